pub mod handlers;
pub mod models;
pub mod report;
pub mod repository;

pub use repository::CardRepository;
