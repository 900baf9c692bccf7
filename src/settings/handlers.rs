use axum::{extract::State, Json};
use std::collections::BTreeMap;
use std::collections::HashMap;

use super::{is_known_key, Settings, KNOWN_KEYS, SECRET_KEYS};
use crate::api::handler::AppState;
use crate::error::{AppError, AppResult};

/// Stand-in returned for stored secrets
pub const SECRET_MASK: &str = "********";

/// Known keys with secrets masked; unset keys come back empty
pub fn masked_view(settings: &Settings) -> BTreeMap<String, String> {
    KNOWN_KEYS
        .iter()
        .map(|key| {
            let value = match settings.get(key) {
                Some(_) if SECRET_KEYS.contains(key) => SECRET_MASK.to_string(),
                Some(value) => value.to_string(),
                None => String::new(),
            };
            (key.to_string(), value)
        })
        .collect()
}

/// Turn a settings update body into rows to write
///
/// Unknown keys are rejected. A secret sent back as the mask keeps its stored value.
pub fn prepare_update(body: HashMap<String, Option<String>>) -> AppResult<Vec<(String, String)>> {
    if let Some(unknown) = body.keys().find(|key| !is_known_key(key)) {
        return Err(AppError::InvalidInput(format!("unknown setting {:?}", unknown)));
    }

    let mut values: Vec<(String, String)> = body
        .into_iter()
        .filter(|(key, value)| {
            !(SECRET_KEYS.contains(&key.as_str()) && value.as_deref() == Some(SECRET_MASK))
        })
        .map(|(key, value)| (key, value.unwrap_or_default().trim().to_string()))
        .collect();
    values.sort();
    Ok(values)
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> AppResult<Json<BTreeMap<String, String>>> {
    let settings = state.settings.load().await?;
    Ok(Json(masked_view(&settings)))
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<HashMap<String, Option<String>>>,
) -> AppResult<Json<BTreeMap<String, String>>> {
    let values = prepare_update(body)?;
    if !values.is_empty() {
        state.settings.upsert(&values).await?;
    }

    let settings = state.settings.load().await?;
    Ok(Json(masked_view(&settings)))
}
