// Monthly payments report (CSV)

use chrono::{Datelike, NaiveDate};

use super::models::PaymentReportRow;
use crate::error::{AppError, AppResult};

pub const REPORT_HEADER: [&str; 5] = ["name", "last4", "payment_date", "method", "note"];

/// A `YYYY-MM` report month as the half-open range `[first day, first day of next month)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportMonth {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportMonth {
    pub fn parse(month: &str) -> AppResult<Self> {
        let invalid = || AppError::InvalidInput(format!("month must be YYYY-MM, got {:?}", month));

        let month = month.trim();
        if month.len() != 7 {
            return Err(invalid());
        }

        let start = NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
            .map_err(|_| invalid())?;
        let end = if start.month() == 12 {
            NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
        }
        .ok_or_else(invalid)?;

        Ok(Self { start, end })
    }

    pub fn label(&self) -> String {
        self.start.format("%Y-%m").to_string()
    }

    pub fn file_name(&self) -> String {
        format!("payments-{}.csv", self.label())
    }
}

/// Render report rows as CSV, header first
pub fn write_csv(rows: &[PaymentReportRow]) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(REPORT_HEADER)?;

    for row in rows {
        let payment_date = row.payment_date.to_string();
        writer.write_record([
            row.name.as_str(),
            row.last4.as_str(),
            payment_date.as_str(),
            row.method.as_deref().unwrap_or(""),
            row.note.as_deref().unwrap_or(""),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV flush failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_bounds() {
        let may = ReportMonth::parse("2025-05").unwrap();
        assert_eq!((may.start, may.end), (date(2025, 5, 1), date(2025, 6, 1)));
        assert_eq!(may.file_name(), "payments-2025-05.csv");

        let december = ReportMonth::parse("2024-12").unwrap();
        assert_eq!(december.end, date(2025, 1, 1));
    }

    #[test]
    fn test_bad_months_rejected() {
        for bad in ["", "2025", "2025-13", "2025-5", "May 2025", "2025-05-01"] {
            assert!(
                matches!(ReportMonth::parse(bad), Err(AppError::InvalidInput(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_csv_layout() {
        let rows = vec![
            PaymentReportRow {
                name: "Visa".to_string(),
                last4: "4242".to_string(),
                payment_date: date(2025, 5, 3),
                method: Some("manual".to_string()),
                note: None,
            },
            PaymentReportRow {
                name: "Amex, Gold".to_string(),
                last4: "0005".to_string(),
                payment_date: date(2025, 5, 20),
                method: None,
                note: Some("paid late".to_string()),
            },
        ];

        let csv = String::from_utf8(write_csv(&rows).unwrap()).unwrap();
        assert_eq!(
            csv,
            "name,last4,payment_date,method,note\n\
             Visa,4242,2025-05-03,manual,\n\
             \"Amex, Gold\",0005,2025-05-20,,paid late\n"
        );
    }

    #[test]
    fn test_empty_report_has_header_only() {
        let csv = String::from_utf8(write_csv(&[]).unwrap()).unwrap();
        assert_eq!(csv, "name,last4,payment_date,method,note\n");
    }
}
