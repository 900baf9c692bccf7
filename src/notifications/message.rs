use serde::Serialize;

use crate::cards::models::MissedCard;

pub const EMAIL_SUBJECT: &str = "CC Tracker: Missed payments";

const EMAIL_HEADER: &str = "The following cards were not paid last month:";

/// Plain-text email body, one line per missed card
pub fn email_body(missed: &[MissedCard]) -> String {
    let mut lines = Vec::with_capacity(missed.len() + 1);
    lines.push(EMAIL_HEADER.to_string());
    lines.extend(
        missed
            .iter()
            .map(|c| format!("- {} ****{} (due {})", c.name, c.last4, c.due_day)),
    );
    lines.join("\n")
}

/// Single-line SMS summary
pub fn sms_body(count: usize) -> String {
    format!("CC Tracker: {} card(s) unpaid last month.", count)
}

/// Webhook body: `{"type": "missed_payments", "cards": [...]}`
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub cards: Vec<WebhookCard<'a>>,
}

#[derive(Debug, Serialize)]
pub struct WebhookCard<'a> {
    pub name: &'a str,
    pub last4: &'a str,
    pub due_day: u32,
}

impl<'a> WebhookPayload<'a> {
    pub fn missed_payments(missed: &'a [MissedCard]) -> Self {
        Self {
            kind: "missed_payments",
            cards: missed
                .iter()
                .map(|c| WebhookCard {
                    name: &c.name,
                    last4: &c.last4,
                    due_day: c.due_day,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::missed_card;

    #[test]
    fn test_email_body_format() {
        let body = email_body(&[
            missed_card(1, "Visa", "4242", 15),
            missed_card(2, "Amex Gold", "0005", 31),
        ]);
        assert_eq!(
            body,
            "The following cards were not paid last month:\n\
             - Visa ****4242 (due 15)\n\
             - Amex Gold ****0005 (due 31)"
        );
    }

    #[test]
    fn test_sms_body_format() {
        assert_eq!(sms_body(2), "CC Tracker: 2 card(s) unpaid last month.");
    }

    #[test]
    fn test_webhook_payload_shape() {
        let missed = vec![missed_card(9, "Visa", "4242", 15)];
        let json = serde_json::to_value(WebhookPayload::missed_payments(&missed)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "missed_payments",
                "cards": [{"name": "Visa", "last4": "4242", "due_day": 15}]
            })
        );
    }
}
