use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: u64,
    pub subject: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(rename = "type")]
    pub ticket_type: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub assignee_id: Option<u64>,
    pub requester_id: Option<u64>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CustomField {
    pub id: u64,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Ticket {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.parse::<DateTime<Utc>>().ok()
    }
}

impl CustomField {
    /// Render the value for a flat export column, or `None` when the field
    /// carries nothing worth a column.
    pub fn export_value(&self) -> Option<String> {
        use serde_json::Value;

        match &self.value {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::Array(items) if items.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            other => Some(other.to_string()),
        }
    }
}
