use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone)]
pub struct User {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Display name and contact email attributed to a user id.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Fallback used for comment authors with a missing or unknown id.
    pub fn unknown_user() -> Self {
        Self::new("Unknown User", "unknown@example.com")
    }
}

impl User {
    /// Identity for this user, filling in placeholders for missing fields.
    pub fn to_identity(&self, id: u64) -> Identity {
        Identity {
            name: self.name.clone().unwrap_or_else(|| "Unknown".to_string()),
            email: self
                .email
                .clone()
                .unwrap_or_else(|| format!("user_{id}@example.com")),
        }
    }
}
