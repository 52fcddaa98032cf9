use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub author_id: Option<u64>,
    pub created_at: Option<String>,
    #[serde(default = "default_public")]
    pub public: bool,
    #[serde(default)]
    pub body: String,
}

fn default_public() -> bool {
    true
}
