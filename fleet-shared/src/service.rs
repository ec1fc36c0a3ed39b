use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Service {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub service_name: Option<String>,
}
