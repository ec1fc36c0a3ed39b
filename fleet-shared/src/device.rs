use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::application::Application;

/// Name of the device -> application relation on the data API.
pub const APPLICATION_RELATION: &str = "belongs_to__application";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Device {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub last_connectivity_event: Option<DateTime<Utc>>,
    #[serde(
        default,
        rename = "belongs_to__application",
        skip_serializing_if = "Option::is_none"
    )]
    pub belongs_to_application: Option<ApplicationLink>,
}

/// The device -> application relation as returned by the API.
///
/// Expanded, it is an array holding the related row. When the caller cannot
/// read that row the array is empty or carries an empty object. Unexpanded,
/// it is a bare `{ "__id": n }` reference.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ApplicationLink {
    Expanded(Vec<Map<String, Value>>),
    Reference {
        #[serde(rename = "__id")]
        id: u64,
    },
}

impl Device {
    pub fn short_uuid(&self) -> &str {
        let uuid = self.uuid.as_deref().unwrap_or("-");
        uuid.get(..7).unwrap_or(uuid)
    }

    /// Owning application from an expanded relation, `None` when the relation
    /// was not expanded or came back empty.
    pub fn expanded_application(&self) -> Result<Option<Application>, serde_json::Error> {
        match &self.belongs_to_application {
            Some(ApplicationLink::Expanded(rows)) => match rows.first() {
                Some(row) if !row.is_empty() => {
                    serde_json::from_value(Value::Object(row.clone())).map(Some)
                }
                _ => Ok(None),
            },
            Some(ApplicationLink::Reference { .. }) | None => Ok(None),
        }
    }
}
