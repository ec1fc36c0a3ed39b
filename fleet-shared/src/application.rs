use serde::{Deserialize, Serialize};

/// Every attribute is optional because a `$select` projection may drop any of them.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Application {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
}

impl Application {
    pub fn display_name(&self) -> &str {
        self.app_name
            .as_deref()
            .or(self.slug.as_deref())
            .unwrap_or("N/a")
    }
}
