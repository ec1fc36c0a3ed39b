//! OData-style read options: `$select` projections and `$expand` relations.

use serde::{Deserialize, Serialize};

use crate::device::APPLICATION_RELATION;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, Hash)]
pub struct Expand {
    pub relation: String,
    pub select: Option<Vec<String>>,
}

impl Expand {
    pub fn relation(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            select: None,
        }
    }

    pub fn select(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    fn render(&self) -> String {
        match &self.select {
            Some(fields) => format!("{}($select={})", self.relation, fields.join(",")),
            None => self.relation.clone(),
        }
    }
}

/// Options for a single device read.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, Hash)]
pub struct DeviceQuery {
    pub select: Option<Vec<String>>,
    pub expand: Vec<Expand>,
}

impl DeviceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn expand(mut self, expand: Expand) -> Self {
        self.expand.push(expand);
        self
    }

    /// Device read expanded with its owning application, the way the
    /// identity resolver asks for it.
    pub fn with_application(device_fields: Option<&[&str]>, app_fields: Option<&[&str]>) -> Self {
        let mut expand = Expand::relation(APPLICATION_RELATION);
        if let Some(fields) = app_fields {
            expand = expand.select(fields.iter().copied());
        }
        let query = Self::new().expand(expand);
        match device_fields {
            Some(fields) => query.select(fields.iter().copied()),
            None => query,
        }
    }

    /// Query-string pairs, in a stable order.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(fields) = &self.select {
            params.push(("$select".to_string(), fields.join(",")));
        }
        if !self.expand.is_empty() {
            let expand = self
                .expand
                .iter()
                .map(Expand::render)
                .collect::<Vec<_>>()
                .join(",");
            params.push(("$expand".to_string(), expand));
        }
        params
    }

    /// Canonical text form, used where a query must be part of a lookup key.
    pub fn fingerprint(&self) -> String {
        self.to_params()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}
