use serde::{Deserialize, Serialize};

/// One stored contact method row. A contact can hold any number of these,
/// several of the same type included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMethod {
    pub id: i64,
    pub contact_id: i64,
    pub method_type: String,
    pub method_value: String,
}

/// A method as the API speaks it: `{"type": "phone", "value": "555"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodEntry {
    #[serde(rename = "type")]
    pub method_type: String,
    pub value: String,
}

impl MethodEntry {
    pub fn new(method_type: String, value: String) -> Self {
        Self { method_type, value }
    }
}

/// A method as submitted by a client. Either field may be missing or blank;
/// such entries are silently dropped rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MethodInput {
    #[serde(rename = "type")]
    pub method_type: Option<String>,
    pub value: Option<String>,
}

impl MethodInput {
    /// The trimmed `(type, value)` pair, or `None` when either side is
    /// missing or empty.
    pub fn well_formed(&self) -> Option<(&str, &str)> {
        let method_type = self.method_type.as_deref().map(str::trim)?;
        let value = self.value.as_deref().map(str::trim)?;
        if method_type.is_empty() || value.is_empty() {
            return None;
        }
        Some((method_type, value))
    }
}
