//! Response envelopes returned by Tapo devices.
//!
//! Every decrypted response has the shape `{"error_code": 0, "result": ...}`.
//! A non-zero `error_code` is surfaced as [`Error::Device`]; `result` is
//! parsed into whatever type the caller asks for.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::Error;

/// Top-level response envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiResponse {
    /// Zero on success, a device-specific code otherwise.
    pub error_code: i32,
    /// Method result; `null` when the method returns nothing.
    #[serde(default)]
    pub result: Value,
}

impl ApiResponse {
    /// Parses a decrypted response body.
    pub fn from_slice(body: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(body).map_err(|e| Error::ParseError(e.to_string()))
    }

    /// Checks the error code and parses the result.
    pub fn into_result<R: DeserializeOwned>(self) -> Result<R, Error> {
        if self.error_code != 0 {
            return Err(Error::Device {
                code: self.error_code,
            });
        }
        serde_json::from_value(self.result).map_err(|e| Error::ParseError(e.to_string()))
    }
}

/// Result of a `control_child` request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlChildResult {
    /// The child's own response envelope.
    #[serde(rename = "responseData")]
    pub response_data: ApiResponse,
}

/// Result of a `get_child_device_list` request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChildDeviceList {
    /// Child devices, each an object carrying at least `device_id`.
    #[serde(default)]
    pub child_device_list: Vec<Value>,
    /// Index of the first child in this page.
    #[serde(default)]
    pub start_index: u32,
    /// Total number of paired children.
    #[serde(default)]
    pub sum: u32,
}

impl ChildDeviceList {
    /// Returns the child with the given `device_id`.
    pub fn find(&self, device_id: &str) -> Option<&Value> {
        self.child_device_list
            .iter()
            .find(|child| child.get("device_id").and_then(Value::as_str) == Some(device_id))
    }
}
