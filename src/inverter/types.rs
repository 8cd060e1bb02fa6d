//! EZ1 Local API Type Definitions
//!
//! Every endpoint of the EZ1 local API answers with the same envelope:
//!
//! ```json
//! { "data": { "p1": 139, "e1": 6.23 }, "message": "SUCCESS", "deviceId": "E07000000001" }
//! ```
//!
//! Only `data` is required. Its values are kept as raw JSON so the schema
//! decides how each one is interpreted.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointPayload {
    pub data: Map<String, Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "deviceId")]
    pub device_id: Option<String>,
}
