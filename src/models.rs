use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_FILENAME: &str = "chart.png";

// Relay request format. Non-string fields are treated as missing.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct SendChartRequest {
    #[serde(default, deserialize_with = "string_or_none")]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub data: Option<String>,
}

impl SendChartRequest {
    // filename is advisory; blank falls back to the default
    pub fn attachment_name(&self) -> String {
        self.filename
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string()
    }
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

// Relay success body
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SendChartResponse {
    pub ok: bool,
}

// Relay error body, also read back by the composer
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}
