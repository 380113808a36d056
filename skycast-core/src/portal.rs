//! Configuration portal hand-off: outgoing query string and the
//! "settings closed" response coming back.

use serde::Deserialize;
use serde_json::Value;

use crate::{
    config::ServiceSelection, error::ConfigParseError, model::ScaleUnit, provider::ProviderId,
};

/// Portal page URL carrying the current selection.
pub fn configuration_url(base: &str, selection: &ServiceSelection) -> String {
    let pairs = [
        ("s", selection.provider.as_str().to_string()),
        ("d", selection.debug.to_string()),
        ("u", selection.scale.as_str().to_string()),
        ("b", if selection.battery { "on" } else { "off" }.to_string()),
        ("a", selection.hourly_api_key.clone().unwrap_or_default()),
    ];
    let query = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{base}?{query}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    scale: Option<String>,
    #[serde(default)]
    debug: Option<Value>,
    #[serde(default)]
    battery: Option<Value>,
    #[serde(default)]
    wu_api_key: Option<String>,
}

/// Selection submitted by the portal page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSettings {
    pub provider: ProviderId,
    pub scale: ScaleUnit,
    pub debug: bool,
    pub battery: bool,
    pub hourly_api_key: Option<String>,
}

impl PortalSettings {
    /// Whether applying these settings requires fresh weather.
    pub fn needs_refresh(&self, current: &ServiceSelection) -> bool {
        self.provider != current.provider
            || self.scale != current.scale
            || self.hourly_api_key != current.hourly_api_key
    }

    pub fn apply_to(&self, selection: &mut ServiceSelection) {
        selection.provider = self.provider;
        selection.scale = self.scale;
        selection.debug = self.debug;
        selection.battery = self.battery;
        selection.hourly_api_key = self.hourly_api_key.clone();
    }
}

fn flag(value: Option<&Value>, truthy: &str) -> bool {
    match value {
        Some(Value::String(s)) => s == truthy,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Parse a "settings closed" response.
///
/// `Ok(None)` means the user cancelled: `CANCELLED`, an empty response, or an
/// empty object.
pub fn parse_settings_response(response: &str) -> Result<Option<PortalSettings>, ConfigParseError> {
    let response = response.trim();
    if response.is_empty() || response == "CANCELLED" {
        return Ok(None);
    }

    let decoded =
        urlencoding::decode(response).map_err(|e| ConfigParseError::Decode(e.to_string()))?;
    let object: serde_json::Map<String, Value> = serde_json::from_str(&decoded)?;
    if object.is_empty() {
        return Ok(None);
    }

    let raw: RawSettings = serde_json::from_value(Value::Object(object))?;
    Ok(Some(PortalSettings {
        provider: ProviderId::from_setting(raw.service.as_deref().unwrap_or_default()),
        scale: ScaleUnit::from_setting(raw.scale.as_deref().unwrap_or_default()),
        debug: flag(raw.debug.as_ref(), "true"),
        battery: flag(raw.battery.as_ref(), "on"),
        hourly_api_key: raw.wu_api_key.filter(|k| !k.is_empty()),
    }))
}
