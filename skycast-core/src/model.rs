use chrono::Timelike;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::provider::ProviderId;

/// A position in floating point degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Temperature scale selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScaleUnit {
    #[serde(rename = "C")]
    Celsius,
    #[default]
    #[serde(rename = "F")]
    Fahrenheit,
}

impl ScaleUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleUnit::Celsius => "C",
            ScaleUnit::Fahrenheit => "F",
        }
    }

    /// Anything other than `C` means Fahrenheit.
    pub fn from_setting(value: &str) -> Self {
        if value == "C" { ScaleUnit::Celsius } else { ScaleUnit::Fahrenheit }
    }

    /// Convert a Kelvin reading, rounding half toward positive infinity.
    pub fn from_kelvin(&self, kelvin: f64) -> i32 {
        let celsius = kelvin - 273.15;
        let value = match self {
            ScaleUnit::Celsius => celsius,
            ScaleUnit::Fahrenheit => celsius * 1.8 + 32.0,
        };
        (value + 0.5).floor() as i32
    }
}

impl std::fmt::Display for ScaleUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized current conditions, identical in shape for every provider.
///
/// `sunrise`/`sunset` keep the semantics of the provider that produced them:
/// absolute epoch seconds for OpenWeather, today's local wall clock (as epoch
/// seconds) for the location-lookup providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeatherReading {
    #[serde(rename = "condition")]
    pub condition_code: i32,
    pub temperature: i32,
    pub sunrise: i64,
    pub sunset: i64,
    pub locale: String,
    #[serde(rename = "pubdate")]
    pub published_at: String,
    #[serde(rename = "tzoffset")]
    pub timezone_offset_seconds: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyPoint {
    pub temperature: i32,
    pub condition_code: i32,
    pub epoch_time: i64,
    pub precipitation_probability: i32,
}

/// Two forecast points, `hourly_index_1` and `hourly_index_2` hours out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyReading {
    pub first: HourlyPoint,
    pub second: HourlyPoint,
}

impl Serialize for HourlyReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("HourlyReading", 8)?;
        s.serialize_field("h1_temp", &self.first.temperature)?;
        s.serialize_field("h1_cond", &self.first.condition_code)?;
        s.serialize_field("h1_time", &self.first.epoch_time)?;
        s.serialize_field("h1_pop", &self.first.precipitation_probability)?;
        s.serialize_field("h2_temp", &self.second.temperature)?;
        s.serialize_field("h2_cond", &self.second.condition_code)?;
        s.serialize_field("h2_time", &self.second.epoch_time)?;
        s.serialize_field("h2_pop", &self.second.precipitation_probability)?;
        s.end()
    }
}

/// What a provider produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    Current(WeatherReading),
    Hourly(HourlyReading),
}

/// Settings echoed back to the device after the portal closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSettings {
    pub service: ProviderId,
    pub scale: ScaleUnit,
    pub debug: u8,
    pub battery: u8,
}

pub const HTTP_ERROR: &str = "HTTP Error";
pub const LOCATION_UNAVAILABLE: &str = "Loc unavailable";

/// Every message the device can receive. Serializes to the exact wire maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Conditions(WeatherReading),
    Hourly(HourlyReading),
    Error { error: String },
    HourlyDisabled { hourly_enabled: u8 },
    Ready { js_ready: bool },
    Settings(DeviceSettings),
}

impl Payload {
    pub fn http_error() -> Self {
        Payload::Error { error: HTTP_ERROR.to_string() }
    }

    pub fn location_unavailable() -> Self {
        Payload::Error { error: LOCATION_UNAVAILABLE.to_string() }
    }

    pub fn hourly_disabled() -> Self {
        Payload::HourlyDisabled { hourly_enabled: 0 }
    }

    pub fn ready() -> Self {
        Payload::Ready { js_ready: true }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Conditions(_) => "conditions",
            Payload::Hourly(_) => "hourly",
            Payload::Error { .. } => "error",
            Payload::HourlyDisabled { .. } => "hourly_disabled",
            Payload::Ready { .. } => "ready",
            Payload::Settings(_) => "settings",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl From<Reading> for Payload {
    fn from(reading: Reading) -> Self {
        match reading {
            Reading::Current(r) => Payload::Conditions(r),
            Reading::Hourly(r) => Payload::Hourly(r),
        }
    }
}

/// `H:MM`, hour not zero-padded.
pub(crate) fn clock_label<T: Timelike>(time: &T) -> String {
    format!("{}:{:02}", time.hour(), time.minute())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use serde_json::json;

    #[test]
    fn kelvin_conversion_hits_fixed_points() {
        assert_eq!(ScaleUnit::Celsius.from_kelvin(273.15), 0);
        assert_eq!(ScaleUnit::Fahrenheit.from_kelvin(273.15), 32);
        assert_eq!(ScaleUnit::Celsius.from_kelvin(373.15), 100);
        assert_eq!(ScaleUnit::Fahrenheit.from_kelvin(373.15), 212);
    }

    #[test]
    fn kelvin_conversion_rounds_to_nearest() {
        assert_eq!(ScaleUnit::Celsius.from_kelvin(272.75), 0);
        assert_eq!(ScaleUnit::Celsius.from_kelvin(273.85), 1);
        assert_eq!(ScaleUnit::Celsius.from_kelvin(263.15), -10);
        assert_eq!(ScaleUnit::Fahrenheit.from_kelvin(255.372), 0);
    }

    #[test]
    fn scale_from_setting_defaults_to_fahrenheit() {
        assert_eq!(ScaleUnit::from_setting("C"), ScaleUnit::Celsius);
        assert_eq!(ScaleUnit::from_setting("F"), ScaleUnit::Fahrenheit);
        assert_eq!(ScaleUnit::from_setting("kelvin"), ScaleUnit::Fahrenheit);
    }

    #[test]
    fn conditions_payload_uses_wire_names() {
        let payload = Payload::Conditions(WeatherReading {
            condition_code: 800,
            temperature: 72,
            sunrise: 1_400_000_000,
            sunset: 1_400_050_000,
            locale: "Ames".into(),
            published_at: "9:05".into(),
            timezone_offset_seconds: 18000,
        });

        assert_eq!(
            payload.to_json().unwrap(),
            json!({
                "condition": 800,
                "temperature": 72,
                "sunrise": 1_400_000_000,
                "sunset": 1_400_050_000,
                "locale": "Ames",
                "pubdate": "9:05",
                "tzoffset": 18000
            })
        );
    }

    #[test]
    fn hourly_payload_is_flat() {
        let point = |t, c, e, p| HourlyPoint {
            temperature: t,
            condition_code: c,
            epoch_time: e,
            precipitation_probability: p,
        };
        let payload = Payload::Hourly(HourlyReading {
            first: point(60, 1, 100, 10),
            second: point(55, 13, 200, 80),
        });

        assert_eq!(
            payload.to_json().unwrap(),
            json!({
                "h1_temp": 60, "h1_cond": 1, "h1_time": 100, "h1_pop": 10,
                "h2_temp": 55, "h2_cond": 13, "h2_time": 200, "h2_pop": 80
            })
        );
    }

    #[test]
    fn fixed_payloads_match_wire_contract() {
        assert_eq!(Payload::http_error().to_json().unwrap(), json!({"error": "HTTP Error"}));
        assert_eq!(
            Payload::location_unavailable().to_json().unwrap(),
            json!({"error": "Loc unavailable"})
        );
        assert_eq!(Payload::hourly_disabled().to_json().unwrap(), json!({"hourly_enabled": 0}));
        assert_eq!(Payload::ready().to_json().unwrap(), json!({"js_ready": true}));
    }

    #[test]
    fn settings_payload_serializes_service_id() {
        let payload = Payload::Settings(DeviceSettings {
            service: ProviderId::OpenWeather,
            scale: ScaleUnit::Celsius,
            debug: 1,
            battery: 0,
        });
        assert_eq!(
            payload.to_json().unwrap(),
            json!({"service": "open", "scale": "C", "debug": 1, "battery": 0})
        );
    }

    #[test]
    fn clock_label_does_not_pad_hour() {
        let t = NaiveTime::from_hms_opt(9, 5, 0).unwrap();
        assert_eq!(clock_label(&t), "9:05");
        let t = NaiveTime::from_hms_opt(17, 30, 0).unwrap();
        assert_eq!(clock_label(&t), "17:30");
    }
}
