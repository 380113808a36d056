use crate::{
    Config, FetchError,
    model::{Location, Reading, ScaleUnit},
    provider::{
        openweather::OpenWeatherProvider,
        underground::{UndergroundConditionsProvider, UndergroundHourlyProvider},
        yahoo::YahooProvider,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveTime, Offset, TimeZone};
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};

pub mod openweather;
pub mod underground;
pub mod yahoo;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Selectable source of current conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProviderId {
    #[default]
    #[serde(rename = "yahoo")]
    Yahoo,
    #[serde(rename = "open")]
    OpenWeather,
    #[serde(rename = "wunder")]
    Underground,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Yahoo => "yahoo",
            ProviderId::OpenWeather => "open",
            ProviderId::Underground => "wunder",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::Yahoo, ProviderId::OpenWeather, ProviderId::Underground]
    }

    /// Device and portal messages fall back to Yahoo for anything unrecognized.
    pub fn from_setting(value: &str) -> Self {
        ProviderId::try_from(value).unwrap_or_default()
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "yahoo" => Ok(ProviderId::Yahoo),
            "open" | "openweather" => Ok(ProviderId::OpenWeather),
            "wunder" | "underground" => Ok(ProviderId::Underground),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: yahoo, open, wunder."
            )),
        }
    }
}

/// One upstream source, normalized to a fixed reading shape.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    async fn fetch(&self, location: Location, scale: ScaleUnit) -> Result<Reading, FetchError>;
}

/// HTTP client shared by every provider.
pub fn http_client() -> anyhow::Result<Client> {
    let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
    Ok(client)
}

/// Construct the conditions provider selected by `id`.
///
/// `hourly_key` is the Weather Underground key from the key-value store; the
/// Underground conditions provider shares it.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
    hourly_key: Option<&str>,
    http: &Client,
) -> Arc<dyn WeatherProvider> {
    let endpoints = &config.endpoints;
    match id {
        ProviderId::Yahoo => Arc::new(YahooProvider::new(http.clone(), endpoints.yahoo.clone())),
        ProviderId::OpenWeather => Arc::new(OpenWeatherProvider::new(
            http.clone(),
            endpoints.openweather.clone(),
            config.provider_api_key(id).map(str::to_owned),
        )),
        ProviderId::Underground => Arc::new(UndergroundConditionsProvider::new(
            http.clone(),
            endpoints.underground.clone(),
            hourly_key.map(str::to_owned),
        )),
    }
}

/// Construct the hourly forecast provider, or `None` when no key is configured.
pub fn hourly_provider_from_config(
    config: &Config,
    hourly_key: Option<&str>,
    http: &Client,
) -> Option<Arc<dyn WeatherProvider>> {
    let key = hourly_key?;
    Some(Arc::new(UndergroundHourlyProvider::new(
        http.clone(),
        config.endpoints.underground.clone(),
        key.to_owned(),
        (config.update.hourly_index_1, config.update.hourly_index_2),
    )))
}

/// Single GET expecting `200` and a JSON body of shape `T`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    http: &Client,
    url: &str,
    source: &str,
) -> Result<T, FetchError> {
    let res = http
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::http(format!("Failed to send request to {source}: {e}")))?;

    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| FetchError::http(format!("Failed to read {source} response body: {e}")))?;

    if status != reqwest::StatusCode::OK {
        return Err(FetchError::http(format!(
            "{source} request failed with status {status}: {}",
            truncate_body(&body),
        )));
    }

    serde_json::from_str(&body)
        .map_err(|e| FetchError::http(format!("Failed to parse {source} JSON: {e}")))
}

/// Upstreams send most numbers as strings; mirror a lenient integer parse.
pub(crate) fn parse_int(field: &str, value: &str) -> Result<i64, FetchError> {
    let trimmed = value.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| {
            trimmed
                .parse::<f64>()
                .ok()
                .map(f64::trunc)
                .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        })
        .ok_or_else(|| FetchError::http(format!("Field '{field}' is not a number: '{value}'")))
}

/// [`parse_int`] for fields the device stores as 32-bit integers.
pub(crate) fn parse_i32(field: &str, value: &str) -> Result<i32, FetchError> {
    let wide = parse_int(field, value)?;
    i32::try_from(wide)
        .map_err(|_| FetchError::http(format!("Field '{field}' is out of range: {wide}")))
}

/// Round half up to the nearest integer the device can store.
pub(crate) fn round_i32(field: &str, value: f64) -> Result<i32, FetchError> {
    let rounded = (value + 0.5).floor();
    if rounded.is_finite() && rounded >= f64::from(i32::MIN) && rounded <= f64::from(i32::MAX) {
        Ok(rounded as i32)
    } else {
        Err(FetchError::http(format!("Field '{field}' is out of range: {value}")))
    }
}

/// Offset reported to the device: seconds to add to local time to get UTC.
pub(crate) fn tz_offset_seconds<Tz: TimeZone>(now: &DateTime<Tz>) -> i32 {
    -now.offset().fix().local_minus_utc()
}

pub(crate) fn local_now() -> DateTime<Local> {
    Local::now()
}

/// Interpret a wall-clock time as today's date in `now`'s zone, as epoch seconds.
pub(crate) fn wall_clock_today<Tz: TimeZone>(now: &DateTime<Tz>, time: NaiveTime) -> Option<i64> {
    now.date_naive()
        .and_time(time)
        .and_local_timezone(now.timezone())
        .earliest()
        .map(|dt| dt.timestamp())
}

/// Parse `"7:12 am"` style times.
pub(crate) fn parse_meridiem_time(text: &str) -> Option<NaiveTime> {
    let mut parts = text.split_whitespace();
    let clock = parts.next()?;
    let meridiem = parts.next().map(str::to_ascii_lowercase);

    let (hour, minute) = clock.split_once(':')?;
    let mut hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;

    match meridiem.as_deref() {
        Some("am") if hour == 12 => hour = 0,
        Some("pm") if hour < 12 => hour += 12,
        Some("am") | Some("pm") | None => {}
        Some(_) => return None,
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::{FixedOffset, NaiveDate};

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let s = id.as_str();
            let parsed = ProviderId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn unknown_setting_falls_back_to_yahoo() {
        assert_eq!(ProviderId::from_setting("open"), ProviderId::OpenWeather);
        assert_eq!(ProviderId::from_setting("bogus"), ProviderId::Yahoo);
        assert_eq!(ProviderId::from_setting(""), ProviderId::Yahoo);
    }

    #[test]
    fn hourly_provider_requires_key() {
        let cfg = Config::default();
        let http = Client::new();
        assert!(hourly_provider_from_config(&cfg, None, &http).is_none());
        let provider = hourly_provider_from_config(&cfg, Some("KEY"), &http).unwrap();
        assert_eq!(provider.name(), "underground-hourly");
    }

    #[test]
    fn provider_from_config_matches_id() {
        let cfg = Config::default();
        let http = Client::new();
        assert_eq!(provider_from_config(ProviderId::Yahoo, &cfg, None, &http).name(), "yahoo");
        assert_eq!(
            provider_from_config(ProviderId::OpenWeather, &cfg, None, &http).name(),
            "openweather"
        );
        assert_eq!(
            provider_from_config(ProviderId::Underground, &cfg, None, &http).name(),
            "underground"
        );
    }

    #[test]
    fn parse_int_accepts_strings_and_decimals() {
        assert_eq!(parse_int("t", "42").unwrap(), 42);
        assert_eq!(parse_int("t", " -7 ").unwrap(), -7);
        assert_eq!(parse_int("t", "33.8").unwrap(), 33);
        assert!(parse_int("t", "warm").is_err());
        assert!(parse_int("t", "NaN").is_err());
        assert!(parse_int("t", "1e300").is_err());
    }

    #[test]
    fn device_integers_reject_out_of_range_values() {
        assert_eq!(parse_i32("temp", "-40").unwrap(), -40);
        assert_eq!(parse_i32("temp", "2147483647").unwrap(), i32::MAX);
        let err = parse_i32("temp", "4294967338").unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");

        assert_eq!(round_i32("temp_f", 71.5).unwrap(), 72);
        assert_eq!(round_i32("temp_f", -3.6).unwrap(), -4);
        assert!(round_i32("temp_f", 1e12).is_err());
        assert!(round_i32("temp_f", f64::NAN).is_err());
    }

    #[test]
    fn meridiem_times_parse() {
        assert_eq!(parse_meridiem_time("7:12 am"), NaiveTime::from_hms_opt(7, 12, 0));
        assert_eq!(parse_meridiem_time("4:48 pm"), NaiveTime::from_hms_opt(16, 48, 0));
        assert_eq!(parse_meridiem_time("12:05 am"), NaiveTime::from_hms_opt(0, 5, 0));
        assert_eq!(parse_meridiem_time("12:30 PM"), NaiveTime::from_hms_opt(12, 30, 0));
        assert_eq!(parse_meridiem_time("13:00"), NaiveTime::from_hms_opt(13, 0, 0));
        assert_eq!(parse_meridiem_time("sunrise"), None);
        assert_eq!(parse_meridiem_time("7:12 xm"), None);
    }

    #[test]
    fn wall_clock_is_anchored_to_today_in_zone() {
        let zone = FixedOffset::west_opt(6 * 3600).unwrap();
        let now = NaiveDate::from_ymd_opt(2014, 3, 2)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
            .and_local_timezone(zone)
            .unwrap();

        let sunrise = wall_clock_today(&now, NaiveTime::from_hms_opt(7, 0, 0).unwrap()).unwrap();
        // 2014-03-02 07:00 -06:00 == 13:00 UTC
        assert_eq!(sunrise, 1_393_765_200);
        assert_eq!(tz_offset_seconds(&now), 6 * 3600);
    }

    #[test]
    fn truncate_body_caps_length() {
        let long = "x".repeat(500);
        let truncated = truncate_body(&long);
        assert_eq!(truncated.len(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
