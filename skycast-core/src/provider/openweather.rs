use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::{
    FetchError,
    model::{Location, Reading, ScaleUnit, WeatherReading, clock_label},
    provider::{get_json, local_now, tz_offset_seconds},
};

use super::WeatherProvider;

/// Current conditions from OpenWeatherMap. Reports Kelvin and absolute epoch
/// sunrise/sunset.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenWeatherProvider {
    pub fn new(http: Client, base_url: String, api_key: Option<String>) -> Self {
        Self { http, base_url, api_key }
    }

    fn request_url(&self, location: Location) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| FetchError::http(format!("Invalid OpenWeather URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("lat", &location.latitude.to_string())
            .append_pair("lon", &location.longitude.to_string())
            .append_pair("cnt", "1");
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("appid", key);
        }
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    id: i32,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    sunrise: i64,
    sunset: i64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    #[serde(default)]
    name: Option<String>,
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    sys: OwSys,
}

fn normalize<Tz: TimeZone>(
    parsed: OwCurrentResponse,
    scale: ScaleUnit,
    now: &DateTime<Tz>,
) -> Result<WeatherReading, FetchError> {
    let condition_code = parsed
        .weather
        .first()
        .map(|w| w.id)
        .ok_or_else(|| FetchError::http("OpenWeather response contained no weather entry"))?;

    let published = now
        .timezone()
        .timestamp_opt(parsed.dt, 0)
        .single()
        .ok_or_else(|| FetchError::http(format!("OpenWeather dt out of range: {}", parsed.dt)))?;

    let locale = parsed
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    Ok(WeatherReading {
        condition_code,
        temperature: scale.from_kelvin(parsed.main.temp),
        sunrise: parsed.sys.sunrise,
        sunset: parsed.sys.sunset,
        locale,
        published_at: clock_label(&published),
        timezone_offset_seconds: tz_offset_seconds(now),
    })
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn name(&self) -> &'static str {
        "openweather"
    }

    async fn fetch(&self, location: Location, scale: ScaleUnit) -> Result<Reading, FetchError> {
        let url = self.request_url(location)?;
        let parsed: OwCurrentResponse = get_json(&self.http, url.as_str(), "OpenWeather").await?;
        let now: DateTime<Local> = local_now();
        normalize(parsed, scale, &now).map(Reading::Current)
    }
}
