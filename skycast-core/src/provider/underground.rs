//! Weather Underground: the hourly forecast source, and a current-conditions
//! source whose textual conditions go through [`condition_code`].

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    FetchError,
    condition::condition_code,
    model::{HourlyPoint, HourlyReading, Location, Reading, ScaleUnit, WeatherReading, clock_label},
    provider::{
        get_json, local_now, parse_i32, parse_int, round_i32, tz_offset_seconds, wall_clock_today,
    },
};

use super::WeatherProvider;

fn feature_url(base_url: &str, key: &str, features: &str, location: Location) -> String {
    format!(
        "{}/api/{}/{}/q/{},{}.json",
        base_url.trim_end_matches('/'),
        urlencoding::encode(key),
        features,
        location.latitude,
        location.longitude
    )
}

#[derive(Debug, Deserialize)]
struct WuTemp {
    english: String,
    metric: String,
}

#[derive(Debug, Deserialize)]
struct WuFctTime {
    epoch: String,
}

#[derive(Debug, Deserialize)]
struct WuHour {
    #[serde(rename = "FCTTIME")]
    fcttime: WuFctTime,
    temp: WuTemp,
    fctcode: String,
    pop: String,
}

#[derive(Debug, Deserialize)]
struct WuHourlyResponse {
    hourly_forecast: Vec<WuHour>,
}

/// Two points of the hourly forecast, picked by index from the series.
#[derive(Debug, Clone)]
pub struct UndergroundHourlyProvider {
    http: Client,
    base_url: String,
    api_key: String,
    indices: (usize, usize),
}

impl UndergroundHourlyProvider {
    pub fn new(http: Client, base_url: String, api_key: String, indices: (usize, usize)) -> Self {
        Self { http, base_url, api_key, indices }
    }
}

fn hourly_point(
    series: &[WuHour],
    index: usize,
    scale: ScaleUnit,
) -> Result<HourlyPoint, FetchError> {
    let hour = series.get(index).ok_or_else(|| {
        FetchError::http(format!(
            "Underground hourly forecast has {} entries, index {index} requested",
            series.len()
        ))
    })?;

    let temp = match scale {
        ScaleUnit::Celsius => &hour.temp.metric,
        ScaleUnit::Fahrenheit => &hour.temp.english,
    };

    Ok(HourlyPoint {
        temperature: parse_i32("temp", temp)?,
        condition_code: parse_i32("fctcode", &hour.fctcode)?,
        epoch_time: parse_int("FCTTIME.epoch", &hour.fcttime.epoch)?,
        precipitation_probability: parse_i32("pop", &hour.pop)?,
    })
}

#[async_trait]
impl WeatherProvider for UndergroundHourlyProvider {
    fn name(&self) -> &'static str {
        "underground-hourly"
    }

    async fn fetch(&self, location: Location, scale: ScaleUnit) -> Result<Reading, FetchError> {
        let url = feature_url(&self.base_url, &self.api_key, "hourly", location);
        let parsed: WuHourlyResponse = get_json(&self.http, &url, "Underground hourly").await?;

        Ok(Reading::Hourly(HourlyReading {
            first: hourly_point(&parsed.hourly_forecast, self.indices.0, scale)?,
            second: hourly_point(&parsed.hourly_forecast, self.indices.1, scale)?,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct WuDisplayLocation {
    #[serde(default)]
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WuObservation {
    weather: String,
    temp_f: f64,
    temp_c: f64,
    observation_epoch: String,
    display_location: WuDisplayLocation,
}

#[derive(Debug, Deserialize)]
struct WuClock {
    hour: String,
    minute: String,
}

#[derive(Debug, Deserialize)]
struct WuSunPhase {
    sunrise: WuClock,
    sunset: WuClock,
}

#[derive(Debug, Deserialize)]
struct WuConditionsResponse {
    current_observation: WuObservation,
    sun_phase: WuSunPhase,
}

/// Current conditions from Weather Underground. Shares the hourly key.
#[derive(Debug, Clone)]
pub struct UndergroundConditionsProvider {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl UndergroundConditionsProvider {
    pub fn new(http: Client, base_url: String, api_key: Option<String>) -> Self {
        Self { http, base_url, api_key }
    }
}

fn sun_clock<Tz: TimeZone>(
    now: &DateTime<Tz>,
    field: &str,
    clock: &WuClock,
) -> Result<i64, FetchError> {
    let hour = parse_int(field, &clock.hour)?;
    let minute = parse_int(field, &clock.minute)?;
    u32::try_from(hour)
        .ok()
        .zip(u32::try_from(minute).ok())
        .and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0))
        .and_then(|t| wall_clock_today(now, t))
        .ok_or_else(|| FetchError::http(format!("Underground {field} is not a clock time")))
}

fn normalize_conditions<Tz: TimeZone>(
    parsed: WuConditionsResponse,
    scale: ScaleUnit,
    now: &DateTime<Tz>,
) -> Result<WeatherReading, FetchError> {
    let obs = parsed.current_observation;
    let temp = match scale {
        ScaleUnit::Celsius => obs.temp_c,
        ScaleUnit::Fahrenheit => obs.temp_f,
    };

    let observed = parse_int("observation_epoch", &obs.observation_epoch)?;
    let published = now
        .timezone()
        .timestamp_opt(observed, 0)
        .single()
        .ok_or_else(|| FetchError::http(format!("Underground epoch out of range: {observed}")))?;

    Ok(WeatherReading {
        condition_code: condition_code(&obs.weather),
        temperature: round_i32("temperature", temp)?,
        sunrise: sun_clock(now, "sunrise", &parsed.sun_phase.sunrise)?,
        sunset: sun_clock(now, "sunset", &parsed.sun_phase.sunset)?,
        locale: obs
            .display_location
            .city
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        published_at: clock_label(&published),
        timezone_offset_seconds: tz_offset_seconds(now),
    })
}

#[async_trait]
impl WeatherProvider for UndergroundConditionsProvider {
    fn name(&self) -> &'static str {
        "underground"
    }

    async fn fetch(&self, location: Location, scale: ScaleUnit) -> Result<Reading, FetchError> {
        let key = self.api_key.as_deref().ok_or(FetchError::MissingApiKey("wunder"))?;
        let url = feature_url(&self.base_url, key, "conditions/astronomy", location);
        let parsed: WuConditionsResponse =
            get_json(&self.http, &url, "Underground conditions").await?;
        let now: DateTime<Local> = local_now();
        normalize_conditions(parsed, scale, &now).map(Reading::Current)
    }
}
