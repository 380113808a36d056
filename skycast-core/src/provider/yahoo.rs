use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::{
    FetchError,
    model::{Location, Reading, ScaleUnit, WeatherReading, clock_label},
    provider::{
        get_json, local_now, parse_i32, parse_meridiem_time, tz_offset_seconds, wall_clock_today,
    },
};

use super::WeatherProvider;

/// Current conditions from Yahoo's YQL endpoint.
///
/// One multi-query resolves the coordinates to a place and fetches its
/// forecast channel in the requested scale, so temperatures pass through.
/// Sunrise and sunset arrive as local wall-clock strings and are anchored
/// to today's date on the host.
#[derive(Debug, Clone)]
pub struct YahooProvider {
    http: Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new(http: Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    fn request_url(&self, location: Location, scale: ScaleUnit) -> Result<Url, FetchError> {
        let text = format!("{},{}", location.latitude, location.longitude);
        let subselect =
            format!(r#"SELECT woeid FROM geo.placefinder WHERE text="{text}" AND gflags="R""#);
        let neighbor =
            format!(r#"SELECT * FROM geo.placefinder WHERE text="{text}" AND gflags="R";"#);
        let query = format!(
            r#"SELECT * FROM weather.forecast WHERE woeid IN ({subselect}) AND u="{}";"#,
            scale.as_str().to_lowercase()
        );
        let multi = format!("SELECT * FROM yql.query.multi WHERE queries='{query} {neighbor}'");

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| FetchError::http(format!("Invalid Yahoo URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("q", &multi)
            .append_pair("nocache", &Utc::now().timestamp_millis().to_string());
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct YqlResponse {
    query: YqlQuery,
}

#[derive(Debug, Deserialize)]
struct YqlQuery {
    results: YqlOuterResults,
}

#[derive(Debug, Deserialize)]
struct YqlOuterResults {
    results: (YChannelResult, YPlaceResult),
}

#[derive(Debug, Deserialize)]
struct YChannelResult {
    channel: YChannel,
}

#[derive(Debug, Deserialize)]
struct YChannel {
    astronomy: YAstronomy,
    item: YItem,
}

#[derive(Debug, Deserialize)]
struct YAstronomy {
    sunrise: String,
    sunset: String,
}

#[derive(Debug, Deserialize)]
struct YItem {
    #[serde(rename = "pubDate")]
    pub_date: String,
    condition: YCondition,
}

#[derive(Debug, Deserialize)]
struct YCondition {
    code: String,
    temp: String,
}

#[derive(Debug, Deserialize)]
struct YPlaceResult {
    #[serde(rename = "Result")]
    result: YPlace,
}

#[derive(Debug, Deserialize)]
struct YPlace {
    #[serde(default)]
    neighborhood: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

/// `"Tue, 29 Nov 2005 3:56 pm PST"`: the trailing zone name is dropped and the
/// wall time is kept as published.
fn parse_pub_date(text: &str) -> Option<NaiveDateTime> {
    let without_zone = match text.trim().rsplit_once(' ') {
        Some((head, tail)) if tail.chars().all(|c| c.is_ascii_alphabetic()) => head,
        _ => text.trim(),
    };
    NaiveDateTime::parse_from_str(&without_zone.to_uppercase(), "%a, %d %b %Y %I:%M %p").ok()
}

fn sun_time<Tz: TimeZone>(now: &DateTime<Tz>, field: &str, text: &str) -> Result<i64, FetchError> {
    parse_meridiem_time(text)
        .and_then(|t| wall_clock_today(now, t))
        .ok_or_else(|| FetchError::http(format!("Yahoo {field} is not a clock time: '{text}'")))
}

fn normalize<Tz: TimeZone>(
    parsed: YqlResponse,
    now: &DateTime<Tz>,
) -> Result<WeatherReading, FetchError> {
    let (channel, place) = parsed.query.results.results;
    let channel = channel.channel;

    let published_at = match parse_pub_date(&channel.item.pub_date) {
        Some(dt) => clock_label(&dt),
        None => clock_label(&now.naive_local()),
    };

    let locale = place
        .result
        .neighborhood
        .filter(|n| !n.is_empty())
        .or(place.result.city.filter(|c| !c.is_empty()))
        .unwrap_or_else(|| "unknown".to_string());

    Ok(WeatherReading {
        condition_code: parse_i32("condition.code", &channel.item.condition.code)?,
        temperature: parse_i32("condition.temp", &channel.item.condition.temp)?,
        sunrise: sun_time(now, "sunrise", &channel.astronomy.sunrise)?,
        sunset: sun_time(now, "sunset", &channel.astronomy.sunset)?,
        locale,
        published_at,
        timezone_offset_seconds: tz_offset_seconds(now),
    })
}

#[async_trait]
impl WeatherProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch(&self, location: Location, scale: ScaleUnit) -> Result<Reading, FetchError> {
        let url = self.request_url(location, scale)?;
        let parsed: YqlResponse = get_json(&self.http, url.as_str(), "Yahoo").await?;
        let now: DateTime<Local> = local_now();
        normalize(parsed, &now).map(Reading::Current)
    }
}
