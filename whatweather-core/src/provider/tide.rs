//! Kartverket sea level service (`api.sehavniva.no`).
//!
//! Predictions come back as a tab-separated table which is reshaped into the
//! same GeoJSON-like `Feature` layout the MET Norway forecasts use.

use chrono::{DateTime, Duration as ChronoDuration, Local};
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    http::{Fetcher, HttpRequest},
    model::{DataOrigin, Envelope, ErrorEnvelope, ErrorKind, Metadata, SuccessEnvelope},
    provider::Coordinates,
};

pub const API_NAME: &str = "Kartverket Tide API";
pub const STATIONS_API_NAME: &str = "Kartverket Tide Stations";

pub const DEFAULT_STATION: &str = "BGO";
pub const DEFAULT_DAYS_AHEAD: i64 = 7;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";
const INTERVAL_MINUTES: u32 = 60;
const HEIGHT_FIELD: &str = "sea_surface_height_above_chart_datum";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TideStation {
    pub code: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl TideStation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    fn matches(&self, key: &str) -> bool {
        self.code.eq_ignore_ascii_case(key) || self.name.eq_ignore_ascii_case(key)
    }
}

/// Permanent stations along the coast, used when the station list is unavailable.
const KNOWN_STATIONS: &[(&str, &str, f64, f64)] = &[
    ("BGO", "Bergen", 60.398_046, 5.320_487),
    ("SVG", "Stavanger", 58.974_339, 5.730_121),
    ("OSL", "Oslo", 59.908_559, 10.734_510),
    ("TRD", "Trondheim", 63.436_484, 10.391_669),
    ("TOS", "Tromso", 69.646_110, 18.954_790),
    ("KRS", "Kristiansand", 58.145_570, 7.989_716),
    ("AES", "Alesund", 62.469_414, 6.151_946),
    ("BOO", "Bodo", 67.288_290, 14.390_929),
    ("HAU", "Haugesund", 59.413_000, 5.268_000),
    ("AND", "Andenes", 69.326_067, 16.134_848),
];

pub fn known_stations() -> Vec<TideStation> {
    KNOWN_STATIONS
        .iter()
        .map(|(code, name, latitude, longitude)| TideStation {
            code: (*code).to_string(),
            name: (*name).to_string(),
            latitude: *latitude,
            longitude: *longitude,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum TideLocation {
    /// Station code or name, e.g. `BGO` or `bergen`.
    Station(String),
    Coordinates(Coordinates),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TideQuery {
    pub location: TideLocation,
    pub from: DateTime<Local>,
    pub to: DateTime<Local>,
}

impl TideQuery {
    pub fn for_station(station: impl Into<String>) -> Self {
        Self::new(TideLocation::Station(station.into()))
    }

    pub fn for_coordinates(coordinates: Coordinates) -> Self {
        Self::new(TideLocation::Coordinates(coordinates))
    }

    fn new(location: TideLocation) -> Self {
        let from = Local::now();
        Self {
            location,
            from,
            to: from + ChronoDuration::days(DEFAULT_DAYS_AHEAD),
        }
    }

    /// Keep `from`, move `to` to `days` days later. The CLI rejects values below one;
    /// library callers passing them get a one-day range.
    pub fn with_days(mut self, days: i64) -> Self {
        self.to = self.from + ChronoDuration::days(days.max(1));
        self
    }

    pub fn with_range(mut self, from: DateTime<Local>, to: DateTime<Local>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days()
    }
}

impl Default for TideQuery {
    fn default() -> Self {
        Self::for_station(DEFAULT_STATION)
    }
}

#[derive(Debug, Clone)]
pub struct TideClient {
    fetcher: Fetcher,
    base_url: String,
    timeout: Option<Duration>,
}

impl TideClient {
    pub fn new(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Tide predictions for a station or point over the query's date range.
    pub async fn fetch(&self, query: &TideQuery) -> Envelope {
        let (coordinates, station, location_info) = match &query.location {
            TideLocation::Coordinates(c) => (*c, None, format!("Coordinates: {c}")),
            TideLocation::Station(key) => match self.resolve_station(key).await {
                Ok(s) => {
                    let info = format!("Station: {} ({})", s.name, s.code);
                    (s.coordinates(), Some(s), info)
                }
                Err(err) => return err.into(),
            },
        };

        let request = self
            .request()
            .with_query("tide_request", "locationdata")
            .with_query("lat", coordinates.lat)
            .with_query("lon", coordinates.lon)
            .with_query("fromtime", query.from.format(TIME_FORMAT))
            .with_query("totime", query.to.format(TIME_FORMAT))
            .with_query("datatype", "tab")
            .with_query("refcode", "cd")
            .with_query("place", station.as_ref().map_or("", |s| s.name.as_str()))
            .with_query("file", "")
            .with_query("lang", "en")
            .with_query("interval", INTERVAL_MINUTES)
            .with_query("dst", 0);

        let body = match self.fetcher.get_text(API_NAME, request).await {
            Ok(body) => body,
            Err(err) => return err.into(),
        };

        let payload = parse_tab_format(&body, coordinates, station.as_ref());
        info!(
            api = API_NAME,
            location = %location_info,
            points = payload["properties"]["timeseries"].as_array().map_or(0, Vec::len),
            "tide predictions fetched"
        );

        let metadata = Metadata::new(API_NAME)
            .with_param("location", location_info)
            .with_param("coordinates", coordinates.to_value())
            .with_param("station", station.map_or_else(|| "auto".to_string(), |s| s.code))
            .with_param("from", query.from.format(TIME_FORMAT).to_string())
            .with_param("to", query.to.format(TIME_FORMAT).to_string())
            .with_param("forecast_period_days", query.days());
        SuccessEnvelope::new(payload, metadata).into()
    }

    /// Known permanent stations, from the service or the embedded table.
    pub async fn stations(&self) -> Envelope {
        let (stations, origin) = self.station_list().await;

        let payload = json!({ "stations": stations });
        let metadata = Metadata::new(STATIONS_API_NAME)
            .with_param("station_count", stations.len())
            .with_origin(origin);
        SuccessEnvelope::new(payload, metadata).into()
    }

    pub async fn station_list(&self) -> (Vec<TideStation>, DataOrigin) {
        match self.remote_stations().await {
            Ok(stations) => (stations, DataOrigin::Live),
            Err(err) => {
                warn!(api = STATIONS_API_NAME, reason = %err.error, "using embedded station table");
                (known_stations(), DataOrigin::Fallback { reason: err.error })
            }
        }
    }

    async fn remote_stations(&self) -> Result<Vec<TideStation>, ErrorEnvelope> {
        let request = self
            .request()
            .with_query("tide_request", "stationlist")
            .with_query("type", "perm")
            .with_query("lang", "en");

        let body = self.fetcher.get_text(STATIONS_API_NAME, request).await?;
        let stations = parse_station_list(&body);
        if stations.is_empty() {
            return Err(ErrorEnvelope::new(
                STATIONS_API_NAME,
                ErrorKind::Decode,
                "station list response contained no stations",
            ));
        }
        Ok(stations)
    }

    /// Embedded table first, then the live list. A list that cannot be
    /// fetched keeps its own error kind; only a live miss is `InvalidRequest`.
    async fn resolve_station(&self, key: &str) -> Result<TideStation, ErrorEnvelope> {
        if let Some(station) = known_stations().into_iter().find(|s| s.matches(key)) {
            return Ok(station);
        }

        let stations = self.remote_stations().await.map_err(|err| {
            ErrorEnvelope::new(
                API_NAME,
                err.kind,
                format!("Could not look up tide station '{key}': {}", err.error),
            )
        })?;

        stations.into_iter().find(|s| s.matches(key)).ok_or_else(|| {
            ErrorEnvelope::new(
                API_NAME,
                ErrorKind::InvalidRequest,
                format!("Unknown tide station '{key}'"),
            )
        })
    }

    fn request(&self) -> HttpRequest {
        let request = HttpRequest::get(&self.base_url);
        match self.timeout {
            Some(timeout) => request.with_timeout(timeout),
            None => request,
        }
    }
}

/// Parse the `datatype=tab` body: `#` comments, a `time` header, then `time<TAB>value` rows.
pub fn parse_tab_format(
    raw: &str,
    coordinates: Coordinates,
    station: Option<&TideStation>,
) -> Value {
    let mut station_name = station.map_or_else(|| "Unknown".to_string(), |s| s.name.clone());
    let station_code = station.map_or_else(|| "N/A".to_string(), |s| s.code.clone());
    let mut timeseries = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("time") {
            if let Some((_, name)) = trimmed.split_once("Location:") {
                let name = name.trim();
                if !name.is_empty() {
                    station_name = name.to_string();
                }
            }
            continue;
        }

        let Some((time, value)) = split_row(trimmed) else { continue };
        let Ok(height) = value.parse::<f64>() else { continue };

        timeseries.push(json!({
            "time": time,
            "data": { "instant": { "details": { HEIGHT_FIELD: height } } },
        }));
    }

    json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": [coordinates.lon, coordinates.lat] },
        "properties": {
            "meta": {
                "station_name": station_name,
                "station_code": station_code,
                "units": { HEIGHT_FIELD: "cm" },
            },
            "timeseries": timeseries,
        },
    })
}

fn split_row(line: &str) -> Option<(&str, &str)> {
    if let Some((time, rest)) = line.split_once('\t') {
        let value = rest.split('\t').next().unwrap_or("").trim();
        return Some((time.trim(), value));
    }
    line.rsplit_once(char::is_whitespace)
        .map(|(time, value)| (time.trim(), value.trim()))
}

/// Pull `<location name=".." code=".." latitude=".." longitude=".."/>` entries out of the XML list.
pub fn parse_station_list(xml: &str) -> Vec<TideStation> {
    xml.split("<location")
        .skip(1)
        .filter_map(|tag| {
            let attr = |name: &str| attribute(tag, name);

            Some(TideStation {
                code: attr("code")?,
                name: attr("name")?,
                latitude: attr("latitude")?.parse().ok()?,
                longitude: attr("longitude")?.parse().ok()?,
            })
        })
        .collect()
}

/// Value of `name="..."` or `name='...'` within the tag starting at `tag`, entities decoded.
fn attribute(tag: &str, name: &str) -> Option<String> {
    let mut rest = tag;
    while let Some(eq) = rest.find('=') {
        let key = &rest[..eq];
        if key.contains('>') {
            return None;
        }

        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next().filter(|&c| matches!(c, '"' | '\''))?;
        let body = &after[1..];
        let end = body.find(quote)?;

        if key.trim() == name {
            return Some(decode_entities(&body[..end]));
        }
        rest = &body[end + 1..];
    }
    None
}

/// The five predefined XML entities plus `&#NN;` / `&#xHH;`. Anything else is kept as is.
fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail
            .find(';')
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
