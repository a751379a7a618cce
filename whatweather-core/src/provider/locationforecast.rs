use serde_json::{Value, json};
use tracing::info;

use crate::{
    http::{Fetcher, HttpRequest},
    model::{Envelope, Metadata, SuccessEnvelope},
    provider::Coordinates,
};

pub const API_NAME: &str = "Locationforecast 2.0";

/// MET Norway Locationforecast (compact): the general point forecast.
#[derive(Debug, Clone)]
pub struct LocationForecastClient {
    fetcher: Fetcher,
    base_url: String,
}

impl LocationForecastClient {
    pub fn new(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self { fetcher, base_url: base_url.into() }
    }

    /// `altitude` is metres above sea level; the provider estimates it when absent.
    pub async fn fetch(&self, coordinates: Coordinates, altitude: Option<i32>) -> Envelope {
        let mut request = coordinates.apply(HttpRequest::get(&self.base_url));
        if let Some(altitude) = altitude {
            request = request.with_query("altitude", altitude);
        }

        let payload = match self.fetcher.get_json(API_NAME, request).await {
            Ok(payload) => payload,
            Err(err) => return err.into(),
        };

        info!(api = API_NAME, %coordinates, ?altitude, "location forecast fetched");
        let metadata = Metadata::new(API_NAME).with_param(
            "coordinates",
            json!({
                "lat": coordinates.lat,
                "lon": coordinates.lon,
                "altitude": altitude.map(Value::from).unwrap_or(Value::Null),
            }),
        );
        SuccessEnvelope::new(payload, metadata).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        format::{
            Formatter, Report,
            text::{TextFormatter, render_text},
        },
        http::testing::{ScriptedTransport, fetcher},
        model::METADATA_KEY,
    };

    const BERGEN_SAMPLE: &str = r#"{
        "type": "Feature",
        "properties": {
            "timeseries": [
                {
                    "time": "2026-10-19T12:00:00Z",
                    "data": {"instant": {"details": {"air_temperature": 7.2}}}
                }
            ]
        }
    }"#;

    #[tokio::test]
    async fn sends_altitude_when_given() {
        let transport = ScriptedTransport::new();
        transport.push_ok(BERGEN_SAMPLE);

        let client = LocationForecastClient::new(fetcher(&transport), "https://example.test/lf");
        let value = client.fetch(Coordinates::new(60.39, 5.32), Some(12)).await.to_value();

        assert_eq!(transport.calls()[0].request.query_value("altitude"), Some("12"));
        assert_eq!(value[METADATA_KEY]["coordinates"]["altitude"], 12);
        assert_eq!(
            value["properties"]["timeseries"][0]["data"]["instant"]["details"]["air_temperature"],
            7.2
        );
    }

    #[tokio::test]
    async fn altitude_is_null_when_absent() {
        let transport = ScriptedTransport::new();
        transport.push_ok(BERGEN_SAMPLE);

        let client = LocationForecastClient::new(fetcher(&transport), "https://example.test/lf");
        let value = client.fetch(Coordinates::new(60.39, 5.32), None).await.to_value();

        assert!(transport.calls()[0].request.query_value("altitude").is_none());
        assert!(value[METADATA_KEY]["coordinates"]["altitude"].is_null());
    }

    #[tokio::test]
    async fn bergen_temperature_shows_up_in_the_text_report() {
        let transport = ScriptedTransport::new();
        transport.push_ok(BERGEN_SAMPLE);

        let client = LocationForecastClient::new(fetcher(&transport), "https://example.test/lf");
        let envelope = client.fetch(Coordinates::new(60.39, 5.32), None).await;
        let report = Report::single("locationforecast", API_NAME, envelope);

        let bytes = TextFormatter.render(&report).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, render_text(&report));
        assert!(text.contains("air_temperature: 7.2"), "{text}");
        assert!(text.contains("lat: 60.39"), "{text}");
        assert_eq!(transport.calls()[0].request.query_value("lat"), Some("60.39"));
    }
}
