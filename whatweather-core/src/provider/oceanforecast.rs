use tracing::info;

use crate::{
    http::{Fetcher, HttpRequest},
    model::{Envelope, Metadata, SuccessEnvelope},
    provider::Coordinates,
};

pub const API_NAME: &str = "Oceanforecast 2.0";

/// MET Norway Oceanforecast: waves, currents and sea temperature for a point at sea.
#[derive(Debug, Clone)]
pub struct OceanForecastClient {
    fetcher: Fetcher,
    base_url: String,
}

impl OceanForecastClient {
    pub fn new(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self { fetcher, base_url: base_url.into() }
    }

    pub async fn fetch(&self, coordinates: Coordinates) -> Envelope {
        let request = coordinates.apply(HttpRequest::get(&self.base_url));

        let payload = match self.fetcher.get_json(API_NAME, request).await {
            Ok(payload) => payload,
            Err(err) => return err.into(),
        };

        info!(api = API_NAME, %coordinates, "ocean forecast fetched");
        let metadata = Metadata::new(API_NAME).with_param("coordinates", coordinates.to_value());
        SuccessEnvelope::new(payload, metadata).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        http::{
            FetchError,
            testing::{ScriptedTransport, fetcher},
        },
        model::{ErrorKind, METADATA_KEY},
    };

    #[tokio::test]
    async fn wraps_payload_with_coordinates() {
        let transport = ScriptedTransport::new();
        transport.push_ok(r#"{"type":"Feature","properties":{"timeseries":[]}}"#);

        let client = OceanForecastClient::new(fetcher(&transport), "https://example.test/ocean");
        let envelope = client.fetch(Coordinates::new(60.10, 9.58)).await;

        let value = envelope.to_value();
        assert_eq!(envelope.api(), API_NAME);
        assert_eq!(value["type"], "Feature");
        assert_eq!(value[METADATA_KEY]["coordinates"]["lat"], 60.10);
        assert_eq!(value[METADATA_KEY]["coordinates"]["lon"], 9.58);

        let calls = transport.calls();
        assert_eq!(calls[0].request.query_value("lat"), Some("60.1"));
        assert_eq!(calls[0].request.query_value("lon"), Some("9.58"));
    }

    #[tokio::test]
    async fn connection_failure_yields_error_envelope() {
        let transport = ScriptedTransport::new();
        transport.push_error(FetchError::Transport("dns error".into()));

        let client = OceanForecastClient::new(fetcher(&transport), "https://example.test/ocean");
        let envelope = client.fetch(Coordinates::new(60.10, 9.58)).await;

        let failure = envelope.as_failure().expect("failure");
        assert_eq!(failure.kind, ErrorKind::Transport);
        assert_eq!(failure.api, API_NAME);
    }
}
