use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::{
    http::{Fetcher, HttpRequest},
    model::{Envelope, Metadata, SuccessEnvelope},
    provider::Coordinates,
};

pub const SEARCH_API_NAME: &str = "Nominatim Geocoding";
pub const REVERSE_API_NAME: &str = "Nominatim Reverse Geocoding";

/// Nominatim usage policy: at most one request per second.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_secs(1);

/// Cooperative throttle owned by a single client.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_call: None }
    }

    /// Sleep until `min_interval` has passed since the previous call finished.
    pub async fn wait(&self) {
        let Some(last) = self.last_call else { return };

        let elapsed = last.elapsed();
        if elapsed < self.min_interval {
            let remaining = self.min_interval - elapsed;
            debug!(wait_ms = remaining.as_millis() as u64, "rate limit: waiting");
            sleep(remaining).await;
        }
    }

    pub fn mark(&mut self) {
        self.last_call = Some(Instant::now());
    }
}

/// Forward and reverse geocoding against Nominatim / OpenStreetMap.
#[derive(Debug)]
pub struct NominatimClient {
    fetcher: Fetcher,
    base_url: String,
    limiter: RateLimiter,
}

impl NominatimClient {
    pub fn new(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(DEFAULT_RATE_LIMIT),
        }
    }

    pub fn with_rate_limit(mut self, min_interval: Duration) -> Self {
        self.limiter = RateLimiter::new(min_interval);
        self
    }

    /// Search for a place by name, e.g. "Bergen, Norway".
    pub async fn search(&mut self, query: &str, limit: u32) -> Envelope {
        let request = HttpRequest::get(format!("{}/search", self.base_url))
            .with_query("q", query)
            .with_query("format", "json")
            .with_query("limit", limit)
            .with_query("addressdetails", 1);

        let results = match self.throttled(SEARCH_API_NAME, request).await {
            Ok(results) => results,
            Err(envelope) => return envelope,
        };

        let result_count = results.as_array().map_or(0, Vec::len);
        info!(api = SEARCH_API_NAME, query, result_count, "search complete");

        let metadata = Metadata::new(SEARCH_API_NAME).with_param("result_count", result_count);
        SuccessEnvelope::new(json!({ "query": query, "results": results }), metadata).into()
    }

    /// Find the place at a coordinate.
    pub async fn reverse(&mut self, coordinates: Coordinates) -> Envelope {
        let request = HttpRequest::get(format!("{}/reverse", self.base_url))
            .with_query("lat", coordinates.lat)
            .with_query("lon", coordinates.lon)
            .with_query("format", "json")
            .with_query("addressdetails", 1);

        let result = match self.throttled(REVERSE_API_NAME, request).await {
            Ok(result) => result,
            Err(envelope) => return envelope,
        };

        info!(api = REVERSE_API_NAME, %coordinates, "reverse lookup complete");
        let payload = json!({ "coordinates": coordinates.to_value(), "result": result });
        let metadata =
            Metadata::new(REVERSE_API_NAME).with_param("coordinates", coordinates.to_value());
        SuccessEnvelope::new(payload, metadata).into()
    }

    async fn throttled(&mut self, api: &str, request: HttpRequest) -> Result<Value, Envelope> {
        self.limiter.wait().await;
        let result = self.fetcher.get_json(api, request).await;
        self.limiter.mark();

        result.map_err(Envelope::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        http::testing::{ScriptedTransport, fetcher},
        model::METADATA_KEY,
    };

    const BERGEN: &str = r#"[
        {"display_name": "Bergen, Vestland, Norge", "lat": "60.3943", "lon": "5.3259"}
    ]"#;

    #[tokio::test]
    async fn search_wraps_results_with_count() {
        let transport = ScriptedTransport::new();
        transport.push_ok(BERGEN);

        let mut client = NominatimClient::new(fetcher(&transport), "https://example.test/");
        let value = client.search("Bergen, Norway", 3).await.to_value();

        let request = &transport.calls()[0].request;
        assert_eq!(request.url, "https://example.test/search");
        assert_eq!(request.query_value("q"), Some("Bergen, Norway"));
        assert_eq!(request.query_value("limit"), Some("3"));

        assert_eq!(value["query"], "Bergen, Norway");
        assert_eq!(value["results"][0]["display_name"], "Bergen, Vestland, Norge");
        assert_eq!(value[METADATA_KEY]["result_count"], 1);
        assert_eq!(value[METADATA_KEY]["api"], SEARCH_API_NAME);
    }

    #[tokio::test]
    async fn reverse_wraps_single_result() {
        let transport = ScriptedTransport::new();
        transport.push_ok(r#"{"display_name": "Stolmen, Austevoll"}"#);

        let mut client = NominatimClient::new(fetcher(&transport), "https://example.test");
        let value = client.reverse(Coordinates::new(60.0, 5.0)).await.to_value();

        assert_eq!(transport.calls()[0].request.url, "https://example.test/reverse");
        assert_eq!(value["result"]["display_name"], "Stolmen, Austevoll");
        assert_eq!(value["coordinates"]["lat"], 60.0);
        assert_eq!(value[METADATA_KEY]["api"], REVERSE_API_NAME);
    }

    #[tokio::test]
    async fn consecutive_calls_respect_min_interval() {
        let interval = Duration::from_millis(150);
        let transport = ScriptedTransport::new();
        transport.push_ok("[]");
        transport.push_ok("{}");

        let mut client = NominatimClient::new(fetcher(&transport), "https://example.test")
            .with_rate_limit(interval);
        client.search("Bergen", 1).await;
        client.reverse(Coordinates::new(60.39, 5.32)).await;

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].at.duration_since(calls[0].at) >= interval);
    }

    #[tokio::test]
    async fn first_call_is_not_delayed() {
        let transport = ScriptedTransport::new();
        transport.push_ok("[]");

        let mut client = NominatimClient::new(fetcher(&transport), "https://example.test")
            .with_rate_limit(Duration::from_secs(5));

        let started = std::time::Instant::now();
        client.search("Oslo", 1).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn failed_call_still_counts_towards_the_limit() {
        let interval = Duration::from_millis(100);
        let transport = ScriptedTransport::new();
        transport.push_status(503, "busy");
        transport.push_ok("[]");

        let mut client = NominatimClient::new(fetcher(&transport), "https://example.test")
            .with_rate_limit(interval);
        let first = client.search("Bergen", 1).await;
        client.search("Bergen", 1).await;

        assert!(!first.is_success());
        let calls = transport.calls();
        assert!(calls[1].at.duration_since(calls[0].at) >= interval);
    }
}
