use serde_json::json;
use tracing::info;

use crate::{
    http::{Fetcher, HttpRequest},
    model::{DataOrigin, Envelope, Metadata, SuccessEnvelope},
};

pub const API_NAME: &str = "BarentsWatch";

const DOCUMENTATION_URL: &str = "https://www.barentswatch.no/en/articles/api-documentation/";
const DEMO_NOTE: &str = "API key required for real data access";

/// BarentsWatch coastal and marine data.
///
/// Without an API key the client runs in demo mode and never touches the network.
#[derive(Debug, Clone)]
pub struct BarentsWatchClient {
    fetcher: Fetcher,
    base_url: String,
    api_key: Option<String>,
}

impl BarentsWatchClient {
    pub fn new(fetcher: Fetcher, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn is_demo(&self) -> bool {
        self.api_key.is_none()
    }

    pub async fn fetch_coastal_info(&self) -> Envelope {
        let Some(api_key) = &self.api_key else {
            info!(api = API_NAME, "no API key configured, returning demo data");
            return demo_envelope();
        };

        let url = format!(
            "{}/v1/geodata/download/fishingfacility",
            self.base_url.trim_end_matches('/')
        );
        let request =
            HttpRequest::get(url).with_header("Authorization", format!("Bearer {api_key}"));

        match self.fetcher.get_json(API_NAME, request).await {
            Ok(payload) => SuccessEnvelope::new(payload, Metadata::new(API_NAME)).into(),
            Err(err) => err.into(),
        }
    }
}

fn demo_envelope() -> Envelope {
    let payload = json!({
        "info": "BarentsWatch API provides coastal and marine data for Norway",
        "features": [
            "Ship traffic data (AIS)",
            "Fishing vessel positions",
            "Weather observations",
            "Sea temperature",
            "Wave height and direction",
            "Coastal zone information",
        ],
        "documentation": DOCUMENTATION_URL,
    });

    let metadata = Metadata::new(API_NAME).with_origin(DataOrigin::Demo { note: DEMO_NOTE.into() });
    SuccessEnvelope::new(payload, metadata).into()
}
