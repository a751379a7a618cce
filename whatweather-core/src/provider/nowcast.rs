use tracing::info;

use crate::{
    http::{Fetcher, HttpRequest},
    model::{Envelope, Metadata, SuccessEnvelope},
    provider::Coordinates,
};

pub const API_NAME: &str = "Nowcast 2.0";

/// MET Norway Nowcast: short-term precipitation for the next two hours.
#[derive(Debug, Clone)]
pub struct NowcastClient {
    fetcher: Fetcher,
    base_url: String,
}

impl NowcastClient {
    pub fn new(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self { fetcher, base_url: base_url.into() }
    }

    pub async fn fetch(&self, coordinates: Coordinates) -> Envelope {
        let request = coordinates.apply(HttpRequest::get(&self.base_url));

        match self.fetcher.get_json(API_NAME, request).await {
            Ok(payload) => {
                info!(api = API_NAME, %coordinates, "nowcast fetched");
                let metadata =
                    Metadata::new(API_NAME).with_param("coordinates", coordinates.to_value());
                SuccessEnvelope::new(payload, metadata).into()
            }
            Err(err) => err.into(),
        }
    }
}
