use serde_json::{Value, json};
use std::{convert::TryFrom, sync::Arc};

use crate::{
    Config,
    http::{Fetcher, HttpRequest, HttpTransport},
    provider::{
        barentswatch::BarentsWatchClient, locationforecast::LocationForecastClient,
        nominatim::NominatimClient, nowcast::NowcastClient, oceanforecast::OceanForecastClient,
        textforecast::TextForecastClient, tide::TideClient,
    },
};

pub mod barentswatch;
pub mod locationforecast;
pub mod nominatim;
pub mod nowcast;
pub mod oceanforecast;
pub mod textforecast;
pub mod tide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OceanForecast,
    LocationForecast,
    TextForecast,
    Nowcast,
    Tide,
    BarentsWatch,
    Nominatim,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OceanForecast => "oceanforecast",
            ProviderId::LocationForecast => "locationforecast",
            ProviderId::TextForecast => "textforecast",
            ProviderId::Nowcast => "nowcast",
            ProviderId::Tide => "tide",
            ProviderId::BarentsWatch => "barentswatch",
            ProviderId::Nominatim => "nominatim",
        }
    }

    /// Display title used in status lines and report headings.
    pub fn title(&self) -> &'static str {
        match self {
            ProviderId::OceanForecast => "MET Norway Oceanforecast 2.0",
            ProviderId::LocationForecast => "MET Norway Locationforecast 2.0",
            ProviderId::TextForecast => "MET Norway Textforecast 2.0",
            ProviderId::Nowcast => "MET Norway Nowcast 2.0",
            ProviderId::Tide => "Kartverket Tide Predictions",
            ProviderId::BarentsWatch => "BarentsWatch Coastal Data",
            ProviderId::Nominatim => "Nominatim Geocoding",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OceanForecast,
            ProviderId::LocationForecast,
            ProviderId::TextForecast,
            ProviderId::Nowcast,
            ProviderId::Tide,
            ProviderId::BarentsWatch,
            ProviderId::Nominatim,
        ]
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

        ProviderId::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == lower)
            .ok_or_else(|| {
                let known: Vec<&str> = ProviderId::all().iter().map(|id| id.as_str()).collect();
                anyhow::anyhow!(
                    "Unknown provider '{value}'. Supported providers: {}.",
                    known.join(", ")
                )
            })
    }
}

/// WGS84 point as sent to the providers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// MET Norway rejects more than four decimals.
    pub fn rounded(&self) -> Self {
        Self {
            lat: round4(self.lat),
            lon: round4(self.lon),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "lat": self.lat, "lon": self.lon })
    }

    pub(crate) fn apply(&self, request: HttpRequest) -> HttpRequest {
        let c = self.rounded();
        request.with_query("lat", c.lat).with_query("lon", c.lon)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.lat, self.lon)
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Every client, built from one [`Config`] over one shared transport.
#[derive(Debug)]
pub struct Providers {
    pub ocean: OceanForecastClient,
    pub location: LocationForecastClient,
    pub text: TextForecastClient,
    pub nowcast: NowcastClient,
    pub tide: TideClient,
    pub barentswatch: BarentsWatchClient,
    pub nominatim: NominatimClient,
}

impl Providers {
    pub fn from_config(config: &Config, transport: Arc<dyn HttpTransport>) -> Self {
        let fetcher = Fetcher::new(transport, config.user_agent.clone(), config.timeout());
        let endpoints = &config.endpoints;

        Self {
            ocean: OceanForecastClient::new(
                fetcher.clone(),
                endpoints.base_url(ProviderId::OceanForecast),
            ),
            location: LocationForecastClient::new(
                fetcher.clone(),
                endpoints.base_url(ProviderId::LocationForecast),
            ),
            text: TextForecastClient::new(
                fetcher.clone(),
                endpoints.base_url(ProviderId::TextForecast),
            ),
            nowcast: NowcastClient::new(fetcher.clone(), endpoints.base_url(ProviderId::Nowcast)),
            tide: TideClient::new(fetcher.clone(), endpoints.base_url(ProviderId::Tide))
                .with_timeout(config.tide_timeout()),
            barentswatch: BarentsWatchClient::new(
                fetcher.clone(),
                endpoints.base_url(ProviderId::BarentsWatch),
                config.barentswatch_api_key().map(str::to_string),
            ),
            nominatim: NominatimClient::new(fetcher, endpoints.base_url(ProviderId::Nominatim))
                .with_rate_limit(config.nominatim_rate_limit()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ScriptedTransport;

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let s = id.as_str();
            let parsed = ProviderId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn provider_id_is_case_insensitive() {
        assert_eq!(ProviderId::try_from("NowCast").unwrap(), ProviderId::Nowcast);
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
        assert!(err.to_string().contains("nominatim"));
    }

    #[test]
    fn coordinates_are_rounded_to_four_decimals() {
        let c = Coordinates::new(60.391_234_5, 5.324_999_9).rounded();
        assert_eq!(c, Coordinates::new(60.3912, 5.325));
    }

    #[tokio::test]
    async fn providers_use_configured_endpoints_and_user_agent() {
        let transport = ScriptedTransport::new();
        transport.push_ok("{}");

        let mut config = Config::default();
        config.user_agent = "Configured/1.0".into();
        config.endpoints.nowcast = "http://localhost:9999/nowcast".into();

        let providers = Providers::from_config(&config, transport.clone());
        providers.nowcast.fetch(Coordinates::new(59.91, 10.75)).await;

        let calls = transport.calls();
        assert_eq!(calls[0].request.url, "http://localhost:9999/nowcast");
        assert_eq!(calls[0].request.header("user-agent"), Some("Configured/1.0"));
    }
}
