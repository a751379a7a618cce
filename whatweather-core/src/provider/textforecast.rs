use serde_json::{Value, json};
use std::str::FromStr;
use tracing::{debug, info};

use crate::{
    http::{Fetcher, HttpRequest},
    model::{Envelope, Metadata, SuccessEnvelope},
};

pub const API_NAME: &str = "Textforecast 2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    /// Norwegian Bokmål.
    #[default]
    Nb,
    /// Norwegian Nynorsk.
    Nn,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Nb => "nb",
            Language::Nn => "nn",
            Language::En => "en",
        }
    }

    pub const fn all() -> &'static [Language] {
        &[Language::Nb, Language::Nn, Language::En]
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "nb" => Ok(Language::Nb),
            "nn" => Ok(Language::Nn),
            "en" => Ok(Language::En),
            _ => Err(anyhow::anyhow!(
                "Unsupported language '{value}'. Supported languages: nb, nn, en."
            )),
        }
    }
}

/// MET Norway Textforecast: the written land overview for Norway.
#[derive(Debug, Clone)]
pub struct TextForecastClient {
    fetcher: Fetcher,
    base_url: String,
}

impl TextForecastClient {
    pub fn new(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        Self { fetcher, base_url: base_url.into() }
    }

    pub async fn fetch(&self, language: Language) -> Envelope {
        let request = HttpRequest::get(&self.base_url).with_query("language", language);

        let body = match self.fetcher.get_text(API_NAME, request).await {
            Ok(body) => body,
            Err(err) => return err.into(),
        };

        // The service answers in XML; anything that isn't JSON is kept verbatim.
        let payload = serde_json::from_str::<Value>(&body).unwrap_or_else(|_| {
            debug!(api = API_NAME, "body is not JSON, keeping it as text");
            json!({ "text": body })
        });

        info!(api = API_NAME, %language, "text forecast fetched");
        let metadata = Metadata::new(API_NAME).with_param("language", language.as_str());
        SuccessEnvelope::new(payload, metadata).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        http::testing::{ScriptedTransport, fetcher},
        model::METADATA_KEY,
    };

    #[test]
    fn default_language_is_bokmal() {
        assert_eq!(Language::default(), Language::Nb);
    }

    #[test]
    fn language_parses_case_insensitively() {
        for lang in Language::all() {
            assert_eq!(lang.as_str().to_uppercase().parse::<Language>().unwrap(), *lang);
        }
        assert!("de".parse::<Language>().is_err());
    }

    #[tokio::test]
    async fn xml_body_is_kept_as_text() {
        let transport = ScriptedTransport::new();
        transport.push_ok("<textforecast><time>Sørvestlig bris</time></textforecast>");

        let client = TextForecastClient::new(fetcher(&transport), "https://example.test/text");
        let value = client.fetch(Language::En).await.to_value();

        assert_eq!(transport.calls()[0].request.query_value("language"), Some("en"));
        assert_eq!(value["text"], "<textforecast><time>Sørvestlig bris</time></textforecast>");
        assert_eq!(value[METADATA_KEY]["language"], "en");
    }

    #[tokio::test]
    async fn json_body_is_decoded() {
        let transport = ScriptedTransport::new();
        transport.push_ok(r#"{"areas": [{"name": "Vestlandet"}]}"#);

        let client = TextForecastClient::new(fetcher(&transport), "https://example.test/text");
        let value = client.fetch(Language::Nn).await.to_value();

        assert_eq!(value["areas"][0]["name"], "Vestlandet");
        assert_eq!(value[METADATA_KEY]["language"], "nn");
    }
}
