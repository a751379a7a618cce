use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::http::FetchError;

/// Key under which success metadata is merged into the provider payload.
pub const METADATA_KEY: &str = "_metadata";

/// Where the data in a successful envelope came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOrigin {
    /// Decoded from a live provider response.
    Live,
    /// Static placeholder returned because no credentials were configured.
    Demo { note: String },
    /// Embedded data used because the provider could not be reached.
    Fallback { reason: String },
}

impl DataOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataOrigin::Live => "live",
            DataOrigin::Demo { .. } => "demo",
            DataOrigin::Fallback { .. } => "fallback",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, DataOrigin::Live)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub fetched_at: DateTime<Utc>,
    pub api: String,
    /// Request parameters echoed back (coordinates, language, station, ...).
    pub params: Map<String, Value>,
    pub origin: DataOrigin,
}

impl Metadata {
    pub fn new(api: impl Into<String>) -> Self {
        Self {
            fetched_at: Utc::now(),
            api: api.into(),
            params: Map::new(),
            origin: DataOrigin::Live,
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_origin(mut self, origin: DataOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("fetched_at".into(), Value::String(self.fetched_at.to_rfc3339()));
        map.insert("api".into(), Value::String(self.api.clone()));
        for (key, value) in &self.params {
            map.insert(key.clone(), value.clone());
        }
        map.insert("origin".into(), Value::String(self.origin.as_str().to_string()));
        match &self.origin {
            DataOrigin::Live => {}
            DataOrigin::Demo { note } => {
                map.insert("note".into(), Value::String(note.clone()));
            }
            DataOrigin::Fallback { reason } => {
                map.insert("note".into(), Value::String(reason.clone()));
            }
        }
        Value::Object(map)
    }
}

/// Provider payload plus the metadata describing how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessEnvelope {
    pub payload: Map<String, Value>,
    pub metadata: Metadata,
}

impl SuccessEnvelope {
    /// Wrap a decoded payload. Non-object payloads are stored under `data`.
    pub fn new(payload: Value, metadata: Metadata) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("data".into(), other);
                map
            }
        };

        Self { payload, metadata }
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.payload.clone();
        map.insert(METADATA_KEY.into(), self.metadata.to_value());
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Timeout,
    Status,
    Decode,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Status => "status",
            ErrorKind::Decode => "decode",
            ErrorKind::InvalidRequest => "invalid_request",
        }
    }
}

/// Replaces the payload entirely when a request fails.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEnvelope {
    pub error: String,
    pub api: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ErrorKind,
}

impl ErrorEnvelope {
    pub fn new(api: impl Into<String>, kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            api: api.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn from_fetch_error(api: impl Into<String>, err: &FetchError) -> Self {
        Self::new(api, err.kind(), err.to_string())
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("error".into(), Value::String(self.error.clone()));
        map.insert("api".into(), Value::String(self.api.clone()));
        map.insert("timestamp".into(), Value::String(self.timestamp.to_rfc3339()));
        map.insert("kind".into(), Value::String(self.kind.as_str().to_string()));
        Value::Object(map)
    }
}

/// Uniform result of every provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success(SuccessEnvelope),
    Failure(ErrorEnvelope),
}

impl Envelope {
    pub fn api(&self) -> &str {
        match self {
            Envelope::Success(s) => &s.metadata.api,
            Envelope::Failure(e) => &e.api,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success(_))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Envelope::Success(s) => s.metadata.fetched_at,
            Envelope::Failure(e) => e.timestamp,
        }
    }

    /// `OK` or `ERROR`, as shown in report summaries.
    pub fn status_label(&self) -> &'static str {
        if self.is_success() { "OK" } else { "ERROR" }
    }

    pub fn origin(&self) -> Option<&DataOrigin> {
        match self {
            Envelope::Success(s) => Some(&s.metadata.origin),
            Envelope::Failure(_) => None,
        }
    }

    pub fn as_success(&self) -> Option<&SuccessEnvelope> {
        match self {
            Envelope::Success(s) => Some(s),
            Envelope::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&ErrorEnvelope> {
        match self {
            Envelope::Success(_) => None,
            Envelope::Failure(e) => Some(e),
        }
    }

    /// Flat JSON shape: payload keys plus `_metadata`, or the error fields.
    pub fn to_value(&self) -> Value {
        match self {
            Envelope::Success(s) => s.to_value(),
            Envelope::Failure(e) => e.to_value(),
        }
    }
}

impl From<SuccessEnvelope> for Envelope {
    fn from(value: SuccessEnvelope) -> Self {
        Envelope::Success(value)
    }
}

impl From<ErrorEnvelope> for Envelope {
    fn from(value: ErrorEnvelope) -> Self {
        Envelope::Failure(value)
    }
}

impl From<Result<SuccessEnvelope, ErrorEnvelope>> for Envelope {
    fn from(value: Result<SuccessEnvelope, ErrorEnvelope>) -> Self {
        match value {
            Ok(s) => Envelope::Success(s),
            Err(e) => Envelope::Failure(e),
        }
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
