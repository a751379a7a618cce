//! Report formatters: HTML, Excel workbook, YAML and plain text.
//!
//! Every formatter renders every field of every envelope; they differ only in
//! layout and decoration. Failed envelopes are rendered, never raised.

use chrono::{DateTime, Local};
use serde_json::{Value, json};
use std::fmt::Debug;
use thiserror::Error;

use crate::model::{Envelope, ErrorEnvelope, ErrorKind, Metadata, SuccessEnvelope};

pub mod excel;
pub mod html;
pub mod text;
pub mod yaml;

pub use excel::ExcelFormatter;
pub use html::HtmlFormatter;
pub use text::TextFormatter;
pub use yaml::YamlFormatter;

#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    /// File-name friendly key, e.g. `locationforecast`.
    pub label: String,
    pub title: String,
    pub envelope: Envelope,
}

/// Formatter input: envelopes keyed by label, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub title: String,
    pub generated_at: DateTime<Local>,
    pub entries: Vec<ReportEntry>,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            generated_at: Local::now(),
            entries: Vec::new(),
        }
    }

    /// A report holding a single envelope, titled after it.
    pub fn single(label: impl Into<String>, title: impl Into<String>, envelope: Envelope) -> Self {
        let title = title.into();
        let mut report = Self::new(title.clone());
        report.push(label, title, envelope);
        report
    }

    /// Append an entry. A repeated label gets a numeric suffix so labels stay unique.
    pub fn push(&mut self, label: impl Into<String>, title: impl Into<String>, envelope: Envelope) {
        let base = label.into();
        let mut label = base.clone();
        let mut n = 2;
        while self.entries.iter().any(|e| e.label == label) {
            label = format!("{base}_{n}");
            n += 1;
        }

        self.entries.push(ReportEntry {
            label,
            title: title.into(),
            envelope,
        });
    }

    pub fn ok_count(&self) -> usize {
        self.entries.iter().filter(|e| e.envelope.is_success()).count()
    }

    pub fn error_count(&self) -> usize {
        self.entries.len() - self.ok_count()
    }

    pub fn generated_at_display(&self) -> String {
        self.generated_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to build spreadsheet: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("failed to serialize YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub trait Formatter: Send + Sync + Debug {
    /// Human-readable format name.
    fn name(&self) -> &'static str;

    /// Sub-directory of the output root this format is written to.
    fn dir_name(&self) -> &'static str;

    fn extension(&self) -> &'static str;

    fn render(&self, report: &Report) -> Result<Vec<u8>, FormatError>;
}

/// All four formatters, in output order.
pub fn all_formatters() -> Vec<Box<dyn Formatter>> {
    vec![
        Box::new(HtmlFormatter),
        Box::new(ExcelFormatter),
        Box::new(YamlFormatter),
        Box::new(TextFormatter),
    ]
}

/// Scalar rendering shared by the text-like formatters.
pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Flatten nested values into `a.b[0].c` paths. Empty containers are kept as `{}` / `[]`.
pub(crate) fn flatten(value: &Value, prefix: &str, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten(child, &path, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                flatten(child, &format!("{prefix}[{i}]"), out);
            }
        }
        other => out.push((prefix.to_string(), other.clone())),
    }
}

/// Mock report used by `whatweather sample` and the formatter tests.
pub fn sample_report() -> Report {
    let mut report = Report::new("Formatter Sample");

    let location = json!({
        "type": "Feature",
        "properties": {
            "meta": {
                "updated_at": "2026-10-19T10:00:00Z",
                "units": { "air_temperature": "celsius", "precipitation_amount": "mm" },
            },
            "timeseries": [{
                "time": "2026-10-19T12:00:00Z",
                "data": {
                    "instant": {
                        "details": {
                            "air_temperature": 12.5,
                            "wind_speed": 5.2,
                            "precipitation_amount": 0.0,
                        }
                    }
                },
            }],
        },
    });
    let metadata = Metadata::new("Locationforecast 2.0")
        .with_param("coordinates", json!({ "lat": 60.39, "lon": 5.32 }));
    report.push(
        "locationforecast",
        "MET Norway Locationforecast 2.0",
        SuccessEnvelope::new(location, metadata).into(),
    );

    report.push(
        "nowcast",
        "MET Norway Nowcast 2.0",
        ErrorEnvelope::new("Nowcast 2.0", ErrorKind::Status, "HTTP 422: Unprocessable Entity")
            .into(),
    );

    report
}
