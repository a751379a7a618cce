use serde_json::Value;

use super::{FormatError, Formatter, Report, ReportEntry, scalar_to_string};
use crate::model::{Envelope, METADATA_KEY};

const WIDTH: usize = 80;

/// Flat, indented plain text without decoration beyond rule lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn name(&self) -> &'static str {
        "Plain text"
    }

    fn dir_name(&self) -> &'static str {
        "txt"
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    fn render(&self, report: &Report) -> Result<Vec<u8>, FormatError> {
        Ok(render_text(report).into_bytes())
    }
}

pub fn render_text(report: &Report) -> String {
    let heavy = "=".repeat(WIDTH);
    let light = "-".repeat(WIDTH);
    let mut lines = vec![
        heavy.clone(),
        format!("{:^WIDTH$}", report.title),
        heavy.clone(),
        String::new(),
    ];

    if report.entries.len() > 1 {
        lines.push("SUMMARY".into());
        lines.push(light.clone());
        for entry in &report.entries {
            lines.push(format!(
                "  {:<32} {:<6} {}",
                entry.title,
                entry.envelope.status_label(),
                entry.envelope.timestamp().to_rfc3339()
            ));
        }
        lines.push(String::new());
    }

    for entry in &report.entries {
        write_entry(&mut lines, entry, &light);
    }

    lines.push(light);
    lines.push(format!("Generated: {}", report.generated_at_display()));
    lines.push(heavy);

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn write_entry(lines: &mut Vec<String>, entry: &ReportEntry, light: &str) {
    lines.push(format!("{} [{}]", entry.title, entry.envelope.status_label()));
    lines.push(light.to_string());

    match &entry.envelope {
        Envelope::Success(success) => {
            lines.push(format!("METADATA ({METADATA_KEY})"));
            if let Value::Object(meta) = success.metadata.to_value() {
                for (key, value) in &meta {
                    write_value(lines, key, value, 1);
                }
            }
            lines.push(String::new());

            lines.push("DATA".into());
            for (key, value) in &success.payload {
                write_value(lines, key, value, 1);
            }
        }
        Envelope::Failure(failure) => {
            lines.push("ERROR".into());
            if let Value::Object(fields) = failure.to_value() {
                for (key, value) in &fields {
                    write_value(lines, key, value, 1);
                }
            }
        }
    }

    lines.push(String::new());
}

fn write_value(lines: &mut Vec<String>, key: &str, value: &Value, depth: usize) {
    let pad = "  ".repeat(depth);
    match value {
        Value::Object(map) if !map.is_empty() => {
            lines.push(format!("{pad}{key}:"));
            for (child_key, child) in map {
                write_value(lines, child_key, child, depth + 1);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            lines.push(format!("{pad}{key}:"));
            for (i, child) in items.iter().enumerate() {
                write_value(lines, &format!("[{i}]"), child, depth + 1);
            }
        }
        Value::Object(_) => lines.push(format!("{pad}{key}: {{}}")),
        Value::Array(_) => lines.push(format!("{pad}{key}: []")),
        scalar => {
            // Keep multi-line strings (text forecasts) aligned under their key.
            let text = scalar_to_string(scalar);
            let mut parts = text.lines();
            lines.push(format!("{pad}{key}: {}", parts.next().unwrap_or("")));
            for part in parts {
                lines.push(format!("{pad}  {part}"));
            }
        }
    }
}
