use serde_json::{Map, Value};
use std::fmt::Write;

use super::{FormatError, Formatter, Report, ReportEntry, scalar_to_string};
use crate::model::Envelope;

const STYLE: &str = r#"
        body {
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            max-width: 1200px;
            margin: 0 auto;
            padding: 20px;
            background-color: #f5f5f5;
        }
        .container {
            background-color: white;
            border-radius: 8px;
            padding: 30px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }
        h1 { color: #2c3e50; border-bottom: 3px solid #3498db; padding-bottom: 10px; }
        h2 { color: #34495e; margin-top: 30px; border-left: 4px solid #3498db; padding-left: 15px; }
        table.summary { border-collapse: collapse; width: 100%; }
        table.summary th, table.summary td {
            border: 1px solid #ddd;
            padding: 6px 10px;
            text-align: left;
        }
        table.summary th { background-color: #3498db; color: white; }
        .status-ok { color: #27ae60; font-weight: bold; }
        .status-error { color: #e74c3c; font-weight: bold; }
        .metadata { background-color: #ecf0f1; padding: 15px; border-radius: 5px; margin: 20px 0; }
        .metadata p { margin: 5px 0; color: #555; }
        .error {
            background-color: #e74c3c;
            color: white;
            padding: 15px;
            border-radius: 5px;
            margin: 20px 0;
        }
        .tree { font-family: 'Courier New', monospace; font-size: 14px; line-height: 1.5; }
        .tree ul, .tree ol { margin: 0; padding-left: 20px; }
        .key { color: #2980b9; font-weight: bold; }
        .empty { color: #7f8c8d; font-style: italic; }
        .timestamp { color: #7f8c8d; font-size: 0.9em; margin-top: 30px; }
"#;

/// Single self-contained HTML page.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlFormatter;

impl Formatter for HtmlFormatter {
    fn name(&self) -> &'static str {
        "HTML"
    }

    fn dir_name(&self) -> &'static str {
        "html"
    }

    fn extension(&self) -> &'static str {
        "html"
    }

    fn render(&self, report: &Report) -> Result<Vec<u8>, FormatError> {
        Ok(render_html(report).into_bytes())
    }
}

pub fn render_html(report: &Report) -> String {
    let title = escape(&report.title);
    let mut html = String::new();

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n    <meta charset=\"UTF-8\">\n    \
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n    \
         <title>{title}</title>\n    <style>{STYLE}    </style>\n</head>\n<body>\n    \
         <div class=\"container\">\n        <h1>{title}</h1>\n"
    );

    if report.entries.len() > 1 {
        write_summary(&mut html, report);
    }

    for entry in &report.entries {
        write_entry(&mut html, entry);
    }

    let _ = write!(
        html,
        "        <p class=\"timestamp\">Generated: {}</p>\n    </div>\n</body>\n</html>\n",
        report.generated_at_display()
    );

    html
}

fn write_summary(html: &mut String, report: &Report) {
    html.push_str("        <table class=\"summary\">\n");
    html.push_str(
        "            <tr><th>API</th><th>Status</th><th>Origin</th><th>Timestamp</th></tr>\n",
    );

    for entry in &report.entries {
        let env = &entry.envelope;
        let _ = writeln!(
            html,
            "            <tr><td><a href=\"#{label}\">{title}</a></td>\
             <td class=\"{class}\">{status}</td><td>{origin}</td><td>{ts}</td></tr>",
            label = escape(&entry.label),
            title = escape(&entry.title),
            class = status_class(env),
            status = env.status_label(),
            origin = env.origin().map_or("", |o| o.as_str()),
            ts = env.timestamp().to_rfc3339(),
        );
    }

    html.push_str("        </table>\n");
}

fn write_entry(html: &mut String, entry: &ReportEntry) {
    let _ = writeln!(
        html,
        "        <section id=\"{}\">\n        <h2>{} <span class=\"{}\">[{}]</span></h2>",
        escape(&entry.label),
        escape(&entry.title),
        status_class(&entry.envelope),
        entry.envelope.status_label(),
    );

    match &entry.envelope {
        Envelope::Success(success) => {
            if let Value::Object(meta) = success.metadata.to_value() {
                write_metadata(html, &meta);
            }
        }
        Envelope::Failure(failure) => {
            let _ = writeln!(
                html,
                "        <div class=\"error\">\n            <h3>Error</h3>\n\
                 \x20           <p>{}</p>\n\
                 \x20           <p>API: {} | kind: {} | at: {}</p>\n        </div>",
                escape(&failure.error),
                escape(&failure.api),
                failure.kind.as_str(),
                failure.timestamp.to_rfc3339(),
            );
        }
    }

    html.push_str("        <h3>Full Response Data</h3>\n        <div class=\"tree\">\n");
    write_value(html, &entry.envelope.to_value());
    html.push_str("\n        </div>\n        </section>\n");
}

fn write_metadata(html: &mut String, meta: &Map<String, Value>) {
    html.push_str("        <div class=\"metadata\">\n            <h3>Metadata</h3>\n");
    for (key, value) in meta {
        let _ = write!(html, "            <p><strong>{}:</strong> ", escape(key));
        write_value(html, value);
        html.push_str("</p>\n");
    }
    html.push_str("        </div>\n");
}

/// Objects become `<ul>` of key/value items, arrays become `<ol>` counted from zero.
fn write_value(html: &mut String, value: &Value) {
    match value {
        Value::Object(map) if map.is_empty() => html.push_str("<span class=\"empty\">{}</span>"),
        Value::Array(items) if items.is_empty() => html.push_str("<span class=\"empty\">[]</span>"),
        Value::Object(map) => {
            html.push_str("<ul>");
            for (key, child) in map {
                let _ = write!(html, "<li><span class=\"key\">{}</span>: ", escape(key));
                write_value(html, child);
                html.push_str("</li>");
            }
            html.push_str("</ul>");
        }
        Value::Array(items) => {
            html.push_str("<ol start=\"0\">");
            for child in items {
                html.push_str("<li>");
                write_value(html, child);
                html.push_str("</li>");
            }
            html.push_str("</ol>");
        }
        scalar => html.push_str(&escape(&scalar_to_string(scalar))),
    }
}

fn status_class(envelope: &Envelope) -> &'static str {
    if envelope.is_success() { "status-ok" } else { "status-error" }
}

pub(crate) fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
