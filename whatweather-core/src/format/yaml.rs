use serde_json::{Map, Value, json};

use super::{FormatError, Formatter, Report};

/// YAML document mirroring each envelope field for field.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFormatter;

impl Formatter for YamlFormatter {
    fn name(&self) -> &'static str {
        "YAML"
    }

    fn dir_name(&self) -> &'static str {
        "yaml"
    }

    fn extension(&self) -> &'static str {
        "yaml"
    }

    fn render(&self, report: &Report) -> Result<Vec<u8>, FormatError> {
        Ok(render_yaml(report)?.into_bytes())
    }
}

pub fn render_yaml(report: &Report) -> Result<String, serde_yaml::Error> {
    let apis: Map<String, Value> = report
        .entries
        .iter()
        .map(|entry| (entry.label.clone(), entry.envelope.to_value()))
        .collect();

    let document = json!({
        "title": report.title,
        "generated_at": report.generated_at.to_rfc3339(),
        "apis": apis,
    });

    serde_yaml::to_string(&document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::fixtures::{expected_keys, mixed_report};

    #[test]
    fn renders_every_key() {
        let report = mixed_report();
        let yaml = render_yaml(&report).unwrap();

        for key in expected_keys(&report) {
            assert!(yaml.contains(&format!("{key}:")), "missing key {key}");
        }
    }

    #[test]
    fn parses_back_to_the_same_envelopes() {
        let report = mixed_report();
        let yaml = render_yaml(&report).unwrap();

        let parsed: Value = serde_yaml::from_str(&yaml).unwrap();
        for entry in &report.entries {
            assert_eq!(parsed["apis"][&entry.label], entry.envelope.to_value());
        }
        assert_eq!(parsed["title"], "Test <Report> & Co");
    }

    #[test]
    fn keeps_provider_key_order() {
        let yaml = render_yaml(&mixed_report()).unwrap();
        let type_pos = yaml.find("type: Feature").unwrap();
        let props_pos = yaml.find("properties:").unwrap();
        let meta_pos = yaml.find("_metadata:").unwrap();
        assert!(type_pos < props_pos && props_pos < meta_pos);
    }
}
