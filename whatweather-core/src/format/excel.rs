//! Workbook output: a summary sheet plus one flattened key/value sheet per API.
//!
//! The workbook is first laid out as a [`WorkbookPlan`] (plain data, easy to
//! inspect in tests) and then written with `rust_xlsxwriter`.

use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};
use serde_json::Value;

use super::{FormatError, Formatter, Report, ReportEntry, flatten, scalar_to_string};
use crate::model::{Envelope, METADATA_KEY};

pub const SUMMARY_SHEET: &str = "Summary";

/// Excel's per-cell limit.
const MAX_CELL_CHARS: usize = 32_767;
const MAX_SHEET_NAME: usize = 31;
const HEADER_BLUE: u32 = 0x3498DB;
const ERROR_RED: u32 = 0xE74C3C;
const OK_GREEN: u32 = 0x27AE60;
const META_GREY: u32 = 0xECF0F1;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Title(String),
    Header(String),
    Text(String),
    Number(f64),
    Status { ok: bool },
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetPlan {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
    pub column_widths: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookPlan {
    pub sheets: Vec<SheetPlan>,
}

impl WorkbookPlan {
    pub fn sheet(&self, name: &str) -> Option<&SheetPlan> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExcelFormatter;

impl Formatter for ExcelFormatter {
    fn name(&self) -> &'static str {
        "Excel"
    }

    fn dir_name(&self) -> &'static str {
        "excel"
    }

    fn extension(&self) -> &'static str {
        "xlsx"
    }

    fn render(&self, report: &Report) -> Result<Vec<u8>, FormatError> {
        Ok(write_workbook(&plan_workbook(report))?)
    }
}

pub fn plan_workbook(report: &Report) -> WorkbookPlan {
    let mut used_names = vec![SUMMARY_SHEET.to_string()];
    let data_sheets: Vec<SheetPlan> = report
        .entries
        .iter()
        .map(|entry| {
            let name = unique_sheet_name(&entry.label, &used_names);
            used_names.push(name.clone());
            plan_data_sheet(name, entry)
        })
        .collect();

    let mut summary = vec![
        vec![Cell::Title(report.title.clone())],
        vec![Cell::Text(format!("Generated: {}", report.generated_at_display()))],
        vec![],
        ["API", "Label", "Status", "Origin", "Timestamp", "Sheet"]
            .into_iter()
            .map(|h| Cell::Header(h.into()))
            .collect(),
    ];

    for (entry, sheet) in report.entries.iter().zip(&data_sheets) {
        let env = &entry.envelope;
        summary.push(vec![
            Cell::Text(env.api().to_string()),
            Cell::Text(entry.label.clone()),
            Cell::Status { ok: env.is_success() },
            env.origin().map_or(Cell::Empty, |o| Cell::Text(o.as_str().into())),
            Cell::Text(env.timestamp().to_rfc3339()),
            Cell::Text(sheet.name.clone()),
        ]);
    }

    let mut sheets = vec![SheetPlan {
        name: SUMMARY_SHEET.into(),
        rows: summary,
        column_widths: vec![32.0, 24.0, 10.0, 10.0, 28.0, 24.0],
    }];
    sheets.extend(data_sheets);

    WorkbookPlan { sheets }
}

fn plan_data_sheet(name: String, entry: &ReportEntry) -> SheetPlan {
    let mut rows = vec![
        vec![Cell::Title(entry.title.clone())],
        vec![Cell::Text("Status".into()), Cell::Status { ok: entry.envelope.is_success() }],
        vec![],
        vec![Cell::Header("Key".into()), Cell::Header("Value".into())],
    ];

    let mut flat = Vec::new();
    match &entry.envelope {
        Envelope::Success(success) => {
            flatten(&success.metadata.to_value(), METADATA_KEY, &mut flat);
            for (key, value) in &success.payload {
                flatten(value, key, &mut flat);
            }
        }
        Envelope::Failure(failure) => flatten(&failure.to_value(), "", &mut flat),
    }

    for (path, value) in flat {
        push_value_rows(&mut rows, path, &value);
    }

    SheetPlan {
        name,
        rows,
        column_widths: vec![60.0, 60.0],
    }
}

/// Numbers stay numeric; text longer than one cell continues on following rows.
fn push_value_rows(rows: &mut Vec<Vec<Cell>>, path: String, value: &Value) {
    if let Some(n) = value.as_number().and_then(|n| n.as_f64()) {
        rows.push(vec![Cell::Text(path), Cell::Number(n)]);
        return;
    }

    let text = scalar_to_string(value);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= MAX_CELL_CHARS {
        rows.push(vec![Cell::Text(path), Cell::Text(text)]);
        return;
    }

    for (i, chunk) in chars.chunks(MAX_CELL_CHARS).enumerate() {
        let key = if i == 0 { path.clone() } else { format!("{path} (cont. {})", i + 1) };
        rows.push(vec![Cell::Text(key), Cell::Text(chunk.iter().collect())]);
    }
}

/// Excel sheet names: at most 31 chars, none of `[]:*?/\`, unique ignoring case.
pub fn unique_sheet_name(label: &str, used: &[String]) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim();
    let base: String = if cleaned.is_empty() {
        "Sheet".into()
    } else {
        cleaned.chars().take(MAX_SHEET_NAME).collect()
    };

    let taken = |name: &str| used.iter().any(|u| u.eq_ignore_ascii_case(name));
    if !taken(&base) {
        return base;
    }

    (2..)
        .map(|n| {
            let suffix = format!("_{n}");
            let keep = MAX_SHEET_NAME - suffix.chars().count();
            format!("{}{suffix}", base.chars().take(keep).collect::<String>())
        })
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

pub fn write_workbook(plan: &WorkbookPlan) -> Result<Vec<u8>, XlsxError> {
    let title = Format::new()
        .set_bold()
        .set_font_size(16)
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_BLUE));
    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(META_GREY));
    let ok = Format::new().set_bold().set_font_color(Color::RGB(OK_GREEN));
    let error = Format::new().set_bold().set_font_color(Color::RGB(ERROR_RED));
    let wrap = Format::new().set_text_wrap().set_align(FormatAlign::Top);

    let mut workbook = Workbook::new();
    for sheet in &plan.sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;
        set_widths(worksheet, &sheet.column_widths)?;

        for (r, row) in sheet.rows.iter().enumerate() {
            let r = r as u32;
            for (c, cell) in row.iter().enumerate() {
                let c = c as u16;
                match cell {
                    Cell::Title(s) => worksheet.write_string_with_format(r, c, s, &title)?,
                    Cell::Header(s) => worksheet.write_string_with_format(r, c, s, &header)?,
                    Cell::Text(s) => worksheet.write_string_with_format(r, c, s, &wrap)?,
                    Cell::Number(n) => worksheet.write_number(r, c, *n)?,
                    Cell::Status { ok: true } => {
                        worksheet.write_string_with_format(r, c, "OK", &ok)?
                    }
                    Cell::Status { ok: false } => {
                        worksheet.write_string_with_format(r, c, "ERROR", &error)?
                    }
                    Cell::Empty => continue,
                };
            }
        }
    }

    workbook.save_to_buffer()
}

fn set_widths(worksheet: &mut Worksheet, widths: &[f64]) -> Result<(), XlsxError> {
    for (c, width) in widths.iter().enumerate() {
        worksheet.set_column_width(c as u16, *width)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        format::fixtures::{expected_keys, mixed_report},
        model::{ErrorEnvelope, ErrorKind, Metadata, SuccessEnvelope},
    };
    use serde_json::json;

    fn texts(sheet: &SheetPlan) -> Vec<String> {
        sheet
            .rows
            .iter()
            .flatten()
            .filter_map(|cell| match cell {
                Cell::Text(s) | Cell::Header(s) | Cell::Title(s) => Some(s.clone()),
                Cell::Number(n) => Some(n.to_string()),
                Cell::Status { ok } => Some(if *ok { "OK".into() } else { "ERROR".into() }),
                Cell::Empty => None,
            })
            .collect()
    }

    #[test]
    fn one_success_one_error_gives_two_data_sheets_and_status_rows() {
        let mut report = Report::new("Two APIs");
        report.push(
            "nowcast",
            "MET Norway Nowcast 2.0",
            SuccessEnvelope::new(json!({"properties": {"x": 1}}), Metadata::new("Nowcast 2.0"))
                .into(),
        );
        report.push(
            "oceanforecast",
            "MET Norway Oceanforecast 2.0",
            ErrorEnvelope::new("Oceanforecast 2.0", ErrorKind::Status, "HTTP 500: boom").into(),
        );

        let plan = plan_workbook(&report);
        let names: Vec<&str> = plan.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, [SUMMARY_SHEET, "nowcast", "oceanforecast"]);

        let summary = plan.sheet(SUMMARY_SHEET).unwrap();
        let statuses: Vec<&Cell> = summary.rows.iter().skip(4).map(|row| &row[2]).collect();
        assert_eq!(statuses, [&Cell::Status { ok: true }, &Cell::Status { ok: false }]);

        for sheet in &plan.sheets[1..] {
            assert!(sheet.rows.len() > 4, "{} has no data rows", sheet.name);
        }
        let failed = texts(plan.sheet("oceanforecast").unwrap());
        assert!(failed.contains(&"HTTP 500: boom".to_string()));
    }

    #[test]
    fn every_key_appears_in_some_path() {
        let report = mixed_report();
        let plan = plan_workbook(&report);
        let all: String = plan.sheets.iter().flat_map(texts).collect::<Vec<_>>().join("\n");

        for key in expected_keys(&report) {
            assert!(all.contains(&key), "missing key {key}");
        }
        assert!(all.contains("properties.timeseries[0].data.instant.details.air_temperature"));
        assert!(all.contains("_metadata.coordinates.lat"));
    }

    #[test]
    fn numbers_stay_numeric() {
        let plan = plan_workbook(&mixed_report());
        let sheet = plan.sheet("locationforecast").unwrap();
        let path =
            Cell::Text("properties.timeseries[0].data.instant.details.air_temperature".into());
        let row = sheet.rows.iter().find(|row| row.first() == Some(&path)).unwrap();
        assert_eq!(row[1], Cell::Number(7.2));
    }

    #[test]
    fn long_text_is_split_not_truncated() {
        let mut rows = Vec::new();
        let long = "a".repeat(MAX_CELL_CHARS + 10);
        push_value_rows(&mut rows, "text".into(), &json!(long));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], Cell::Text("text (cont. 2)".into()));
        assert_eq!(rows[1][1], Cell::Text("a".repeat(10)));
    }

    #[test]
    fn sheet_names_are_sanitised_and_unique() {
        let used = vec!["Summary".to_string(), "nominatim".to_string()];
        assert_eq!(unique_sheet_name("a/b:c", &used), "a_b_c");
        assert_eq!(unique_sheet_name("NOMINATIM", &used), "NOMINATIM_2");
        assert_eq!(unique_sheet_name("summary", &used), "summary_2");
        assert_eq!(unique_sheet_name("", &used), "Sheet");

        let long = "x".repeat(40);
        let name = unique_sheet_name(&long, &[long.chars().take(31).collect()]);
        assert_eq!(name.chars().count(), 31);
        assert!(name.ends_with("_2"));
    }

    #[test]
    fn writes_a_zip_container() {
        let bytes = ExcelFormatter.render(&mixed_report()).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
