//! Sequential pass over every provider, followed by rendering the combined
//! report through each formatter.
//!
//! A failed provider call is an entry in the report, not a fault. Only writing
//! the report files can make [`Collector::run`] return an error; progress lines
//! are best effort.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{info, warn};

use crate::{
    Config,
    format::{Formatter, Report, all_formatters},
    http::HttpTransport,
    model::{DataOrigin, Envelope},
    provider::{Coordinates, ProviderId, Providers, textforecast::Language, tide::TideQuery},
};

/// Stolmen, on the coast south-west of Bergen.
pub const DEFAULT_COORDINATES: Coordinates = Coordinates::new(60.00, 5.00);
pub const DEFAULT_LANGUAGE: Language = Language::En;
pub const DEFAULT_SEARCH_QUERY: &str = "Bergen, Norway";
pub const DEFAULT_SEARCH_LIMIT: u32 = 3;

pub const REPORT_TITLE: &str = "Norwegian Coastal Weather Data";
/// Base name of the per-format file holding every entry.
pub const COMBINED_REPORT_NAME: &str = "weather_report";
/// Sorts lexicographically in time order.
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const WIDTH: usize = 80;

/// One unit of the collection pass. Nominatim contributes two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Ocean,
    Location,
    Text,
    Nowcast,
    Tide,
    BarentsWatch,
    Search,
    Reverse,
}

impl Step {
    const ALL: [Step; 8] = [
        Step::Ocean,
        Step::Location,
        Step::Text,
        Step::Nowcast,
        Step::Tide,
        Step::BarentsWatch,
        Step::Search,
        Step::Reverse,
    ];

    fn provider(self) -> ProviderId {
        match self {
            Step::Ocean => ProviderId::OceanForecast,
            Step::Location => ProviderId::LocationForecast,
            Step::Text => ProviderId::TextForecast,
            Step::Nowcast => ProviderId::Nowcast,
            Step::Tide => ProviderId::Tide,
            Step::BarentsWatch => ProviderId::BarentsWatch,
            Step::Search | Step::Reverse => ProviderId::Nominatim,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Step::Search => "nominatim_search",
            Step::Reverse => "nominatim_reverse",
            other => other.provider().as_str(),
        }
    }

    fn title(self) -> String {
        match self {
            Step::Search => format!("Nominatim Search: {DEFAULT_SEARCH_QUERY}"),
            Step::Reverse => format!("Nominatim Reverse: {DEFAULT_COORDINATES}"),
            other => other.provider().title().to_string(),
        }
    }
}

/// Outcome of a full [`Collector::run`].
#[derive(Debug)]
pub struct CollectionSummary {
    pub report: Report,
    pub files: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl CollectionSummary {
    pub fn ok_count(&self) -> usize {
        self.report.ok_count()
    }

    pub fn error_count(&self) -> usize {
        self.report.error_count()
    }
}

#[derive(Debug)]
pub struct Collector {
    providers: Providers,
    output_dir: PathBuf,
    only: Vec<ProviderId>,
}

impl Collector {
    pub fn new(config: &Config, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            providers: Providers::from_config(config, transport),
            output_dir: config.output_dir.clone(),
            only: Vec::new(),
        }
    }

    /// Restrict the pass to the given providers. Empty means all of them.
    pub fn with_only(mut self, providers: Vec<ProviderId>) -> Self {
        self.only = providers;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fetch, render and write everything, printing progress to `out`.
    pub async fn run(&mut self, out: &mut impl Write) -> Result<CollectionSummary> {
        let started = Instant::now();
        let mut progress = Progress::new(out);
        let rule = "=".repeat(WIDTH);
        progress.line(format_args!(
            "\n{rule}\n{:^WIDTH$}\n{rule}\n",
            "Norwegian Coastal Weather Data Collector"
        ));

        let report = self.fetch_steps(&mut progress).await;

        let stamp = file_stamp(Local::now());
        let files = write_report_files(&self.output_dir, &all_formatters(), &report, &stamp)?;
        progress.line(format_args!("Wrote {} files:", files.len()));
        for path in &files {
            progress.line(format_args!("  {}", path.display()));
        }

        let elapsed = started.elapsed();
        let complete = format!(
            "Data collection complete: {} OK, {} failed ({:.2}s)",
            report.ok_count(),
            report.error_count(),
            elapsed.as_secs_f64()
        );
        let saved = format!("Outputs saved to: {}", self.output_dir.display());
        progress.line(format_args!("\n{rule}\n{complete:^WIDTH$}\n{saved:^WIDTH$}\n{rule}"));

        info!(
            ok = report.ok_count(),
            failed = report.error_count(),
            files = files.len(),
            "collection finished"
        );
        Ok(CollectionSummary { report, files, elapsed })
    }

    /// Call every selected provider in order and gather the envelopes.
    pub async fn fetch_all(&mut self, out: &mut impl Write) -> Report {
        self.fetch_steps(&mut Progress::new(out)).await
    }

    async fn fetch_steps<W: Write>(&mut self, progress: &mut Progress<'_, W>) -> Report {
        let mut report = Report::new(REPORT_TITLE);
        let steps: Vec<Step> = Step::ALL
            .into_iter()
            .filter(|step| self.only.is_empty() || self.only.contains(&step.provider()))
            .collect();

        for (n, step) in steps.into_iter().enumerate() {
            let title = step.title();
            progress.line(format_args!("{}. Fetching {title}...", n + 1));

            let started = Instant::now();
            let envelope = self.fetch_step(step).await;
            progress.line(format_args!(
                "  {} ({:.2}s)\n",
                status_line(&envelope),
                started.elapsed().as_secs_f64()
            ));

            report.push(step.label(), title, envelope);
        }

        report
    }

    async fn fetch_step(&mut self, step: Step) -> Envelope {
        let p = &mut self.providers;
        match step {
            Step::Ocean => p.ocean.fetch(DEFAULT_COORDINATES).await,
            Step::Location => p.location.fetch(DEFAULT_COORDINATES, None).await,
            Step::Text => p.text.fetch(DEFAULT_LANGUAGE).await,
            Step::Nowcast => p.nowcast.fetch(DEFAULT_COORDINATES).await,
            Step::Tide => p.tide.fetch(&TideQuery::default()).await,
            Step::BarentsWatch => p.barentswatch.fetch_coastal_info().await,
            Step::Search => p.nominatim.search(DEFAULT_SEARCH_QUERY, DEFAULT_SEARCH_LIMIT).await,
            Step::Reverse => p.nominatim.reverse(DEFAULT_COORDINATES).await,
        }
    }
}

/// Progress lines for a human watching the run. The first write error is logged
/// and later lines are dropped.
struct Progress<'a, W: Write> {
    out: &'a mut W,
    broken: bool,
}

impl<'a, W: Write> Progress<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self { out, broken: false }
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if self.broken {
            return;
        }
        let written = self.out.write_fmt(args).and_then(|()| self.out.write_all(b"\n"));
        if let Err(err) = written {
            warn!(error = %err, "progress output failed, continuing without it");
            self.broken = true;
        }
    }
}

/// `✓`/`✗` line for one envelope.
pub fn status_line(envelope: &Envelope) -> String {
    match envelope {
        Envelope::Success(s) => match &s.metadata.origin {
            DataOrigin::Live => format!("✓ {} data collected", s.metadata.api),
            DataOrigin::Demo { note } => format!("✓ {} demo data ({note})", s.metadata.api),
            DataOrigin::Fallback { reason } => {
                format!("✓ {} fallback data ({reason})", s.metadata.api)
            }
        },
        Envelope::Failure(e) => format!("✗ Error: {}", e.error),
    }
}

pub fn file_stamp(at: DateTime<Local>) -> String {
    at.format(FILE_STAMP_FORMAT).to_string()
}

/// Write one file per entry and one combined file, for every formatter:
/// `<output_dir>/<dir>/<label>_<stamp>.<ext>` and
/// `<output_dir>/<dir>/weather_report_<stamp>.<ext>`.
pub fn write_report_files(
    output_dir: &Path,
    formatters: &[Box<dyn Formatter>],
    report: &Report,
    stamp: &str,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for formatter in formatters {
        let dir = output_dir.join(formatter.dir_name());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

        for entry in &report.entries {
            let single = Report {
                title: entry.title.clone(),
                generated_at: report.generated_at,
                entries: vec![entry.clone()],
            };
            let path = dir.join(format!("{}_{stamp}.{}", entry.label, formatter.extension()));
            write_rendered(formatter.as_ref(), &single, &path)?;
            written.push(path);
        }

        let path = dir.join(format!("{COMBINED_REPORT_NAME}_{stamp}.{}", formatter.extension()));
        write_rendered(formatter.as_ref(), report, &path)?;
        written.push(path);
    }

    Ok(written)
}

fn write_rendered(formatter: &dyn Formatter, report: &Report, path: &Path) -> Result<()> {
    let bytes = formatter
        .render(report)
        .with_context(|| {
            format!("Failed to render {} output for {}", formatter.name(), path.display())
        })
        .inspect_err(|err| warn!(error = %err, "render failed"))?;

    fs::write(path, bytes)
        .with_context(|| format!("Failed to write output file: {}", path.display()))
}
