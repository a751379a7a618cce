use anyhow::{Context, Result};
use chrono::Local;
use clap::{ArgAction, Parser, Subcommand};
use inquire::{Password, Text};
use std::{io, path::PathBuf, sync::Arc};
use tracing::{info, warn};

use whatweather_core::{
    Config, Coordinates, Envelope, ProviderId, Providers, ReqwestTransport,
    collector::{self, Collector},
    format::{all_formatters, sample_report},
    provider::{
        textforecast::Language,
        tide::{self, TideQuery},
    },
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "whatweather",
    version,
    about = "Norwegian coastal weather, tide and geocoding data collector"
)]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output root directory (overrides config and WHATWEATHER_OUTPUT_DIR).
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Defaults to `collect`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every API with fixed defaults and write all report formats.
    Collect {
        /// Only these providers, e.g. `--only nowcast,tide`.
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },

    /// MET Norway ocean forecast (waves, currents, sea temperature).
    Oceanforecast {
        #[arg(long, default_value_t = 60.10, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, default_value_t = 9.58, allow_negative_numbers = true)]
        lon: f64,
    },

    /// MET Norway location forecast.
    Locationforecast {
        #[arg(long, default_value_t = 59.91, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, default_value_t = 10.75, allow_negative_numbers = true)]
        lon: f64,
        /// Metres above sea level.
        #[arg(long, allow_negative_numbers = true)]
        altitude: Option<i32>,
    },

    /// MET Norway written land overview.
    Textforecast {
        /// nb, nn or en.
        #[arg(long, default_value = "nb")]
        language: Language,
    },

    /// MET Norway nowcast (next two hours).
    Nowcast {
        #[arg(long, default_value_t = 59.91, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, default_value_t = 10.75, allow_negative_numbers = true)]
        lon: f64,
    },

    /// Kartverket tide predictions for a station or a point.
    Tide {
        /// Station code or name; ignored when --lat and --lon are given.
        #[arg(long, default_value = tide::DEFAULT_STATION)]
        station: String,
        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,
        #[arg(
            long,
            default_value_t = tide::DEFAULT_DAYS_AHEAD,
            value_parser = clap::value_parser!(i64).range(1..)
        )]
        days: i64,
    },

    /// List permanent Kartverket tide stations.
    TideStations,

    /// BarentsWatch coastal data (demo data without an API key).
    Barentswatch,

    /// Nominatim place search.
    Search {
        #[arg(default_value = "Bergen, Norway")]
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: u32,
    },

    /// Nominatim reverse geocoding.
    Reverse {
        #[arg(long, default_value_t = 60.39, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, default_value_t = 5.32, allow_negative_numbers = true)]
        lon: f64,
    },

    /// Interactively set the user agent, output directory and BarentsWatch key.
    Configure,

    /// Render a built-in sample report through every formatter.
    Sample,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // A bare `whatweather` run must not fail on a broken default config file.
        let implicit_collect = self.command.is_none() && self.config.is_none();
        let command = self.command.unwrap_or(Command::Collect { only: Vec::new() });

        let loaded = match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        };
        let mut config = config_or_defaults(loaded, implicit_collect)?;
        config.apply_env_overrides();
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        info!(
            output_dir = %config.output_dir.display(),
            user_agent = %config.user_agent,
            "configuration loaded"
        );

        let transport = Arc::new(ReqwestTransport::new());
        let mut p = Providers::from_config(&config, transport.clone());

        let (title, envelope) = match command {
            Command::Collect { only } => {
                let only = only
                    .iter()
                    .map(|name| ProviderId::try_from(name.as_str()))
                    .collect::<Result<Vec<_>>>()?;

                let mut collector = Collector::new(&config, transport).with_only(only);
                collector.run(&mut io::stdout().lock()).await?;
                return Ok(());
            }
            Command::Configure => return configure(self.config),
            Command::Sample => return write_sample(&config),

            Command::Oceanforecast { lat, lon } => (
                ProviderId::OceanForecast.title().to_string(),
                p.ocean.fetch(Coordinates::new(lat, lon)).await,
            ),
            Command::Locationforecast { lat, lon, altitude } => (
                ProviderId::LocationForecast.title().to_string(),
                p.location.fetch(Coordinates::new(lat, lon), altitude).await,
            ),
            Command::Textforecast { language } => (
                ProviderId::TextForecast.title().to_string(),
                p.text.fetch(language).await,
            ),
            Command::Nowcast { lat, lon } => (
                ProviderId::Nowcast.title().to_string(),
                p.nowcast.fetch(Coordinates::new(lat, lon)).await,
            ),
            Command::Tide { station, lat, lon, days } => {
                let query = match lat.zip(lon) {
                    Some((lat, lon)) => TideQuery::for_coordinates(Coordinates::new(lat, lon)),
                    None => TideQuery::for_station(station),
                };
                (
                    ProviderId::Tide.title().to_string(),
                    p.tide.fetch(&query.with_days(days)).await,
                )
            }
            Command::TideStations => (
                "Kartverket Tide Stations".to_string(),
                p.tide.stations().await,
            ),
            Command::Barentswatch => (
                ProviderId::BarentsWatch.title().to_string(),
                p.barentswatch.fetch_coastal_info().await,
            ),
            Command::Search { query, limit } => (
                format!("Nominatim Search: {query}"),
                p.nominatim.search(&query, limit).await,
            ),
            Command::Reverse { lat, lon } => {
                let coordinates = Coordinates::new(lat, lon);
                (
                    format!("Nominatim Reverse: {coordinates}"),
                    p.nominatim.reverse(coordinates).await,
                )
            }
        };

        print_envelope(&title, &envelope);
        Ok(())
    }
}

/// With `lenient`, an unreadable config is logged and replaced by the defaults.
fn config_or_defaults(loaded: Result<Config>, lenient: bool) -> Result<Config> {
    match loaded {
        Ok(config) => Ok(config),
        Err(err) if lenient => {
            warn!(error = %format!("{err:#}"), "ignoring unreadable config, using defaults");
            Ok(Config::default())
        }
        Err(err) => Err(err),
    }
}

fn write_sample(config: &Config) -> Result<()> {
    let stamp = collector::file_stamp(Local::now());
    let files = collector::write_report_files(
        &config.output_dir,
        &all_formatters(),
        &sample_report(),
        &stamp,
    )?;

    println!("Sample report written to:");
    for path in files {
        println!("  {}", path.display());
    }
    Ok(())
}

/// One-screen summary: status, timestamp and top-level keys (or the error).
fn print_envelope(title: &str, envelope: &Envelope) {
    println!("{title}");
    println!("{}", "-".repeat(title.chars().count().max(40)));
    println!("{}", collector::status_line(envelope));

    match envelope {
        Envelope::Success(s) => {
            println!("  fetched_at: {}", s.metadata.fetched_at.to_rfc3339());
            println!("  origin:     {}", s.metadata.origin.as_str());
            for (key, value) in &s.metadata.params {
                println!("  {key}: {value}");
            }
            let keys: Vec<&str> = s.payload.keys().map(String::as_str).collect();
            println!("  keys:       {}", keys.join(", "));
        }
        Envelope::Failure(e) => {
            println!("  kind:       {}", e.kind.as_str());
            println!("  timestamp:  {}", e.timestamp.to_rfc3339());
        }
    }
}

fn configure(path: Option<PathBuf>) -> Result<()> {
    let mut config = match &path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let user_agent = Text::new("User-Agent (app name and contact):")
        .with_default(&config.user_agent)
        .prompt()
        .context("Failed to read user agent")?;
    config.user_agent = user_agent;

    let current_dir = config.output_dir.display().to_string();
    let output_dir = Text::new("Output directory:")
        .with_default(&current_dir)
        .prompt()
        .context("Failed to read output directory")?;
    config.output_dir = PathBuf::from(output_dir);

    let key = Password::new("BarentsWatch API key (leave blank for demo mode):")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    config.set_barentswatch_api_key(Some(key));

    let saved_to = match path {
        Some(path) => {
            config.save_to(&path)?;
            path
        }
        None => config.save()?,
    };

    println!("Configuration saved to {}", saved_to.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_collect() {
        let cli = Cli::try_parse_from(["whatweather"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn single_client_commands_have_defaults() {
        let cli = Cli::try_parse_from(["whatweather", "oceanforecast"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Oceanforecast { lat, lon }) if lat == 60.10 && lon == 9.58
        ));

        let cli = Cli::try_parse_from(["whatweather", "textforecast"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Textforecast { language: Language::Nb })));

        let cli = Cli::try_parse_from(["whatweather", "tide"]).unwrap();
        match cli.command {
            Some(Command::Tide { station, lat, lon, days }) => {
                assert_eq!(station, "BGO");
                assert_eq!((lat, lon), (None, None));
                assert_eq!(days, 7);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_and_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "whatweather",
            "reverse",
            "--lat",
            "-33.9",
            "--lon",
            "18.4",
            "--output-dir",
            "out",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output_dir, Some(PathBuf::from("out")));
        assert!(matches!(cli.command, Some(Command::Reverse { lat, .. }) if lat == -33.9));
    }

    #[test]
    fn collect_only_accepts_a_list() {
        let cli =
            Cli::try_parse_from(["whatweather", "collect", "--only", "nowcast,tide"]).unwrap();
        match cli.command {
            Some(Command::Collect { only }) => assert_eq!(only, ["nowcast", "tide"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_language_is_rejected() {
        let parsed = Cli::try_parse_from(["whatweather", "textforecast", "--language", "de"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn tide_days_below_one_are_rejected() {
        assert!(Cli::try_parse_from(["whatweather", "tide", "--days", "0"]).is_err());
        assert!(Cli::try_parse_from(["whatweather", "tide", "--days", "-3"]).is_err());

        let cli = Cli::try_parse_from(["whatweather", "tide", "--days", "1"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Tide { days: 1, .. })));
    }

    #[test]
    fn broken_config_falls_back_to_defaults_for_the_bare_run() {
        let broken = Err(anyhow::anyhow!("Failed to parse config file: expected `=`"));
        assert_eq!(config_or_defaults(broken, true).unwrap(), Config::default());
    }

    #[test]
    fn broken_config_stays_fatal_otherwise() {
        let broken = Err(anyhow::anyhow!("Failed to parse config file: expected `=`"));
        let err = config_or_defaults(broken, false).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
