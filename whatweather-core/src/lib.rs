//! Core library for the `whatweather` CLI.
//!
//! This crate defines:
//! - Configuration (user agent, output root, endpoints, credentials)
//! - The uniform success/error envelope every provider call returns
//! - Clients for MET Norway, Kartverket, BarentsWatch and Nominatim
//! - Report formatters (HTML, Excel, YAML, plain text)
//! - The collector that runs every client and writes the reports
//!
//! It is used by `whatweather-cli`, but can also be reused by other binaries or services.

pub mod collector;
pub mod config;
pub mod format;
pub mod http;
pub mod model;
pub mod provider;

pub use collector::{CollectionSummary, Collector};
pub use config::Config;
pub use format::{Formatter, Report, all_formatters};
pub use http::{FetchError, Fetcher, HttpTransport, ReqwestTransport};
pub use model::{DataOrigin, Envelope, ErrorEnvelope, ErrorKind, Metadata, SuccessEnvelope};
pub use provider::{Coordinates, ProviderId, Providers};
