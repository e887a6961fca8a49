#![warn(rust_2018_idioms)]

pub mod adapter;
pub mod app;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod exporter;
pub mod handler;
pub mod healthcheck;
pub mod index_name;
pub mod indexer;
pub mod model;
pub mod otlp;
pub mod port;

#[doc(hidden)]
pub mod test_support;

pub use config::Settings;
pub use error::{ExportError, IndexError, JoinedError};
pub use exporter::SsoTracesExporter;
pub use healthcheck::{healthcheck, healthcheck_with_port};
pub use index_name::resolve_index_name;
