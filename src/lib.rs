pub mod cli;
pub mod config;
pub mod inspector;
pub mod logging;
pub mod models;
pub mod network;
pub mod parser;
pub mod pool;
pub mod printer;
pub mod visited;

// Re-export main types for library usage
pub use config::{Config, ConfigError, InspectorConfig, PrinterConfig};
pub use inspector::Inspector;
pub use models::{compare_urls, Link, OutputFormat, Status};
pub use network::{FetchError, HttpClient};
pub use parser::extract_links;
pub use pool::WorkerPool;
pub use printer::Printer;
pub use visited::VisitedSet;
