use std::cmp::Ordering;
use std::fmt;

/// Synthetic status code for references pointing outside the inspected host.
pub const STATUS_EXTERNAL: u16 = 991;

/// Synthetic status code for fetch or URL-resolution failures.
pub const STATUS_ERROR: u16 = 992;

/// Outcome of checking a single URL.
///
/// Real HTTP responses keep their status code; the two synthetic variants
/// live in the 9xx private range so they can never collide with one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Http(u16),
    External,
    Error,
}

impl Status {
    /// Numeric code used for reporting and for the skip-status comparison.
    pub fn code(self) -> u16 {
        match self {
            Status::Http(code) => code,
            Status::External => STATUS_EXTERNAL,
            Status::Error => STATUS_ERROR,
        }
    }

    /// Human-readable label: the decimal code, or `EXT`/`ERR` for sentinels.
    pub fn label(self) -> String {
        match self {
            Status::Http(code) => code.to_string(),
            Status::External => "EXT".to_string(),
            Status::Error => "ERR".to_string(),
        }
    }

    /// Success-class and redirect responses qualify for HTML parsing.
    pub fn is_parseable(self) -> bool {
        matches!(self, Status::Http(code) if code < 400)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Per-URL record kept in the visited map for the lifetime of a crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Absolute URL, the canonical identity of the record.
    pub url: String,

    pub status: Status,

    /// Sightings beyond the first one, saturating at the byte maximum.
    pub occurrences: u8,
}

impl Link {
    pub fn new(url: impl Into<String>, status: Status) -> Self {
        Self {
            url: url.into(),
            status,
            occurrences: 0,
        }
    }
}

/// Report destination selected by `printer.outputFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Stdout,
    Html,
    Csv,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stdout" => Some(OutputFormat::Stdout),
            "html" => Some(OutputFormat::Html),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Stdout => "stdout",
            OutputFormat::Html => "html",
            OutputFormat::Csv => "csv",
        }
    }

    /// Whether this format writes a report file instead of streaming.
    pub fn is_file(self) -> bool {
        matches!(self, OutputFormat::Html | OutputFormat::Csv)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort order for reports: shallow URLs before deep ones, lexicographic
/// segment by segment within the same depth.
pub fn compare_urls(a: &str, b: &str) -> Ordering {
    let segments_a: Vec<&str> = a.split('/').collect();
    let segments_b: Vec<&str> = b.split('/').collect();

    segments_a
        .len()
        .cmp(&segments_b.len())
        .then_with(|| segments_a.cmp(&segments_b))
}
