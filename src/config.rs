use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::OutputFormat;

pub const ENV_PREFIX: &str = "LINKS";

const DEFAULT_CONFIG_DIR: &str = "com.yaroslavgrebnov.links";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_ATTEMPTS: u8 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2);

/// Every settable configuration key, in `section.key` form. Environment
/// overrides are derived from this list (`inspector.host` →
/// `LINKS_INSPECTOR_HOST`).
const CONFIG_KEYS: &[&str] = &[
    "inspector.host",
    "inspector.requestTimeout",
    "inspector.retryAttempts",
    "inspector.retryDelay",
    "inspector.doNotFollowRedirects",
    "inspector.logExternalLinks",
    "inspector.skipStatusCodes",
    "printer.sortOutput",
    "printer.displayOccurrences",
    "printer.skipOK",
    "printer.outputFormat",
    "printer.doNotOpenFileReport",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration settings")]
    InvalidSettings,

    #[error("invalid printer.outputFormat value")]
    InvalidOutputFormat,

    #[error("empty host value")]
    EmptyHost,

    #[error("invalid host value")]
    InvalidHost,

    #[error("cannot determine user configuration directory")]
    NoConfigDir,

    #[error("cannot access configuration file: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialization format for `config show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowFormat {
    Yaml,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InspectorConfig {
    /// Base URL; normalized to `scheme://host[:port]` during validation.
    pub host: String,

    #[serde(with = "duration_str")]
    pub request_timeout: Duration,

    pub do_not_follow_redirects: bool,

    pub log_external_links: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skip_status_codes: Vec<u16>,

    pub retry_attempts: u8,

    #[serde(with = "duration_str")]
    pub retry_delay: Duration,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            do_not_follow_redirects: false,
            log_external_links: false,
            skip_status_codes: Vec::new(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PrinterConfig {
    pub sort_output: bool,

    pub display_occurrences: bool,

    #[serde(rename = "skipOK")]
    pub skip_ok: bool,

    /// One of `stdout`, `html`, `csv`; kept as the raw string so validation
    /// can report the documented error for unknown values.
    pub output_format: String,

    pub do_not_open_file_report: bool,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            sort_output: false,
            display_occurrences: false,
            skip_ok: false,
            output_format: OutputFormat::Stdout.as_str().to_string(),
            do_not_open_file_report: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub inspector: InspectorConfig,
    pub printer: PrinterConfig,
}

impl Config {
    /// Layered load: defaults, then the YAML file (the explicit path, or the
    /// default location when it exists), then environment overrides. CLI
    /// flags are applied by the caller before [`validate`](Config::validate).
    pub fn load(cfg_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match cfg_file {
            Some(path) => read_config_file(path)?,
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    read_config_file(&path)?
                } else {
                    // The file is only ever created by `config set`.
                    Config::default()
                }
            }
        };

        apply_env_from(&mut cfg, |name| std::env::var(name).ok())?;
        Ok(cfg)
    }

    /// Validate and normalize. The host gets a scheme when missing and is
    /// reduced to its `scheme://host[:port]` form.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.validate_output_format()?;
        self.validate_host()
    }

    fn validate_output_format(&self) -> Result<(), ConfigError> {
        OutputFormat::parse(&self.printer.output_format)
            .map(|_| ())
            .ok_or(ConfigError::InvalidOutputFormat)
    }

    fn validate_host(&mut self) -> Result<(), ConfigError> {
        let host = self.inspector.host.trim();
        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };

        let url = Url::parse(&with_scheme).map_err(|_| ConfigError::InvalidHost)?;
        let host_str = url.host_str().ok_or(ConfigError::InvalidHost)?;

        self.inspector.host = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host_str, port),
            None => format!("{}://{}", url.scheme(), host_str),
        };

        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&contents).map_err(|_| ConfigError::InvalidSettings)
}

/// Default location: `<user-config-dir>/com.yaroslavgrebnov.links/config.yaml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE))
        .ok_or(ConfigError::NoConfigDir)
}

pub fn env_var_name(key: &str) -> String {
    format!("{ENV_PREFIX}_{}", key.replace('.', "_").to_uppercase())
}

fn apply_env_from(
    cfg: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    for key in CONFIG_KEYS {
        if let Some(value) = lookup(&env_var_name(key)) {
            set_key(cfg, key, &value)?;
        }
    }
    Ok(())
}

/// Assign a raw string value to a configuration key, parsing per key type.
/// Unknown keys are rejected.
pub fn set_key(cfg: &mut Config, key: &str, value: &str) -> Result<(), ConfigError> {
    match key {
        "inspector.host" => cfg.inspector.host = value.to_string(),
        "inspector.requestTimeout" => cfg.inspector.request_timeout = parse_duration(value)?,
        "inspector.retryAttempts" => {
            cfg.inspector.retry_attempts =
                value.parse().map_err(|_| ConfigError::InvalidSettings)?;
        }
        "inspector.retryDelay" => cfg.inspector.retry_delay = parse_duration(value)?,
        "inspector.doNotFollowRedirects" => {
            cfg.inspector.do_not_follow_redirects = parse_bool(value)?;
        }
        "inspector.logExternalLinks" => cfg.inspector.log_external_links = parse_bool(value)?,
        "inspector.skipStatusCodes" => {
            cfg.inspector.skip_status_codes = parse_status_codes(value)?;
        }
        "printer.sortOutput" => cfg.printer.sort_output = parse_bool(value)?,
        "printer.displayOccurrences" => cfg.printer.display_occurrences = parse_bool(value)?,
        "printer.skipOK" => cfg.printer.skip_ok = parse_bool(value)?,
        "printer.outputFormat" => cfg.printer.output_format = value.to_string(),
        "printer.doNotOpenFileReport" => {
            cfg.printer.do_not_open_file_report = parse_bool(value)?;
        }
        _ => return Err(ConfigError::InvalidSettings),
    }

    Ok(())
}

/// Print the configuration file status line, then the effective
/// configuration. An empty host does not block showing; it is expected
/// during first-time setup.
pub fn show(cfg_file: Option<&Path>, format: ShowFormat) -> Result<(), ConfigError> {
    let mut cfg = Config::load(cfg_file)?;
    match cfg.validate() {
        Ok(()) | Err(ConfigError::EmptyHost) => {}
        Err(e) => return Err(e),
    }

    println!("{}", config_file_status(cfg_file));

    let serialized = match format {
        ShowFormat::Json => {
            serde_json::to_string_pretty(&cfg).map_err(|_| ConfigError::InvalidSettings)?
        }
        ShowFormat::Yaml => serde_yaml::to_string(&cfg).map_err(|_| ConfigError::InvalidSettings)?,
    };
    println!("{serialized}");

    Ok(())
}

/// Assign and persist a setting. Creates the configuration file at the
/// default location (directory mode 0700, file mode 0600) when no explicit
/// path is in use and none exists yet.
pub fn set(cfg_file: Option<&Path>, key: &str, value: &str) -> Result<(), ConfigError> {
    let mut cfg = Config::load(cfg_file)?;
    set_key(&mut cfg, key, value)?;

    match cfg.validate() {
        Ok(()) | Err(ConfigError::EmptyHost) => {}
        Err(e) => return Err(e),
    }

    let path = match cfg_file {
        Some(path) => path.to_path_buf(),
        None => {
            let path = default_config_path()?;
            if let Some(dir) = path.parent() {
                create_config_dir(dir)?;
            }
            path
        }
    };

    write_config_file(&path, &cfg)
}

fn config_file_status(cfg_file: Option<&Path>) -> String {
    if let Some(path) = cfg_file {
        return format!("Configuration file path: {}", path.display());
    }

    match default_config_path() {
        Ok(path) if path.exists() => format!("Configuration file path: {}", path.display()),
        Ok(path) => format!(
            "Configuration file does not exist at default location: {}",
            path.display()
        ),
        Err(e) => format!("Error retrieving configuration file at default location: {e}"),
    }
}

fn create_config_dir(dir: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)?;
    }

    #[cfg(not(unix))]
    std::fs::create_dir_all(dir)?;

    Ok(())
}

fn write_config_file(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    let serialized = serde_yaml::to_string(cfg).map_err(|_| ConfigError::InvalidSettings)?;
    std::fs::write(path, serialized)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

fn parse_bool(value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidSettings),
    }
}

fn parse_status_codes(value: &str) -> Result<Vec<u16>, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }

    value
        .split(',')
        .map(|code| code.trim().parse().map_err(|_| ConfigError::InvalidSettings))
        .collect()
}

/// Parse durations written as `300ms`, `30s`, `5m`, `1h`.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    let unit_start = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or(ConfigError::InvalidSettings)?;
    let (number, unit) = value.split_at(unit_start);
    let number: u64 = number.parse().map_err(|_| ConfigError::InvalidSettings)?;

    match unit {
        "ms" => Ok(Duration::from_millis(number)),
        "s" => Ok(Duration::from_secs(number)),
        "m" => Ok(Duration::from_secs(number * 60)),
        "h" => Ok(Duration::from_secs(number * 3600)),
        _ => Err(ConfigError::InvalidSettings),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{format_duration, parse_duration};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?;
        parse_duration(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.inspector.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.inspector.retry_attempts, 3);
        assert_eq!(cfg.inspector.retry_delay, Duration::from_millis(2));
        assert!(!cfg.inspector.log_external_links);
        assert!(cfg.inspector.skip_status_codes.is_empty());
        assert_eq!(cfg.printer.output_format, "stdout");
    }

    #[test]
    fn test_load_yaml_file() {
        let file = temp_config(
            r#"
inspector:
  host: example.com
  requestTimeout: 5s
  retryAttempts: 2
  retryDelay: 10ms
  logExternalLinks: true
  skipStatusCodes: [404, 500]
printer:
  sortOutput: true
  skipOK: true
  outputFormat: csv
"#,
        );

        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.inspector.host, "example.com");
        assert_eq!(cfg.inspector.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.inspector.retry_attempts, 2);
        assert_eq!(cfg.inspector.retry_delay, Duration::from_millis(10));
        assert!(cfg.inspector.log_external_links);
        assert_eq!(cfg.inspector.skip_status_codes, vec![404, 500]);
        assert!(cfg.printer.sort_output);
        assert!(cfg.printer.skip_ok);
        assert_eq!(cfg.printer.output_format, "csv");
        assert!(!cfg.printer.do_not_open_file_report);
    }

    #[test]
    fn test_load_invalid_yaml() {
        let file = temp_config("inspector: [not, a, mapping]");
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::InvalidSettings)
        ));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        assert!(matches!(
            Config::load(Some(Path::new("/nonexistent/config.yaml"))),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("inspector.host"), "LINKS_INSPECTOR_HOST");
        assert_eq!(
            env_var_name("inspector.requestTimeout"),
            "LINKS_INSPECTOR_REQUESTTIMEOUT"
        );
        assert_eq!(env_var_name("printer.skipOK"), "LINKS_PRINTER_SKIPOK");
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::default();
        apply_env_from(&mut cfg, |name| match name {
            "LINKS_INSPECTOR_HOST" => Some("http://env.host".to_string()),
            "LINKS_INSPECTOR_RETRYATTEMPTS" => Some("7".to_string()),
            "LINKS_PRINTER_SORTOUTPUT" => Some("true".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(cfg.inspector.host, "http://env.host");
        assert_eq!(cfg.inspector.retry_attempts, 7);
        assert!(cfg.printer.sort_output);
    }

    #[test]
    fn test_validate_normalizes_host() {
        let mut cfg = Config {
            inspector: InspectorConfig {
                host: "example.com".to_string(),
                ..InspectorConfig::default()
            },
            ..Config::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.inspector.host, "http://example.com");
    }

    #[test]
    fn test_validate_keeps_scheme_and_port() {
        let mut cfg = Config {
            inspector: InspectorConfig {
                host: "https://example.com:8443/some/path".to_string(),
                ..InspectorConfig::default()
            },
            ..Config::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.inspector.host, "https://example.com:8443");
    }

    #[test]
    fn test_validate_empty_host() {
        let mut cfg = Config::default();
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyHost)));
    }

    #[test]
    fn test_validate_invalid_host() {
        let mut cfg = Config {
            inspector: InspectorConfig {
                host: "http://".to_string(),
                ..InspectorConfig::default()
            },
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidHost)));
    }

    #[test]
    fn test_validate_invalid_output_format() {
        let mut cfg = Config {
            inspector: InspectorConfig {
                host: "example.com".to_string(),
                ..InspectorConfig::default()
            },
            printer: PrinterConfig {
                output_format: "pdf".to_string(),
                ..PrinterConfig::default()
            },
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidOutputFormat)
        ));
    }

    #[test]
    fn test_set_key_rejects_unknown() {
        let mut cfg = Config::default();
        assert!(matches!(
            set_key(&mut cfg, "inspector.bogus", "1"),
            Err(ConfigError::InvalidSettings)
        ));
    }

    #[test]
    fn test_set_key_parses_status_codes() {
        let mut cfg = Config::default();
        set_key(&mut cfg, "inspector.skipStatusCodes", "404, 500,301").unwrap();
        assert_eq!(cfg.inspector.skip_status_codes, vec![404, 500, 301]);

        set_key(&mut cfg, "inspector.skipStatusCodes", "").unwrap();
        assert!(cfg.inspector.skip_status_codes.is_empty());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2ms").unwrap(), Duration::from_millis(2));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("30x").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_millis(2)), "2ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn test_set_then_load_round_trip() {
        let file = NamedTempFile::new().unwrap();

        set(Some(file.path()), "inspector.host", "example.com").unwrap();
        set(Some(file.path()), "printer.outputFormat", "csv").unwrap();

        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.inspector.host, "http://example.com");
        assert_eq!(cfg.printer.output_format, "csv");
    }

    #[test]
    fn test_set_rejects_invalid_output_format() {
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(
            set(Some(file.path()), "printer.outputFormat", "pdf"),
            Err(ConfigError::InvalidOutputFormat)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_set_writes_restricted_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let file = NamedTempFile::new().unwrap();
        set(Some(file.path()), "inspector.host", "example.com").unwrap();

        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_yaml_round_trip_preserves_durations() {
        let cfg = Config {
            inspector: InspectorConfig {
                host: "http://example.com".to_string(),
                request_timeout: Duration::from_secs(10),
                retry_delay: Duration::from_millis(5),
                ..InspectorConfig::default()
            },
            ..Config::default()
        };

        let serialized = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&serialized).unwrap();
        assert_eq!(parsed, cfg);
    }
}
