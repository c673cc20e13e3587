use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub estimator: EstimatorConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Tunables of the estimation engine. Every constant the strategies depend
/// on lives here so deployments can adjust them without a rebuild.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatorConfig {
    /// Candidate devices must be released within this many years of the
    /// target, on either side.
    pub similar_year_window: i32,
    /// Nearest-neighbor price adjustment per year of release-year gap.
    pub year_adjustment_rate: f64,
    /// Estimates at or above this confidence are persisted without review.
    pub auto_approve_threshold: f64,
    /// Returned when neither brand-scoped nor global averages have data.
    pub fallback_default_price: f64,
    pub linear_confidence: ConfidenceClamp,
    pub weighted_confidence: ConfidenceClamp,
    pub nearest_confidence: ConfidenceClamp,
}

/// Inclusive confidence band a strategy's output is clamped into.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceClamp {
    pub min: f64,
    pub max: f64,
}

impl ConfidenceClamp {
    pub fn apply(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub auto_approve_threshold: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://repricer.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            similar_year_window: 3,
            year_adjustment_rate: 0.05,
            auto_approve_threshold: 0.85,
            fallback_default_price: 100.0,
            linear_confidence: ConfidenceClamp { min: 0.60, max: 0.95 },
            weighted_confidence: ConfidenceClamp { min: 0.65, max: 0.90 },
            nearest_confidence: ConfidenceClamp { min: 0.60, max: 0.85 },
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Layered load: defaults, then the config file, then `REPRICER_*`
    /// environment variables, then programmatic overrides, validated last.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("repricer.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(estimator) = patch.estimator {
            if let Some(similar_year_window) = estimator.similar_year_window {
                self.estimator.similar_year_window = similar_year_window;
            }
            if let Some(year_adjustment_rate) = estimator.year_adjustment_rate {
                self.estimator.year_adjustment_rate = year_adjustment_rate;
            }
            if let Some(auto_approve_threshold) = estimator.auto_approve_threshold {
                self.estimator.auto_approve_threshold = auto_approve_threshold;
            }
            if let Some(fallback_default_price) = estimator.fallback_default_price {
                self.estimator.fallback_default_price = fallback_default_price;
            }
            if let Some(linear_confidence) = estimator.linear_confidence {
                self.estimator.linear_confidence = linear_confidence;
            }
            if let Some(weighted_confidence) = estimator.weighted_confidence {
                self.estimator.weighted_confidence = weighted_confidence;
            }
            if let Some(nearest_confidence) = estimator.nearest_confidence {
                self.estimator.nearest_confidence = nearest_confidence;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("REPRICER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("REPRICER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("REPRICER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("REPRICER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("REPRICER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REPRICER_ESTIMATOR_YEAR_WINDOW") {
            self.estimator.similar_year_window =
                parse_i32("REPRICER_ESTIMATOR_YEAR_WINDOW", &value)?;
        }
        if let Some(value) = read_env("REPRICER_ESTIMATOR_YEAR_ADJUSTMENT_RATE") {
            self.estimator.year_adjustment_rate =
                parse_f64("REPRICER_ESTIMATOR_YEAR_ADJUSTMENT_RATE", &value)?;
        }
        if let Some(value) = read_env("REPRICER_ESTIMATOR_AUTO_APPROVE_THRESHOLD") {
            self.estimator.auto_approve_threshold =
                parse_f64("REPRICER_ESTIMATOR_AUTO_APPROVE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("REPRICER_ESTIMATOR_FALLBACK_DEFAULT_PRICE") {
            self.estimator.fallback_default_price =
                parse_f64("REPRICER_ESTIMATOR_FALLBACK_DEFAULT_PRICE", &value)?;
        }

        let log_level =
            read_env("REPRICER_LOGGING_LEVEL").or_else(|| read_env("REPRICER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("REPRICER_LOGGING_FORMAT").or_else(|| read_env("REPRICER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(auto_approve_threshold) = overrides.auto_approve_threshold {
            self.estimator.auto_approve_threshold = auto_approve_threshold;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_estimator(&self.estimator)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("repricer.toml"), PathBuf::from("config/repricer.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_estimator(estimator: &EstimatorConfig) -> Result<(), ConfigError> {
    if estimator.similar_year_window < 1 || estimator.similar_year_window > 10 {
        return Err(ConfigError::Validation(
            "estimator.similar_year_window must be in range 1..=10".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&estimator.year_adjustment_rate) {
        return Err(ConfigError::Validation(
            "estimator.year_adjustment_rate must be in range 0.0..=1.0".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&estimator.auto_approve_threshold) {
        return Err(ConfigError::Validation(
            "estimator.auto_approve_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if estimator.fallback_default_price <= 0.0 {
        return Err(ConfigError::Validation(
            "estimator.fallback_default_price must be greater than zero".to_string(),
        ));
    }

    for (name, clamp) in [
        ("linear_confidence", &estimator.linear_confidence),
        ("weighted_confidence", &estimator.weighted_confidence),
        ("nearest_confidence", &estimator.nearest_confidence),
    ] {
        let ordered = clamp.min <= clamp.max;
        let in_unit_range = (0.0..=1.0).contains(&clamp.min) && (0.0..=1.0).contains(&clamp.max);
        if !ordered || !in_unit_range {
            return Err(ConfigError::Validation(format!(
                "estimator.{name} must satisfy 0.0 <= min <= max <= 1.0"
            )));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_i32(key: &str, value: &str) -> Result<i32, ConfigError> {
    value.parse::<i32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    estimator: Option<EstimatorPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EstimatorPatch {
    similar_year_window: Option<i32>,
    year_adjustment_rate: Option<f64>,
    auto_approve_threshold: Option<f64>,
    fallback_default_price: Option<f64>,
    linear_confidence: Option<ConfidenceClamp>,
    weighted_confidence: Option<ConfidenceClamp>,
    nearest_confidence: Option<ConfidenceClamp>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_match_the_documented_tunables() {
        let config = AppConfig::default();

        assert_eq!(config.estimator.similar_year_window, 3);
        assert_eq!(config.estimator.year_adjustment_rate, 0.05);
        assert_eq!(config.estimator.auto_approve_threshold, 0.85);
        assert_eq!(config.estimator.fallback_default_price, 100.0);
        assert_eq!(config.estimator.linear_confidence.min, 0.60);
        assert_eq!(config.estimator.linear_confidence.max, 0.95);
        assert_eq!(config.estimator.weighted_confidence.min, 0.65);
        assert_eq!(config.estimator.weighted_confidence.max, 0.90);
        assert_eq!(config.estimator.nearest_confidence.min, 0.60);
        assert_eq!(config.estimator.nearest_confidence.max, 0.85);
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_REPRICER_DB_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("repricer.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_REPRICER_DB_URL}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            if config.database.url != "sqlite://from-env.db" {
                return Err("database url should be interpolated from environment".to_string());
            }
            Ok(())
        })();

        clear_vars(&["TEST_REPRICER_DB_URL"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REPRICER_ESTIMATOR_YEAR_WINDOW", "5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("repricer.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[estimator]
similar_year_window = 2
auto_approve_threshold = 0.9

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            if config.database.url != "sqlite://from-override.db" {
                return Err("override database url should win".to_string());
            }
            if config.logging.level != "debug" {
                return Err("overridden log level should be debug".to_string());
            }
            if config.estimator.similar_year_window != 5 {
                return Err("env year window should win over file and defaults".to_string());
            }
            if config.estimator.auto_approve_threshold != 0.9 {
                return Err("file auto-approve threshold should win over defaults".to_string());
            }
            Ok(())
        })();

        clear_vars(&["REPRICER_ESTIMATOR_YEAR_WINDOW"]);
        result
    }

    #[test]
    fn clamp_ranges_are_loadable_from_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("repricer.toml");
        fs::write(
            &path,
            r#"
[estimator]
linear_confidence = { min = 0.5, max = 0.9 }
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        if config.estimator.linear_confidence.min != 0.5 {
            return Err("linear clamp min should come from the file".to_string());
        }
        if config.estimator.weighted_confidence.min != 0.65 {
            return Err("untouched clamps should keep their defaults".to_string());
        }
        Ok(())
    }

    #[test]
    fn validation_rejects_inverted_clamp_ranges() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.estimator.nearest_confidence.min = 0.9;
        config.estimator.nearest_confidence.max = 0.6;

        match config.validate() {
            Err(ConfigError::Validation(message)) if message.contains("nearest_confidence") => {
                Ok(())
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(()) => Err("inverted clamp range should fail validation".to_string()),
        }
    }

    #[test]
    fn validation_rejects_non_sqlite_database_urls() {
        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/repricer".to_string();

        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REPRICER_LOG_LEVEL", "warn");
        env::set_var("REPRICER_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            if config.logging.level != "warn" {
                return Err("log level should come from the alias var".to_string());
            }
            if config.logging.format != LogFormat::Pretty {
                return Err("log format should come from the alias var".to_string());
            }
            Ok(())
        })();

        clear_vars(&["REPRICER_LOG_LEVEL", "REPRICER_LOG_FORMAT"]);
        result
    }
}
