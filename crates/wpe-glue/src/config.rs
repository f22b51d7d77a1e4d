//! Glue configuration
//!
//! Defaults match the stock WPE Android port. A TOML file named by
//! `WPE_GLUE_CONFIG` can override them, and `WPE_GLUE_LOG` replaces the log
//! filter last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Environment variable naming a TOML config file.
pub const CONFIG_PATH_VAR: &str = "WPE_GLUE_CONFIG";

/// Environment variable overriding `log_filter`.
pub const LOG_FILTER_VAR: &str = "WPE_GLUE_LOG";

static CONFIG: OnceLock<GlueConfig> = OnceLock::new();

/// Config loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlueConfig {
    /// Logcat tag for native logs and redirected stdout
    pub log_tag: String,
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
    /// Redirect stdout into logcat during `setupEnvironment`
    pub pipe_stdout: bool,
    /// Also redirect stderr (Android only)
    pub redirect_stderr: bool,
    /// JNI name of the Java glue class
    pub glue_class: String,
    /// JNI name of the Java page class
    pub page_class: String,
    /// JNI name of the settings object passed to `nativeUpdateAllSettings`
    pub page_settings_class: String,
}

impl Default for GlueConfig {
    fn default() -> Self {
        Self {
            log_tag: "WPEBrowserGlue".to_string(),
            log_filter: "info".to_string(),
            pipe_stdout: true,
            redirect_stderr: false,
            glue_class: "com/wpe/wpe/BrowserGlue".to_string(),
            page_class: "com/wpe/wpe/Page".to_string(),
            page_settings_class: "com/wpe/wpe/PageSettings".to_string(),
        }
    }
}

impl GlueConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from the process environment.
    ///
    /// A broken config file falls back to defaults; the error is returned
    /// alongside so it can be logged once logging is up.
    pub fn load() -> (Self, Option<ConfigError>) {
        Self::load_with(|key| std::env::var(key).ok())
    }

    fn load_with<F>(lookup: F) -> (Self, Option<ConfigError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let (mut config, error) = match lookup(CONFIG_PATH_VAR) {
            Some(path) => match Self::from_file(Path::new(&path)) {
                Ok(config) => (config, None),
                Err(e) => (Self::default(), Some(e)),
            },
            None => (Self::default(), None),
        };

        if let Some(filter) = lookup(LOG_FILTER_VAR).filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }

        (config, error)
    }
}

/// Load the process-wide config on first use.
///
/// The error, if any, is only returned to the first caller.
pub fn init_global() -> (&'static GlueConfig, Option<ConfigError>) {
    let mut load_error = None;
    let config = CONFIG.get_or_init(|| {
        let (config, error) = GlueConfig::load();
        load_error = error;
        config
    });
    (config, load_error)
}

/// The process-wide config (defaults until [`init_global`] has run).
pub fn get() -> &'static GlueConfig {
    CONFIG.get_or_init(GlueConfig::default)
}
