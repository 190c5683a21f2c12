use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

const CONFIG_DIR: &str = ".blindbuster";
const CONFIG_FILE: &str = "config.yml";

const DEFAULT_CONFIG: &str = r#"# Blindbuster config
#
# Location (default):
#   ~/.blindbuster/config.yml
#
# Command-line flags override every value here.

# Input
payloads: ./payloads/blind-xss.txt
# file: ./urls.txt

# Scan
encode: 0
require_star: false
marker: xss.report
settle: 3

# Browser
page_timeout: 20
# chrome: /usr/bin/chromium
fixed_fingerprint: false

# Output (optional)
# output: ./vulnerable.txt
# output_format: text

debug: false
no_color: false
"#;

/// Values read from the YAML config. Every field is optional; unset fields
/// fall back to the command line or built-in defaults.
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ConfigFile {
    pub payloads: Option<String>,
    #[serde(alias = "input_file")]
    pub file: Option<String>,
    pub encode: Option<u8>,
    pub require_star: Option<bool>,
    pub marker: Option<String>,
    pub settle: Option<u64>,
    pub page_timeout: Option<u64>,
    pub chrome: Option<String>,
    pub fixed_fingerprint: Option<bool>,
    pub output: Option<String>,
    pub output_format: Option<String>,
    pub debug: Option<bool>,
    pub no_color: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine home directory")]
    NoHome,

    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to read config: {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write config: {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

fn home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .into_iter()
        .filter_map(env::var_os)
        .find(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// `~/.blindbuster/config.yml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    home_dir()
        .map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
        .ok_or(ConfigError::NoHome)
}

fn expand_tilde_with(path: &str, home: Option<&Path>) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() => rest,
        Some(rest) if rest.starts_with(['/', '\\']) => &rest[1..],
        _ => return PathBuf::from(path),
    };
    match home {
        Some(home) if rest.is_empty() => home.to_path_buf(),
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// Resolves a leading `~` against the home directory. `~user` forms are
/// left alone.
pub fn expand_tilde(path: &str) -> PathBuf {
    expand_tilde_with(path, home_dir().as_deref())
}

/// [`expand_tilde`] for paths kept as strings (payload, URL and output files).
pub fn user_path(path: &str) -> String {
    expand_tilde(path).to_string_lossy().into_owned()
}

/// An empty document yields the all-default config.
pub fn parse_config(contents: &str) -> Result<ConfigFile, serde_yaml::Error> {
    if contents.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(contents)
}

pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let display = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ConfigError::NotFound {
            path: display.clone(),
        },
        _ => ConfigError::Read {
            path: display.clone(),
            source,
        },
    })?;
    parse_config(&contents).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}

/// `--config` must exist. Without it the default location is used when a
/// file is there, and built-in defaults otherwise.
pub fn resolve_config(explicit: Option<&str>) -> Result<ConfigFile, ConfigError> {
    if let Some(path) = explicit {
        return load_config(&expand_tilde(path));
    }
    match default_config_path() {
        Ok(path) if path.is_file() => load_config(&path),
        _ => Ok(ConfigFile::default()),
    }
}

/// Writes the commented default config unless `path` already exists.
/// Returns whether a file was written.
pub fn write_default_config(path: &Path) -> Result<bool, ConfigError> {
    let write_err = |p: &Path, source| ConfigError::Write {
        path: p.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
    }
    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(write_err(path, e)),
    };
    file.write_all(DEFAULT_CONFIG.as_bytes())
        .map_err(|e| write_err(path, e))?;
    Ok(true)
}
