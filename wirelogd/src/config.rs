// Layered configuration resolver

//! Configuration resolution
//!
//! Every option is declared once in a [`ConfigSpec`] with its caster and
//! default. Resolution folds four partial layers, each overriding the keys
//! set by the previous one:
//!
//! 1. spec defaults
//! 2. the `[wirelogd]` section of an INI file (skipped when the file is absent)
//! 3. `WIRELOGD_<KEY>` environment variables
//! 4. command-line values
//!
//! Missing sources contribute nothing. A file is rejected when it cannot be
//! parsed, has options before any section header or sets an option twice.
//! A value that cannot be decoded is also an error.

use crate::logging::{LogDestination, LogFormat};
use ini::{Ini, ParseOption};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// INI section holding wirelogd options
pub const SECTION: &str = "wirelogd";

/// Prefix of the per-key environment variables
pub const ENV_PREFIX: &str = "WIRELOGD";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "WIRELOGD_CONFIG";

/// Config file read when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/wirelogd.cfg";

/// Directory where wg-gen-web stores its client files
pub const DEFAULT_WG_GEN_WEB_PATH: &str = "/etc/wireguard/";

/// Strings accepted as `true` by the boolean caster (case-insensitive)
const TRUTHY_VALUES: [&str; 6] = ["1", "on", "enable", "enabled", "true", "yes"];

/// Errors raised while building the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Explicitly requested config file does not exist
    #[error("{} not found", .0.display())]
    NotFound(PathBuf),
    /// Config file is not valid INI
    #[error("cannot parse configuration file {}: {source}", .path.display())]
    Parse {
        /// Config file
        path: PathBuf,
        /// Reader error
        #[source]
        source: ini::Error,
    },
    /// Option written before any section header
    #[error("{}: option {key} is outside any section", .path.display())]
    MissingSectionHeader {
        /// Config file
        path: PathBuf,
        /// First option outside a section
        key: String,
    },
    /// Option set twice in the `[wirelogd]` section
    #[error("{}: option {key} is set more than once", .path.display())]
    DuplicateKey {
        /// Config file
        path: PathBuf,
        /// Repeated option, lowercased
        key: String,
    },
    /// Raw text the caster cannot decode
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Option name
        key: String,
        /// Raw text
        value: String,
    },
    /// Decoded value outside the accepted range
    #[error("invalid setting {key}: {reason}")]
    Invalid {
        /// Option name
        key: String,
        /// What is wrong with it
        reason: String,
    },
    /// Key absent from the resolved config
    #[error("missing configuration key {0}")]
    Missing(String),
    /// Key read with the wrong typed getter
    #[error("configuration key {key} is not {expected}")]
    WrongType {
        /// Option name
        key: String,
        /// Type the getter expected
        expected: &'static str,
    },
}

/// A decoded configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// String
    Str(String),
}

/// Decoding applied to raw text from the file, environment and CLI layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caster {
    /// Truthy vocabulary, see [`booly`]
    Bool,
    /// Decimal integer, surrounding whitespace allowed
    Int,
    /// Text kept as is
    Str,
}

impl Caster {
    /// Decode `raw` for `key`
    ///
    /// Booleans never fail: anything outside the truthy vocabulary is false.
    pub fn cast(self, key: &str, raw: &str) -> Result<ConfigValue, ConfigError> {
        match self {
            Caster::Bool => Ok(ConfigValue::Bool(booly(raw))),
            Caster::Int => raw
                .trim()
                .parse::<i64>()
                .map(ConfigValue::Int)
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                }),
            Caster::Str => Ok(ConfigValue::Str(raw.to_string())),
        }
    }
}

/// Return a boolean from values like "yes", "off", "Enabled"...
pub fn booly(value: &str) -> bool {
    let value = value.to_lowercase();
    TRUTHY_VALUES.contains(&value.as_str())
}

/// One recognized option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKey {
    /// Option name as written in the file, hyphens included
    pub name: &'static str,
    /// Decoding of raw text
    pub caster: Caster,
    /// Value when no layer sets the option
    pub default: ConfigValue,
}

impl ConfigKey {
    /// Boolean option decoded with [`booly`]
    pub fn bool(name: &'static str, default: bool) -> Self {
        Self {
            name,
            caster: Caster::Bool,
            default: ConfigValue::Bool(default),
        }
    }

    /// Integer option
    pub fn int(name: &'static str, default: i64) -> Self {
        Self {
            name,
            caster: Caster::Int,
            default: ConfigValue::Int(default),
        }
    }

    /// Free-form string option
    pub fn string(name: &'static str, default: &str) -> Self {
        Self {
            name,
            caster: Caster::Str,
            default: ConfigValue::Str(default.to_string()),
        }
    }
}

/// Ordered set of recognized options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSpec {
    keys: Vec<ConfigKey>,
}

impl ConfigSpec {
    /// Spec made of `keys`, in resolution order
    pub fn new(keys: Vec<ConfigKey>) -> Self {
        Self { keys }
    }

    /// Options understood by the wirelogd daemon
    pub fn wirelogd() -> Self {
        Self::new(vec![
            ConfigKey::bool("debug", false),
            ConfigKey::int("refresh", 5),
            ConfigKey::bool("sudo", false),
            ConfigKey::int("timeout", 300),
            ConfigKey::bool("wg-gen-web", false),
            ConfigKey::string("wg-gen-web-path", DEFAULT_WG_GEN_WEB_PATH),
            ConfigKey::bool("netlink", false),
            ConfigKey::string("log-format", "text"),
            ConfigKey::string("log-destination", "stderr"),
        ])
    }

    /// Iterate over the recognized options
    pub fn keys(&self) -> impl Iterator<Item = &ConfigKey> {
        self.keys.iter()
    }
}

/// Partial mapping produced by a single layer
pub type Layer = BTreeMap<&'static str, ConfigValue>;

/// Raw command-line values keyed by option name (hyphens preserved)
pub type CliValues = HashMap<String, String>;

/// Fully resolved configuration: exactly one value per spec key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResolvedConfig {
    values: BTreeMap<&'static str, ConfigValue>,
}

impl ResolvedConfig {
    /// Raw value of `key`, if it is a spec key
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Value of a boolean option
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        match self.lookup(key)? {
            ConfigValue::Bool(value) => Ok(*value),
            _ => Err(wrong_type(key, "a boolean")),
        }
    }

    /// Value of an integer option
    pub fn get_int(&self, key: &str) -> Result<i64, ConfigError> {
        match self.lookup(key)? {
            ConfigValue::Int(value) => Ok(*value),
            _ => Err(wrong_type(key, "an integer")),
        }
    }

    /// Value of a string option
    pub fn get_str(&self, key: &str) -> Result<&str, ConfigError> {
        match self.lookup(key)? {
            ConfigValue::Str(value) => Ok(value),
            _ => Err(wrong_type(key, "a string")),
        }
    }

    /// Number of resolved options
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the spec had no options
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn lookup(&self, key: &str) -> Result<&ConfigValue, ConfigError> {
        self.values
            .get(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }
}

fn wrong_type(key: &str, expected: &'static str) -> ConfigError {
    ConfigError::WrongType {
        key: key.to_string(),
        expected,
    }
}

/// Layer 1: every key set to its default
pub fn from_defaults(spec: &ConfigSpec) -> Layer {
    spec.keys()
        .map(|key| (key.name, key.default.clone()))
        .collect()
}

/// Layer 2: keys present in the `[wirelogd]` section of `path`
///
/// An absent file or section yields an empty layer. Option names are
/// matched case-insensitively.
pub fn from_file(spec: &ConfigSpec, path: &Path) -> Result<Layer, ConfigError> {
    if !path.exists() {
        return Ok(Layer::new());
    }

    let option = ParseOption {
        enabled_escape: false,
        ..ParseOption::default()
    };
    let ini = Ini::load_from_file_opt(path, option).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let entries = section_entries(&ini, path)?;
    decode_present(spec, |key| entries.get(key).cloned())
}

/// Options of the `[wirelogd]` section, names lowercased
///
/// Options outside any section and options given twice are errors.
fn section_entries(ini: &Ini, path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let mut entries = HashMap::new();

    for (name, properties) in ini.iter() {
        match name {
            None => {
                if let Some((key, _)) = properties.iter().next() {
                    return Err(ConfigError::MissingSectionHeader {
                        path: path.to_path_buf(),
                        key: key.to_string(),
                    });
                }
            }
            Some(SECTION) => {
                for (key, value) in properties.iter() {
                    let key = key.to_lowercase();
                    if entries.insert(key.clone(), value.to_string()).is_some() {
                        return Err(ConfigError::DuplicateKey {
                            path: path.to_path_buf(),
                            key,
                        });
                    }
                }
            }
            Some(_) => {}
        }
    }

    Ok(entries)
}

/// Name of the environment variable for `key`, e.g. `WIRELOGD_WG_GEN_WEB`
pub fn env_var_name(prefix: &str, key: &str) -> String {
    format!("{}_{}", prefix, key.to_uppercase().replace('-', "_"))
}

/// Layer 3: keys set in the process environment
pub fn from_env(spec: &ConfigSpec, prefix: &str) -> Result<Layer, ConfigError> {
    from_env_with(spec, prefix, |name| std::env::var(name).ok())
}

/// Layer 3 with an explicit variable lookup
pub fn from_env_with<F>(spec: &ConfigSpec, prefix: &str, lookup: F) -> Result<Layer, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    decode_present(spec, |key| lookup(&env_var_name(prefix, key)))
}

/// Layer 4: values supplied on the command line
pub fn from_cli(spec: &ConfigSpec, cli: &CliValues) -> Result<Layer, ConfigError> {
    decode_present(spec, |key| cli.get(key).cloned())
}

/// Decode every spec key whose raw value is present and non-empty
fn decode_present<F>(spec: &ConfigSpec, raw: F) -> Result<Layer, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut layer = Layer::new();
    for key in spec.keys() {
        if let Some(value) = raw(key.name).filter(|v| !v.is_empty()) {
            layer.insert(key.name, key.caster.cast(key.name, &value)?);
        }
    }
    Ok(layer)
}

/// Resolve configuration from defaults, file, environment and CLI
pub fn resolve(
    spec: &ConfigSpec,
    file_path: &Path,
    env_prefix: &str,
    cli: &CliValues,
) -> Result<ResolvedConfig, ConfigError> {
    resolve_with(spec, file_path, env_prefix, |name| std::env::var(name).ok(), cli)
}

/// [`resolve`] with an explicit environment lookup
pub fn resolve_with<F>(
    spec: &ConfigSpec,
    file_path: &Path,
    env_prefix: &str,
    env: F,
    cli: &CliValues,
) -> Result<ResolvedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let layers = [
        from_defaults(spec),
        from_file(spec, file_path)?,
        from_env_with(spec, env_prefix, env)?,
        from_cli(spec, cli)?,
    ];

    let values = layers.into_iter().fold(Layer::new(), |mut merged, layer| {
        merged.extend(layer);
        merged
    });

    Ok(ResolvedConfig { values })
}

/// Pick the config file: CLI path, then `WIRELOGD_CONFIG`, then the default
///
/// An explicitly given path must exist; the default one may be absent.
pub fn select_config_path(
    cli: Option<PathBuf>,
    env: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    let explicit = cli
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| env.filter(|p| !p.as_os_str().is_empty()));

    match explicit {
        Some(path) if !path.exists() => Err(ConfigError::NotFound(path)),
        Some(path) => Ok(path),
        None => Ok(PathBuf::from(DEFAULT_CONFIG_PATH)),
    }
}

/// Typed view of the wirelogd options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Log at debug level
    pub debug: bool,
    /// Pause between two polling cycles
    pub refresh: Duration,
    /// Run `wg` through sudo
    pub sudo: bool,
    /// Handshake age in seconds after which a peer is inactive
    pub timeout: u64,
    /// Look up peer names in wg-gen-web client files
    pub wg_gen_web: bool,
    /// Directory of the wg-gen-web client files
    pub wg_gen_web_path: PathBuf,
    /// Read peers over netlink instead of running `wg`
    pub netlink: bool,
    /// Rendering of log lines
    pub log_format: LogFormat,
    /// Where log lines go
    pub log_destination: LogDestination,
}

impl TryFrom<&ResolvedConfig> for Settings {
    type Error = ConfigError;

    fn try_from(config: &ResolvedConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            debug: config.get_bool("debug")?,
            refresh: Duration::from_secs(non_negative(config, "refresh")?),
            sudo: config.get_bool("sudo")?,
            timeout: non_negative(config, "timeout")?,
            wg_gen_web: config.get_bool("wg-gen-web")?,
            wg_gen_web_path: PathBuf::from(config.get_str("wg-gen-web-path")?),
            netlink: config.get_bool("netlink")?,
            log_format: config.get_str("log-format")?.parse()?,
            log_destination: config.get_str("log-destination")?.parse()?,
        })
    }
}

fn non_negative(config: &ResolvedConfig, key: &str) -> Result<u64, ConfigError> {
    let value = config.get_int(key)?;
    u64::try_from(value).map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("must be >= 0, got {}", value),
    })
}
