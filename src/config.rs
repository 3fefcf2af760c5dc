use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::Path,
    time::Duration,
};

use crate::error::{Error, Result};

/// Server configuration loaded from TOML.
///
/// `delay` set at the top level is the main scope; every `[[location]]` inherits
/// it unless it sets its own, and nested locations inherit from their parent.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    pub log_level: String,
    #[serde(with = "time_value")]
    pub client_header_timeout: Duration,
    #[serde(with = "opt_time_value", skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
    #[serde(rename = "location")]
    pub locations: Vec<LocationConfig>,
}

/// One `[[location]]` block as written in the file, before inheritance.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LocationConfig {
    pub path: String,
    #[serde(with = "opt_time_value", skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(rename = "location", skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<LocationConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".into(),
            log_level: "info".into(),
            client_header_timeout: Duration::from_secs(60),
            delay: None,
            locations: Vec::new(),
        }
    }
}

impl Config {
    /// Reads the config at `path`, writing a default one first if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let config = match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents).map_err(|reason| Error::Config {
                path: path.to_path_buf(),
                reason,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                let config = Config::default();
                let contents = toml::to_string_pretty(&config).map_err(|err| Error::Config {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })?;
                fs::write(path, contents)?;
                config
            }
            Err(err) => return Err(err.into()),
        };

        config.validate().map_err(|reason| Error::Config {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, String> {
        let config: Config = toml::from_str(contents).map_err(|err| err.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        fn check(parent: &str, list: &[LocationConfig]) -> std::result::Result<(), String> {
            for loc in list {
                if !loc.path.starts_with('/') {
                    return Err(format!("location path {:?} must start with '/'", loc.path));
                }
                if !loc.path.starts_with(parent) {
                    return Err(format!(
                        "location {:?} is outside of location {:?}",
                        loc.path, parent
                    ));
                }
                if let Some(status) = loc.status {
                    if !(100..=599).contains(&status) {
                        return Err(format!("location {:?}: invalid status {status}", loc.path));
                    }
                }
                check(&loc.path, &loc.locations)?;
            }
            Ok(())
        }

        check("", &self.locations)
    }

    /// Flattens the location tree, merging every parent scope into its children.
    pub fn locations(&self) -> Locations {
        let root = LocationConf {
            path: String::new(),
            delay: self.delay,
            status: 200,
            body: None,
        };

        let mut entries = Vec::new();
        flatten(&root, &self.locations, &mut entries);
        // Longest prefix first; stable so the first declared wins on ties.
        entries.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        Locations { root, entries }
    }
}

fn flatten(parent: &LocationConf, list: &[LocationConfig], out: &mut Vec<LocationConf>) {
    for loc in list {
        let merged = LocationConf {
            path: loc.path.clone(),
            delay: loc.delay.or(parent.delay),
            status: loc.status.unwrap_or(parent.status),
            body: loc.body.clone().or_else(|| parent.body.clone()),
        };
        flatten(&merged, &loc.locations, out);
        out.push(merged);
    }
}

/// A location with every inherited setting resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationConf {
    pub path: String,
    pub delay: Option<Duration>,
    pub status: u16,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Locations {
    root: LocationConf,
    entries: Vec<LocationConf>,
}

impl Locations {
    /// Longest-prefix lookup; falls back to the main scope.
    pub fn find(&self, uri: &str) -> &LocationConf {
        let path = uri.split(['?', '#']).next().unwrap_or(uri);
        self.entries
            .iter()
            .find(|loc| path.starts_with(&loc.path))
            .unwrap_or(&self.root)
    }
}

/// Parses an nginx-style time string into a duration.
///
/// Accepts sequences of `<number><unit>` separated by optional spaces, where the
/// unit is one of `ms`, `s`, `m`, `h`, `d`, `w`, `M`, `y`. A bare number is seconds.
pub fn parse_time(value: &str) -> Result<Duration> {
    let invalid = || Error::InvalidTime {
        value: value.to_string(),
    };

    let mut total: u64 = 0;
    let mut rest = value.trim();
    if rest.is_empty() {
        return Err(invalid());
    }

    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let number: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let (scale, unit_len) = if rest.starts_with("ms") {
            (1, 2)
        } else {
            match rest.chars().next() {
                Some('s') => (1_000, 1),
                Some('m') => (60_000, 1),
                Some('h') => (3_600_000, 1),
                Some('d') => (86_400_000, 1),
                Some('w') => (7 * 86_400_000, 1),
                Some('M') => (30 * 86_400_000, 1),
                Some('y') => (365 * 86_400_000, 1),
                None | Some(' ') => (1_000, 0),
                Some(_) => return Err(invalid()),
            }
        };

        let part = number.checked_mul(scale).ok_or_else(invalid)?;
        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = rest[unit_len..].trim_start();
    }

    Ok(Duration::from_millis(total))
}

pub fn format_time(value: Duration) -> String {
    let ms = value.as_millis();
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

mod time_value {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_time(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map_err(de::Error::custom)
    }
}

mod opt_time_value {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_str(&super::format_time(*value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map(Some).map_err(de::Error::custom)
    }
}
