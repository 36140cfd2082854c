use crate::error::ConfigError;
use crate::federated::FederatedConfig;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_DATA_FILE: &str = "database/store.bin.gz";
const DEFAULT_USERS_FILE: &str = "database/users.json";
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60; // 24 hours

/// Server settings, read from `TRACKER_*` environment variables.
///
/// | variable | default |
/// |---|---|
/// | `TRACKER_BIND` | `127.0.0.1:3000` |
/// | `TRACKER_DATA_FILE` | `database/store.bin.gz` (`none` keeps data in memory) |
/// | `TRACKER_USERS_FILE` | `database/users.json` (`none` keeps accounts in memory) |
/// | `TRACKER_STATIC_DIR` | `static` |
/// | `TRACKER_SESSION_TTL_SECS` | `86400` |
/// | `TRACKER_SEED_LEGACY` | `true` |
/// | `TRACKER_FEDERATED_AUTHORIZE_URL`, `_TOKEN_URL`, `_CLIENT_ID`, `_CLIENT_SECRET`, `_REDIRECT_URL` | unset (federated sign-in disabled) |
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_file: Option<PathBuf>,
    pub users_file: Option<PathBuf>,
    pub static_dir: PathBuf,
    pub session_ttl: Duration,
    pub seed_legacy_project: bool,
    pub federated: Option<FederatedConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_addr: DEFAULT_BIND.to_string(),
            data_file: Some(PathBuf::from(DEFAULT_DATA_FILE)),
            users_file: Some(PathBuf::from(DEFAULT_USERS_FILE)),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            seed_legacy_project: true,
            federated: None,
        }
    }
}

impl AppConfig {
    /// Settings with nothing persisted to disk.
    pub fn in_memory() -> Self {
        AppConfig {
            data_file: None,
            users_file: None,
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let optional_path = |name: &str, default: Option<PathBuf>| match var(name) {
            Some(v) if v.eq_ignore_ascii_case("none") => None,
            Some(v) => Some(PathBuf::from(v)),
            None => default,
        };

        let session_ttl = match var("TRACKER_SESSION_TTL_SECS") {
            Some(v) => Duration::from_secs(v.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                name: "TRACKER_SESSION_TTL_SECS",
                value: v.clone(),
            })?),
            None => defaults.session_ttl,
        };

        let seed_legacy_project = match var("TRACKER_SEED_LEGACY") {
            Some(v) => parse_bool(&v).ok_or(ConfigError::InvalidValue {
                name: "TRACKER_SEED_LEGACY",
                value: v,
            })?,
            None => defaults.seed_legacy_project,
        };

        Ok(AppConfig {
            bind_addr: var("TRACKER_BIND").unwrap_or(defaults.bind_addr),
            data_file: optional_path("TRACKER_DATA_FILE", defaults.data_file),
            users_file: optional_path("TRACKER_USERS_FILE", defaults.users_file),
            static_dir: var("TRACKER_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            session_ttl,
            seed_legacy_project,
            federated: federated_from(&var)?,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

/// All five federated settings or none of them.
fn federated_from<F>(var: &F) -> Result<Option<FederatedConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    const KEYS: [&str; 5] = [
        "TRACKER_FEDERATED_AUTHORIZE_URL",
        "TRACKER_FEDERATED_TOKEN_URL",
        "TRACKER_FEDERATED_CLIENT_ID",
        "TRACKER_FEDERATED_CLIENT_SECRET",
        "TRACKER_FEDERATED_REDIRECT_URL",
    ];

    let values: Vec<Option<String>> = KEYS.iter().map(|&k| var(k)).collect();
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    if let Some(i) = values.iter().position(Option::is_none) {
        return Err(ConfigError::IncompleteFederated(KEYS[i]));
    }

    let mut values = values.into_iter().flatten();
    let mut next = || values.next().unwrap_or_default();
    Ok(Some(FederatedConfig {
        authorize_url: next(),
        token_url: next(),
        client_id: next(),
        client_secret: next(),
        redirect_url: next(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config_from(&[]).unwrap(), AppConfig::default());
    }

    #[test]
    fn overrides_and_none_paths() {
        let config = config_from(&[
            ("TRACKER_BIND", "0.0.0.0:8080"),
            ("TRACKER_DATA_FILE", "none"),
            ("TRACKER_SESSION_TTL_SECS", "60"),
            ("TRACKER_SEED_LEGACY", "no"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.data_file, None);
        assert_eq!(config.users_file, Some(PathBuf::from(DEFAULT_USERS_FILE)));
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert!(!config.seed_legacy_project);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config_from(&[("TRACKER_SESSION_TTL_SECS", "soon")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config_from(&[("TRACKER_FEDERATED_CLIENT_ID", "abc")]),
            Err(ConfigError::IncompleteFederated("TRACKER_FEDERATED_AUTHORIZE_URL"))
        ));
    }

    #[test]
    fn reads_federated_settings() {
        let config = config_from(&[
            ("TRACKER_FEDERATED_AUTHORIZE_URL", "https://id.example/authorize"),
            ("TRACKER_FEDERATED_TOKEN_URL", "https://id.example/token"),
            ("TRACKER_FEDERATED_CLIENT_ID", "tracker"),
            ("TRACKER_FEDERATED_CLIENT_SECRET", "s3cret"),
            ("TRACKER_FEDERATED_REDIRECT_URL", "http://localhost:3000/login/federated/callback"),
        ])
        .unwrap();

        let federated = config.federated.unwrap();
        assert_eq!(federated.token_url, "https://id.example/token");
        assert_eq!(federated.client_secret, "s3cret");
    }
}
