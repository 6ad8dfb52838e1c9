use crate::debounce::DEFAULT_IDLE_INTERVAL;
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::time::Duration;

pub const BACKEND_ENV: &str = "STICKIES_BACKEND";
pub const DEBOUNCE_MS_ENV: &str = "STICKIES_DEBOUNCE_MS";
pub const DATA_DIR_ENV: &str = "STICKIES_DATA_DIR";
pub const CLOUDKIT_CONTAINER_ENV: &str = "STICKIES_CLOUDKIT_CONTAINER";
pub const CLOUDKIT_ENVIRONMENT_ENV: &str = "STICKIES_CLOUDKIT_ENVIRONMENT";
pub const CLOUDKIT_API_TOKEN_ENV: &str = "STICKIES_CLOUDKIT_API_TOKEN";
pub const CLOUDKIT_WEB_AUTH_TOKEN_ENV: &str = "STICKIES_CLOUDKIT_WEB_AUTH_TOKEN";

const LOCAL_STATE_DB_DIR_NAME: &str = "stickies_db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudKitEnvironment {
    Development,
    Production,
}

impl CloudKitEnvironment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudKitConfig {
    pub container: String,
    pub environment: CloudKitEnvironment,
    pub api_token: String,
    pub web_auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Local,
    CloudKit(CloudKitConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub backend: Backend,
    pub debounce_interval: Duration,
    pub data_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let debounce_interval = match var(DEBOUNCE_MS_ENV) {
            Some(raw) => {
                let millis = raw
                    .parse::<u64>()
                    .with_context(|| format!("{DEBOUNCE_MS_ENV} must be a number, got '{raw}'"))?;
                if millis == 0 {
                    bail!("{DEBOUNCE_MS_ENV} must be greater than zero");
                }
                Duration::from_millis(millis)
            }
            None => DEFAULT_IDLE_INTERVAL,
        };

        let data_dir = var(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir(var("HOME")));

        let requested = var(BACKEND_ENV).map(|value| value.to_ascii_lowercase());
        let wants_cloudkit = match requested.as_deref() {
            Some("cloudkit") => true,
            Some("local") => false,
            Some(other) => bail!("{BACKEND_ENV} must be 'local' or 'cloudkit', got '{other}'"),
            None => var(CLOUDKIT_API_TOKEN_ENV).is_some(),
        };

        let backend = if wants_cloudkit {
            let container = var(CLOUDKIT_CONTAINER_ENV)
                .with_context(|| format!("{CLOUDKIT_CONTAINER_ENV} is required for cloudkit"))?;
            let api_token = var(CLOUDKIT_API_TOKEN_ENV)
                .with_context(|| format!("{CLOUDKIT_API_TOKEN_ENV} is required for cloudkit"))?;
            let environment = match var(CLOUDKIT_ENVIRONMENT_ENV)
                .map(|value| value.to_ascii_lowercase())
                .as_deref()
            {
                None | Some("development") => CloudKitEnvironment::Development,
                Some("production") => CloudKitEnvironment::Production,
                Some(other) => bail!(
                    "{CLOUDKIT_ENVIRONMENT_ENV} must be 'development' or 'production', got '{other}'"
                ),
            };
            Backend::CloudKit(CloudKitConfig {
                container,
                environment,
                api_token,
                web_auth_token: var(CLOUDKIT_WEB_AUTH_TOKEN_ENV),
            })
        } else {
            Backend::Local
        };

        Ok(Self {
            backend,
            debounce_interval,
            data_dir,
        })
    }

    /// Defaults with the local backend, used when the environment is invalid.
    pub fn fallback() -> Self {
        Self {
            backend: Backend::Local,
            debounce_interval: DEFAULT_IDLE_INTERVAL,
            data_dir: default_data_dir(std::env::var("HOME").ok()),
        }
    }

    pub fn local_state_db_path(&self) -> PathBuf {
        self.data_dir.join(LOCAL_STATE_DB_DIR_NAME)
    }
}

fn default_data_dir(home: Option<String>) -> PathBuf {
    match home {
        Some(home) => PathBuf::from(home).join(".stickies"),
        None => std::env::temp_dir().join("stickies"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_local_backend() {
        let config = config_from(&[("HOME", "/Users/ada")]).unwrap();
        assert_eq!(config.backend, Backend::Local);
        assert_eq!(config.debounce_interval, Duration::from_millis(500));
        assert_eq!(config.data_dir, PathBuf::from("/Users/ada/.stickies"));
        assert_eq!(
            config.local_state_db_path(),
            PathBuf::from("/Users/ada/.stickies/stickies_db")
        );
    }

    #[test]
    fn api_token_selects_cloudkit() {
        let config = config_from(&[
            (CLOUDKIT_API_TOKEN_ENV, "abc"),
            (CLOUDKIT_CONTAINER_ENV, "iCloud.com.example.stickies"),
            (CLOUDKIT_ENVIRONMENT_ENV, "Production"),
            (DEBOUNCE_MS_ENV, " 750 "),
        ])
        .unwrap();
        assert_eq!(
            config.backend,
            Backend::CloudKit(CloudKitConfig {
                container: "iCloud.com.example.stickies".into(),
                environment: CloudKitEnvironment::Production,
                api_token: "abc".into(),
                web_auth_token: None,
            })
        );
        assert_eq!(config.debounce_interval, Duration::from_millis(750));
    }

    #[test]
    fn explicit_local_wins_over_token() {
        let config = config_from(&[(BACKEND_ENV, "local"), (CLOUDKIT_API_TOKEN_ENV, "abc")]).unwrap();
        assert_eq!(config.backend, Backend::Local);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(config_from(&[(DEBOUNCE_MS_ENV, "soon")]).is_err());
        assert!(config_from(&[(DEBOUNCE_MS_ENV, "0")]).is_err());
        assert!(config_from(&[(BACKEND_ENV, "dropbox")]).is_err());
        assert!(config_from(&[(BACKEND_ENV, "cloudkit"), (CLOUDKIT_API_TOKEN_ENV, "abc")]).is_err());
        assert!(
            config_from(&[
                (CLOUDKIT_API_TOKEN_ENV, "abc"),
                (CLOUDKIT_CONTAINER_ENV, "c"),
                (CLOUDKIT_ENVIRONMENT_ENV, "staging"),
            ])
            .is_err()
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[(BACKEND_ENV, "  "), (DATA_DIR_ENV, "/tmp/notes")]).unwrap();
        assert_eq!(config.backend, Backend::Local);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/notes"));
    }
}
