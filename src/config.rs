use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;

use crate::sync::DEFAULT_TYPING_LEASE;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Root directory of the file bucket.
    pub storage_dir: PathBuf,
    pub typing_lease: Duration,
    pub session_idle: time::Duration,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        fn parsed<T>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> anyhow::Result<T>
        where
            T: FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match lookup(key) {
                Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}")),
                None => Ok(default),
            }
        }

        let default_lease_ms = DEFAULT_TYPING_LEASE.as_millis() as u64;
        let typing_lease_ms: u64 = parsed(&lookup, "TYPING_LEASE_MS", default_lease_ms)?;
        let session_idle_minutes: i64 = parsed(&lookup, "SESSION_IDLE_MINUTES", 5)?;

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://roomchat.db?mode=rwc".to_owned()),
            bind_addr: parsed(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            storage_dir: lookup("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("storage")),
            typing_lease: Duration::from_millis(typing_lease_ms),
            session_idle: time::Duration::minutes(session_idle_minutes),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite://roomchat.db?mode=rwc");
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.storage_dir, PathBuf::from("storage"));
        assert_eq!(config.typing_lease, Duration::from_millis(3000));
        assert_eq!(config.session_idle, time::Duration::minutes(5));
    }

    #[test]
    fn overrides_and_rejects_garbage() {
        let config =
            config(&[("TYPING_LEASE_MS", "1500"), ("BIND_ADDR", "127.0.0.1:9000")]).unwrap();
        assert_eq!(config.typing_lease, Duration::from_millis(1500));
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));

        let err = Config::from_lookup(|key| (key == "TYPING_LEASE_MS").then(|| "soon".to_owned()))
            .unwrap_err();
        assert!(err.to_string().contains("TYPING_LEASE_MS"));
    }
}
