use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use samh_api::nim::{DEFAULT_BASE_URL, DEFAULT_MODEL, NimConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub db_path: PathBuf,
    /// `None` when no API key is set; suggestions then use the fixed set.
    pub nim: Option<NimConfig>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host: IpAddr = var("SAMH_HOST")
            .unwrap_or_else(|| "0.0.0.0".into())
            .parse()
            .context("SAMH_HOST must be an IP address")?;
        let port: u16 = var("SAMH_PORT")
            .unwrap_or_else(|| "3001".into())
            .parse()
            .context("SAMH_PORT must be a port number")?;
        let db_path: PathBuf = var("SAMH_DB_PATH")
            .unwrap_or_else(|| "samh_chat.db".into())
            .into();

        let timeout_secs: u64 = var("SAMH_SUGGESTION_TIMEOUT_SECS")
            .map(|v| v.parse())
            .transpose()
            .context("SAMH_SUGGESTION_TIMEOUT_SECS must be a whole number of seconds")?
            .unwrap_or(10);

        let nim = var("SAMH_NIM_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| NimConfig {
                base_url: var("SAMH_NIM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
                api_key,
                model: var("SAMH_NIM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
                timeout: Duration::from_secs(timeout_secs),
            });

        Ok(Self {
            host,
            port,
            db_path,
            nim,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.addr(), "0.0.0.0:3001".parse::<SocketAddr>().unwrap());
        assert_eq!(config.port, 3001);
        assert_eq!(config.db_path, PathBuf::from("samh_chat.db"));
        assert!(config.nim.is_none());
    }

    #[test]
    fn api_key_enables_the_model() {
        let config = Config::from_lookup(lookup(&[
            ("SAMH_NIM_API_KEY", "nvapi-test"),
            ("SAMH_SUGGESTION_TIMEOUT_SECS", "4"),
        ]))
        .unwrap();
        let nim = config.nim.unwrap();
        assert_eq!(nim.base_url, DEFAULT_BASE_URL);
        assert_eq!(nim.model, DEFAULT_MODEL);
        assert_eq!(nim.timeout, Duration::from_secs(4));
    }

    #[test]
    fn ipv6_host_binds() {
        let config = Config::from_lookup(lookup(&[("SAMH_HOST", "::"), ("SAMH_PORT", "8080")])).unwrap();
        assert_eq!(config.addr(), "[::]:8080".parse::<SocketAddr>().unwrap());
        assert!(Config::from_lookup(lookup(&[("SAMH_HOST", "localhost")])).is_err());
    }

    #[test]
    fn rejects_bad_port() {
        assert!(Config::from_lookup(lookup(&[("SAMH_PORT", "http")])).is_err());
    }
}
