use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const DEFAULT_ADDR: &str = "0.0.0.0:2052";
pub const DEFAULT_STATIC_DIR: &str = "public";
pub const DEFAULT_CODE_LENGTH: usize = 6;
pub const DEFAULT_NAME: &str = "Anonymous";
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

const CODE_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 4..=32;

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsConfig {
    /// Checks that the certificate chain and private key parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut cert_reader = open(&self.cert_path)?;
        let certs = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ConfigError::TlsIo {
                path: self.cert_path.clone(),
                source,
            })?;
        if certs.is_empty() {
            return Err(ConfigError::NoCertificates(self.cert_path.clone()));
        }

        let mut key_reader = open(&self.key_path)?;
        rustls_pemfile::private_key(&mut key_reader)
            .map_err(|source| ConfigError::TlsIo {
                path: self.key_path.clone(),
                source,
            })?
            .ok_or_else(|| ConfigError::NoPrivateKey(self.key_path.clone()))?;

        Ok(())
    }
}

fn open(path: &Path) -> Result<BufReader<File>, ConfigError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ConfigError::TlsIo {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
    pub tls: Option<TlsConfig>,
    pub code_length: usize,
    pub default_name: String,
    pub history_limit: usize,
}

impl Config {
    /// Reads `ROOM_MATCH_*` variables, loading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let addr_raw = get("ROOM_MATCH_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr: SocketAddr = addr_raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "ROOM_MATCH_ADDR",
                value: addr_raw.clone(),
            })?;

        let code_length = parse_usize(&get, "ROOM_MATCH_CODE_LENGTH", DEFAULT_CODE_LENGTH)?;
        if !CODE_LENGTH_RANGE.contains(&code_length) {
            return Err(ConfigError::InvalidValue {
                key: "ROOM_MATCH_CODE_LENGTH",
                value: code_length.to_string(),
            });
        }

        let tls = match (get("ROOM_MATCH_TLS_CERT"), get("ROOM_MATCH_TLS_KEY")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::IncompleteTls("ROOM_MATCH_TLS_KEY")),
            (None, Some(_)) => return Err(ConfigError::IncompleteTls("ROOM_MATCH_TLS_CERT")),
        };

        Ok(Config {
            addr,
            static_dir: get("ROOM_MATCH_STATIC_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR), PathBuf::from),
            tls,
            code_length,
            default_name: get("ROOM_MATCH_DEFAULT_NAME")
                .map_or_else(|| DEFAULT_NAME.to_string(), |name| name.trim().to_string()),
            history_limit: parse_usize(&get, "ROOM_MATCH_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: ([0, 0, 0, 0], 2052).into(),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            tls: None,
            code_length: DEFAULT_CODE_LENGTH,
            default_name: DEFAULT_NAME.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

fn parse_usize<G>(get: &G, key: &'static str, default: usize) -> Result<usize, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.addr, DEFAULT_ADDR.parse::<SocketAddr>().unwrap());
        assert_eq!(config.code_length, 6);
        assert_eq!(config.default_name, "Anonymous");
        assert_eq!(config.history_limit, 100);
        assert!(config.tls.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ROOM_MATCH_ADDR", "127.0.0.1:9000"),
            ("ROOM_MATCH_CODE_LENGTH", "8"),
            ("ROOM_MATCH_DEFAULT_NAME", " Stranger "),
            ("ROOM_MATCH_HISTORY_LIMIT", "0"),
            ("ROOM_MATCH_STATIC_DIR", "web"),
        ]))
        .unwrap();
        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.code_length, 8);
        assert_eq!(config.default_name, "Stranger");
        assert_eq!(config.history_limit, 0);
        assert_eq!(config.static_dir, PathBuf::from("web"));
    }

    #[test]
    fn rejects_bad_numbers_and_addresses() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("ROOM_MATCH_CODE_LENGTH", "two")])),
            Err(ConfigError::InvalidValue { key: "ROOM_MATCH_CODE_LENGTH", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("ROOM_MATCH_CODE_LENGTH", "2")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("ROOM_MATCH_ADDR", "nowhere")])),
            Err(ConfigError::InvalidValue { key: "ROOM_MATCH_ADDR", .. })
        ));
    }

    #[test]
    fn tls_needs_both_paths() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("ROOM_MATCH_TLS_CERT", "cert.pem")])),
            Err(ConfigError::IncompleteTls("ROOM_MATCH_TLS_KEY"))
        ));
        let config = Config::from_lookup(lookup(&[
            ("ROOM_MATCH_TLS_CERT", "cert.pem"),
            ("ROOM_MATCH_TLS_KEY", "key.pem"),
        ]))
        .unwrap();
        assert!(config.tls.is_some());
    }

    #[test]
    fn missing_tls_files_fail_validation() {
        let tls = TlsConfig {
            cert_path: PathBuf::from("/nonexistent/cert.pem"),
            key_path: PathBuf::from("/nonexistent/key.pem"),
        };
        assert!(matches!(tls.validate(), Err(ConfigError::TlsIo { .. })));
    }
}
