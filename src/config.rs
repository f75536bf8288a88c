use log::info;
use rand::RngCore;
use std::{env, fmt::Display, path::PathBuf, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub data_dir: PathBuf,
    pub dataset: Option<PathBuf>,
    pub model: PathBuf,
    pub vectorizer: PathBuf,
    pub templates: String,
    /// Session lifetime in seconds.
    pub session_ttl: i64,
    pub cookie_key: [u8; 32],
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let session_ttl = try_load(&lookup, "CINESENSE_SESSION_TTL", "3600")?;
        if session_ttl <= 0 {
            return Err(ConfigError::Invalid {
                key: "CINESENSE_SESSION_TTL",
                reason: "must be positive".to_owned(),
            });
        }
        let cookie_key = match lookup("CINESENSE_COOKIE_KEY") {
            Some(hex) => parse_key(&hex).map_err(|reason| ConfigError::Invalid {
                key: "CINESENSE_COOKIE_KEY",
                reason,
            })?,
            None => {
                info!("CINESENSE_COOKIE_KEY not set, sessions will not survive a restart");
                let mut key = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                key
            }
        };
        Ok(Config {
            bind: try_load(&lookup, "CINESENSE_BIND", "127.0.0.1:8080")?,
            data_dir: try_load(&lookup, "CINESENSE_DATA_DIR", "cinesense.db")?,
            dataset: lookup("CINESENSE_DATASET").map(PathBuf::from),
            model: try_load(&lookup, "CINESENSE_MODEL", "sentiment_model.json")?,
            vectorizer: try_load(&lookup, "CINESENSE_VECTORIZER", "vectorizer.json")?,
            templates: try_load(
                &lookup,
                "CINESENSE_TEMPLATES",
                concat!(env!("CARGO_MANIFEST_DIR"), "/templates/**/*"),
            )?,
            session_ttl,
            cookie_key,
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{} not set, using default: {}", key, default);
            default.to_owned()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })
}

fn parse_key(hex: &str) -> Result<[u8; 32], String> {
    let hex = hex.trim();
    if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("expected 64 hex characters".to_owned());
    }
    let mut key = [0u8; 32];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).map_err(|e| e.to_string())?;
    }
    Ok(key)
}
