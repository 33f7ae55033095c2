//! Configuration types.
//!
//! Everything is read from environment variables (optionally seeded from a
//! `.env` file by `main`). `ServerConfig::from_lookup` takes the variable
//! source as a closure so tests never touch the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, LlmBackend, LlmConfig};
use crate::topic::KeywordSet;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Generation backend settings.
    pub llm: LlmConfig,
    /// Firebase project whose ID tokens are accepted.
    pub firebase_project_id: Option<String>,
    /// Override for Google's signing-key endpoint (Auth emulator).
    pub firebase_jwks_url: Option<String>,
    /// Timeout for one signing-key fetch.
    pub firebase_jwks_timeout: Duration,
    /// Static `token → uid` pairs for local development.
    pub dev_tokens: Vec<(String, String)>,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Topic gate keywords.
    pub keywords: KeywordSet,
    /// Directory for the daily rolling log file.
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = var("API_KEY").ok_or_else(|| ConfigError::MissingEnvVar("API_KEY".into()))?;

        let llm = LlmConfig {
            backend: LlmBackend::Gemini,
            api_key: secrecy::SecretString::from(api_key),
            model: var("FIT_ASSIST_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: var("FIT_ASSIST_LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            timeout: Duration::from_secs(parse_or(&var, "FIT_ASSIST_LLM_TIMEOUT_SECS", 60)?),
        };

        let keywords = match (var("FIT_ASSIST_KEYWORDS"), var("FIT_ASSIST_KEYWORDS_FILE")) {
            (Some(list), _) => KeywordSet::from_csv(&list),
            (None, Some(path)) => KeywordSet::from_lines(&std::fs::read_to_string(path)?),
            (None, None) => KeywordSet::gym_defaults(),
        };

        Ok(Self {
            host: var("FIT_ASSIST_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&var, "FIT_ASSIST_PORT", 5000)?,
            db_path: var("FIT_ASSIST_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/fit-assist.db")),
            llm,
            firebase_project_id: var("FIREBASE_PROJECT_ID"),
            firebase_jwks_url: var("FIREBASE_JWKS_URL"),
            firebase_jwks_timeout: Duration::from_secs(parse_or(
                &var,
                "FIREBASE_JWKS_TIMEOUT_SECS",
                10,
            )?),
            dev_tokens: var("FIT_ASSIST_DEV_TOKENS")
                .map(|s| parse_dev_tokens(&s))
                .transpose()?
                .unwrap_or_default(),
            cors_origins: var("FIT_ASSIST_CORS_ORIGINS")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            keywords,
            log_dir: var("FIT_ASSIST_LOG_DIR").map(PathBuf::from),
        })
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `token=uid,token2=uid2`.
fn parse_dev_tokens(s: &str) -> Result<Vec<(String, String)>, ConfigError> {
    split_list(s)
        .into_iter()
        .map(|pair| match pair.split_once('=') {
            Some((token, uid)) if !token.trim().is_empty() && !uid.trim().is_empty() => {
                Ok((token.trim().to_string(), uid.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidValue {
                key: "FIT_ASSIST_DEV_TOKENS".to_string(),
                message: format!("expected token=uid, got {pair:?}"),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    use secrecy::ExposeSecret;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_with_only_api_key() {
        let config = load(&[("API_KEY", "secret")]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.db_path, PathBuf::from("./data/fit-assist.db"));
        assert_eq!(config.llm.model, "gemini-1.5-flash");
        assert_eq!(config.llm.api_key.expose_secret(), "secret");
        assert_eq!(config.llm.timeout, Duration::from_secs(60));
        assert_eq!(config.keywords, KeywordSet::gym_defaults());
        assert!(config.firebase_project_id.is_none());
        assert!(config.firebase_jwks_url.is_none());
        assert_eq!(config.firebase_jwks_timeout, Duration::from_secs(10));
        assert!(config.dev_tokens.is_empty());
        assert!(config.cors_origins.is_empty());
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "API_KEY"));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        assert!(matches!(
            load(&[("API_KEY", "  ")]),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn invalid_port_is_reported() {
        let err = load(&[("API_KEY", "k"), ("FIT_ASSIST_PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FIT_ASSIST_PORT"));
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("API_KEY", "k"),
            ("FIT_ASSIST_HOST", "127.0.0.1"),
            ("FIT_ASSIST_PORT", "8081"),
            ("FIT_ASSIST_MODEL", "gemini-2.0-flash"),
            ("FIT_ASSIST_LLM_TIMEOUT_SECS", "5"),
            ("FIREBASE_PROJECT_ID", "fit-prod"),
            ("FIREBASE_JWKS_URL", "http://localhost:9099/jwks"),
            ("FIREBASE_JWKS_TIMEOUT_SECS", "3"),
            ("FIT_ASSIST_CORS_ORIGINS", "http://localhost:3000, https://fit.example.com"),
            ("FIT_ASSIST_KEYWORDS", "swim,Bike"),
        ])
        .unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8081");
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.llm.timeout, Duration::from_secs(5));
        assert_eq!(config.firebase_project_id.as_deref(), Some("fit-prod"));
        assert_eq!(
            config.firebase_jwks_url.as_deref(),
            Some("http://localhost:9099/jwks")
        );
        assert_eq!(config.firebase_jwks_timeout, Duration::from_secs(3));
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:3000", "https://fit.example.com"]
        );
        assert_eq!(config.keywords, KeywordSet::new(["swim", "bike"]));
    }

    #[test]
    fn keywords_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# custom\nkettlebell\nrowing").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = load(&[("API_KEY", "k"), ("FIT_ASSIST_KEYWORDS_FILE", path.as_str())]).unwrap();
        assert_eq!(config.keywords, KeywordSet::new(["kettlebell", "rowing"]));
    }

    #[test]
    fn missing_keywords_file_is_io_error() {
        let err = load(&[
            ("API_KEY", "k"),
            ("FIT_ASSIST_KEYWORDS_FILE", "/nonexistent/fit-assist/keywords.txt"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn parses_dev_tokens() {
        let config = load(&[("API_KEY", "k"), ("FIT_ASSIST_DEV_TOKENS", "t1=alice, t2=bob")]).unwrap();
        assert_eq!(
            config.dev_tokens,
            vec![
                ("t1".to_string(), "alice".to_string()),
                ("t2".to_string(), "bob".to_string())
            ]
        );
    }

    #[test]
    fn malformed_dev_tokens_are_rejected() {
        let err = load(&[("API_KEY", "k"), ("FIT_ASSIST_DEV_TOKENS", "t1")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
