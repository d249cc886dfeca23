use anyhow::{Context as _, anyhow};
use std::str::FromStr;
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;
use crate::relay::{DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, OpenAiSettings};
use crate::validation::UploadPolicy;

/// Origins allowed to call the API from a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(origins)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub allowed_origins: AllowedOrigins,
    pub upload: UploadPolicy,
    pub openai: OpenAiSettings,
    pub rate_limit: RateLimitConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Present but unparsable values
    /// are errors; absent values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("OPENAI_API_KEY environment variable is required"))?;

        let openai = OpenAiSettings {
            api_key,
            base_url: lookup("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: parse_or(&lookup, "OPENAI_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            timeout: parse_opt::<u64>(&lookup, "UPSTREAM_TIMEOUT_SECS")?.map(Duration::from_secs),
        };

        let max_file_size_mb = parse_nonzero(&lookup, "MAX_FILE_SIZE_MB", 100)?;
        let upload = UploadPolicy::from_megabytes(
            max_file_size_mb,
            parse_nonzero(&lookup, "MAX_FILES", 10)?,
        )
        .ok_or_else(|| anyhow!("MAX_FILE_SIZE_MB is too large: {max_file_size_mb}"))?;

        let rate_limit = RateLimitConfig {
            enabled: parse_or(&lookup, "RATE_LIMIT_ENABLED", true)?,
            window: Duration::from_secs(parse_nonzero(&lookup, "RATE_LIMIT_WINDOW_SECS", 15 * 60)?),
            max_requests: parse_nonzero(&lookup, "RATE_LIMIT_MAX_REQUESTS", 100)?,
            trust_proxy: parse_or(&lookup, "TRUST_PROXY", false)?,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 5000)?,
            allowed_origins: AllowedOrigins::parse(&lookup("ALLOWED_ORIGINS").unwrap_or_default()),
            upload,
            openai,
            rate_limit,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_opt<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

/// Like `parse_or`, for limits where zero would reject or admit everything.
fn parse_nonzero<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = parse_or(lookup, key, default)?;
    if value == T::default() {
        return Err(anyhow!("{key} must be greater than zero"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.allowed_origins, AllowedOrigins::Any);
        assert_eq!(config.upload, UploadPolicy::from_megabytes(100, 10).unwrap());
        assert_eq!(config.openai.model, "gpt-4o");
        assert_eq!(config.openai.max_tokens, 2048);
        assert!(config.openai.timeout.is_none());
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.window, Duration::from_secs(900));
        assert_eq!(config.rate_limit.max_requests, 100);
        assert!(!config.rate_limit.trust_proxy);
    }

    #[test]
    fn api_key_is_required() {
        assert!(Config::from_lookup(lookup_from(&[])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "  ")])).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("PORT", "8080"),
            ("MAX_FILE_SIZE_MB", "10"),
            ("MAX_FILES", "1"),
            ("OPENAI_MAX_TOKENS", "1000"),
            ("UPSTREAM_TIMEOUT_SECS", "300"),
            ("RATE_LIMIT_ENABLED", "false"),
            ("ALLOWED_ORIGINS", "https://example.com, https://www.example.com"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.upload.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.upload.max_files, 1);
        assert_eq!(config.openai.max_tokens, 1000);
        assert_eq!(config.openai.timeout, Some(Duration::from_secs(300)));
        assert!(!config.rate_limit.enabled);
        assert_eq!(
            config.allowed_origins,
            AllowedOrigins::List(vec![
                "https://example.com".to_string(),
                "https://www.example.com".to_string()
            ])
        );
    }

    #[test]
    fn unparsable_values_are_errors() {
        let err = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn zero_limits_are_errors() {
        for key in [
            "MAX_FILE_SIZE_MB",
            "MAX_FILES",
            "RATE_LIMIT_WINDOW_SECS",
            "RATE_LIMIT_MAX_REQUESTS",
        ] {
            let err = Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test"), (key, "0")]))
                .unwrap_err();
            assert!(err.to_string().contains(key), "{key}: {err}");
        }
    }

    #[test]
    fn oversized_file_ceiling_is_an_error() {
        let huge = usize::MAX.to_string();
        let err = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("MAX_FILE_SIZE_MB", huge.as_str()),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("MAX_FILE_SIZE_MB"));
    }

    #[test]
    fn wildcard_origin_means_any() {
        assert_eq!(AllowedOrigins::parse("https://a.com,*"), AllowedOrigins::Any);
    }
}
