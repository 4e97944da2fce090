use crate::core::cache::CacheConfig;
use crate::core::circuit_breaker::CircuitBreakerConfig;
use crate::core::rate_limiter::RateLimiterConfig;
use crate::utils::error::{ResilienceError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_one_of, validate_positive_number, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var regex"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricsGuardConfig {
    pub source: SourceConfig,
    pub circuit_breaker: BreakerSection,
    pub rate_limit: RateLimitSection,
    pub cache: CacheSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.lyrics.ovh/v1".to_string(),
            timeout_seconds: 10,
            user_agent: format!("lyrics-guard/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub enabled: bool,
    pub name: String,
    pub failure_threshold: u32,
    pub recovery_timeout_seconds: u64,
    pub success_threshold: u32,
    pub call_timeout_seconds: Option<u64>,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "lyrics".to_string(),
            failure_threshold: 5,
            recovery_timeout_seconds: 60,
            success_threshold: 2,
            call_timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub max_calls: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_calls: 30,
            window_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LyricsGuardConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ResilienceError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| ResilienceError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${LYRICS_ENDPOINT})，未設定的保留原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_seconds)
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            recovery_timeout: Duration::from_secs(self.circuit_breaker.recovery_timeout_seconds),
            success_threshold: self.circuit_breaker.success_threshold,
            call_timeout: self.circuit_breaker.call_timeout_seconds.map(Duration::from_secs),
        }
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_calls: self.rate_limit.max_calls,
            window: Duration::from_secs(self.rate_limit.window_seconds),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.cache.max_entries,
        }
    }
}

impl Validate for LyricsGuardConfig {
    fn validate(&self) -> Result<()> {
        validate_url("source.endpoint", &self.source.endpoint)?;
        validate_positive_number("source.timeout_seconds", self.source.timeout_seconds, 1)?;

        if self.circuit_breaker.enabled {
            validate_non_empty_string("circuit_breaker.name", &self.circuit_breaker.name)?;
            validate_positive_number(
                "circuit_breaker.recovery_timeout_seconds",
                self.circuit_breaker.recovery_timeout_seconds,
                1,
            )?;
            self.breaker_config().validate()?;

            // 上游逾時必須比斷路器恢復時間短
            if self.source.timeout_seconds >= self.circuit_breaker.recovery_timeout_seconds {
                return Err(ResilienceError::InvalidConfigValueError {
                    field: "source.timeout_seconds".to_string(),
                    value: self.source.timeout_seconds.to_string(),
                    reason: format!(
                        "Must be shorter than circuit_breaker.recovery_timeout_seconds ({})",
                        self.circuit_breaker.recovery_timeout_seconds
                    ),
                });
            }
        }

        validate_positive_number("rate_limit.max_calls", self.rate_limit.max_calls, 1)?;
        validate_positive_number("rate_limit.window_seconds", self.rate_limit.window_seconds, 1)?;

        if let Some(max_entries) = self.cache.max_entries {
            validate_positive_number("cache.max_entries", max_entries, 1)?;
        }

        validate_one_of(
            "logging.level",
            &self.logging.level,
            &["trace", "debug", "info", "warn", "error"],
        )?;

        Ok(())
    }
}
