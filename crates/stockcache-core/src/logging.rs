//! tracing 구독자 초기화.
//!
//! 설정 파일의 `[logging]` 섹션과 CLI 인자로 레벨·형식을 정하고,
//! `RUST_LOG`가 있으면 그 필터를 우선합니다.
//!
//! - **pretty**: 개발용 여러 줄 형식
//! - **json**: 로그 수집용, 현재 span 포함
//! - **compact**: 데몬 실행용 한 줄 형식

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{CoreError, CoreResult};

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{}' (pretty, json, compact)", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
            Self::Compact => "compact",
        };
        f.write_str(name)
    }
}

/// 구독자 설정.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// 필터 지시어 (예: "info", "stockcache_data=debug")
    pub level: String,
    pub format: LogFormat,
}

impl LogConfig {
    /// `[logging]` 섹션에서 생성합니다.
    ///
    /// 형식 문자열을 해석할 수 없으면 pretty 형식을 사용합니다.
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            format: settings.format.parse().unwrap_or_default(),
        }
    }

    /// 주어진 값만 덮어씁니다.
    pub fn with_overrides(mut self, level: Option<&str>, format: Option<LogFormat>) -> Self {
        if let Some(level) = level {
            self.level = level.to_string();
        }
        if let Some(format) = format {
            self.format = format;
        }
        self
    }

    /// `level` 지시어로 필터를 만듭니다.
    pub fn env_filter(&self) -> CoreResult<EnvFilter> {
        EnvFilter::try_new(&self.level)
            .map_err(|e| CoreError::Config(format!("invalid log level '{}': {}", self.level, e)))
    }
}

/// 전역 구독자를 설치합니다.
///
/// `RUST_LOG`가 유효하면 `config.level`보다 우선합니다.
pub fn init_logging(config: &LogConfig) -> CoreResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => config.env_filter()?,
    };

    let layer = match config.format {
        LogFormat::Pretty => tracing_fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Json => tracing_fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => tracing_fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| CoreError::Config(format!("logging already initialized: {}", e)))?;

    tracing::debug!(format = %config.format, level = %config.level, "로깅 초기화");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(level: &str, format: &str) -> LoggingSettings {
        LoggingSettings {
            level: level.to_string(),
            format: format.to_string(),
        }
    }

    #[test]
    fn test_log_format_parse_and_display() {
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());

        for format in [LogFormat::Pretty, LogFormat::Json, LogFormat::Compact] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_from_settings_falls_back_to_pretty() {
        let config = LogConfig::from_settings(&settings("stockcache_data=debug", "compact"));
        assert_eq!(config.level, "stockcache_data=debug");
        assert_eq!(config.format, LogFormat::Compact);

        assert_eq!(
            LogConfig::from_settings(&settings("info", "xml")).format,
            LogFormat::Pretty
        );
    }

    #[test]
    fn test_overrides_replace_only_given_values() {
        let base = LogConfig::from_settings(&settings("warn", "json"));

        let unchanged = base.clone().with_overrides(None, None);
        assert_eq!(unchanged, base);

        let level_only = base.clone().with_overrides(Some("debug"), None);
        assert_eq!(level_only.level, "debug");
        assert_eq!(level_only.format, LogFormat::Json);
    }

    #[test]
    fn test_env_filter_rejects_bad_directive() {
        assert!(LogConfig::from_settings(&settings("info,stockcache_data=debug", "pretty"))
            .env_filter()
            .is_ok());
        let err = LogConfig::from_settings(&settings("stockcache_data=loud", "pretty"))
            .env_filter()
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
