//! 캐시 코어의 에러 타입.

use thiserror::Error;

/// 핵심 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 잘못된 입력 (빈 심볼, 알 수 없는 자산 유형 등)
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),
}

/// 코어 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
