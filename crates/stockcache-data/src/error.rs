//! 데이터 모듈 오류 타입.

use thiserror::Error;

/// 캐시/데이터 소스 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 캐시 저장소에 연결할 수 없음
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// 캐시 명령 실행 오류
    #[error("Cache error: {0}")]
    Cache(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 데이터 가져오기 오류 (외부 소스)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// 응답 파싱 오류
    #[error("Parse error: {0}")]
    Parse(String),

    /// 타임아웃 오류
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// 모든 소스에서 데이터를 얻지 못함
    #[error("No data for {0}")]
    NoData(String),

    /// 소스가 지원하지 않는 요청
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// 다른 일괄 갱신이 진행 중
    #[error("Refresh already in progress")]
    RefreshInProgress,

    /// 설정 오류
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DataError {
    /// 재시도하면 성공할 수 있는 일시적 오류인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DataError::CacheUnavailable(_)
                | DataError::Fetch(_)
                | DataError::Timeout(_)
                | DataError::NoData(_)
        )
    }
}

impl From<redis::RedisError> for DataError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            DataError::CacheUnavailable(err.to_string())
        } else if err.is_timeout() {
            DataError::Timeout(err.to_string())
        } else {
            DataError::Cache(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DataError::Timeout(err.to_string())
        } else if err.is_decode() {
            DataError::Parse(err.to_string())
        } else {
            DataError::Fetch(err.to_string())
        }
    }
}

impl From<stockcache_core::CoreError> for DataError {
    fn from(err: stockcache_core::CoreError) -> Self {
        DataError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
