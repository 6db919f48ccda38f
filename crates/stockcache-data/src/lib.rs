//! 주식/암호화폐 일봉 캐시의 데이터 계층.
//!
//! 이 crate는 다음을 제공합니다:
//! - 캐시 저장소 (Redis, 메모리) 및 심볼 인덱스
//! - 데이터 소스 어댑터 (VNDirect, Yahoo Finance)와 fallback 체인
//! - 원본 행 정규화
//! - 일괄 갱신, 온디맨드 조회, 주기 작업 스케줄러
//! - 위 구성요소를 묶는 `CacheOrchestrator`

pub mod cache;
pub mod error;
pub mod manager;
pub mod normalize;
pub mod provider;
pub mod refresh;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use error::{DataError, Result};
pub use manager::*;

// 저장소 타입 재내보내기
pub use cache::CacheStore;
pub use storage::{CacheBackend, InMemoryCache, RedisCache};

// 데이터 소스 재내보내기
pub use normalize::Normalizer;
pub use provider::{
    FetchedSeries, PriceProvider, RawRow, RawSeries, RawTimestamp, SourceChain, SpotRateProvider,
    VnDirectProvider, YahooProvider, YahooSpotRate,
};

// 갱신 타입 재내보내기
pub use refresh::{
    BatchRefresher, CacheScheduler, OnDemandFetcher, RefreshReport, RefreshStats, RetryPolicy,
};
