//! 캐시 갱신.
//!
//! - `batch`: 전체 심볼 일괄 갱신
//! - `on_demand`: 캐시 미스 시 단일 심볼 조회 (single-flight)
//! - `retry`: 두 경로가 공유하는 재시도 정책
//! - `scheduler`: 인덱스 정리 및 선택적 정기 갱신
//! - `stats`: 갱신 통계

pub mod batch;
pub mod on_demand;
pub mod retry;
pub mod scheduler;
pub mod stats;

pub use batch::BatchRefresher;
pub use on_demand::OnDemandFetcher;
pub use retry::RetryPolicy;
pub use scheduler::CacheScheduler;
pub use stats::{RefreshReport, RefreshStats};
