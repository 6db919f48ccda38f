//! # Stock Cache Core
//!
//! 주식/암호화폐 일봉 데이터 캐시의 핵심 타입을 제공합니다.
//!
//! 이 크레이트는 캐시 시스템 전반에서 사용되는 기본 타입을 제공합니다:
//! - 자산 유형 및 OHLCV 바(bar) 구조체
//! - 캐시 항목(`CacheEntry`)과 요약 통계
//! - canonical 심볼 변환
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
