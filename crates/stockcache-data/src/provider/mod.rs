//! 가격 데이터 소스.
//!
//! 각 소스는 원본 스키마를 거의 그대로 [`RawRow`]로 넘기고,
//! 필드 별칭 해석과 검증은 [`crate::normalize::Normalizer`]가 담당합니다.
//!
//! - `vndirect`: 베트남 주식 (지역 소스)
//! - `yahoo`: Yahoo Finance (주식 fallback, 암호화폐, 환율)
//! - `chain`: 자산 유형별 소스 순서와 fallback

pub mod chain;
pub mod vndirect;
pub mod yahoo;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use stockcache_core::AssetType;

use crate::error::{DataError, Result};

pub use chain::{FetchedSeries, SourceChain};
pub use vndirect::VnDirectProvider;
pub use yahoo::{YahooProvider, YahooSpotRate};

/// 원본 행의 시간 표현.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    /// Unix epoch 초 (크기가 밀리초 범위면 밀리초로 간주)
    Seconds(i64),
    /// Unix epoch 밀리초
    Millis(i64),
    /// 달력 날짜 (UTC 자정)
    Date(NaiveDate),
    /// RFC 3339 또는 `YYYY-MM-DD` 문자열
    Text(String),
}

/// 소스가 반환한 정규화 전 행.
///
/// 필드 이름은 소스 스키마 그대로이며 대소문자를 구분하지 않습니다.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub timestamp: RawTimestamp,
    pub fields: BTreeMap<String, f64>,
}

impl RawRow {
    pub fn new(timestamp: RawTimestamp) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    /// 필드를 추가합니다.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// 한 소스의 한 심볼 응답.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub rows: Vec<RawRow>,
    /// 가격 통화
    pub currency: String,
}

impl RawSeries {
    pub fn new(rows: Vec<RawRow>, currency: impl Into<String>) -> Self {
        Self {
            rows,
            currency: currency.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 심볼별 일괄 조회 결과.
pub type BatchResponse = HashMap<String, Result<RawSeries>>;

/// 일봉 데이터 소스.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// 소스 식별자 (캐시 항목의 `source`).
    fn id(&self) -> &'static str;

    /// canonical 심볼을 소스 심볼로 변환합니다.
    fn source_symbol(&self, symbol: &str, asset_type: AssetType) -> String;

    /// `[start, end]` 구간의 일봉을 조회합니다.
    async fn fetch(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries>;

    /// 여러 심볼을 한 번에 조회할 수 있는지 여부.
    fn supports_batch(&self) -> bool {
        false
    }

    /// 여러 심볼을 조회합니다. 결과 키는 canonical 심볼입니다.
    async fn fetch_batch(
        &self,
        _symbols: &[String],
        _asset_type: AssetType,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<BatchResponse> {
        Err(DataError::Unsupported(format!(
            "{} does not support batch requests",
            self.id()
        )))
    }
}

/// 환율 조회.
#[async_trait]
pub trait SpotRateProvider: Send + Sync {
    /// 통화쌍(예: `USDVND=X`)의 현재 환율.
    async fn rate(&self, pair: &str) -> Result<f64>;
}
