//! 캐시 항목.
//!
//! 한 심볼의 캐시된 시계열입니다. 한 번 기록된 항목은 수정하지 않으며,
//! 갱신은 항목 전체를 교체합니다.

use super::market_data::{Bar, MarketInfo, PriceSummary};
use crate::types::AssetType;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 한 심볼의 캐시된 시계열.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// canonical 심볼
    pub symbol: String,
    /// 자산 유형
    pub asset_type: AssetType,
    /// 시간 오름차순, 시간 중복 없는 바 목록
    pub bars: Vec<Bar>,
    /// 요약 통계
    pub summary: PriceSummary,
    /// 시장 정보
    pub market_info: MarketInfo,
    /// 바 가격의 실제 통화 (환율 변환 실패 시 원 통화)
    pub quote_currency: String,
    /// 데이터를 제공한 소스 ID
    pub source: String,
    /// 캐시 시각
    pub cached_at: DateTime<Utc>,
    /// TTL (초)
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// 새 캐시 항목을 생성합니다.
    ///
    /// `bars`는 이미 정규화(정렬, 중복 제거)된 상태여야 합니다.
    pub fn new(
        symbol: impl Into<String>,
        asset_type: AssetType,
        bars: Vec<Bar>,
        source: impl Into<String>,
        quote_currency: impl Into<String>,
    ) -> Self {
        debug_assert!(bars.windows(2).all(|w| w[0].time < w[1].time));

        let summary = PriceSummary::from_bars(&bars);
        Self {
            symbol: symbol.into(),
            asset_type,
            bars,
            summary,
            market_info: MarketInfo::for_asset(asset_type),
            quote_currency: quote_currency.into(),
            source: source.into(),
            cached_at: Utc::now(),
            ttl_seconds: 0,
        }
    }

    /// TTL을 설정합니다.
    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.ttl_seconds = ttl.as_secs();
        self
    }

    /// 캐시 시각을 설정합니다.
    pub fn with_cached_at(mut self, cached_at: DateTime<Utc>) -> Self {
        self.cached_at = cached_at;
        self
    }

    /// 바가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// 마지막 바를 반환합니다.
    pub fn latest_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// 예상 만료 시각. 표현할 수 없을 만큼 멀면 `DateTime::MAX_UTC`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.cached_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_entry() -> CacheEntry {
        let bars = vec![
            Bar::new(1_700_000_000, dec!(10), dec!(10.5), dec!(9.5), dec!(10), dec!(1000)),
            Bar::new(1_700_086_400, dec!(10), dec!(11.5), dec!(9.9), dec!(11), dec!(1200)),
        ];
        CacheEntry::new("VCB", AssetType::Stock, bars, "vndirect", "VND")
    }

    #[test]
    fn test_new_computes_summary() {
        let entry = sample_entry();
        assert_eq!(entry.summary.latest_price, dec!(11));
        assert_eq!(entry.summary.latest_price, entry.latest_bar().unwrap().close);
        assert_eq!(entry.summary.latest_volume, dec!(1200));
        assert_eq!(entry.market_info.currency, "VND");
        assert_eq!(entry.ttl_seconds, 0);
    }

    #[test]
    fn test_with_ttl_and_expiry() {
        let entry = sample_entry().with_ttl(std::time::Duration::from_secs(3600));
        assert_eq!(entry.ttl_seconds, 3600);
        assert_eq!(entry.expires_at() - entry.cached_at, Duration::hours(1));
    }

    #[test]
    fn test_expiry_saturates_for_huge_ttl() {
        let entry = sample_entry().with_ttl(std::time::Duration::from_secs(u64::MAX));
        assert_eq!(entry.expires_at(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_json_roundtrip_preserves_entry() {
        let entry = sample_entry().with_ttl(std::time::Duration::from_secs(60));
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
