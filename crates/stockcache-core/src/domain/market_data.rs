//! 시장 데이터 타입 및 구조체.
//!
//! 이 모듈은 캐시에 저장되는 시장 데이터 타입을 정의합니다:
//! - `Bar` - 정규화된 OHLCV 일봉
//! - `PriceSummary` - 바 목록에서 계산한 요약 통계
//! - `MarketInfo` - 자산 유형별 정적 시장 정보

use crate::types::AssetType;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 정규화된 OHLCV 바.
///
/// 시간은 초 단위 Unix epoch입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// 바 시작 시간 (Unix epoch, 초)
    pub time: i64,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량
    pub volume: Decimal,
}

impl Bar {
    /// 새 바를 생성합니다.
    pub fn new(
        time: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 시가/고가/저가/종가가 모두 양수인지 확인합니다.
    pub fn has_positive_prices(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| *p > Decimal::ZERO)
    }

    /// 바 시작 시간을 `DateTime`으로 반환합니다.
    pub fn open_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.time, 0).single()
    }
}

/// 바 목록의 요약 통계.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSummary {
    /// 최신 종가 (바가 없으면 0)
    pub latest_price: Decimal,
    /// 직전 종가 대비 변동
    pub price_change: Decimal,
    /// 직전 종가 대비 변동률 (%)
    pub price_change_percent: Decimal,
    /// 바 개수
    pub record_count: usize,
    /// 첫 바 시간
    pub date_range_start: Option<i64>,
    /// 마지막 바 시간
    pub date_range_end: Option<i64>,
    /// 최신 거래량
    pub latest_volume: Decimal,
}

impl PriceSummary {
    /// 정렬된 바 목록에서 요약 통계를 계산합니다.
    ///
    /// 변동과 변동률은 소수점 2자리로 반올림합니다.
    /// 최신 가격은 반올림하지 않으므로 항상 마지막 바의 종가와 같습니다.
    pub fn from_bars(bars: &[Bar]) -> Self {
        let latest = bars.last();

        let (price_change, price_change_percent) = match bars {
            [.., previous, current] => {
                let change = current.close - previous.close;
                let percent = change
                    .checked_div(previous.close)
                    .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                    .unwrap_or(Decimal::ZERO);
                (change.round_dp(2), percent.round_dp(2))
            }
            _ => (Decimal::ZERO, Decimal::ZERO),
        };

        Self {
            latest_price: latest.map(|b| b.close).unwrap_or(Decimal::ZERO),
            price_change,
            price_change_percent,
            record_count: bars.len(),
            date_range_start: bars.first().map(|b| b.time),
            date_range_end: latest.map(|b| b.time),
            latest_volume: latest.map(|b| b.volume).unwrap_or(Decimal::ZERO),
        }
    }
}

/// 자산 유형별 시장 정보.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInfo {
    /// 시장 표시 이름
    pub display_name: String,
    /// 표시 통화
    pub currency: String,
    /// 시장 시간대
    pub timezone: String,
    /// 안내 문구
    pub note: String,
}

impl MarketInfo {
    /// 자산 유형에 해당하는 정적 시장 정보를 반환합니다.
    pub fn for_asset(asset_type: AssetType) -> Self {
        match asset_type {
            AssetType::Stock => Self {
                display_name: "Vietnam Stock Market".to_string(),
                currency: "VND".to_string(),
                timezone: "Asia/Ho_Chi_Minh".to_string(),
                note: "All tickers listed on HOSE, HNX and UPCOM".to_string(),
            },
            AssetType::Crypto => Self {
                display_name: "Cryptocurrency Market".to_string(),
                currency: "VND (converted from USD)".to_string(),
                timezone: "UTC".to_string(),
                note: "Major crypto assets (BTC, ETH, BNB, ADA, SOL...)".to_string(),
            },
        }
    }
}
