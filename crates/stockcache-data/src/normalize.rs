//! 원본 행을 캐시 바 스키마로 변환.
//!
//! 규칙:
//! - 필드 별칭 (대소문자 무시): open `open|o`, high `high|h`, low `low|l`,
//!   close `close|c`, 종가 대체 `adjclose|adj close|adj_close|adjusted_close`,
//!   volume `volume|vol|v`
//! - 없거나 유한하지 않은 OHLC는 0으로 간주하고, OHLC 중 하나라도 0 이하면 행 제거
//! - 양수 판정은 반올림 전 원본 값으로 하며, 아주 작은 가격은 유효숫자로 보존
//! - 시간은 Unix epoch 초로 통일, 해석할 수 없으면 행 제거
//! - 같은 시간은 마지막 행 우선, 시간 오름차순 정렬

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use stockcache_core::Bar;
use tracing::debug;

use crate::provider::{RawRow, RawTimestamp};

/// 이 값 이상의 epoch 초는 밀리초로 간주 (서기 5138년 이후).
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// 기본 소수점 자리수. 부동소수점 잡음을 제거하면서 소액 암호화폐 가격은 유지합니다.
const DEFAULT_PRICE_SCALE: u32 = 8;

/// 소수점 반올림으로 0이 되는 값은 유효숫자 기준으로 반올림.
const SIGNIFICANT_DIGITS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Open,
    High,
    Low,
    Close,
    AdjClose,
    Volume,
}

fn classify(name: &str) -> Option<Field> {
    match name.trim().to_ascii_lowercase().as_str() {
        "open" | "o" => Some(Field::Open),
        "high" | "h" => Some(Field::High),
        "low" | "l" => Some(Field::Low),
        "close" | "c" => Some(Field::Close),
        "adjclose" | "adj close" | "adj_close" | "adjusted_close" => Some(Field::AdjClose),
        "volume" | "vol" | "v" => Some(Field::Volume),
        _ => None,
    }
}

/// 원본 행 정규화기.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    price_scale: u32,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            price_scale: DEFAULT_PRICE_SCALE,
        }
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 소수점 자리수를 지정합니다.
    pub fn with_price_scale(mut self, scale: u32) -> Self {
        self.price_scale = scale;
        self
    }

    /// 원본 행들을 정렬·중복 제거된 바 목록으로 변환합니다.
    pub fn normalize(&self, rows: &[RawRow]) -> Vec<Bar> {
        let mut by_time: BTreeMap<i64, Bar> = BTreeMap::new();
        let mut dropped = 0usize;

        for row in rows {
            match self.normalize_row(row) {
                Some(bar) => {
                    by_time.insert(bar.time, bar);
                }
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!(total = rows.len(), dropped, "정규화 중 행 제거");
        }

        by_time.into_values().collect()
    }

    /// 가격(OHLC)에 환율을 곱합니다. 거래량은 그대로 둡니다.
    pub fn convert(&self, bars: Vec<Bar>, rate: Decimal) -> Vec<Bar> {
        let scale = |price: Decimal| round_price(price * rate, self.price_scale);
        bars.into_iter()
            .map(|bar| Bar {
                open: scale(bar.open),
                high: scale(bar.high),
                low: scale(bar.low),
                close: scale(bar.close),
                ..bar
            })
            .collect()
    }

    fn normalize_row(&self, row: &RawRow) -> Option<Bar> {
        let time = normalize_timestamp(&row.timestamp)?;

        let mut open = None;
        let mut high = None;
        let mut low = None;
        let mut close = None;
        let mut adj_close = None;
        let mut volume = None;

        for (name, &value) in &row.fields {
            if !value.is_finite() {
                continue;
            }
            let slot = match classify(name) {
                Some(Field::Open) => &mut open,
                Some(Field::High) => &mut high,
                Some(Field::Low) => &mut low,
                Some(Field::Close) => &mut close,
                Some(Field::AdjClose) => &mut adj_close,
                Some(Field::Volume) => &mut volume,
                None => continue,
            };
            *slot = Some(value);
        }

        let prices = [open, high, low, close.or(adj_close)];
        if !prices.iter().all(|p| p.is_some_and(|v| v > 0.0)) {
            return None;
        }
        let [open, high, low, close] = prices.map(|p| p.and_then(|v| self.decimal(v)));

        let (Some(open), Some(high), Some(low), Some(close)) = (open, high, low, close) else {
            debug!(time, "Decimal 범위를 벗어난 가격");
            return None;
        };
        let volume = volume.and_then(|v| self.decimal(v)).unwrap_or(Decimal::ZERO);

        Some(Bar::new(time, open, high, low, close, volume))
    }

    fn decimal(&self, value: f64) -> Option<Decimal> {
        Decimal::from_f64(value).map(|d| round_price(d, self.price_scale))
    }
}

/// 소수점 `scale`자리로 반올림하되 0이 아닌 값이 0이 되지 않게 합니다.
fn round_price(value: Decimal, scale: u32) -> Decimal {
    let rounded = value.round_dp(scale);
    if rounded.is_zero() && !value.is_zero() {
        return value.round_sf(SIGNIFICANT_DIGITS).unwrap_or(value).normalize();
    }
    rounded.normalize()
}

/// 시간 표현을 Unix epoch 초로 변환합니다.
pub fn normalize_timestamp(timestamp: &RawTimestamp) -> Option<i64> {
    match timestamp {
        RawTimestamp::Seconds(secs) if secs.abs() >= MILLIS_THRESHOLD => {
            Some(secs.div_euclid(1000))
        }
        RawTimestamp::Seconds(secs) => Some(*secs),
        RawTimestamp::Millis(millis) => Some(millis.div_euclid(1000)),
        RawTimestamp::Date(date) => date_to_epoch(*date),
        RawTimestamp::Text(text) => parse_text_timestamp(text),
    }
}

fn date_to_epoch(date: NaiveDate) -> Option<i64> {
    date.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp())
}

fn parse_text_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.timestamp());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date_to_epoch(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc().timestamp());
        }
    }

    text.parse::<i64>()
        .ok()
        .and_then(|n| normalize_timestamp(&RawTimestamp::Seconds(n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn row(ts: i64, close: f64) -> RawRow {
        RawRow::new(RawTimestamp::Seconds(ts))
            .with("open", close)
            .with("high", close)
            .with("low", close)
            .with("close", close)
    }

    #[test]
    fn test_aliases_are_case_insensitive() {
        let rows = vec![RawRow::new(RawTimestamp::Seconds(1_704_153_600))
            .with("O", 10.0)
            .with("High", 12.0)
            .with("l", 9.0)
            .with("Adj Close", 11.5)
            .with("VOL", 300.0)];

        let bars = Normalizer::new().normalize(&rows);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].open, dec!(10));
        assert_eq!(bars[0].high, dec!(12));
        assert_eq!(bars[0].low, dec!(9));
        // close가 없으면 adjclose 사용
        assert_eq!(bars[0].close, dec!(11.5));
        assert_eq!(bars[0].volume, dec!(300));
    }

    #[test]
    fn test_primary_close_wins_over_adjclose() {
        let rows = vec![row(1_704_153_600, 10.0).with("adjclose", 9.5)];
        let bars = Normalizer::new().normalize(&rows);
        assert_eq!(bars[0].close, dec!(10));
    }

    #[test]
    fn test_non_positive_or_missing_prices_drop_row() {
        let rows = vec![
            row(1, 10.0),
            row(2, 0.0),
            row(3, -1.0),
            RawRow::new(RawTimestamp::Seconds(4))
                .with("open", 1.0)
                .with("high", 1.0)
                .with("low", 1.0),
            row(5, f64::NAN),
            row(6, 10.0).with("volume", f64::INFINITY),
        ];

        let bars = Normalizer::new().normalize(&rows);
        let times: Vec<i64> = bars.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![1, 6]);
        // 유한하지 않은 거래량은 0
        assert_eq!(bars[1].volume, Decimal::ZERO);
    }

    #[test]
    fn test_dedup_last_write_wins_and_sorted() {
        let rows = vec![row(300, 3.0), row(100, 1.0), row(200, 2.0), row(100, 1.5)];
        let bars = Normalizer::new().normalize(&rows);

        let times: Vec<i64> = bars.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![100, 200, 300]);
        assert_eq!(bars[0].close, dec!(1.5));
    }

    #[test]
    fn test_timestamp_forms() {
        let day = 1_704_153_600;
        assert_eq!(normalize_timestamp(&RawTimestamp::Seconds(day)), Some(day));
        assert_eq!(
            normalize_timestamp(&RawTimestamp::Seconds(day * 1000)),
            Some(day)
        );
        assert_eq!(
            normalize_timestamp(&RawTimestamp::Millis(day * 1000 + 999)),
            Some(day)
        );
        assert_eq!(
            normalize_timestamp(&RawTimestamp::Date(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
            )),
            Some(day)
        );
        assert_eq!(
            normalize_timestamp(&RawTimestamp::Text("2024-01-02".into())),
            Some(day)
        );
        assert_eq!(
            normalize_timestamp(&RawTimestamp::Text("2024-01-02T07:00:00+07:00".into())),
            Some(day)
        );
        assert_eq!(
            normalize_timestamp(&RawTimestamp::Text("02/01/2024".into())),
            None
        );
    }

    #[test]
    fn test_unparseable_timestamp_drops_row() {
        let rows = vec![RawRow::new(RawTimestamp::Text("yesterday".into()))
            .with("o", 1.0)
            .with("h", 1.0)
            .with("l", 1.0)
            .with("c", 1.0)];
        assert!(Normalizer::new().normalize(&rows).is_empty());
    }

    #[test]
    fn test_float_noise_is_rounded() {
        // 23.45 * 1000 = 23450.000000000004
        let rows = vec![row(1, 23.45 * 1000.0)];
        let bars = Normalizer::new().normalize(&rows);
        assert_eq!(bars[0].close, dec!(23450));
    }

    #[test]
    fn test_tiny_positive_prices_are_kept() {
        let rows = vec![row(1, 4e-9), row(2, 1.23456789e-12)];
        let bars = Normalizer::new().normalize(&rows);

        assert_eq!(bars.len(), 2);
        assert!(bars.iter().all(|b| b.has_positive_prices()));
        assert_eq!(bars[0].close, dec!(0.000000004));
        assert_eq!(bars[1].close, dec!(0.0000000000012345679));
    }

    #[test]
    fn test_out_of_range_price_drops_row() {
        let rows = vec![row(1, 1e30), row(2, 5.0)];
        let bars = Normalizer::new().normalize(&rows);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, dec!(5));
    }

    #[test]
    fn test_convert_keeps_tiny_converted_price() {
        let normalizer = Normalizer::new();
        let bars = normalizer.convert(normalizer.normalize(&[row(1, 2e-9)]), dec!(0.5));
        assert_eq!(bars[0].close, dec!(0.000000001));
    }

    #[test]
    fn test_convert_scales_prices_only() {
        let rows = vec![row(1, 2.5).with("volume", 7.0)];
        let normalizer = Normalizer::new();
        let bars = normalizer.convert(normalizer.normalize(&rows), dec!(25000));
        assert_eq!(bars[0].close, dec!(62500));
        assert_eq!(bars[0].open, dec!(62500));
        assert_eq!(bars[0].volume, dec!(7));
    }

    proptest! {
        #[test]
        fn prop_retained_bars_are_positive_and_strictly_ascending(
            rows in prop::collection::vec(
                (
                    0i64..5_000_000_000,
                    prop::option::of(-100.0f64..1_000.0),
                    prop::option::of(-100.0f64..1_000.0),
                    prop::option::of(-100.0f64..1_000.0),
                    prop::option::of(-100.0f64..1_000.0),
                ),
                0..64,
            )
        ) {
            let raw: Vec<RawRow> = rows
                .iter()
                .map(|(ts, o, h, l, c)| {
                    let mut row = RawRow::new(RawTimestamp::Seconds(*ts));
                    for (name, value) in [("open", o), ("high", h), ("low", l), ("close", c)] {
                        if let Some(v) = value {
                            row.fields.insert(name.to_string(), *v);
                        }
                    }
                    row
                })
                .collect();

            let bars = Normalizer::new().normalize(&raw);
            prop_assert!(bars.len() <= raw.len());
            prop_assert!(bars.iter().all(|b| b.has_positive_prices()));
            prop_assert!(bars.windows(2).all(|w| w[0].time < w[1].time));
        }
    }
}
