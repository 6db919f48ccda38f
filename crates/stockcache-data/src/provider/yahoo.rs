//! Yahoo Finance 데이터 소스.
//!
//! - 베트남 주식: `{SYMBOL}.VN`
//! - 암호화폐: `{SYMBOL}-USD` (USD 가격)
//! - 환율: `USDVND=X` 등 통화쌍의 최근 종가

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use stockcache_core::{AssetType, ProviderSettings};
use time::OffsetDateTime;
use tracing::{debug, warn};
use yahoo_finance_api as yahoo;

use super::{BatchResponse, PriceProvider, RawRow, RawSeries, RawTimestamp, SpotRateProvider};
use crate::error::{DataError, Result};

/// 일봉 간격.
const DAILY_INTERVAL: &str = "1d";

/// Yahoo Finance 일봉 데이터 소스.
pub struct YahooProvider {
    connector: yahoo::YahooConnector,
    request_timeout: Duration,
    batch_concurrency: usize,
}

impl YahooProvider {
    /// 설정으로 생성합니다.
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| DataError::Config(format!("Yahoo Finance 연결 실패: {}", e)))?;

        Ok(Self {
            connector,
            request_timeout: settings.request_timeout(),
            batch_concurrency: settings.batch_concurrency.max(1),
        })
    }

    fn quote_to_row(quote: &yahoo::Quote) -> RawRow {
        RawRow::new(RawTimestamp::Seconds(quote.timestamp as i64))
            .with("open", quote.open)
            .with("high", quote.high)
            .with("low", quote.low)
            .with("close", quote.close)
            .with("adjclose", quote.adjclose)
            .with("volume", quote.volume as f64)
    }

    fn currency(asset_type: AssetType) -> &'static str {
        match asset_type {
            AssetType::Stock => "VND",
            AssetType::Crypto => "USD",
        }
    }
}

#[async_trait]
impl PriceProvider for YahooProvider {
    fn id(&self) -> &'static str {
        "yahoo"
    }

    fn source_symbol(&self, symbol: &str, asset_type: AssetType) -> String {
        match asset_type {
            AssetType::Stock => format!("{}.VN", symbol.to_uppercase()),
            AssetType::Crypto => format!("{}-USD", symbol.to_uppercase()),
        }
    }

    async fn fetch(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries> {
        let yahoo_symbol = self.source_symbol(symbol, asset_type);
        let start_at = date_to_offset_datetime(start)?;
        // 종료일 당일 봉을 포함하도록 하루 뒤 자정까지 조회
        let end_at = date_to_offset_datetime(end)? + time::Duration::days(1);

        debug!(symbol = %yahoo_symbol, start = %start, end = %end, "Yahoo Finance 일봉 조회");

        let request = self.connector.get_quote_history_interval(
            &yahoo_symbol,
            start_at,
            end_at,
            DAILY_INTERVAL,
        );
        let response = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| {
                DataError::Timeout(format!(
                    "Yahoo Finance {} exceeded {:?}",
                    yahoo_symbol, self.request_timeout
                ))
            })?
            .map_err(|e| {
                DataError::Fetch(format!("Yahoo Finance API 오류 ({}): {}", yahoo_symbol, e))
            })?;

        let quotes = response
            .quotes()
            .map_err(|e| DataError::Parse(format!("Quote 파싱 오류 ({}): {}", yahoo_symbol, e)))?;

        if quotes.is_empty() {
            warn!(symbol = %yahoo_symbol, "Yahoo Finance 데이터 없음");
        }

        let rows = quotes.iter().map(Self::quote_to_row).collect();
        Ok(RawSeries::new(rows, Self::currency(asset_type)))
    }

    fn supports_batch(&self) -> bool {
        true
    }

    /// 심볼별 요청을 제한된 동시성으로 병렬 실행합니다.
    async fn fetch_batch(
        &self,
        symbols: &[String],
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BatchResponse> {
        let results: BatchResponse = stream::iter(symbols.iter().cloned())
            .map(|symbol| async move {
                let result = self.fetch(&symbol, asset_type, start, end).await;
                (symbol, result)
            })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        let served = results
            .values()
            .filter(|r| matches!(r, Ok(series) if !series.is_empty()))
            .count();
        debug!(requested = symbols.len(), served, "Yahoo Finance 일괄 조회 완료");

        if served == 0 && !symbols.is_empty() {
            return Err(DataError::Fetch(format!(
                "Yahoo Finance 일괄 조회 실패: {}개 심볼 모두 응답 없음",
                symbols.len()
            )));
        }

        Ok(results)
    }
}

/// Yahoo Finance 환율 조회.
pub struct YahooSpotRate {
    connector: yahoo::YahooConnector,
    request_timeout: Duration,
}

impl YahooSpotRate {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| DataError::Config(format!("Yahoo Finance 연결 실패: {}", e)))?;

        Ok(Self {
            connector,
            request_timeout: settings.request_timeout(),
        })
    }
}

#[async_trait]
impl SpotRateProvider for YahooSpotRate {
    async fn rate(&self, pair: &str) -> Result<f64> {
        let request = self.connector.get_latest_quotes(pair, DAILY_INTERVAL);
        let response = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| DataError::Timeout(format!("환율 조회 시간 초과: {}", pair)))?
            .map_err(|e| DataError::Fetch(format!("환율 조회 실패 ({}): {}", pair, e)))?;

        let quote = response
            .last_quote()
            .map_err(|e| DataError::Parse(format!("환율 파싱 실패 ({}): {}", pair, e)))?;

        if quote.close.is_finite() && quote.close > 0.0 {
            Ok(quote.close)
        } else {
            Err(DataError::Parse(format!(
                "잘못된 환율 ({}): {}",
                pair, quote.close
            )))
        }
    }
}

/// `NaiveDate`를 UTC 자정의 `OffsetDateTime`으로 변환.
fn date_to_offset_datetime(date: NaiveDate) -> Result<OffsetDateTime> {
    let month = u8::try_from(date.month())
        .ok()
        .and_then(|m| time::Month::try_from(m).ok())
        .ok_or_else(|| DataError::Parse(format!("잘못된 날짜: {}", date)))?;
    let day = u8::try_from(date.day())
        .map_err(|_| DataError::Parse(format!("잘못된 날짜: {}", date)))?;

    time::Date::from_calendar_date(date.year(), month, day)
        .map(|d| d.midnight().assume_utc())
        .map_err(|e| DataError::Parse(format!("잘못된 날짜 {}: {}", date, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_symbol_suffixes() {
        let provider = YahooProvider::new(&ProviderSettings::default()).unwrap();
        assert_eq!(provider.source_symbol("vcb", AssetType::Stock), "VCB.VN");
        assert_eq!(provider.source_symbol("BTC", AssetType::Crypto), "BTC-USD");
        assert!(provider.supports_batch());
    }

    #[test]
    fn test_quote_to_row_keeps_adjclose() {
        let quote = yahoo::Quote {
            timestamp: 1_704_153_600,
            open: 42_000.0,
            high: 43_000.0,
            low: 41_500.0,
            volume: 1_000,
            close: 42_500.0,
            adjclose: 42_500.0,
        };
        let row = YahooProvider::quote_to_row(&quote);
        assert_eq!(row.timestamp, RawTimestamp::Seconds(1_704_153_600));
        assert_eq!(row.fields["adjclose"], 42_500.0);
        assert_eq!(row.fields["volume"], 1_000.0);
    }

    #[test]
    fn test_date_to_offset_datetime() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let at = date_to_offset_datetime(date).unwrap();
        assert_eq!(at.unix_timestamp(), 1_704_153_600);
    }
}
