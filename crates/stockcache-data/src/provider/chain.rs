//! 자산 유형별 데이터 소스 체인.
//!
//! 주식은 VNDirect → Yahoo Finance, 암호화폐는 Yahoo Finance 순서로 시도하며
//! 처음으로 비어있지 않은 데이터를 돌려준 소스의 결과를 사용합니다.
//! 암호화폐 가격은 USD로 받아 설정된 통화쌍 환율로 변환합니다.

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stockcache_core::{AssetType, Bar, CacheEntry, ProviderSettings};
use tracing::{debug, info, instrument, warn};

use super::{PriceProvider, RawSeries, SpotRateProvider, VnDirectProvider, YahooProvider, YahooSpotRate};
use crate::error::{DataError, Result};
use crate::normalize::Normalizer;

/// 정규화된 조회 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedSeries {
    /// 데이터를 제공한 소스 ID
    pub source: String,
    /// 바 가격 통화
    pub currency: String,
    pub bars: Vec<Bar>,
}

impl FetchedSeries {
    /// 캐시 항목으로 변환합니다.
    pub fn into_entry(self, symbol: &str, asset_type: AssetType, ttl: Duration) -> CacheEntry {
        CacheEntry::new(symbol, asset_type, self.bars, self.source, self.currency).with_ttl(ttl)
    }
}

/// 데이터 소스 체인.
pub struct SourceChain {
    stock: Vec<Arc<dyn PriceProvider>>,
    crypto: Vec<Arc<dyn PriceProvider>>,
    spot_rate: Option<Arc<dyn SpotRateProvider>>,
    fx_pair: String,
    display_currency: String,
    request_timeout: Duration,
    normalizer: Normalizer,
}

impl SourceChain {
    /// 소스가 없는 빈 체인을 생성합니다.
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            stock: Vec::new(),
            crypto: Vec::new(),
            spot_rate: None,
            fx_pair: settings.fx_pair.clone(),
            display_currency: settings.display_currency.clone(),
            request_timeout: settings.request_timeout(),
            normalizer: Normalizer::default(),
        }
    }

    /// 기본 소스 구성 (주식: VNDirect → Yahoo, 암호화폐: Yahoo + 환율).
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let yahoo: Arc<dyn PriceProvider> = Arc::new(YahooProvider::new(settings)?);
        let vndirect: Arc<dyn PriceProvider> = Arc::new(VnDirectProvider::new(settings)?);

        Ok(Self::new(settings)
            .with_provider(AssetType::Stock, vndirect)
            .with_provider(AssetType::Stock, yahoo.clone())
            .with_provider(AssetType::Crypto, yahoo)
            .with_spot_rate(Arc::new(YahooSpotRate::new(settings)?)))
    }

    /// 자산 유형의 체인 끝에 소스를 추가합니다.
    pub fn with_provider(mut self, asset_type: AssetType, provider: Arc<dyn PriceProvider>) -> Self {
        match asset_type {
            AssetType::Stock => self.stock.push(provider),
            AssetType::Crypto => self.crypto.push(provider),
        }
        self
    }

    pub fn with_spot_rate(mut self, spot_rate: Arc<dyn SpotRateProvider>) -> Self {
        self.spot_rate = Some(spot_rate);
        self
    }

    /// 자산 유형의 소스 목록 (시도 순서).
    pub fn providers(&self, asset_type: AssetType) -> &[Arc<dyn PriceProvider>] {
        match asset_type {
            AssetType::Stock => &self.stock,
            AssetType::Crypto => &self.crypto,
        }
    }

    /// 소스를 순서대로 시도해 처음으로 유효한 데이터를 반환합니다.
    ///
    /// 오류, 타임아웃, 빈 응답, 정규화 후 빈 결과는 모두 다음 소스로 넘어갑니다.
    #[instrument(skip(self))]
    pub async fn fetch(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchedSeries> {
        for provider in self.providers(asset_type) {
            let attempt = provider.fetch(symbol, asset_type, start, end);
            let series = match tokio::time::timeout(self.request_timeout, attempt).await {
                Err(_) => {
                    warn!(provider = provider.id(), timeout = ?self.request_timeout, "소스 시간 초과, 다음 소스로 Fallback");
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(provider = provider.id(), error = %e, "소스 실패, 다음 소스로 Fallback");
                    continue;
                }
                Ok(Ok(series)) => series,
            };

            if series.is_empty() {
                info!(provider = provider.id(), "소스 데이터 없음, 다음 소스로 Fallback");
                continue;
            }

            let bars = self.normalizer.normalize(&series.rows);
            if bars.is_empty() {
                warn!(
                    provider = provider.id(),
                    rows = series.rows.len(),
                    "유효한 행 없음, 다음 소스로 Fallback"
                );
                continue;
            }

            let rate = if self.needs_conversion(&series) {
                self.spot_rate().await
            } else {
                None
            };
            let fetched = self.finish(provider.id(), series.currency, bars, rate);
            debug!(provider = %fetched.source, bars = fetched.bars.len(), currency = %fetched.currency, "소스 조회 성공");
            return Ok(fetched);
        }

        Err(DataError::NoData(format!("{} ({})", symbol, asset_type)))
    }

    /// 소스를 순서대로 시도하고 캐시 항목으로 변환합니다.
    pub async fn fetch_entry(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
        ttl: Duration,
    ) -> Result<CacheEntry> {
        self.fetch(symbol, asset_type, start, end)
            .await
            .map(|series| series.into_entry(symbol, asset_type, ttl))
    }

    /// 일괄 조회를 지원하는 첫 소스로 여러 심볼을 조회합니다.
    ///
    /// 환율은 일괄 요청당 한 번만 조회합니다. 응답에 없는 심볼은 결과에도 없습니다.
    #[instrument(skip(self, symbols), fields(count = symbols.len()))]
    pub async fn fetch_batch(
        &self,
        symbols: &[String],
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<String, Result<FetchedSeries>>> {
        let provider = self
            .providers(asset_type)
            .iter()
            .find(|p| p.supports_batch())
            .ok_or_else(|| {
                DataError::Unsupported(format!("no batch-capable provider for {}", asset_type))
            })?;

        // 심볼당 요청 하나를 기준으로 전체 상한을 둠
        let limit = self
            .request_timeout
            .saturating_mul(u32::try_from(symbols.len().max(1)).unwrap_or(u32::MAX));
        let response =
            match tokio::time::timeout(limit, provider.fetch_batch(symbols, asset_type, start, end))
                .await
            {
                Ok(response) => response?,
                Err(_) => {
                    warn!(
                        provider = provider.id(),
                        symbols = symbols.len(),
                        timeout_secs = limit.as_secs(),
                        "일괄 조회 시간 초과"
                    );
                    return Err(DataError::Timeout(format!(
                        "{} batch of {} symbols",
                        provider.id(),
                        symbols.len()
                    )));
                }
            };

        let mut rate = None;
        let mut rate_checked = false;
        let mut results = HashMap::with_capacity(response.len());

        for (symbol, series) in response {
            let result = match series {
                Ok(series) => {
                    let bars = self.normalizer.normalize(&series.rows);
                    if bars.is_empty() {
                        Err(DataError::NoData(format!("{} ({})", symbol, asset_type)))
                    } else {
                        if self.needs_conversion(&series) && !rate_checked {
                            rate = self.spot_rate().await;
                            rate_checked = true;
                        }
                        let rate = if self.needs_conversion(&series) { rate } else { None };
                        Ok(self.finish(provider.id(), series.currency, bars, rate))
                    }
                }
                Err(e) => Err(e),
            };
            results.insert(symbol, result);
        }

        Ok(results)
    }

    fn needs_conversion(&self, series: &RawSeries) -> bool {
        self.spot_rate.is_some() && !series.currency.eq_ignore_ascii_case(&self.display_currency)
    }

    /// 환율을 조회합니다. 실패하면 `None`을 반환하고 원 통화를 유지합니다.
    async fn spot_rate(&self) -> Option<Decimal> {
        let spot_rate = self.spot_rate.as_ref()?;

        let rate = match tokio::time::timeout(self.request_timeout, spot_rate.rate(&self.fx_pair)).await {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                warn!(pair = %self.fx_pair, error = %e, "환율 조회 실패, 원 통화 유지");
                return None;
            }
            Err(_) => {
                warn!(pair = %self.fx_pair, "환율 조회 시간 초과, 원 통화 유지");
                return None;
            }
        };

        match Decimal::from_f64(rate) {
            Some(rate) if rate > Decimal::ZERO => Some(rate),
            _ => {
                warn!(pair = %self.fx_pair, rate, "잘못된 환율, 원 통화 유지");
                None
            }
        }
    }

    fn finish(&self, source: &str, currency: String, bars: Vec<Bar>, rate: Option<Decimal>) -> FetchedSeries {
        match rate {
            Some(rate) => FetchedSeries {
                source: source.to_string(),
                currency: self.display_currency.clone(),
                bars: self.normalizer.convert(bars, rate),
            },
            None => FetchedSeries {
                source: source.to_string(),
                currency,
                bars,
            },
        }
    }
}
