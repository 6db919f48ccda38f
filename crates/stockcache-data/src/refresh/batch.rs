//! 전체 심볼 일괄 갱신.
//!
//! 설정된 심볼 목록을 고정 크기 배치로 나누어 조회하고 캐시에 저장합니다.
//!
//! - 주식: 심볼별로 소스 체인 조회 (재시도 포함)
//! - 암호화폐: 배치 단위 일괄 조회, 일괄 조회가 끝내 실패하면 심볼별 조회로 전환
//! - 배치 사이에 `batch_delay`만큼 대기 (마지막 배치 뒤에는 대기하지 않음)
//! - 모든 자산 유형을 끝까지 처리한 경우에만 완료 시각을 기록

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Instant;
use stockcache_core::{canonical_symbol, AssetType, BatchSettings, CacheConfig, UniverseSettings};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::retry::RetryPolicy;
use super::stats::{RefreshReport, RefreshStats};
use crate::cache::CacheStore;
use crate::error::{DataError, Result};
use crate::provider::{FetchedSeries, SourceChain};

/// 일괄 갱신 실행기.
pub struct BatchRefresher {
    store: CacheStore,
    chain: Arc<SourceChain>,
    settings: BatchSettings,
    universe: UniverseSettings,
    retry: RetryPolicy,
    running: Mutex<()>,
}

impl BatchRefresher {
    pub fn new(store: CacheStore, chain: Arc<SourceChain>, config: &CacheConfig) -> Self {
        Self {
            store,
            chain,
            settings: config.batch.clone(),
            universe: config.universe.clone(),
            retry: RetryPolicy::from(&config.retry),
            running: Mutex::new(()),
        }
    }

    /// 갱신이 진행 중인지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// 배치 크기.
    pub fn batch_size(&self) -> usize {
        self.settings.batch_size.max(1)
    }

    /// 설정된 전체 심볼 수.
    pub fn universe_size(&self) -> usize {
        self.universe.len()
    }

    /// 전체 심볼을 갱신합니다.
    ///
    /// 이미 갱신 중이면 기다리지 않고 `DataError::RefreshInProgress`를 반환합니다.
    /// 취소되면 `completed = false`인 보고서를 반환하고 완료 시각은 기록하지 않습니다.
    #[instrument(skip(self, cancel))]
    pub async fn refresh_all(&self, cancel: &CancellationToken) -> Result<RefreshReport> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| DataError::RefreshInProgress)?;

        let started = Instant::now();
        let mut report = RefreshReport::new();

        info!(
            stocks = self.universe.stocks.len(),
            crypto = self.universe.crypto.len(),
            batch_size = self.batch_size(),
            "일괄 갱신 시작"
        );

        if self.settings.clear_before_refresh {
            self.store.clear_all().await;
        }

        let (start, end) = lookback_window(self.settings.lookback_days);
        let mut cancelled = false;

        'assets: for asset_type in AssetType::all() {
            let symbols = self.symbols_for(asset_type);
            let stats = report.stats_mut(asset_type);
            stats.total = symbols.len();

            let batches: Vec<&[String]> = symbols.chunks(self.batch_size()).collect();
            for (index, batch) in batches.iter().enumerate() {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'assets;
                }

                debug!(
                    asset_type = %asset_type,
                    batch = index + 1,
                    batches = batches.len(),
                    size = batch.len(),
                    "배치 처리"
                );

                match asset_type {
                    AssetType::Stock => self.refresh_stock_batch(batch, start, end, stats).await,
                    AssetType::Crypto => self.refresh_crypto_batch(batch, start, end, stats).await,
                }

                if index + 1 < batches.len() {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            cancelled = true;
                            break 'assets;
                        }
                        _ = tokio::time::sleep(self.settings.batch_delay()) => {}
                    }
                }
            }

            info!(
                asset_type = %asset_type,
                success = stats.success,
                total = stats.total,
                "자산 유형 갱신 완료"
            );
        }

        report.completed = !cancelled;
        if cancelled {
            warn!("일괄 갱신 취소됨, 완료 시각 기록 생략");
        } else {
            report.marker_written = self.store.set_last_full_refresh(Utc::now()).await;
            self.store
                .set_last_full_refresh_count(report.total_success())
                .await;
        }

        report.elapsed = started.elapsed();
        report.log_summary();
        Ok(report)
    }

    /// 마지막 전체 갱신이 없거나 오래되었거나 캐시 심볼이 적으면 전체 갱신합니다.
    ///
    /// 심볼 수 기준은 `warmup_min_symbols`, 유니버스 크기, 마지막 전체 갱신의
    /// 성공 심볼 수 중 가장 작은 값입니다. 갱신하지 않았으면 `None`을 반환합니다.
    pub async fn initial_fetch_if_needed(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<RefreshReport>> {
        let indexed = self.store.list_indexed_symbols().await.len();
        let last = self.store.last_full_refresh().await;
        let max_age = ChronoDuration::try_seconds(
            i64::try_from(self.settings.warmup_max_age_secs).unwrap_or(i64::MAX),
        )
        .unwrap_or(ChronoDuration::MAX);
        let min_symbols = self.warmup_threshold().await;

        let reason = match last {
            None => Some("완료 기록 없음"),
            Some(at) if Utc::now() - at > max_age => Some("마지막 갱신이 오래됨"),
            Some(_) if indexed < min_symbols => Some("캐시 심볼 부족"),
            Some(_) => None,
        };

        match reason {
            Some(reason) => {
                info!(reason, indexed, min_symbols, last_full_refresh = ?last, "초기 일괄 갱신 실행");
                self.refresh_all(cancel).await.map(Some)
            }
            None => {
                info!(indexed, last_full_refresh = ?last, "캐시가 최신 상태, 초기 갱신 생략");
                Ok(None)
            }
        }
    }

    async fn warmup_threshold(&self) -> usize {
        let threshold = self.settings.warmup_min_symbols.min(self.universe_size());
        match self.store.last_full_refresh_count().await {
            Some(count) => threshold.min(count),
            None => threshold,
        }
    }

    /// canonical 심볼 목록 (잘못된 심볼 제외, 중복 제거).
    fn symbols_for(&self, asset_type: AssetType) -> Vec<String> {
        let raw = match asset_type {
            AssetType::Stock => &self.universe.stocks,
            AssetType::Crypto => &self.universe.crypto,
        };

        let mut symbols: Vec<String> = Vec::with_capacity(raw.len());
        for symbol in raw {
            match canonical_symbol(symbol) {
                Ok(symbol) if !symbols.contains(&symbol) => symbols.push(symbol),
                Ok(_) => {}
                Err(e) => warn!(symbol = %symbol, error = %e, "잘못된 심볼 제외"),
            }
        }
        symbols
    }

    async fn refresh_stock_batch(
        &self,
        batch: &[String],
        start: NaiveDate,
        end: NaiveDate,
        stats: &mut RefreshStats,
    ) {
        for symbol in batch {
            let result = self
                .retry
                .run(symbol, || self.chain.fetch(symbol, AssetType::Stock, start, end))
                .await;
            self.record(symbol, AssetType::Stock, result, stats).await;
        }
    }

    async fn refresh_crypto_batch(
        &self,
        batch: &[String],
        start: NaiveDate,
        end: NaiveDate,
        stats: &mut RefreshStats,
    ) {
        let response = self
            .retry
            .run("crypto batch", || {
                self.chain.fetch_batch(batch, AssetType::Crypto, start, end)
            })
            .await;

        match response {
            Ok(mut results) => {
                for symbol in batch {
                    let result = results.remove(symbol).unwrap_or_else(|| {
                        Err(DataError::NoData(format!("{} missing from batch response", symbol)))
                    });
                    self.record(symbol, AssetType::Crypto, result, stats).await;
                }
            }
            Err(e) => {
                warn!(error = %e, size = batch.len(), "암호화폐 일괄 조회 실패, 심볼별 조회로 전환");
                for symbol in batch {
                    let result = self
                        .retry
                        .run(symbol, || self.chain.fetch(symbol, AssetType::Crypto, start, end))
                        .await;
                    self.record(symbol, AssetType::Crypto, result, stats).await;
                }
            }
        }
    }

    async fn record(
        &self,
        symbol: &str,
        asset_type: AssetType,
        result: Result<FetchedSeries>,
        stats: &mut RefreshStats,
    ) {
        match result {
            Ok(series) => {
                let bars = series.bars.len();
                let entry = series.into_entry(symbol, asset_type, self.settings.ttl());
                if self.store.set(&entry, self.settings.ttl()).await {
                    stats.success += 1;
                    stats.total_bars += bars;
                    debug!(symbol, bars, source = %entry.source, "캐시 저장 완료");
                } else {
                    stats.store_failures += 1;
                    stats.failed_symbols.push(symbol.to_string());
                }
            }
            Err(e) => {
                stats.errors += 1;
                stats.failed_symbols.push(symbol.to_string());
                warn!(symbol, asset_type = %asset_type, error = %e, "심볼 갱신 실패, 건너뜀");
            }
        }
    }
}

/// 오늘(UTC)부터 `lookback_days` 이전까지의 조회 구간.
///
/// 시작일이 날짜 범위를 벗어나면 `NaiveDate::MIN`으로 고정합니다.
pub(crate) fn lookback_window(lookback_days: i64) -> (NaiveDate, NaiveDate) {
    let end = Utc::now().date_naive();
    let start = ChronoDuration::try_days(lookback_days.max(0))
        .and_then(|days| end.checked_sub_signed(days))
        .unwrap_or(NaiveDate::MIN);
    (start, end)
}
