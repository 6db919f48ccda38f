//! 캐시 오케스트레이터.
//!
//! 저장소, 소스 체인, 온디맨드 조회, 일괄 갱신, 스케줄러를 하나로 묶는 진입점입니다.
//! 한 번 생성해 `Arc`로 공유합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stockcache_core::{canonical_symbol, AssetType, BackendKind, CacheConfig, CacheEntry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::CacheStore;
use crate::error::Result;
use crate::provider::SourceChain;
use crate::refresh::{BatchRefresher, CacheScheduler, OnDemandFetcher, RefreshReport};
use crate::storage::{CacheBackend, InMemoryCache, RedisCache};

/// 상태 출력에 포함할 심볼 수.
const SYMBOL_PREVIEW_LEN: usize = 10;

/// 조회 결과의 출처.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupOrigin {
    /// 캐시 적중
    Cache,
    /// 캐시 미스 후 소스에서 조회
    Fetched,
}

/// 캐시 메타데이터가 포함된 조회 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub entry: CacheEntry,
    pub origin: LookupOrigin,
}

/// Cache 통계.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// 적중/미스 카운터.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheMetrics {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// 현재 통계.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// 갱신 상태.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub indexed_symbol_count: usize,
    pub last_full_refresh: Option<DateTime<Utc>>,
    pub scheduler_running: bool,
}

/// 캐시 전체 상태.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    #[serde(flatten)]
    pub refresh: RefreshStatus,
    pub backend: String,
    pub backend_available: bool,
    /// 정렬된 심볼 앞부분
    pub symbol_preview: Vec<String>,
    pub metrics: CacheStats,
    pub batch_size: usize,
    pub universe_size: usize,
    pub refresh_in_progress: bool,
}

/// 내보내기 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub symbol: String,
    pub asset_type: AssetType,
    pub record_count: usize,
    pub cached_at: DateTime<Utc>,
    pub source: String,
}

/// 캐시 내용 요약.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub exported_at: DateTime<Utc>,
    pub total_symbols: usize,
    pub entries: Vec<ExportRecord>,
}

/// 캐시 오케스트레이터.
pub struct CacheOrchestrator {
    store: CacheStore,
    on_demand: OnDemandFetcher,
    refresher: Arc<BatchRefresher>,
    scheduler: CacheScheduler,
    metrics: CacheMetrics,
}

impl CacheOrchestrator {
    /// 주어진 백엔드와 소스 체인으로 생성합니다.
    pub fn new(backend: Arc<dyn CacheBackend>, chain: SourceChain, config: &CacheConfig) -> Self {
        let store = CacheStore::new(backend);
        let chain = Arc::new(chain);
        let refresher = Arc::new(BatchRefresher::new(store.clone(), chain.clone(), config));
        let on_demand = OnDemandFetcher::new(store.clone(), chain, config);
        let scheduler = CacheScheduler::new(store.clone(), refresher.clone(), config.scheduler.clone());

        Self {
            store,
            on_demand,
            refresher,
            scheduler,
            metrics: CacheMetrics::default(),
        }
    }

    /// 설정에 따라 백엔드와 기본 소스 체인을 구성합니다.
    ///
    /// Redis에 연결할 수 없어도 생성은 성공하며 이후 명령에서 재연결합니다.
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        let backend: Arc<dyn CacheBackend> = match config.redis.backend {
            BackendKind::Redis => Arc::new(RedisCache::connect(&config.redis).await?),
            BackendKind::Memory => {
                info!("메모리 캐시 사용");
                Arc::new(InMemoryCache::new())
            }
        };
        let chain = SourceChain::from_settings(&config.providers)?;

        Ok(Self::new(backend, chain, config))
    }

    /// 저장소.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// 캐시를 먼저 보고 없으면 소스에서 조회합니다.
    pub async fn get(&self, symbol: &str, asset_type: AssetType) -> Option<CacheEntry> {
        self.lookup(symbol, asset_type).await.map(|lookup| lookup.entry)
    }

    /// `get`과 같으며 결과의 출처를 함께 반환합니다.
    #[instrument(skip(self))]
    pub async fn lookup(&self, symbol: &str, asset_type: AssetType) -> Option<Lookup> {
        let symbol = match canonical_symbol(symbol) {
            Ok(symbol) => symbol,
            Err(e) => {
                warn!(error = %e, "잘못된 심볼");
                return None;
            }
        };

        if let Some(entry) = self.store.get(&symbol).await {
            self.metrics.record_hit();
            debug!(symbol = %symbol, "캐시 적중");
            return Some(Lookup {
                entry,
                origin: LookupOrigin::Cache,
            });
        }

        self.metrics.record_miss();
        debug!(symbol = %symbol, "캐시 미스, 온디맨드 조회");
        self.on_demand
            .fetch_single(&symbol, asset_type)
            .await
            .map(|entry| Lookup {
                entry,
                origin: LookupOrigin::Fetched,
            })
    }

    /// 전체 심볼을 갱신합니다.
    pub async fn refresh_all(&self, cancel: &CancellationToken) -> Result<RefreshReport> {
        self.refresher.refresh_all(cancel).await
    }

    /// 필요할 때만 전체 갱신합니다.
    pub async fn initial_fetch_if_needed(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<RefreshReport>> {
        self.refresher.initial_fetch_if_needed(cancel).await
    }

    /// 갱신 상태.
    pub async fn refresh_status(&self) -> RefreshStatus {
        RefreshStatus {
            indexed_symbol_count: self.store.list_indexed_symbols().await.len(),
            last_full_refresh: self.store.last_full_refresh().await,
            scheduler_running: self.scheduler.is_running(),
        }
    }

    /// 캐시 전체 상태.
    pub async fn cache_status(&self) -> CacheStatus {
        let backend_available = self.store.is_available().await;
        let symbols = self.store.list_indexed_symbols().await;

        CacheStatus {
            refresh: RefreshStatus {
                indexed_symbol_count: symbols.len(),
                last_full_refresh: self.store.last_full_refresh().await,
                scheduler_running: self.scheduler.is_running(),
            },
            backend: self.store.backend_name().to_string(),
            backend_available,
            symbol_preview: symbols.into_iter().take(SYMBOL_PREVIEW_LEN).collect(),
            metrics: self.metrics.stats(),
            batch_size: self.refresher.batch_size(),
            universe_size: self.refresher.universe_size(),
            refresh_in_progress: self.refresher.is_running(),
        }
    }

    /// 적중/미스 통계.
    pub fn metrics(&self) -> CacheStats {
        self.metrics.stats()
    }

    /// 모든 항목과 인덱스를 삭제합니다.
    pub async fn clear(&self) -> usize {
        self.store.clear_all().await
    }

    /// 만료된 심볼을 인덱스에서 제거합니다.
    pub async fn prune(&self) -> usize {
        self.store.prune_stale_index_entries().await
    }

    /// 심볼의 항목이 살아있는지 확인합니다.
    pub async fn is_cached(&self, symbol: &str) -> bool {
        match canonical_symbol(symbol) {
            Ok(symbol) => self.store.contains(&symbol).await,
            Err(_) => false,
        }
    }

    /// 스케줄러를 시작합니다.
    pub fn start_scheduler(&self) -> bool {
        self.scheduler.start()
    }

    /// 스케줄러를 중지합니다.
    pub async fn stop_scheduler(&self) {
        self.scheduler.stop().await;
    }

    /// 살아있는 모든 항목의 요약.
    pub async fn export_summary(&self) -> ExportSummary {
        let mut entries = Vec::new();
        for symbol in self.store.list_indexed_symbols().await {
            if let Some(entry) = self.store.get(&symbol).await {
                entries.push(ExportRecord {
                    symbol: entry.symbol,
                    asset_type: entry.asset_type,
                    record_count: entry.summary.record_count,
                    cached_at: entry.cached_at,
                    source: entry.source,
                });
            }
        }

        ExportSummary {
            exported_at: Utc::now(),
            total_symbols: entries.len(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{daily_rows, MockProvider, Reply};
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use stockcache_core::ProviderSettings;

    fn orchestrator(provider: Arc<MockProvider>) -> (Arc<InMemoryCache>, CacheOrchestrator) {
        let backend = Arc::new(InMemoryCache::new());
        let mut config = CacheConfig::default();
        config.universe.stocks = vec!["FPT".to_string(), "VNM".to_string()];
        config.universe.crypto = Vec::new();

        let chain = SourceChain::new(&ProviderSettings::default())
            .with_provider(AssetType::Stock, provider);
        (backend.clone(), CacheOrchestrator::new(backend, chain, &config))
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let provider = Arc::new(
            MockProvider::new("vndirect").reply("FPT", Reply::Rows(daily_rows(&[10.0, 11.0, 12.0]))),
        );
        let (_, cache) = orchestrator(provider.clone());

        let first = cache.lookup("fpt.vn", AssetType::Stock).await.unwrap();
        assert_eq!(first.origin, LookupOrigin::Fetched);
        assert_eq!(first.entry.symbol, "FPT");
        assert_eq!(first.entry.summary.latest_price, dec!(12));

        let second = cache.lookup("FPT", AssetType::Stock).await.unwrap();
        assert_eq!(second.origin, LookupOrigin::Cache);
        assert_eq!(provider.call_count("FPT"), 1);

        let stats = cache.metrics();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!(cache.is_cached("FPT").await);
    }

    #[tokio::test]
    async fn test_get_absent_when_no_data() {
        let provider = Arc::new(MockProvider::new("vndirect"));
        let (_, cache) = orchestrator(provider);

        assert!(cache.get("ZZZ", AssetType::Stock).await.is_none());
        assert!(cache.get("", AssetType::Stock).await.is_none());
        assert!(!cache.is_cached("ZZZ").await);
    }

    #[tokio::test]
    async fn test_unavailable_backend_still_serves_fetches() {
        let provider = Arc::new(
            MockProvider::new("vndirect").reply("FPT", Reply::Rows(daily_rows(&[10.0]))),
        );
        let (backend, cache) = orchestrator(provider);
        backend.set_available(false);

        assert!(cache.get("FPT", AssetType::Stock).await.is_some());
        assert_eq!(cache.clear().await, 0);

        let status = cache.cache_status().await;
        assert!(!status.backend_available);
        assert_eq!(status.refresh.indexed_symbol_count, 0);
    }

    #[tokio::test]
    async fn test_status_and_export() {
        let provider = Arc::new(
            MockProvider::new("vndirect").default_reply(Reply::Rows(daily_rows(&[10.0, 11.0]))),
        );
        let (_, cache) = orchestrator(provider);

        let report = cache.refresh_all(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.success_count(AssetType::Stock), 2);

        let status = cache.cache_status().await;
        assert_eq!(status.backend, "memory");
        assert!(status.backend_available);
        assert_eq!(status.refresh.indexed_symbol_count, 2);
        assert!(status.refresh.last_full_refresh.is_some());
        assert_eq!(status.symbol_preview, vec!["FPT", "VNM"]);
        assert_eq!(status.universe_size, 2);
        assert_eq!(status.batch_size, 50);
        assert!(!status.refresh_in_progress);

        let export = cache.export_summary().await;
        assert_eq!(export.total_symbols, 2);
        assert_eq!(export.entries[0].record_count, 2);
        assert_eq!(export.entries[0].source, "vndirect");

        assert_eq!(cache.clear().await, 2);
        assert_eq!(cache.refresh_status().await.indexed_symbol_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_after_expiry() {
        let provider = Arc::new(
            MockProvider::new("vndirect").reply("FPT", Reply::Rows(daily_rows(&[10.0]))),
        );
        let (_, cache) = orchestrator(provider);

        cache.get("FPT", AssetType::Stock).await;
        tokio::time::advance(Duration::from_secs(3601)).await;

        assert!(!cache.is_cached("FPT").await);
        assert_eq!(cache.prune().await, 1);
        assert_eq!(cache.refresh_status().await.indexed_symbol_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_lifecycle() {
        let (_, cache) = orchestrator(Arc::new(MockProvider::new("vndirect")));

        assert!(cache.start_scheduler());
        assert!(cache.refresh_status().await.scheduler_running);
        cache.stop_scheduler().await;
        assert!(!cache.refresh_status().await.scheduler_running);
    }
}
