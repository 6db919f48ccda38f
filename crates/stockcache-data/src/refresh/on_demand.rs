//! 캐시 미스 시 단일 심볼 조회.
//!
//! 같은 심볼에 대한 동시 요청은 진행 중인 하나의 조회를 공유합니다.
//! 조회가 끝나면 진행 중 목록에서 제거되므로 이후 요청은 캐시를 먼저 보게 됩니다.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use stockcache_core::{AssetType, CacheConfig, CacheEntry, OnDemandSettings};
use tracing::{debug, info, instrument, warn};

use super::batch::lookback_window;
use super::retry::RetryPolicy;
use crate::cache::CacheStore;
use crate::provider::SourceChain;

type InflightKey = (String, AssetType);
type SharedFetch = Shared<BoxFuture<'static, Option<CacheEntry>>>;

struct Inner {
    store: CacheStore,
    chain: Arc<SourceChain>,
    settings: OnDemandSettings,
    retry: RetryPolicy,
    inflight: Mutex<HashMap<InflightKey, SharedFetch>>,
}

impl Inner {
    fn inflight(&self) -> MutexGuard<'_, HashMap<InflightKey, SharedFetch>> {
        // 잠금 구간에서 패닉이 나도 맵 자체는 일관성이 유지됨
        self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fetch_and_store(&self, symbol: &str, asset_type: AssetType) -> Option<CacheEntry> {
        let (start, end) = lookback_window(self.settings.lookback_days);
        let ttl = self.settings.ttl();

        let result = self
            .retry
            .run(symbol, || self.chain.fetch(symbol, asset_type, start, end))
            .await;

        match result {
            Ok(series) => {
                let entry = series.into_entry(symbol, asset_type, ttl);
                if !self.store.set(&entry, ttl).await {
                    warn!(symbol, "온디맨드 조회 결과 캐시 저장 실패");
                }
                info!(symbol, bars = entry.bars.len(), source = %entry.source, "온디맨드 조회 완료");
                Some(entry)
            }
            Err(e) => {
                warn!(symbol, asset_type = %asset_type, error = %e, "온디맨드 조회 실패");
                None
            }
        }
    }
}

/// 단일 심볼 온디맨드 조회기.
#[derive(Clone)]
pub struct OnDemandFetcher {
    inner: Arc<Inner>,
}

impl OnDemandFetcher {
    pub fn new(store: CacheStore, chain: Arc<SourceChain>, config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                chain,
                settings: config.on_demand.clone(),
                retry: RetryPolicy::from(&config.on_demand.retry),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// 온디맨드 캐시 TTL.
    pub fn ttl(&self) -> Duration {
        self.inner.settings.ttl()
    }

    /// 진행 중인 조회 수.
    pub fn in_flight(&self) -> usize {
        self.inner.inflight().len()
    }

    /// 소스 체인에서 조회하고 캐시에 저장합니다.
    ///
    /// 모든 소스가 실패하면 `None`을 반환합니다.
    #[instrument(skip(self))]
    pub async fn fetch_single(&self, symbol: &str, asset_type: AssetType) -> Option<CacheEntry> {
        let key: InflightKey = (symbol.to_string(), asset_type);

        let fetch = {
            let mut inflight = self.inner.inflight();
            match inflight.get(&key) {
                Some(existing) => {
                    debug!("진행 중인 조회에 합류");
                    existing.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let owned_key = key.clone();
                    let fetch = async move {
                        let result = inner.fetch_and_store(&owned_key.0, owned_key.1).await;
                        inner.inflight().remove(&owned_key);
                        result
                    }
                    .boxed()
                    .shared();

                    inflight.insert(key, fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }
}
