//! 심볼 단위 캐시 저장소.
//!
//! 백엔드 위에 다음 키 구성을 유지합니다:
//!
//! | 키 | 값 | TTL |
//! |---|---|---|
//! | `stock:{SYMBOL}` | JSON `CacheEntry` | 갱신 경로별 TTL |
//! | `cached_symbols` | 심볼 집합 | 없음 |
//! | `last_full_fetch` | RFC 3339 시각 | 없음 |
//! | `last_full_fetch_symbols` | 마지막 전체 갱신 성공 심볼 수 | 없음 |
//!
//! 백엔드 장애는 호출자에게 전파하지 않습니다. 조회는 없음, 쓰기는 `false`,
//! 목록은 빈 값으로 처리하고 경고만 남깁니다.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use stockcache_core::CacheEntry;
use tracing::{debug, info, instrument, warn};

use crate::storage::CacheBackend;

/// 캐시된 심볼 인덱스 키.
pub const CACHED_SYMBOLS_KEY: &str = "cached_symbols";

/// 마지막 전체 갱신 시각 키.
pub const LAST_FULL_FETCH_KEY: &str = "last_full_fetch";

/// 마지막 전체 갱신 성공 심볼 수 키.
pub const LAST_FULL_FETCH_COUNT_KEY: &str = "last_full_fetch_symbols";

/// 심볼 항목 키.
pub fn entry_key(symbol: &str) -> String {
    format!("stock:{}", symbol)
}

/// TTL 캐시 저장소 + 심볼 인덱스.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// 백엔드 이름.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// 백엔드 연결 가능 여부 (PING).
    pub async fn is_available(&self) -> bool {
        match self.backend.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "캐시 저장소 연결 불가");
                false
            }
        }
    }

    /// 캐시 항목을 조회합니다.
    ///
    /// 디코딩할 수 없는 값은 없는 것으로 처리합니다.
    #[instrument(skip(self))]
    pub async fn get(&self, symbol: &str) -> Option<CacheEntry> {
        let payload = match self.backend.get(&entry_key(symbol)).await {
            Ok(payload) => payload?,
            Err(e) => {
                warn!(symbol, error = %e, "캐시 조회 실패");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&payload) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(symbol, error = %e, "캐시 항목 디코딩 실패");
                None
            }
        }
    }

    /// 캐시 항목을 저장하고 인덱스에 추가합니다.
    ///
    /// 기존 항목은 통째로 교체됩니다.
    #[instrument(skip(self, entry), fields(symbol = %entry.symbol, bars = entry.bars.len()))]
    pub async fn set(&self, entry: &CacheEntry, ttl: Duration) -> bool {
        let payload = match serde_json::to_string(entry) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "캐시 항목 직렬화 실패");
                return false;
            }
        };

        if let Err(e) = self
            .backend
            .set(&entry_key(&entry.symbol), &payload, Some(ttl))
            .await
        {
            warn!(error = %e, "캐시 저장 실패");
            return false;
        }

        if let Err(e) = self.backend.set_add(CACHED_SYMBOLS_KEY, &entry.symbol).await {
            warn!(error = %e, "캐시 인덱스 추가 실패");
            return false;
        }

        debug!(ttl_secs = ttl.as_secs(), "캐시 저장 완료");
        true
    }

    /// 항목이 살아있는지 확인합니다.
    pub async fn contains(&self, symbol: &str) -> bool {
        match self.backend.exists(&entry_key(symbol)).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(symbol, error = %e, "캐시 존재 확인 실패");
                false
            }
        }
    }

    /// 인덱스에 등록된 심볼 목록.
    pub async fn list_indexed_symbols(&self) -> BTreeSet<String> {
        match self.backend.set_members(CACHED_SYMBOLS_KEY).await {
            Ok(members) => members.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "캐시 인덱스 조회 실패");
                BTreeSet::new()
            }
        }
    }

    /// 인덱스 등록 여부.
    pub async fn is_indexed(&self, symbol: &str) -> bool {
        self.list_indexed_symbols().await.contains(symbol)
    }

    /// 인덱스의 모든 항목과 인덱스 자체를 삭제합니다.
    ///
    /// 개별 삭제 실패는 기록하고 계속 진행합니다. 삭제된 항목 수를 반환합니다.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> usize {
        let symbols = self.list_indexed_symbols().await;
        let mut deleted = 0;

        for symbol in &symbols {
            match self.backend.delete(&[entry_key(symbol)]).await {
                Ok(n) => deleted += n,
                Err(e) => warn!(symbol = %symbol, error = %e, "캐시 항목 삭제 실패"),
            }
        }

        if let Err(e) = self
            .backend
            .delete(&[CACHED_SYMBOLS_KEY.to_string()])
            .await
        {
            warn!(error = %e, "캐시 인덱스 삭제 실패");
        }

        info!(indexed = symbols.len(), deleted, "캐시 전체 삭제");
        deleted
    }

    /// 항목이 만료된 심볼을 인덱스에서 제거합니다.
    ///
    /// 제거된 심볼 수를 반환합니다.
    #[instrument(skip(self))]
    pub async fn prune_stale_index_entries(&self) -> usize {
        let symbols = self.list_indexed_symbols().await;
        let mut stale = Vec::new();

        for symbol in symbols {
            match self.backend.exists(&entry_key(&symbol)).await {
                Ok(false) => stale.push(symbol),
                Ok(true) => {}
                Err(e) => {
                    // 확인할 수 없는 심볼은 남겨둠
                    warn!(symbol = %symbol, error = %e, "캐시 존재 확인 실패");
                }
            }
        }

        if stale.is_empty() {
            return 0;
        }

        match self.backend.set_remove(CACHED_SYMBOLS_KEY, &stale).await {
            Ok(removed) => {
                info!(removed, "만료된 심볼 인덱스 정리");
                removed
            }
            Err(e) => {
                warn!(error = %e, "캐시 인덱스 정리 실패");
                0
            }
        }
    }

    /// 마지막 전체 갱신 시각을 조회합니다.
    pub async fn last_full_refresh(&self) -> Option<DateTime<Utc>> {
        let raw = match self.backend.get(LAST_FULL_FETCH_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "마지막 갱신 시각 조회 실패");
                return None;
            }
        };

        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                warn!(value = %raw, error = %e, "마지막 갱신 시각 파싱 실패");
                None
            }
        }
    }

    /// 마지막 전체 갱신 시각을 기록합니다.
    pub async fn set_last_full_refresh(&self, at: DateTime<Utc>) -> bool {
        match self
            .backend
            .set(LAST_FULL_FETCH_KEY, &at.to_rfc3339(), None)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "마지막 갱신 시각 기록 실패");
                false
            }
        }
    }

    /// 마지막 전체 갱신에서 저장에 성공한 심볼 수.
    pub async fn last_full_refresh_count(&self) -> Option<usize> {
        match self.backend.get(LAST_FULL_FETCH_COUNT_KEY).await {
            Ok(raw) => raw?.trim().parse().ok(),
            Err(e) => {
                warn!(error = %e, "마지막 갱신 심볼 수 조회 실패");
                None
            }
        }
    }

    /// 마지막 전체 갱신 성공 심볼 수를 기록합니다.
    pub async fn set_last_full_refresh_count(&self, count: usize) -> bool {
        match self
            .backend
            .set(LAST_FULL_FETCH_COUNT_KEY, &count.to_string(), None)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "마지막 갱신 심볼 수 기록 실패");
                false
            }
        }
    }
}
