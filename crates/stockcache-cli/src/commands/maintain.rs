//! 캐시 변경 명령 (refresh, clear, prune, fetch).

use anyhow::{bail, Context, Result};
use stockcache_core::AssetType;
use stockcache_data::{CacheOrchestrator, LookupOrigin};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Ctrl-C 입력 시 토큰을 취소하는 감시 태스크를 띄웁니다.
pub(crate) fn cancel_on_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("종료 신호 수신, 진행 중인 배치 후 중단");
            cancel.cancel();
        }
    })
}

/// 전체 심볼을 갱신합니다.
pub async fn refresh(cache: &CacheOrchestrator) -> Result<()> {
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());

    let result = cache.refresh_all(&cancel).await;
    watcher.abort();

    let report = result.context("전체 갱신 실패")?;
    report.log_summary();

    println!(
        "갱신 {}: 성공 {}, 실패 {}",
        if report.completed { "완료" } else { "중단" },
        report.total_success(),
        report.total_errors()
    );
    for (asset_type, stats) in &report.by_asset {
        if !stats.failed_symbols.is_empty() {
            println!("  {} 실패: {}", asset_type, stats.failed_symbols.join(", "));
        }
    }
    Ok(())
}

/// 모든 항목과 인덱스를 삭제합니다.
pub async fn clear(cache: &CacheOrchestrator) {
    let deleted = cache.clear().await;
    info!(deleted, "캐시 삭제 완료");
    println!("{}개 항목 삭제", deleted);
}

/// 만료된 심볼을 인덱스에서 제거합니다.
pub async fn prune(cache: &CacheOrchestrator) {
    let removed = cache.prune().await;
    println!("{}개 심볼을 인덱스에서 제거", removed);
}

/// 캐시를 통해 심볼을 조회합니다.
pub async fn fetch(cache: &CacheOrchestrator, symbol: &str, asset_type: AssetType) -> Result<()> {
    let Some(lookup) = cache.lookup(symbol, asset_type).await else {
        bail!("{} ({}) 데이터를 가져오지 못했습니다", symbol, asset_type);
    };

    let entry = &lookup.entry;
    let origin = match lookup.origin {
        LookupOrigin::Cache => "cache",
        LookupOrigin::Fetched => "fetched",
    };

    println!("{} [{}] ({})", entry.symbol, entry.asset_type, origin);
    println!("  소스: {}", entry.source);
    println!("  바 개수: {}", entry.summary.record_count);
    println!(
        "  최신가: {} {} (변동 {}, {}%)",
        entry.summary.latest_price,
        entry.quote_currency,
        entry.summary.price_change,
        entry.summary.price_change_percent
    );
    println!("  시장: {} ({})", entry.market_info.display_name, entry.market_info.timezone);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stockcache_core::{CacheConfig, CacheEntry, ProviderSettings};
    use stockcache_data::{InMemoryCache, SourceChain};

    fn offline_cache() -> CacheOrchestrator {
        CacheOrchestrator::new(
            Arc::new(InMemoryCache::new()),
            SourceChain::new(&ProviderSettings::default()),
            &CacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_fetch_fails_without_sources() {
        let cache = offline_cache();
        assert!(fetch(&cache, "FPT", AssetType::Stock).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_serves_cached_entry() {
        let cache = offline_cache();
        let entry = CacheEntry::new("FPT", AssetType::Stock, Vec::new(), "vndirect", "VND");
        cache.store().set(&entry, std::time::Duration::from_secs(60)).await;

        assert!(fetch(&cache, "fpt", AssetType::Stock).await.is_ok());
        assert_eq!(cache.metrics().hits, 1);
    }

    #[tokio::test]
    async fn test_clear_then_prune() {
        let cache = offline_cache();
        let entry = CacheEntry::new("VNM", AssetType::Stock, Vec::new(), "vndirect", "VND");
        cache.store().set(&entry, std::time::Duration::from_secs(60)).await;

        clear(&cache).await;
        prune(&cache).await;
        assert!(cache.store().list_indexed_symbols().await.is_empty());
    }
}
