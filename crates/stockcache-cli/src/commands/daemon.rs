//! 데몬 모드.

use super::maintain::cancel_on_ctrl_c;
use anyhow::Result;
use stockcache_data::{CacheOrchestrator, DataError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 스케줄러를 시작하고 종료 신호까지 대기합니다.
///
/// `warmup`이면 시작 직후 캐시 상태를 보고 필요할 때 전체 갱신합니다.
pub async fn run(cache: &CacheOrchestrator, warmup: bool) -> Result<()> {
    info!("=== 데몬 모드 시작 ===");

    if !cache.start_scheduler() {
        warn!("스케줄러가 이미 실행 중");
    }

    if warmup {
        let cancel = CancellationToken::new();
        let watcher = cancel_on_ctrl_c(cancel.clone());

        match cache.initial_fetch_if_needed(&cancel).await {
            Ok(Some(report)) => report.log_summary(),
            Ok(None) => info!("캐시가 충분히 최신이라 초기 갱신 생략"),
            Err(DataError::RefreshInProgress) => warn!("다른 갱신이 진행 중이라 초기 갱신 생략"),
            Err(e) => error!(error = %e, "초기 갱신 실패"),
        }

        watcher.abort();
        if cancel.is_cancelled() {
            cache.stop_scheduler().await;
            info!("데몬 종료");
            return Ok(());
        }
    }

    let status = cache.refresh_status().await;
    info!(
        indexed = status.indexed_symbol_count,
        last_full_refresh = ?status.last_full_refresh,
        "스케줄러 실행 중, Ctrl-C로 종료"
    );

    tokio::signal::ctrl_c().await?;
    info!("종료 신호 수신, 데몬 종료 중...");

    cache.stop_scheduler().await;
    info!("데몬 종료");
    Ok(())
}
