//! 주기 작업 스케줄러.
//!
//! - 인덱스 정리: `prune_interval`마다 만료된 심볼을 인덱스에서 제거 (조회 없음)
//! - 일괄 갱신 (선택): `refresh_interval`이 설정된 경우에만 실행
//!
//! 두 작업은 독립적이며 같은 취소 토큰으로 함께 종료됩니다.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use stockcache_core::SchedulerSettings;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::batch::BatchRefresher;
use crate::cache::CacheStore;
use crate::error::DataError;

struct Running {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// 캐시 유지보수 스케줄러.
pub struct CacheScheduler {
    store: CacheStore,
    refresher: Arc<BatchRefresher>,
    settings: SchedulerSettings,
    running: Mutex<Option<Running>>,
}

impl CacheScheduler {
    pub fn new(store: CacheStore, refresher: Arc<BatchRefresher>, settings: SchedulerSettings) -> Self {
        Self {
            store,
            refresher,
            settings,
            running: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 실행 중인지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.state().is_some()
    }

    /// 작업을 시작합니다. 이미 실행 중이면 `false`를 반환합니다.
    pub fn start(&self) -> bool {
        let mut state = self.state();
        if state.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let mut tasks = vec![spawn_prune_job(
            self.store.clone(),
            self.settings.prune_interval(),
            token.clone(),
        )];

        match self.settings.refresh_interval() {
            Some(period) => tasks.push(spawn_refresh_job(
                self.refresher.clone(),
                period,
                token.clone(),
            )),
            None => info!("자동 일괄 갱신 비활성화"),
        }

        info!(
            prune_interval_secs = self.settings.prune_interval_secs,
            refresh_interval_secs = ?self.settings.refresh_interval_secs,
            "스케줄러 시작"
        );

        *state = Some(Running { token, tasks });
        true
    }

    /// 작업을 중지하고 종료될 때까지 기다립니다.
    pub async fn stop(&self) {
        let Some(running) = self.state().take() else {
            return;
        };

        running.token.cancel();
        for task in running.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "스케줄러 작업 비정상 종료");
            }
        }
        info!("스케줄러 중지");
    }
}

/// 기간이 0이면 tokio interval이 패닉하므로 최소 1초로 보정.
fn period_or_min(period: Duration) -> Duration {
    period.max(Duration::from_secs(1))
}

fn spawn_prune_job(store: CacheStore, period: Duration, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = period_or_min(period);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let pruned = store.prune_stale_index_entries().await;
                    info!(pruned, "정기 인덱스 정리 완료");
                }
                _ = token.cancelled() => break,
            }
        }
    })
}

fn spawn_refresh_job(
    refresher: Arc<BatchRefresher>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = period_or_min(period);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match refresher.refresh_all(&token).await {
                        Ok(report) => info!(
                            success = report.total_success(),
                            completed = report.completed,
                            "정기 일괄 갱신 완료"
                        ),
                        Err(DataError::RefreshInProgress) => {
                            info!("다른 일괄 갱신이 진행 중, 이번 주기 건너뜀");
                        }
                        Err(e) => error!(error = %e, "정기 일괄 갱신 실패"),
                    }
                }
                _ = token.cancelled() => break,
            }
        }
    })
}
