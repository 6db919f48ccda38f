//! 일괄 갱신 통계.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use stockcache_core::AssetType;

/// 자산 유형별 갱신 통계.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStats {
    /// 대상 심볼 수
    pub total: usize,
    /// 캐시 저장 성공 수
    pub success: usize,
    /// 조회 실패 수 (일괄 응답 누락 포함)
    pub errors: usize,
    /// 조회는 성공했으나 캐시 저장 실패
    pub store_failures: usize,
    /// 저장된 총 바 수
    pub total_bars: usize,
    /// 실패한 심볼
    pub failed_symbols: Vec<String>,
}

impl RefreshStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success as f64 / self.total as f64) * 100.0
        }
    }
}

/// 한 번의 일괄 갱신 결과.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// 자산 유형별 통계
    pub by_asset: BTreeMap<AssetType, RefreshStats>,
    /// 모든 배치를 끝까지 처리했는지 (취소 시 false)
    pub completed: bool,
    /// 완료 시각 기록 여부
    pub marker_written: bool,
    pub started_at: Option<DateTime<Utc>>,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RefreshReport {
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// 자산 유형의 통계 (없으면 생성).
    pub fn stats_mut(&mut self, asset_type: AssetType) -> &mut RefreshStats {
        self.by_asset.entry(asset_type).or_default()
    }

    /// 자산 유형의 성공 수.
    pub fn success_count(&self, asset_type: AssetType) -> usize {
        self.by_asset.get(&asset_type).map_or(0, |s| s.success)
    }

    /// 전체 성공 수.
    pub fn total_success(&self) -> usize {
        self.by_asset.values().map(|s| s.success).sum()
    }

    /// 전체 실패 수.
    pub fn total_errors(&self) -> usize {
        self.by_asset.values().map(|s| s.errors + s.store_failures).sum()
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self) {
        for (asset_type, stats) in &self.by_asset {
            tracing::info!(
                asset_type = %asset_type,
                total = stats.total,
                success = stats.success,
                errors = stats.errors,
                store_failures = stats.store_failures,
                total_bars = stats.total_bars,
                success_rate = format!("{:.1}%", stats.success_rate()),
                "자산 유형별 갱신 결과"
            );
        }
        tracing::info!(
            completed = self.completed,
            marker_written = self.marker_written,
            success = self.total_success(),
            errors = self.total_errors(),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "일괄 갱신 완료"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_totals() {
        let mut report = RefreshReport::new();
        {
            let stocks = report.stats_mut(AssetType::Stock);
            stocks.total = 4;
            stocks.success = 3;
            stocks.errors = 1;
        }
        report.stats_mut(AssetType::Crypto).success = 2;

        assert_eq!(report.success_count(AssetType::Stock), 3);
        assert_eq!(report.total_success(), 5);
        assert_eq!(report.total_errors(), 1);
        assert_eq!(report.by_asset[&AssetType::Stock].success_rate(), 75.0);
    }
}
