//! 캐시 조회 명령 (status, list, check, export).

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use stockcache_core::{canonical_symbol, UniverseSettings};
use stockcache_data::CacheOrchestrator;
use tracing::info;

/// 캐시 상태를 JSON으로 출력합니다.
pub async fn status(cache: &CacheOrchestrator) -> Result<()> {
    let status = cache.cache_status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// 유니버스 기준으로 나눈 심볼 목록.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct SymbolGroups {
    pub stocks: Vec<String>,
    pub crypto: Vec<String>,
    /// 유니버스에 없는 심볼 (단건 조회로 캐시된 것)
    pub other: Vec<String>,
}

/// 인덱스 심볼을 설정된 유니버스에 따라 분류합니다.
pub fn group_by_universe(symbols: &BTreeSet<String>, universe: &UniverseSettings) -> SymbolGroups {
    let stocks: BTreeSet<String> = universe
        .stocks
        .iter()
        .filter_map(|s| canonical_symbol(s).ok())
        .collect();
    let crypto: BTreeSet<String> = universe
        .crypto
        .iter()
        .filter_map(|s| canonical_symbol(s).ok())
        .collect();

    let mut groups = SymbolGroups::default();
    for symbol in symbols {
        if stocks.contains(symbol) {
            groups.stocks.push(symbol.clone());
        } else if crypto.contains(symbol) {
            groups.crypto.push(symbol.clone());
        } else {
            groups.other.push(symbol.clone());
        }
    }
    groups
}

/// 캐시된 심볼 목록을 출력합니다.
pub async fn list(cache: &CacheOrchestrator, universe: &UniverseSettings) {
    let symbols = cache.store().list_indexed_symbols().await;
    let groups = group_by_universe(&symbols, universe);

    println!("캐시된 심볼: {}개", symbols.len());
    println!("  주식 ({}): {}", groups.stocks.len(), groups.stocks.join(", "));
    println!("  암호화폐 ({}): {}", groups.crypto.len(), groups.crypto.join(", "));
    if !groups.other.is_empty() {
        println!("  기타 ({}): {}", groups.other.len(), groups.other.join(", "));
    }
}

/// 심볼의 인덱스 등록 여부와 항목 정보를 출력합니다.
pub async fn check(cache: &CacheOrchestrator, symbol: &str) -> Result<()> {
    let symbol = canonical_symbol(symbol)?;
    let indexed = cache.store().is_indexed(&symbol).await;

    println!("{}", symbol);
    println!("  인덱스 등록: {}", if indexed { "yes" } else { "no" });

    match cache.store().get(&symbol).await {
        Some(entry) => {
            let range = match (
                entry.bars.first().and_then(|b| b.open_time()),
                entry.latest_bar().and_then(|b| b.open_time()),
            ) {
                (Some(start), Some(end)) => {
                    format!("{} ~ {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
                }
                _ => "-".to_string(),
            };

            println!("  자산 유형: {}", entry.asset_type);
            println!("  소스: {}", entry.source);
            println!("  바 개수: {}", entry.summary.record_count);
            println!("  기간: {}", range);
            println!(
                "  최신가: {} {} ({}%)",
                entry.summary.latest_price, entry.quote_currency, entry.summary.price_change_percent
            );
            println!("  캐시 시각: {}", entry.cached_at.to_rfc3339());
            println!("  만료 예정: {}", entry.expires_at().to_rfc3339());
        }
        None => println!("  캐시 항목 없음"),
    }

    Ok(())
}

/// 살아있는 항목의 요약을 JSON 파일로 저장합니다.
pub async fn export(cache: &CacheOrchestrator, path: &Path) -> Result<()> {
    let summary = cache.export_summary().await;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("디렉토리 생성 실패: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(&summary)?;
    let mut file =
        File::create(path).with_context(|| format!("파일 생성 실패: {}", path.display()))?;
    file.write_all(json.as_bytes())?;

    info!(
        path = %path.display(),
        total_symbols = summary.total_symbols,
        "캐시 요약 저장 완료"
    );
    println!("{}개 심볼 요약 저장: {}", summary.total_symbols, path.display());
    Ok(())
}
