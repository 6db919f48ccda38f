//! 시세 캐시 관리 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 캐시 상태 확인
//! stockcache status
//!
//! # 전체 심볼 갱신 (Ctrl-C로 배치 사이에서 중단)
//! stockcache refresh
//!
//! # 단일 심볼 조회 (캐시 미스면 소스에서 가져옴)
//! stockcache fetch BTC --asset-type crypto
//!
//! # 스케줄러 실행
//! stockcache --config config/cache.toml daemon --warmup
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stockcache_core::{init_logging, AssetType, CacheConfig, LogConfig, LogFormat};
use stockcache_data::CacheOrchestrator;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "stockcache")]
#[command(about = "Market data cache admin CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로 (TOML). 없으면 환경 변수만 사용
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// 로그 형식 (pretty, json, compact)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 캐시 상태 출력
    Status,

    /// 캐시된 심볼 목록 (주식/암호화폐 구분)
    List,

    /// 심볼의 캐시 여부와 항목 정보 확인
    Check {
        /// 심볼 (예: FPT, BTC)
        symbol: String,
    },

    /// 전체 심볼 갱신
    Refresh,

    /// 모든 캐시 항목과 인덱스 삭제
    Clear,

    /// 캐시를 통해 심볼 조회
    Fetch {
        /// 심볼 (예: FPT, BTC)
        symbol: String,

        /// 자산 유형 (stock, crypto)
        #[arg(short, long, default_value = "stock")]
        asset_type: AssetType,
    },

    /// 캐시 요약을 JSON 파일로 저장
    Export {
        /// 출력 파일 경로
        file: PathBuf,
    },

    /// 만료된 심볼을 인덱스에서 제거
    Prune,

    /// 데몬 모드: 스케줄러 실행 (Ctrl-C로 종료)
    Daemon {
        /// 시작 시 캐시가 비어있거나 오래됐으면 전체 갱신
        #[arg(long)]
        warmup: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<CacheConfig> {
    match path {
        Some(path) => CacheConfig::load(path)
            .with_context(|| format!("설정 파일 로드 실패: {}", path.display())),
        None => CacheConfig::from_env().context("환경 변수 설정 로드 실패"),
    }
}

fn log_config(cli: &Cli, config: &CacheConfig) -> LogConfig {
    LogConfig::from_settings(&config.logging)
        .with_overrides(cli.log_level.as_deref(), cli.log_format)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    init_logging(&log_config(&cli, &config)).context("로깅 초기화 실패")?;

    tracing::info!(
        backend = ?config.redis.backend,
        universe = config.universe.len(),
        "Stock Cache CLI 시작"
    );

    let cache = CacheOrchestrator::from_config(&config)
        .await
        .context("캐시 초기화 실패")?;

    match cli.command {
        Commands::Status => commands::inspect::status(&cache).await?,
        Commands::List => commands::inspect::list(&cache, &config.universe).await,
        Commands::Check { symbol } => commands::inspect::check(&cache, &symbol).await?,
        Commands::Export { file } => commands::inspect::export(&cache, &file).await?,
        Commands::Refresh => commands::maintain::refresh(&cache).await?,
        Commands::Clear => commands::maintain::clear(&cache).await,
        Commands::Prune => commands::maintain::prune(&cache).await,
        Commands::Fetch { symbol, asset_type } => {
            commands::maintain::fetch(&cache, &symbol, asset_type).await?
        }
        Commands::Daemon { warmup } => commands::daemon::run(&cache, warmup).await?,
    }

    tracing::info!("Stock Cache CLI 종료");
    Ok(())
}
