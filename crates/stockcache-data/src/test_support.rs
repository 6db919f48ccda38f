//! 단위 테스트용 가짜 데이터 소스.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockcache_core::AssetType;

use crate::error::{DataError, Result};
use crate::provider::{
    BatchResponse, PriceProvider, RawRow, RawSeries, RawTimestamp, SpotRateProvider,
};

/// 종가 목록으로 하루 간격의 행을 만듭니다.
pub fn daily_rows(closes: &[f64]) -> Vec<RawRow> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            RawRow::new(RawTimestamp::Seconds(1_704_067_200 + i as i64 * 86_400))
                .with("open", close)
                .with("high", close)
                .with("low", close)
                .with("close", close)
                .with("volume", 1_000.0)
        })
        .collect()
}

/// 심볼별 응답.
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<RawRow>),
    Empty,
    Fail,
    /// 처음 n번 실패 후 행 반환
    FailTimes(usize, Vec<RawRow>),
}

/// 호출 기록이 남는 가짜 소스.
pub struct MockProvider {
    id: &'static str,
    currency: &'static str,
    replies: Mutex<HashMap<String, Reply>>,
    default_reply: Reply,
    calls: Mutex<Vec<String>>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
    delay: Option<Duration>,
    batch: bool,
    batch_failures: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            currency: "VND",
            replies: Mutex::new(HashMap::new()),
            default_reply: Reply::Empty,
            calls: Mutex::new(Vec::new()),
            journal: None,
            delay: None,
            batch: false,
            batch_failures: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    pub fn currency(mut self, currency: &'static str) -> Self {
        self.currency = currency;
        self
    }

    pub fn reply(self, symbol: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(symbol.to_string(), reply);
        self
    }

    pub fn default_reply(mut self, reply: Reply) -> Self {
        self.default_reply = reply;
        self
    }

    pub fn journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 일괄 조회를 지원하며 처음 `failures`번의 일괄 요청은 통째로 실패합니다.
    pub fn batch(mut self, failures: usize) -> Self {
        self.batch = true;
        self.batch_failures = AtomicUsize::new(failures);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, symbol: &str) -> usize {
        self.calls().iter().filter(|s| *s == symbol).count()
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self, symbol: &str) -> Result<RawSeries> {
        let mut replies = self.replies.lock().unwrap();
        let reply = replies
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| self.default_reply.clone());

        match reply {
            Reply::Rows(rows) => Ok(RawSeries::new(rows, self.currency)),
            Reply::Empty => Ok(RawSeries::new(Vec::new(), self.currency)),
            Reply::Fail => Err(DataError::Fetch(format!("{} down", self.id))),
            Reply::FailTimes(0, rows) => Ok(RawSeries::new(rows, self.currency)),
            Reply::FailTimes(n, rows) => {
                replies.insert(symbol.to_string(), Reply::FailTimes(n - 1, rows));
                Err(DataError::Fetch(format!("{} flaky", self.id)))
            }
        }
    }
}

#[async_trait]
impl PriceProvider for MockProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn source_symbol(&self, symbol: &str, _asset_type: AssetType) -> String {
        symbol.to_string()
    }

    async fn fetch(
        &self,
        symbol: &str,
        _asset_type: AssetType,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<RawSeries> {
        self.calls.lock().unwrap().push(symbol.to_string());
        if let Some(journal) = &self.journal {
            journal
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.id, symbol));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_reply(symbol)
    }

    fn supports_batch(&self) -> bool {
        self.batch
    }

    async fn fetch_batch(
        &self,
        symbols: &[String],
        _asset_type: AssetType,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<BatchResponse> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.batch_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.batch_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DataError::Fetch(format!("{} batch down", self.id)));
        }

        let mut response = BatchResponse::new();
        for symbol in symbols {
            let reply = self.replies.lock().unwrap().get(symbol).cloned();
            // 응답에 없는 심볼은 키 자체를 생략
            match reply {
                Some(Reply::Rows(rows)) => {
                    response.insert(symbol.clone(), Ok(RawSeries::new(rows, self.currency)));
                }
                Some(Reply::Fail) => {
                    response.insert(symbol.clone(), Err(DataError::Fetch("symbol failed".into())));
                }
                _ => {}
            }
        }
        Ok(response)
    }
}

/// 고정 환율 또는 실패를 반환하는 가짜 환율 소스.
pub struct MockSpotRate {
    rate: Option<f64>,
    calls: AtomicUsize,
}

impl MockSpotRate {
    pub fn fixed(rate: f64) -> Self {
        Self {
            rate: Some(rate),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            rate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpotRateProvider for MockSpotRate {
    async fn rate(&self, pair: &str) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rate
            .ok_or_else(|| DataError::Fetch(format!("no rate for {}", pair)))
    }
}
