//! VNDirect 차트 API 데이터 소스.
//!
//! HOSE/HNX/UPCOM 종목의 일봉을 조회합니다. 가격은 천 동 단위로 제공되므로
//! 설정된 배율(기본 1000)을 곱해 동 단위로 반환합니다.
//!
//! 응답 형식 (TradingView UDF):
//!
//! ```json
//! {"s":"ok","t":[1704153600],"o":[95.1],"h":[96.0],"l":[94.8],"c":[95.5],"v":[1200300]}
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use stockcache_core::{AssetType, ProviderSettings};
use tracing::{debug, warn};

use super::{PriceProvider, RawRow, RawSeries, RawTimestamp};
use crate::error::{DataError, Result};

/// 차트 히스토리 경로.
const HISTORY_PATH: &str = "/dchart/history";

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    /// 상태 ("ok", "no_data", "error")
    #[serde(default)]
    s: String,
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    o: Vec<Option<f64>>,
    #[serde(default)]
    h: Vec<Option<f64>>,
    #[serde(default)]
    l: Vec<Option<f64>>,
    #[serde(default)]
    c: Vec<Option<f64>>,
    #[serde(default)]
    v: Vec<Option<f64>>,
    /// 오류 메시지
    #[serde(default, rename = "errmsg")]
    error_message: Option<String>,
}

/// VNDirect 데이터 소스.
pub struct VnDirectProvider {
    client: reqwest::Client,
    base_url: String,
    price_scale: f64,
}

impl VnDirectProvider {
    /// 설정으로 생성합니다.
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .timeout(settings.request_timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DataError::Config(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.vndirect_base_url.trim_end_matches('/').to_string(),
            price_scale: settings.vndirect_price_scale,
        })
    }

    fn scale(&self, value: Option<f64>) -> Option<f64> {
        value.map(|v| v * self.price_scale)
    }

    fn parse_rows(&self, symbol: &str, response: HistoryResponse) -> Result<Vec<RawRow>> {
        match response.s.as_str() {
            "ok" => {}
            "no_data" => return Ok(Vec::new()),
            other => {
                return Err(DataError::Fetch(format!(
                    "VNDirect 응답 오류 ({}): status={} {}",
                    symbol,
                    other,
                    response.error_message.unwrap_or_default()
                )))
            }
        }

        let len = response.t.len();
        if [&response.o, &response.h, &response.l, &response.c]
            .iter()
            .any(|column| column.len() != len)
        {
            return Err(DataError::Parse(format!(
                "VNDirect 응답 컬럼 길이 불일치 ({})",
                symbol
            )));
        }

        let rows = response
            .t
            .iter()
            .enumerate()
            .map(|(i, &ts)| {
                let mut row = RawRow::new(RawTimestamp::Seconds(ts));
                let prices = [
                    ("o", self.scale(response.o[i])),
                    ("h", self.scale(response.h[i])),
                    ("l", self.scale(response.l[i])),
                    ("c", self.scale(response.c[i])),
                    ("v", response.v.get(i).copied().flatten()),
                ];
                for (name, value) in prices {
                    if let Some(value) = value {
                        row.fields.insert(name.to_string(), value);
                    }
                }
                row
            })
            .collect();

        Ok(rows)
    }
}

#[async_trait]
impl PriceProvider for VnDirectProvider {
    fn id(&self) -> &'static str {
        "vndirect"
    }

    fn source_symbol(&self, symbol: &str, _asset_type: AssetType) -> String {
        symbol.to_uppercase()
    }

    async fn fetch(
        &self,
        symbol: &str,
        asset_type: AssetType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries> {
        if asset_type != AssetType::Stock {
            return Err(DataError::Unsupported(format!(
                "VNDirect는 주식만 지원합니다: {}",
                symbol
            )));
        }

        let source_symbol = self.source_symbol(symbol, asset_type);
        let from = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp());
        let to = end.and_hms_opt(23, 59, 59).map(|t| t.and_utc().timestamp());
        let (Some(from), Some(to)) = (from, to) else {
            return Err(DataError::Parse(format!("잘못된 조회 구간: {} ~ {}", start, end)));
        };

        debug!(symbol = %source_symbol, start = %start, end = %end, "VNDirect 일봉 조회");

        let url = format!("{}{}", self.base_url, HISTORY_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("resolution", "D".to_string()),
                ("symbol", source_symbol.clone()),
                ("from", from.to_string()),
                ("to", to.to_string()),
            ])
            .send()
            .await
            .map_err(|e| DataError::Fetch(format!("VNDirect API 호출 실패: {}", e)))?;

        if !response.status().is_success() {
            return Err(DataError::Fetch(format!(
                "VNDirect API 응답 오류 ({}): {}",
                source_symbol,
                response.status()
            )));
        }

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|e| DataError::Parse(format!("VNDirect 응답 파싱 실패: {}", e)))?;

        let rows = self.parse_rows(&source_symbol, body)?;
        if rows.is_empty() {
            warn!(symbol = %source_symbol, "VNDirect 데이터 없음");
        } else {
            debug!(symbol = %source_symbol, count = rows.len(), "VNDirect 일봉 수신");
        }

        Ok(RawSeries::new(rows, "VND"))
    }
}
