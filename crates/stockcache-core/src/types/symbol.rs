//! 자산 유형 및 canonical 심볼 정의.
//!
//! 이 모듈은 캐시 키로 사용되는 심볼 관련 타입을 정의합니다:
//! - `AssetType` - 자산 유형 (주식, 암호화폐)
//! - `canonical_symbol` - 데이터 소스별 접미사를 제거한 대문자 심볼

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 자산 유형 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// 베트남 상장 주식 (HOSE, HNX, UPCOM)
    Stock,
    /// 암호화폐
    Crypto,
}

impl AssetType {
    /// 모든 자산 유형 반환 (일괄 갱신 순서).
    pub fn all() -> [AssetType; 2] {
        [AssetType::Stock, AssetType::Crypto]
    }

    /// 문자열 표현.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Stock => "stock",
            AssetType::Crypto => "crypto",
        }
    }
}

impl Default for AssetType {
    fn default() -> Self {
        Self::Stock
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stock" | "equity" => Ok(Self::Stock),
            "crypto" => Ok(Self::Crypto),
            other => Err(CoreError::InvalidInput(format!(
                "알 수 없는 자산 유형: {}",
                other
            ))),
        }
    }
}

/// 데이터 소스 심볼 접미사.
///
/// Yahoo Finance의 `.VN`, 암호화폐 통화쌍 `-USD` 등은 캐시 키에서 제거됩니다.
const PROVIDER_SUFFIXES: &[&str] = &[".VN", ".HM", ".HN", "-USD", "-USDT", "-VND"];

/// canonical 심볼로 변환.
///
/// 앞뒤 공백을 제거하고 대문자로 바꾼 뒤 데이터 소스 접미사를 제거합니다.
///
/// # 예제
///
/// ```
/// use stockcache_core::canonical_symbol;
///
/// assert_eq!(canonical_symbol(" vcb.vn ").unwrap(), "VCB");
/// assert_eq!(canonical_symbol("btc-usd").unwrap(), "BTC");
/// ```
pub fn canonical_symbol(raw: &str) -> CoreResult<String> {
    let mut symbol = raw.trim().to_uppercase();

    for suffix in PROVIDER_SUFFIXES {
        if let Some(stripped) = symbol.strip_suffix(suffix) {
            if !stripped.is_empty() {
                symbol = stripped.to_string();
                break;
            }
        }
    }

    if symbol.is_empty() {
        return Err(CoreError::InvalidInput("빈 심볼".to_string()));
    }

    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(CoreError::InvalidInput(format!(
            "허용되지 않는 문자가 포함된 심볼: {}",
            raw
        )));
    }

    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_type_from_str() {
        assert_eq!("stock".parse::<AssetType>().unwrap(), AssetType::Stock);
        assert_eq!("CRYPTO".parse::<AssetType>().unwrap(), AssetType::Crypto);
        assert_eq!("equity".parse::<AssetType>().unwrap(), AssetType::Stock);
        assert!("forex".parse::<AssetType>().is_err());
    }

    #[test]
    fn test_asset_type_serde() {
        let json = serde_json::to_string(&AssetType::Crypto).unwrap();
        assert_eq!(json, "\"crypto\"");
        let parsed: AssetType = serde_json::from_str("\"stock\"").unwrap();
        assert_eq!(parsed, AssetType::Stock);
    }

    #[test]
    fn test_canonical_symbol_strips_suffixes() {
        assert_eq!(canonical_symbol("fpt").unwrap(), "FPT");
        assert_eq!(canonical_symbol("FPT.VN").unwrap(), "FPT");
        assert_eq!(canonical_symbol("eth-usd").unwrap(), "ETH");
        assert_eq!(canonical_symbol("SOL-USDT").unwrap(), "SOL");
    }

    #[test]
    fn test_canonical_symbol_rejects_invalid() {
        assert!(canonical_symbol("   ").is_err());
        assert!(canonical_symbol("AB C").is_err());
        assert!(canonical_symbol("stock:ABC").is_err());
    }
}
