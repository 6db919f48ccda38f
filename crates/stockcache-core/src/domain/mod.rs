//! 캐시 데이터 도메인 모델.

mod entry;
mod market_data;

pub use entry::*;
pub use market_data::*;
