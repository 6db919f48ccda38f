//! 캐시 저장소 계층.

pub mod store;

pub use store::{
    entry_key, CacheStore, CACHED_SYMBOLS_KEY, LAST_FULL_FETCH_COUNT_KEY, LAST_FULL_FETCH_KEY,
};
