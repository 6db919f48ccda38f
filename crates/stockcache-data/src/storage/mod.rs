//! 캐시 저장소 백엔드.
//!
//! - `backend`: 저장소 공통 trait
//! - `redis`: Redis 구현
//! - `memory`: 프로세스 내부 TTL 맵 구현

pub mod backend;
pub mod memory;
pub mod redis;

pub use backend::CacheBackend;
pub use memory::InMemoryCache;
pub use redis::RedisCache;
