//! 캐시 저장소 trait.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// 문자열 키-값과 문자열 집합을 저장하는 TTL 저장소.
///
/// 비즈니스 로직은 없으며 실패는 `DataError`로 그대로 전달합니다.
/// 실패를 흡수하는 쪽은 [`crate::cache::CacheStore`]입니다.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// 로그와 상태 출력에 쓰이는 백엔드 이름.
    fn name(&self) -> &'static str;

    /// 연결 상태 확인.
    async fn ping(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 값을 저장합니다. `ttl`이 `None`이면 만료되지 않습니다.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// 키들을 삭제하고 실제로 삭제된 수를 반환합니다.
    async fn delete(&self, keys: &[String]) -> Result<usize>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn set_add(&self, key: &str, member: &str) -> Result<()>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<usize>;
}
