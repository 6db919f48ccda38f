//! 프로세스 내부 TTL 캐시 백엔드.
//!
//! 만료 시각은 `tokio::time::Instant` 기준이므로
//! `start_paused` 테스트에서 시간을 앞당겨 TTL을 검증할 수 있습니다.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::backend::CacheBackend;
use crate::error::{DataError, Result};

#[derive(Debug)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, Slot>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// 메모리 기반 캐시.
#[derive(Debug)]
pub struct InMemoryCache {
    state: Mutex<State>,
    available: AtomicBool,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            available: AtomicBool::new(true),
        }
    }

    /// 저장소 장애를 흉내냅니다. `false`면 모든 명령이 실패합니다.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DataError::CacheUnavailable("in-memory cache offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| DataError::Cache("in-memory cache lock poisoned".to_string()))
    }

    /// 만료된 값을 제거한 뒤 가드를 반환합니다.
    fn lock_live(&self) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock()?;
        let now = Instant::now();
        state.values.retain(|_, slot| slot.is_live(now));
        Ok(state)
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let state = self.lock_live()?;
        Ok(state.values.get(key).map(|slot| slot.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut state = self.lock()?;
        // 표현할 수 없는 TTL은 만료 없음
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        state.values.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        let mut state = self.lock_live()?;
        let mut deleted = 0;
        for key in keys {
            if state.values.remove(key).is_some() {
                deleted += 1;
            } else if state.sets.remove(key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let state = self.lock_live()?;
        Ok(state.values.contains_key(key) || state.sets.contains_key(key))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut state = self.lock()?;
        state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .sets
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<usize> {
        let mut state = self.lock()?;
        let Some(set) = state.sets.get_mut(key) else {
            return Ok(0);
        };

        let removed = members.iter().filter(|m| set.remove(m.as_str())).count();
        // Redis와 같이 빈 집합은 키 자체를 제거
        if set.is_empty() {
            state.sets.remove(key);
        }
        Ok(removed)
    }
}
