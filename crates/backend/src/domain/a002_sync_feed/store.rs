use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contracts::domain::a002_sync_feed::aggregate::SyncFeed;
use contracts::domain::a002_sync_feed::status::SyncFeedStatus;
use uuid::Uuid;

use super::repository;

/// Хранилище фидов синхронизации
///
/// Оркестратор работает с фидами только через этот трейт: боевой вариант —
/// sqlite через sea-orm, в тестах — память. Ключевое требование к
/// реализации — атомарность compare-and-set по статусу.
#[async_trait]
pub trait SyncFeedStore: Send + Sync {
    async fn insert(&self, feed: &SyncFeed) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<SyncFeed>>;

    async fn list_all(&self) -> Result<Vec<SyncFeed>>;

    /// Нетерминальные фиды, чьё `next_poll_at` наступило
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<SyncFeed>>;

    /// Сохранить фид целиком, только если персистентный статус ещё `expected`
    async fn save_if_status(&self, feed: &SyncFeed, expected: SyncFeedStatus) -> Result<bool>;

    /// Атомарно перевести статус `expected -> next`
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: SyncFeedStatus,
        next: SyncFeedStatus,
    ) -> Result<bool>;
}

/// Боевое хранилище поверх sqlite (общее соединение sea-orm)
pub struct SqliteSyncFeedStore;

#[async_trait]
impl SyncFeedStore for SqliteSyncFeedStore {
    async fn insert(&self, feed: &SyncFeed) -> Result<()> {
        repository::insert(feed).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SyncFeed>> {
        repository::get_by_id(id).await
    }

    async fn list_all(&self) -> Result<Vec<SyncFeed>> {
        repository::list_all().await
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<SyncFeed>> {
        repository::list_due(now).await
    }

    async fn save_if_status(&self, feed: &SyncFeed, expected: SyncFeedStatus) -> Result<bool> {
        repository::save_if_status(feed, expected).await
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: SyncFeedStatus,
        next: SyncFeedStatus,
    ) -> Result<bool> {
        repository::compare_and_set_status(id, expected, next).await
    }
}

/// In-memory хранилище для тестов машины состояний
#[cfg(test)]
pub mod in_memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemorySyncFeedStore {
        feeds: Mutex<HashMap<Uuid, SyncFeed>>,
        save_count: Mutex<usize>,
    }

    impl InMemorySyncFeedStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Сколько записей прошло через save/CAS (для проверок идемпотентности)
        pub fn write_count(&self) -> usize {
            *self.save_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl SyncFeedStore for InMemorySyncFeedStore {
        async fn insert(&self, feed: &SyncFeed) -> Result<()> {
            self.feeds
                .lock()
                .unwrap()
                .insert(feed.base.id.value(), feed.clone());
            Ok(())
        }

        async fn get(&self, id: Uuid) -> Result<Option<SyncFeed>> {
            Ok(self.feeds.lock().unwrap().get(&id).cloned())
        }

        async fn list_all(&self) -> Result<Vec<SyncFeed>> {
            Ok(self.feeds.lock().unwrap().values().cloned().collect())
        }

        async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<SyncFeed>> {
            Ok(self
                .feeds
                .lock()
                .unwrap()
                .values()
                .filter(|f| !f.status.is_terminal())
                .filter(|f| f.next_poll_at.map(|at| at <= now).unwrap_or(false))
                .cloned()
                .collect())
        }

        async fn save_if_status(&self, feed: &SyncFeed, expected: SyncFeedStatus) -> Result<bool> {
            let mut feeds = self.feeds.lock().unwrap();
            let id = feed.base.id.value();
            match feeds.get(&id) {
                Some(stored) if stored.status == expected => {
                    feeds.insert(id, feed.clone());
                    *self.save_count.lock().unwrap() += 1;
                    Ok(true)
                }
                Some(_) => Ok(false),
                None => Ok(false),
            }
        }

        async fn compare_and_set_status(
            &self,
            id: Uuid,
            expected: SyncFeedStatus,
            next: SyncFeedStatus,
        ) -> Result<bool> {
            let mut feeds = self.feeds.lock().unwrap();
            match feeds.get_mut(&id) {
                Some(stored) if stored.status == expected => {
                    stored.status = next;
                    stored.base.touch();
                    *self.save_count.lock().unwrap() += 1;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }
}
