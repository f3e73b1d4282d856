use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::a002_sync_feed::aggregate::{
    AggregatedEntry, FeedLineResult, PriceConflict, SyncFeed,
};
use crate::domain::a002_sync_feed::status::{SyncFeedMode, SyncFeedStatus};
use crate::domain::common::AggregateId;

/// Превью агрегации очереди: заявки по ASIN плюс конфликты цен
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationPreview {
    pub entries: Vec<AggregatedEntry>,
    pub conflicts: Vec<PriceConflict>,
}

/// Ответ на создание фида
///
/// Конфликтующие ASIN в фид не попали; они возвращаются рядом, чтобы UI
/// показал заблокированные позиции.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFeedResponse {
    pub feed: SyncFeedSummary,
    pub conflicts: Vec<PriceConflict>,
}

/// Сводка фида для UI: фазовый статус плюс построчная свёртка
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFeedSummary {
    pub id: String,
    pub code: String,
    pub status: SyncFeedStatus,
    pub mode: SyncFeedMode,
    pub is_dry_run: bool,
    pub entry_count: usize,
    pub price_feed_id: Option<String>,
    pub quantity_feed_id: Option<String>,
    pub poll_count: i32,
    pub transient_error_count: i32,
    pub success_count: i32,
    pub warning_count: i32,
    pub error_count: i32,
    pub error_message: Option<String>,
    pub line_results: Vec<FeedLineResult>,
    pub next_poll_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SyncFeed> for SyncFeedSummary {
    fn from(feed: &SyncFeed) -> Self {
        Self {
            id: feed.base.id.as_string(),
            code: feed.base.code.clone(),
            status: feed.status,
            mode: feed.mode,
            is_dry_run: feed.is_dry_run,
            entry_count: feed.entries.len(),
            price_feed_id: feed.price_feed_id.clone(),
            quantity_feed_id: feed.quantity_feed_id.clone(),
            poll_count: feed.poll_count,
            transient_error_count: feed.transient_error_count,
            success_count: feed.success_count,
            warning_count: feed.warning_count,
            error_count: feed.error_count,
            error_message: feed.error_message.clone(),
            line_results: feed.line_results.clone(),
            next_poll_at: feed.next_poll_at,
            created_at: feed.base.metadata.created_at,
            updated_at: feed.base.metadata.updated_at,
        }
    }
}
