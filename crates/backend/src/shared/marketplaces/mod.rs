pub mod amazon;

use async_trait::async_trait;
use contracts::domain::a002_sync_feed::aggregate::{AggregatedEntry, FeedLineResult};
use thiserror::Error;

/// Ошибка клиента фидов
///
/// Транзиентная ошибка не двигает статус фида — следующий плановый опрос
/// повторит тот же внешний вызов. Фатальная переводит фид в `failed`.
#[derive(Debug, Error)]
pub enum FeedClientError {
    #[error("временная ошибка клиента фидов: {0}")]
    Transient(String),
    #[error("фатальная ошибка клиента фидов: {0}")]
    Fatal(String),
}

/// Статус обработки фида на стороне Amazon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedProcessingStatus {
    InProgress,
    Done,
    Fatal,
}

/// Отчёт о состоянии фида: статус обработки плюс построчные результаты
#[derive(Debug, Clone)]
pub struct FeedProcessingReport {
    pub status: FeedProcessingStatus,
    pub line_results: Vec<FeedLineResult>,
    pub error_message: Option<String>,
}

/// Клиент асинхронного Feeds API
///
/// Оркестратор не знает, говорит он с Amazon или с dry-run симулятором:
/// обе реализации живут за этим трейтом.
#[async_trait]
pub trait FeedSubmissionClient: Send + Sync {
    /// Отправить ценовой фид, вернуть id документа обработки
    async fn submit_price_feed(
        &self,
        entries: &[AggregatedEntry],
    ) -> Result<String, FeedClientError>;

    /// Отправить фид остатков
    async fn submit_quantity_feed(
        &self,
        entries: &[AggregatedEntry],
    ) -> Result<String, FeedClientError>;

    /// Однофазный (legacy) фид: цена и остаток одной посылкой
    async fn submit_price_quantity_feed(
        &self,
        entries: &[AggregatedEntry],
    ) -> Result<String, FeedClientError>;

    /// Статус обработки ранее отправленного фида
    async fn get_feed_status(&self, feed_id: &str)
        -> Result<FeedProcessingReport, FeedClientError>;

    /// Текущая живая цена листинга
    async fn get_live_price(&self, asin: &str) -> Result<f64, FeedClientError>;
}
