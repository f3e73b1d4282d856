use anyhow::Result;
use contracts::domain::a001_sync_queue_item::aggregate::SyncQueueItem;
use contracts::domain::a002_sync_feed::aggregate::SyncFeed;
use contracts::usecases::common::{UseCaseError, UseCaseResult};
use contracts::usecases::u501_amazon_feed_sync::{
    AggregationPreview, CreateFeedRequest, CreateFeedResponse, SyncFeedSummary,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::aggregator;
use super::orchestrator::SyncOrchestrator;
use crate::domain::a001_sync_queue_item;
use crate::domain::a002_sync_feed::store::SyncFeedStore;
use crate::shared::config::AmazonConfig;
use crate::shared::marketplaces::amazon::dry_run::DryRunFeedClient;
use crate::shared::marketplaces::amazon::SpApiFeedClient;
use crate::shared::marketplaces::FeedSubmissionClient;

/// Executor UseCase u501: принимает запросы API и фонового воркера,
/// собирает фиды из очереди и прогоняет их через оркестратор.
pub struct FeedSyncExecutor {
    store: Arc<dyn SyncFeedStore>,
    amazon: AmazonConfig,
}

impl FeedSyncExecutor {
    pub fn new(store: Arc<dyn SyncFeedStore>, amazon: AmazonConfig) -> Self {
        Self { store, amazon }
    }

    /// Клиент для фида: dry-run фиды получают симулятор с картами подмен из
    /// самого фида, боевые — клиент SP-API.
    fn client_for(&self, feed: &SyncFeed) -> Result<Arc<dyn FeedSubmissionClient>> {
        if feed.is_dry_run {
            Ok(Arc::new(DryRunFeedClient::new(
                feed.entries.clone(),
                feed.dry_run_price_overrides.clone(),
                feed.dry_run_line_errors.clone(),
            )))
        } else {
            let client = SpApiFeedClient::new(&self.amazon)
                .map_err(|e| anyhow::anyhow!("Amazon client: {}", e))?;
            Ok(Arc::new(client))
        }
    }

    fn orchestrator_for(&self, feed: &SyncFeed) -> Result<SyncOrchestrator> {
        Ok(SyncOrchestrator::new(
            self.store.clone(),
            self.client_for(feed)?,
        ))
    }

    /// Превью агрегации текущей очереди, без создания фида
    pub async fn preview(&self) -> Result<AggregationPreview> {
        let items = a001_sync_queue_item::service::list_all().await?;
        let result = aggregator::aggregate(&items);
        Ok(AggregationPreview {
            entries: result.entries,
            conflicts: result.conflicts,
        })
    }

    /// Создать фид из текущей очереди
    ///
    /// Конфликтующие ASIN в фид не входят и возвращаются рядом с ним; если
    /// бесконфликтных заявок не осталось, фид не создаётся вовсе.
    pub async fn create_feed(&self, request: CreateFeedRequest) -> UseCaseResult<CreateFeedResponse> {
        let items = a001_sync_queue_item::service::list_all().await?;
        let response = self.create_feed_from_items(&items, request).await?;

        // Вошедшие в фид позиции покидают очередь
        let included: Vec<Uuid> = items
            .iter()
            .filter(|item| {
                !response
                    .conflicts
                    .iter()
                    .any(|c| c.item_ids.contains(&item.base.id.value()))
            })
            .map(|item| item.base.id.value())
            .collect();
        a001_sync_queue_item::service::remove_included(&included)
            .await
            .map_err(UseCaseError::from)?;

        Ok(response)
    }

    /// Ядро создания фида: агрегировать снимок очереди и сохранить фид
    pub async fn create_feed_from_items(
        &self,
        items: &[SyncQueueItem],
        request: CreateFeedRequest,
    ) -> UseCaseResult<CreateFeedResponse> {
        if items.is_empty() {
            return Err(UseCaseError::validation("Очередь синхронизации пуста"));
        }

        let aggregation = aggregator::aggregate(items);
        if aggregation.entries.is_empty() {
            return Err(UseCaseError::price_conflict(
                "Все ASIN очереди в конфликте цен; фид создавать не из чего",
            )
            .with_details(
                aggregation
                    .conflicts
                    .iter()
                    .map(|c| c.asin.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ));
        }

        let mut feed =
            SyncFeed::new_for_insert(aggregation.entries, request.mode, request.is_dry_run);
        feed.dry_run_price_overrides = request.dry_run_price_overrides;
        feed.dry_run_line_errors = request.dry_run_line_errors;
        feed.validate().map_err(UseCaseError::validation)?;
        feed.before_write();

        self.store.insert(&feed).await.map_err(UseCaseError::from)?;
        info!(
            "Created sync feed {} ({} entries, mode {}, dry_run {})",
            feed.to_string_id(),
            feed.entries.len(),
            feed.mode.as_str(),
            feed.is_dry_run
        );

        Ok(CreateFeedResponse {
            feed: SyncFeedSummary::from(&feed),
            conflicts: aggregation.conflicts,
        })
    }

    /// Идемпотентный опрос фида; безопасен для конкурентных вызовов
    pub async fn poll(&self, feed_id: Uuid) -> Result<SyncFeed> {
        let feed = self
            .store
            .get(feed_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Feed {} not found", feed_id))?;
        self.orchestrator_for(&feed)?.poll(feed_id).await
    }

    pub async fn cancel(&self, feed_id: Uuid) -> Result<SyncFeed> {
        let feed = self
            .store
            .get(feed_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Feed {} not found", feed_id))?;
        self.orchestrator_for(&feed)?.cancel(feed_id).await
    }

    pub async fn get_status(&self, feed_id: Uuid) -> Result<Option<SyncFeed>> {
        self.store.get(feed_id).await
    }

    pub async fn list_feeds(&self) -> Result<Vec<SyncFeed>> {
        self.store.list_all().await
    }

    /// Нетерминальные фиды, чьё время опроса наступило (для воркера)
    pub async fn due_feeds(&self) -> Result<Vec<SyncFeed>> {
        self.store.list_due(chrono::Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a002_sync_feed::store::in_memory::InMemorySyncFeedStore;
    use contracts::domain::a002_sync_feed::status::{SyncFeedMode, SyncFeedStatus};

    fn executor_with_store() -> (FeedSyncExecutor, Arc<InMemorySyncFeedStore>) {
        let store = Arc::new(InMemorySyncFeedStore::new());
        (
            FeedSyncExecutor::new(store.clone(), AmazonConfig::default()),
            store,
        )
    }

    fn item(asin: &str, price: f64, quantity: i32) -> SyncQueueItem {
        SyncQueueItem::new_for_insert(Uuid::new_v4(), asin.to_string(), price, quantity)
    }

    fn dry_run_request() -> CreateFeedRequest {
        CreateFeedRequest {
            is_dry_run: true,
            ..CreateFeedRequest::default()
        }
    }

    #[tokio::test]
    async fn queue_scenario_aggregates_and_completes() {
        let (executor, _store) = executor_with_store();
        let items = vec![item("B01X", 19.99, 1), item("B01X", 19.99, 2)];

        let response = executor
            .create_feed_from_items(&items, dry_run_request())
            .await
            .unwrap();
        assert!(response.conflicts.is_empty());
        assert_eq!(response.feed.entry_count, 1);
        let feed_id = Uuid::parse_str(&response.feed.id).unwrap();

        let mut feed = executor.poll(feed_id).await.unwrap();
        while !feed.status.is_terminal() {
            feed = executor.poll(feed_id).await.unwrap();
        }
        assert_eq!(feed.status, SyncFeedStatus::Completed);
        assert_eq!(feed.entries[0].quantity, 3);
        assert_eq!(feed.success_count, 1);
        assert_eq!(feed.error_count, 0);
    }

    #[tokio::test]
    async fn override_scenario_fails_verification_with_quantity_untouched() {
        let (executor, _store) = executor_with_store();
        let mut request = dry_run_request();
        request
            .dry_run_price_overrides
            .insert("B02Y".to_string(), 25.00);

        let response = executor
            .create_feed_from_items(&[item("B02Y", 20.00, 1)], request)
            .await
            .unwrap();
        let feed_id = Uuid::parse_str(&response.feed.id).unwrap();

        let mut feed = executor.poll(feed_id).await.unwrap();
        while !feed.status.is_terminal() {
            feed = executor.poll(feed_id).await.unwrap();
        }
        assert_eq!(feed.status, SyncFeedStatus::VerificationFailed);
        assert!(feed.quantity_feed_id.is_none());
    }

    #[tokio::test]
    async fn fully_conflicted_queue_refuses_feed_creation() {
        let (executor, store) = executor_with_store();
        let items = vec![item("B01X", 19.99, 1), item("B01X", 24.99, 1)];

        let error = executor
            .create_feed_from_items(&items, dry_run_request())
            .await
            .unwrap_err();
        assert_eq!(error.code, "PRICE_CONFLICT");
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn partially_conflicted_queue_creates_feed_and_reports_conflicts() {
        let (executor, _store) = executor_with_store();
        let items = vec![
            item("B01X", 19.99, 1),
            item("B01X", 24.99, 1),
            item("B02Y", 5.00, 1),
        ];

        let response = executor
            .create_feed_from_items(&items, dry_run_request())
            .await
            .unwrap();
        assert_eq!(response.feed.entry_count, 1);
        assert_eq!(response.conflicts.len(), 1);
        assert_eq!(response.conflicts[0].asin, "B01X");
    }

    #[tokio::test]
    async fn single_phase_request_creates_legacy_feed() {
        let (executor, store) = executor_with_store();
        let request = CreateFeedRequest {
            is_dry_run: true,
            mode: SyncFeedMode::SinglePhase,
            ..CreateFeedRequest::default()
        };
        let response = executor
            .create_feed_from_items(&[item("B01X", 19.99, 1)], request)
            .await
            .unwrap();
        assert_eq!(response.feed.status, SyncFeedStatus::Pending);

        let feed_id = Uuid::parse_str(&response.feed.id).unwrap();
        let stored = store.get(feed_id).await.unwrap().unwrap();
        assert_eq!(stored.mode, SyncFeedMode::SinglePhase);
    }
}
