use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use contracts::domain::a002_sync_feed::aggregate::SyncFeed;
use contracts::domain::a002_sync_feed::status::SyncFeedStatus;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::poller::VerificationPoller;
use crate::domain::a002_sync_feed::store::SyncFeedStore;
use crate::shared::marketplaces::{FeedClientError, FeedSubmissionClient};

/// Шаг опроса, пока Amazon обрабатывает фид
pub const PROCESSING_POLL_SECS: i64 = 30;
/// Первая сверка цены вскоре после окончания обработки
pub const VERIFY_INITIAL_SECS: i64 = 5;
/// Дальнейшие сверки раз в минуту
pub const VERIFY_REPEAT_SECS: i64 = 60;

/// Оркестратор жизненного цикла фида синхронизации
///
/// Не держит ни потоков, ни соединений: каждый вызов poll() выполняет один
/// короткий шаг машины состояний, записывает итог и возвращается. Прогресс
/// наблюдает следующий плановый или ручной опрос.
pub struct SyncOrchestrator {
    store: Arc<dyn SyncFeedStore>,
    client: Arc<dyn FeedSubmissionClient>,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn SyncFeedStore>, client: Arc<dyn FeedSubmissionClient>) -> Self {
        Self { store, client }
    }

    /// Идемпотентный шаг машины состояний
    ///
    /// Терминальный фид возвращается как есть, без единого внешнего вызова.
    /// Ошибки внешних вызовов наружу не выходят — вызывающий всегда получает
    /// корректный SyncFeed; ошибкой может завершиться только само хранилище.
    pub async fn poll(&self, feed_id: Uuid) -> Result<SyncFeed> {
        use SyncFeedStatus::*;

        let mut feed = self
            .store
            .get(feed_id)
            .await?
            .with_context(|| format!("Feed {} not found", feed_id))?;

        // Терминальная защёлка: опоздавшие опросы — no-op
        if feed.status.is_terminal() {
            return Ok(feed);
        }
        let loaded_status = feed.status;

        match feed.status {
            PricePending => self.submit_price_phase(&mut feed).await,
            Pending => self.submit_combined(&mut feed).await,
            PriceVerified => return self.advance_to_quantity(feed_id).await,
            QuantityPending => self.submit_quantity_phase(&mut feed).await,
            Done => {
                feed.transition_to(DoneVerifying);
            }
            s if s.is_awaiting_processing() => {
                VerificationPoller::new(self.client.as_ref())
                    .check_feed_processing(&mut feed)
                    .await;
            }
            s if s.is_verifying() => {
                VerificationPoller::new(self.client.as_ref())
                    .verify_live_prices(&mut feed)
                    .await;
            }
            _ => {}
        }

        self.finish_poll(feed, loaded_status).await
    }

    /// Отменить фид из любого нетерминального статуса
    ///
    /// CAS против текущего статуса: если конкурирующий опрос успел раньше,
    /// перечитываем и пробуем снова, пока фид не терминален.
    pub async fn cancel(&self, feed_id: Uuid) -> Result<SyncFeed> {
        loop {
            let feed = self
                .store
                .get(feed_id)
                .await?
                .with_context(|| format!("Feed {} not found", feed_id))?;
            if feed.status.is_terminal() {
                return Ok(feed);
            }
            if self
                .store
                .compare_and_set_status(feed_id, feed.status, SyncFeedStatus::Cancelled)
                .await?
            {
                info!("Feed {} cancelled from {}", feed_id, feed.status);
                return self
                    .store
                    .get(feed_id)
                    .await?
                    .with_context(|| format!("Feed {} not found", feed_id));
            }
            // Статус сменился под ногами — перечитываем и повторяем
        }
    }

    /// Защищённый переход price_verified -> quantity_pending
    ///
    /// Статус пишется ДО обращения к клиенту: конкурирующий опрос (ручной
    /// "poll now" поверх фонового таймера) увидит уже продвинутый статус и
    /// не отправит фид остатков второй раз.
    async fn advance_to_quantity(&self, feed_id: Uuid) -> Result<SyncFeed> {
        let won = self
            .store
            .compare_and_set_status(
                feed_id,
                SyncFeedStatus::PriceVerified,
                SyncFeedStatus::QuantityPending,
            )
            .await?;
        if !won {
            info!(
                "Feed {} already advanced past price_verified by a concurrent poll",
                feed_id
            );
            return self
                .store
                .get(feed_id)
                .await?
                .with_context(|| format!("Feed {} not found", feed_id));
        }

        let mut feed = self
            .store
            .get(feed_id)
            .await?
            .with_context(|| format!("Feed {} not found", feed_id))?;
        self.submit_quantity_phase(&mut feed).await;
        self.finish_poll(feed, SyncFeedStatus::QuantityPending).await
    }

    async fn submit_price_phase(&self, feed: &mut SyncFeed) {
        match self.client.submit_price_feed(&feed.entries).await {
            Ok(document_id) => {
                info!(
                    "Feed {} price feed submitted, document {}",
                    feed.to_string_id(),
                    document_id
                );
                feed.price_feed_id = Some(document_id);
                feed.transition_to(SyncFeedStatus::PriceSubmitted);
            }
            Err(e) => self.handle_submit_error(feed, e),
        }
    }

    async fn submit_quantity_phase(&self, feed: &mut SyncFeed) {
        match self.client.submit_quantity_feed(&feed.entries).await {
            Ok(document_id) => {
                info!(
                    "Feed {} quantity feed submitted, document {}",
                    feed.to_string_id(),
                    document_id
                );
                feed.quantity_feed_id = Some(document_id);
                feed.transition_to(SyncFeedStatus::QuantitySubmitted);
            }
            Err(e) => self.handle_submit_error(feed, e),
        }
    }

    async fn submit_combined(&self, feed: &mut SyncFeed) {
        match self.client.submit_price_quantity_feed(&feed.entries).await {
            Ok(document_id) => {
                info!(
                    "Feed {} combined feed submitted, document {}",
                    feed.to_string_id(),
                    document_id
                );
                feed.price_feed_id = Some(document_id);
                feed.transition_to(SyncFeedStatus::Submitted);
            }
            Err(e) => self.handle_submit_error(feed, e),
        }
    }

    fn handle_submit_error(&self, feed: &mut SyncFeed, error: FeedClientError) {
        match error {
            FeedClientError::Transient(msg) => {
                // Статус не двигаем: следующий опрос повторит отправку
                feed.transient_error_count += 1;
                warn!(
                    "Feed {} submission failed transiently: {}",
                    feed.to_string_id(),
                    msg
                );
            }
            FeedClientError::Fatal(msg) => {
                feed.transition_to(SyncFeedStatus::Failed);
                feed.error_message = Some(msg);
            }
        }
    }

    /// Записать итог шага с защитой от конкурирующей записи
    ///
    /// Если кто-то (другой опрос, отмена) успел сменить статус между нашим
    /// чтением и записью, наша версия отбрасывается целиком и возвращается
    /// актуальная.
    async fn finish_poll(&self, mut feed: SyncFeed, expected: SyncFeedStatus) -> Result<SyncFeed> {
        feed.next_poll_at = next_poll_time(expected, feed.status);
        feed.before_write();
        if self.store.save_if_status(&feed, expected).await? {
            Ok(feed)
        } else {
            info!(
                "Feed {} advanced concurrently, discarding stale poll result",
                feed.to_string_id()
            );
            self.store
                .get(feed.base.id.value())
                .await?
                .context("feed disappeared during poll")
        }
    }
}

/// Когда воркеру опрашивать фид в следующий раз
///
/// 30 с, пока Amazon обрабатывает посылку; первая сверка цены через ~5 с
/// после окончания обработки, дальше раз в минуту; терминальные фиды не
/// опрашиваются.
fn next_poll_time(previous: SyncFeedStatus, current: SyncFeedStatus) -> Option<DateTime<Utc>> {
    if current.is_terminal() {
        return None;
    }
    let seconds = if current.is_verifying() {
        if previous == current {
            VERIFY_REPEAT_SECS
        } else {
            VERIFY_INITIAL_SECS
        }
    } else {
        PROCESSING_POLL_SECS
    };
    Some(Utc::now() + Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a002_sync_feed::store::in_memory::InMemorySyncFeedStore;
    use crate::shared::marketplaces::amazon::dry_run::DryRunFeedClient;
    use crate::usecases::u501_amazon_feed_sync::poller::MAX_POLL_ATTEMPTS;
    use contracts::domain::a002_sync_feed::aggregate::AggregatedEntry;
    use contracts::domain::a002_sync_feed::status::SyncFeedMode;
    use std::collections::HashMap;

    fn entry(asin: &str, price: f64, quantity: i32) -> AggregatedEntry {
        AggregatedEntry {
            asin: asin.to_string(),
            items: vec![],
            quantity,
            price,
            has_price_conflict: false,
        }
    }

    struct Harness {
        store: Arc<InMemorySyncFeedStore>,
        client: Arc<DryRunFeedClient>,
        orchestrator: SyncOrchestrator,
        feed_id: Uuid,
    }

    async fn harness(
        entries: Vec<AggregatedEntry>,
        mode: SyncFeedMode,
        price_overrides: HashMap<String, f64>,
        line_errors: HashMap<String, String>,
    ) -> Harness {
        let store = Arc::new(InMemorySyncFeedStore::new());
        let client = Arc::new(DryRunFeedClient::new(
            entries.clone(),
            price_overrides,
            line_errors,
        ));
        let feed = SyncFeed::new_for_insert(entries, mode, true);
        let feed_id = feed.base.id.value();
        store.insert(&feed).await.unwrap();
        let orchestrator = SyncOrchestrator::new(store.clone(), client.clone());
        Harness {
            store,
            client,
            orchestrator,
            feed_id,
        }
    }

    #[tokio::test]
    async fn two_phase_happy_path_reaches_completed() {
        let h = harness(
            vec![entry("B01X", 19.99, 3)],
            SyncFeedMode::TwoPhase,
            HashMap::new(),
            HashMap::new(),
        )
        .await;

        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::PriceSubmitted);
        assert!(feed.price_feed_id.is_some());
        assert!(feed.quantity_feed_id.is_none());

        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::PriceVerifying);
        assert!(feed.quantity_feed_id.is_none());

        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::PriceVerified);
        assert!(feed.quantity_feed_id.is_none());

        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::QuantitySubmitted);
        assert!(feed.quantity_feed_id.is_some());

        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::Completed);
        assert_eq!(feed.success_count, 1);
        assert_eq!(feed.error_count, 0);
        assert!(feed.next_poll_at.is_none());
    }

    #[tokio::test]
    async fn terminal_poll_is_noop_without_external_calls() {
        let h = harness(
            vec![entry("B01X", 19.99, 1)],
            SyncFeedMode::TwoPhase,
            HashMap::new(),
            HashMap::new(),
        )
        .await;

        loop {
            let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
            if feed.status.is_terminal() {
                break;
            }
        }
        let calls_at_completion = h.client.external_call_count();
        let writes_at_completion = h.store.write_count();

        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        let feed_again = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::Completed);
        assert_eq!(feed_again.status, SyncFeedStatus::Completed);
        assert_eq!(h.client.external_call_count(), calls_at_completion);
        assert_eq!(h.store.write_count(), writes_at_completion);
    }

    #[tokio::test]
    async fn price_mismatch_exhausts_budget_to_verification_failed() {
        let mut overrides = HashMap::new();
        overrides.insert("B02Y".to_string(), 25.00);
        let h = harness(
            vec![entry("B02Y", 20.00, 1)],
            SyncFeedMode::TwoPhase,
            overrides,
            HashMap::new(),
        )
        .await;

        // Отправка и окончание обработки
        h.orchestrator.poll(h.feed_id).await.unwrap();
        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::PriceVerifying);

        // Ровно MAX_POLL_ATTEMPTS сверок: до последней фид стоит на месте
        for attempt in 1..MAX_POLL_ATTEMPTS {
            let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
            assert_eq!(feed.status, SyncFeedStatus::PriceVerifying, "attempt {}", attempt);
            assert_eq!(feed.poll_count, attempt);
        }
        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::VerificationFailed);
        assert_eq!(feed.poll_count, MAX_POLL_ATTEMPTS);
        // Остатки не отправлялись, и сообщение об этом говорит
        assert!(feed.quantity_feed_id.is_none());
        assert!(feed
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("остатки"));
    }

    #[tokio::test]
    async fn partial_line_errors_do_not_block_completion() {
        let mut line_errors = HashMap::new();
        line_errors.insert("B02Y".to_string(), "SKU suppressed".to_string());
        let h = harness(
            vec![entry("B01X", 19.99, 2), entry("B02Y", 5.00, 1)],
            SyncFeedMode::TwoPhase,
            HashMap::new(),
            line_errors,
        )
        .await;

        let mut feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        while !feed.status.is_terminal() {
            feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        }
        assert_eq!(feed.status, SyncFeedStatus::Completed);
        assert_eq!(feed.success_count, 1);
        // Ошибки обеих фаз по подавленному SKU
        assert_eq!(feed.error_count, 2);
    }

    #[tokio::test]
    async fn single_phase_mode_reaches_verified() {
        let h = harness(
            vec![entry("B01X", 19.99, 1)],
            SyncFeedMode::SinglePhase,
            HashMap::new(),
            HashMap::new(),
        )
        .await;

        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::Submitted);
        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::Done);
        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::DoneVerifying);
        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::Verified);
        // В однофазном режиме отдельного фида остатков нет
        assert!(feed.quantity_feed_id.is_none());
    }

    #[tokio::test]
    async fn cancel_wins_and_next_poll_is_noop() {
        let h = harness(
            vec![entry("B01X", 19.99, 1)],
            SyncFeedMode::TwoPhase,
            HashMap::new(),
            HashMap::new(),
        )
        .await;

        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::PriceSubmitted);

        let feed = h.orchestrator.cancel(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::Cancelled);

        let calls = h.client.external_call_count();
        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::Cancelled);
        assert_eq!(h.client.external_call_count(), calls);

        // Повторная отмена терминального фида — тоже no-op
        let feed = h.orchestrator.cancel(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::Cancelled);
    }

    #[tokio::test]
    async fn stale_poll_result_is_discarded_by_status_guard() {
        let h = harness(
            vec![entry("B01X", 19.99, 1)],
            SyncFeedMode::TwoPhase,
            HashMap::new(),
            HashMap::new(),
        )
        .await;

        // Эмуляция гонки: отмена вклинивается между чтением и записью опроса
        let mut stale = h.store.get(h.feed_id).await.unwrap().unwrap();
        let loaded_status = stale.status;
        h.orchestrator.cancel(h.feed_id).await.unwrap();

        stale.price_feed_id = Some("DRYRUN-PRICE-1".into());
        stale.transition_to(SyncFeedStatus::PriceSubmitted);
        let saved = h.store.save_if_status(&stale, loaded_status).await.unwrap();
        assert!(!saved);

        let current = h.store.get(h.feed_id).await.unwrap().unwrap();
        assert_eq!(current.status, SyncFeedStatus::Cancelled);
        assert!(current.price_feed_id.is_none());
    }

    #[tokio::test]
    async fn concurrent_quantity_guard_blocks_double_submission() {
        let h = harness(
            vec![entry("B01X", 19.99, 1)],
            SyncFeedMode::TwoPhase,
            HashMap::new(),
            HashMap::new(),
        )
        .await;

        // Довести до price_verified
        h.orchestrator.poll(h.feed_id).await.unwrap();
        h.orchestrator.poll(h.feed_id).await.unwrap();
        let feed = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(feed.status, SyncFeedStatus::PriceVerified);

        // Первый же из гонки вызовов забирает CAS; второй обязан увидеть
        // продвинутый статус и не отправить фид второй раз
        let first = h.orchestrator.poll(h.feed_id).await.unwrap();
        assert_eq!(first.status, SyncFeedStatus::QuantitySubmitted);
        let quantity_doc = first.quantity_feed_id.clone();

        let second = h.orchestrator.poll(h.feed_id).await.unwrap();
        // Второй опрос уже проверяет обработку, а не отправляет заново
        assert_eq!(second.quantity_feed_id, quantity_doc);
    }
}
