use contracts::domain::common::AggregateId;
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::usecases::u501_amazon_feed_sync::FeedSyncExecutor;

/// Фоновый воркер опроса фидов синхронизации.
///
/// Тик раз в несколько секунд; на каждом тике забираются нетерминальные
/// фиды, чьё `next_poll_at` наступило, и для каждого зовётся тот же
/// идемпотентный poll(), что и у ручной кнопки в UI. Каденс опроса задаёт
/// оркестратор через `next_poll_at`, воркер лишь соблюдает его.
pub struct FeedPollWorker {
    executor: Arc<FeedSyncExecutor>,
    interval_seconds: u64,
}

impl FeedPollWorker {
    pub fn new(executor: Arc<FeedSyncExecutor>, interval_seconds: u64) -> Self {
        Self {
            executor,
            interval_seconds,
        }
    }

    /// Запускает цикл опроса.
    pub async fn run_loop(&self) {
        info!(
            "Feed poll worker started with interval {} seconds",
            self.interval_seconds
        );
        let mut interval = time::interval(time::Duration::from_secs(self.interval_seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = self.process_due_feeds().await {
                error!("Error processing due sync feeds: {:?}", e);
            }
        }
    }

    /// Опрашивает фиды, чьё время наступило.
    async fn process_due_feeds(&self) -> anyhow::Result<()> {
        let due = self.executor.due_feeds().await?;
        for feed in due {
            let feed_id = feed.base.id.value();
            info!(
                "Polling sync feed {} in status {}",
                feed.base.id.as_string(),
                feed.status
            );
            let executor = Arc::clone(&self.executor);
            tokio::spawn(async move {
                match executor.poll(feed_id).await {
                    Ok(updated) => {
                        info!("Feed {} polled, status {}", feed_id, updated.status);
                    }
                    Err(e) => {
                        error!("Feed {} poll failed: {:?}", feed_id, e);
                    }
                }
            });
        }
        Ok(())
    }
}
