use super::super::{
    FeedClientError, FeedProcessingReport, FeedProcessingStatus, FeedSubmissionClient,
};
use async_trait::async_trait;
use contracts::domain::a002_sync_feed::aggregate::{
    AggregatedEntry, FeedLineResult, FeedPhase, LineOutcome,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Dry-run симулятор Feeds API
///
/// Детерминированный двойник Amazon без сети: отправка мгновенно возвращает
/// синтетический id, первый же опрос статуса отдаёт DONE, живая цена равна
/// желаемой. Карты подмен позволяют прогнать пути verification_failed и
/// частичных построчных отказов.
pub struct DryRunFeedClient {
    entries: Vec<AggregatedEntry>,
    /// ASIN -> подменная живая цена (сверка никогда не сойдётся)
    price_overrides: HashMap<String, f64>,
    /// ASIN -> текст построчной ошибки
    line_errors: HashMap<String, String>,
    submit_count: AtomicUsize,
    external_calls: AtomicUsize,
}

const PRICE_FEED_PREFIX: &str = "DRYRUN-PRICE-";
const QUANTITY_FEED_PREFIX: &str = "DRYRUN-QTY-";
const COMBINED_FEED_PREFIX: &str = "DRYRUN-FULL-";

impl DryRunFeedClient {
    pub fn new(
        entries: Vec<AggregatedEntry>,
        price_overrides: HashMap<String, f64>,
        line_errors: HashMap<String, String>,
    ) -> Self {
        Self {
            entries,
            price_overrides,
            line_errors,
            submit_count: AtomicUsize::new(0),
            external_calls: AtomicUsize::new(0),
        }
    }

    /// Сколько внешних вызовов увидел симулятор (для проверок идемпотентности)
    pub fn external_call_count(&self) -> usize {
        self.external_calls.load(Ordering::SeqCst)
    }

    fn next_feed_id(&self, prefix: &str) -> String {
        let n = self.submit_count.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}{}", prefix, n)
    }

    fn price_phase_lines(&self) -> Vec<FeedLineResult> {
        self.entries
            .iter()
            .map(|entry| match self.line_errors.get(&entry.asin) {
                Some(message) => FeedLineResult {
                    asin: entry.asin.clone(),
                    phase: FeedPhase::Price,
                    outcome: LineOutcome::Error,
                    message: Some(message.clone()),
                },
                None => FeedLineResult {
                    asin: entry.asin.clone(),
                    phase: FeedPhase::Price,
                    outcome: LineOutcome::Success,
                    message: None,
                },
            })
            .collect()
    }

    /// Фаза остатков отдаёт только ошибки: успехи по остаткам выражаются
    /// статусом completed, а не дублированием построчной свёртки.
    fn quantity_phase_lines(&self) -> Vec<FeedLineResult> {
        self.entries
            .iter()
            .filter_map(|entry| {
                self.line_errors.get(&entry.asin).map(|message| FeedLineResult {
                    asin: entry.asin.clone(),
                    phase: FeedPhase::Quantity,
                    outcome: LineOutcome::Error,
                    message: Some(message.clone()),
                })
            })
            .collect()
    }
}

#[async_trait]
impl FeedSubmissionClient for DryRunFeedClient {
    async fn submit_price_feed(
        &self,
        _entries: &[AggregatedEntry],
    ) -> Result<String, FeedClientError> {
        self.external_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_feed_id(PRICE_FEED_PREFIX))
    }

    async fn submit_quantity_feed(
        &self,
        _entries: &[AggregatedEntry],
    ) -> Result<String, FeedClientError> {
        self.external_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_feed_id(QUANTITY_FEED_PREFIX))
    }

    async fn submit_price_quantity_feed(
        &self,
        _entries: &[AggregatedEntry],
    ) -> Result<String, FeedClientError> {
        self.external_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_feed_id(COMBINED_FEED_PREFIX))
    }

    async fn get_feed_status(
        &self,
        feed_id: &str,
    ) -> Result<FeedProcessingReport, FeedClientError> {
        self.external_calls.fetch_add(1, Ordering::SeqCst);
        let line_results = if feed_id.starts_with(QUANTITY_FEED_PREFIX) {
            self.quantity_phase_lines()
        } else if feed_id.starts_with(PRICE_FEED_PREFIX) || feed_id.starts_with(COMBINED_FEED_PREFIX)
        {
            self.price_phase_lines()
        } else {
            return Err(FeedClientError::Fatal(format!(
                "неизвестный dry-run feed id: {}",
                feed_id
            )));
        };
        Ok(FeedProcessingReport {
            status: FeedProcessingStatus::Done,
            line_results,
            error_message: None,
        })
    }

    async fn get_live_price(&self, asin: &str) -> Result<f64, FeedClientError> {
        self.external_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(price) = self.price_overrides.get(asin) {
            return Ok(*price);
        }
        self.entries
            .iter()
            .find(|e| e.asin == asin)
            .map(|e| e.price)
            .ok_or_else(|| {
                FeedClientError::Fatal(format!("ASIN {} не входил в dry-run фид", asin))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(asin: &str, price: f64, quantity: i32) -> AggregatedEntry {
        AggregatedEntry {
            asin: asin.to_string(),
            items: vec![],
            quantity,
            price,
            has_price_conflict: false,
        }
    }

    #[tokio::test]
    async fn first_status_poll_is_done_with_one_line_per_entry() {
        let client = DryRunFeedClient::new(
            vec![entry("B01X", 19.99, 3), entry("B02Y", 5.00, 1)],
            HashMap::new(),
            HashMap::new(),
        );
        let feed_id = client.submit_price_feed(&[]).await.unwrap();
        let report = client.get_feed_status(&feed_id).await.unwrap();
        assert_eq!(report.status, FeedProcessingStatus::Done);
        assert_eq!(report.line_results.len(), 2);
        assert!(report
            .line_results
            .iter()
            .all(|r| r.outcome == LineOutcome::Success));
    }

    #[tokio::test]
    async fn line_error_map_marks_specific_asin() {
        let mut errors = HashMap::new();
        errors.insert("B02Y".to_string(), "SKU suppressed".to_string());
        let client = DryRunFeedClient::new(
            vec![entry("B01X", 19.99, 3), entry("B02Y", 5.00, 1)],
            HashMap::new(),
            errors,
        );
        let feed_id = client.submit_price_feed(&[]).await.unwrap();
        let report = client.get_feed_status(&feed_id).await.unwrap();
        let failed: Vec<_> = report
            .line_results
            .iter()
            .filter(|r| r.outcome == LineOutcome::Error)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].asin, "B02Y");
    }

    #[tokio::test]
    async fn live_price_respects_override() {
        let mut overrides = HashMap::new();
        overrides.insert("B02Y".to_string(), 25.00);
        let client = DryRunFeedClient::new(
            vec![entry("B02Y", 20.00, 1)],
            overrides,
            HashMap::new(),
        );
        assert_eq!(client.get_live_price("B02Y").await.unwrap(), 25.00);

        let plain = DryRunFeedClient::new(
            vec![entry("B01X", 19.99, 1)],
            HashMap::new(),
            HashMap::new(),
        );
        assert_eq!(plain.get_live_price("B01X").await.unwrap(), 19.99);
    }
}
