use contracts::domain::a002_sync_feed::aggregate::SyncFeed;
use contracts::domain::a002_sync_feed::status::SyncFeedStatus;
use tracing::{info, warn};

use super::aggregator::prices_match;
use crate::shared::marketplaces::{
    FeedClientError, FeedProcessingStatus, FeedSubmissionClient,
};

/// Бюджет попыток сверки живой цены: ~30 минут окна верификации при
/// минутном шаге опроса.
pub const MAX_POLL_ATTEMPTS: i32 = 30;

/// Поллер верификации: по текущему статусу фида выполняет ровно один
/// следующий внешний запрос и применяет не более одного перехода.
///
/// Ошибки клиента наружу не выходят: транзиентные только двигают счётчик,
/// фатальные переводят фид в failed с текстом ошибки.
pub struct VerificationPoller<'a> {
    client: &'a dyn FeedSubmissionClient,
}

impl<'a> VerificationPoller<'a> {
    pub fn new(client: &'a dyn FeedSubmissionClient) -> Self {
        Self { client }
    }

    /// Проверить обработку отправленного фида (статусы *_submitted / *_processing)
    pub async fn check_feed_processing(&self, feed: &mut SyncFeed) {
        use SyncFeedStatus::*;

        let quantity_phase = matches!(feed.status, QuantitySubmitted | QuantityProcessing);
        let document_id = if quantity_phase {
            feed.quantity_feed_id.clone()
        } else {
            feed.price_feed_id.clone()
        };
        let Some(document_id) = document_id else {
            feed.transition_to(Failed);
            feed.error_message = Some("Внутренняя ошибка: нет id документа обработки".into());
            return;
        };

        match self.client.get_feed_status(&document_id).await {
            Err(FeedClientError::Transient(msg)) => {
                feed.transient_error_count += 1;
                warn!(
                    "Feed {} status check failed transiently: {}",
                    feed.to_string_id(),
                    msg
                );
            }
            Err(FeedClientError::Fatal(msg)) => {
                feed.transition_to(Failed);
                feed.error_message = Some(msg);
            }
            Ok(report) => match report.status {
                FeedProcessingStatus::InProgress => {
                    let next = match feed.status {
                        PriceSubmitted => Some(PriceProcessing),
                        QuantitySubmitted => Some(QuantityProcessing),
                        Submitted => Some(Processing),
                        _ => None, // уже в *_processing
                    };
                    if let Some(next) = next {
                        feed.transition_to(next);
                    }
                }
                FeedProcessingStatus::Done => {
                    feed.record_line_results(report.line_results);
                    let next = match feed.status {
                        PriceSubmitted | PriceProcessing => PriceVerifying,
                        Submitted | Processing => Done,
                        QuantitySubmitted | QuantityProcessing => Completed,
                        _ => return,
                    };
                    feed.transition_to(next);
                    info!(
                        "Feed {} processing finished, moving to {}",
                        feed.to_string_id(),
                        feed.status
                    );
                }
                FeedProcessingStatus::Fatal => {
                    feed.transition_to(Failed);
                    feed.error_message = report.error_message.or_else(|| {
                        Some("Amazon сообщил о фатальной ошибке обработки фида".into())
                    });
                }
            },
        }
    }

    /// Сверить живую цену с желаемой (статусы price_verifying / done_verifying)
    ///
    /// ASIN-ы с ошибочной ценовой строкой из сверки исключаются: их цена на
    /// листинг заведомо не легла, и держать из-за них весь фид в
    /// verification_failed значило бы блокировать остатки успешных позиций.
    pub async fn verify_live_prices(&self, feed: &mut SyncFeed) {
        use SyncFeedStatus::*;

        let verified_status = match feed.status {
            PriceVerifying => PriceVerified,
            DoneVerifying => Verified,
            _ => return,
        };

        let rejected: Vec<String> = feed
            .price_rejected_asins()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let to_check: Vec<(String, f64)> = feed
            .entries
            .iter()
            .filter(|e| !rejected.contains(&e.asin))
            .map(|e| (e.asin.clone(), e.price))
            .collect();

        if to_check.is_empty() {
            // Ни одна позиция не прошла ценовую фазу: подтверждать нечего,
            // остатки не трогаем.
            feed.transition_to(VerificationFailed);
            feed.error_message = Some(
                "Ни одна позиция не прошла ценовую фазу; фид остатков не отправлялся".into(),
            );
            return;
        }

        let mut all_match = true;
        for (asin, desired) in &to_check {
            match self.client.get_live_price(asin).await {
                Err(FeedClientError::Transient(msg)) => {
                    // Сетевой сбой не тратит бюджет попыток
                    feed.transient_error_count += 1;
                    warn!(
                        "Feed {} live price check for {} failed transiently: {}",
                        feed.to_string_id(),
                        asin,
                        msg
                    );
                    return;
                }
                Err(FeedClientError::Fatal(msg)) => {
                    feed.transition_to(Failed);
                    feed.error_message = Some(msg);
                    return;
                }
                Ok(live) => {
                    if !prices_match(live, *desired) {
                        all_match = false;
                    }
                }
            }
        }

        if all_match {
            feed.transition_to(verified_status);
            info!("Feed {} live prices confirmed", feed.to_string_id());
            return;
        }

        feed.poll_count += 1;
        if feed.poll_count >= MAX_POLL_ATTEMPTS {
            feed.transition_to(VerificationFailed);
            feed.error_message = Some(format!(
                "Живая цена не совпала с желаемой за {} попыток; \
                 фид остатков не отправлялся, остатки на Amazon не менялись",
                MAX_POLL_ATTEMPTS
            ));
        }
    }
}
