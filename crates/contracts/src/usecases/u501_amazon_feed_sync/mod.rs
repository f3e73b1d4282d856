pub mod request;
pub mod response;

pub use request::CreateFeedRequest;
pub use response::{AggregationPreview, CreateFeedResponse, SyncFeedSummary};

use crate::usecases::common::UseCaseMetadata;

/// UseCase u501: двухфазная синхронизация цен и остатков на Amazon
pub struct AmazonFeedSync;

impl UseCaseMetadata for AmazonFeedSync {
    fn usecase_index() -> &'static str {
        "u501"
    }

    fn usecase_name() -> &'static str {
        "amazon_feed_sync"
    }

    fn display_name() -> &'static str {
        "Синхронизация цен и остатков Amazon"
    }

    fn description() -> &'static str {
        "Агрегирует очередь по ASIN и отправляет изменения на Amazon двумя \
         упорядоченными фидами: остаток не уходит, пока цена не подтверждена"
    }
}
