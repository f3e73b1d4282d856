use axum::http::StatusCode;
use axum::{extract::Path, Json};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::a002_sync_feed::store::SqliteSyncFeedStore;
use crate::shared::config::AmazonConfig;
use crate::usecases::u501_amazon_feed_sync::FeedSyncExecutor;
use contracts::usecases::common::UseCaseError;
use contracts::usecases::u501_amazon_feed_sync::{
    AggregationPreview, CreateFeedRequest, CreateFeedResponse, SyncFeedSummary,
};

static FEED_SYNC_EXECUTOR: OnceCell<Arc<FeedSyncExecutor>> = OnceCell::new();

/// Собрать executor поверх sqlite-хранилища; зовётся один раз из main
pub fn initialize_executor(amazon: AmazonConfig) -> anyhow::Result<Arc<FeedSyncExecutor>> {
    let executor = Arc::new(FeedSyncExecutor::new(Arc::new(SqliteSyncFeedStore), amazon));
    FEED_SYNC_EXECUTOR
        .set(executor.clone())
        .map_err(|_| anyhow::anyhow!("Feed sync executor already initialized"))?;
    Ok(executor)
}

fn executor() -> Arc<FeedSyncExecutor> {
    FEED_SYNC_EXECUTOR
        .get()
        .expect("Feed sync executor has not been initialized")
        .clone()
}

fn parse_feed_id(id: &str) -> Result<Uuid, StatusCode> {
    Uuid::parse_str(id).map_err(|_| StatusCode::BAD_REQUEST)
}

/// GET /api/u501/aggregate/preview
pub async fn aggregate_preview() -> Result<Json<AggregationPreview>, StatusCode> {
    match executor().preview().await {
        Ok(preview) => Ok(Json(preview)),
        Err(e) => {
            tracing::error!("Aggregation preview failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/u501/feeds
pub async fn create_feed(
    Json(request): Json<CreateFeedRequest>,
) -> Result<Json<CreateFeedResponse>, (StatusCode, Json<UseCaseError>)> {
    match executor().create_feed(request).await {
        Ok(response) => Ok(Json(response)),
        Err(error) => {
            tracing::warn!("Feed creation rejected: {}", error);
            let status = match error.code.as_str() {
                "PRICE_CONFLICT" => StatusCode::CONFLICT,
                "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((status, Json(error)))
        }
    }
}

/// GET /api/u501/feeds
pub async fn list_feeds() -> Result<Json<Vec<SyncFeedSummary>>, StatusCode> {
    match executor().list_feeds().await {
        Ok(feeds) => Ok(Json(feeds.iter().map(SyncFeedSummary::from).collect())),
        Err(e) => {
            tracing::error!("Failed to list sync feeds: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/u501/feeds/:id
pub async fn get_feed(Path(id): Path<String>) -> Result<Json<SyncFeedSummary>, StatusCode> {
    let feed_id = parse_feed_id(&id)?;
    match executor().get_status(feed_id).await {
        Ok(Some(feed)) => Ok(Json(SyncFeedSummary::from(&feed))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to read sync feed {}: {}", feed_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/u501/feeds/:id/poll — ручной опрос, тот же идемпотентный путь,
/// что и у фонового воркера
pub async fn poll_feed(Path(id): Path<String>) -> Result<Json<SyncFeedSummary>, StatusCode> {
    let feed_id = parse_feed_id(&id)?;
    match executor().poll(feed_id).await {
        Ok(feed) => Ok(Json(SyncFeedSummary::from(&feed))),
        Err(e) => {
            tracing::error!("Failed to poll sync feed {}: {}", feed_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/u501/feeds/:id/cancel
pub async fn cancel_feed(Path(id): Path<String>) -> Result<Json<SyncFeedSummary>, StatusCode> {
    let feed_id = parse_feed_id(&id)?;
    match executor().cancel(feed_id).await {
        Ok(feed) => Ok(Json(SyncFeedSummary::from(&feed))),
        Err(e) => {
            tracing::error!("Failed to cancel sync feed {}: {}", feed_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
