use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;

/// Конфигурация всех роутов приложения
pub fn configure_routes() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        // A001 Sync queue handlers
        .route(
            "/api/sync_queue",
            get(handlers::a001_sync_queue_item::list_all)
                .post(handlers::a001_sync_queue_item::create),
        )
        .route(
            "/api/sync_queue/:id",
            get(handlers::a001_sync_queue_item::get_by_id)
                .delete(handlers::a001_sync_queue_item::delete),
        )
        .route(
            "/api/sync_queue/testdata",
            post(handlers::a001_sync_queue_item::insert_test_data),
        )
        // UseCase u501: Amazon feed sync
        .route(
            "/api/u501/aggregate/preview",
            get(handlers::u501_amazon_feed_sync::aggregate_preview),
        )
        .route(
            "/api/u501/feeds",
            get(handlers::u501_amazon_feed_sync::list_feeds)
                .post(handlers::u501_amazon_feed_sync::create_feed),
        )
        .route(
            "/api/u501/feeds/:id",
            get(handlers::u501_amazon_feed_sync::get_feed),
        )
        .route(
            "/api/u501/feeds/:id/poll",
            post(handlers::u501_amazon_feed_sync::poll_feed),
        )
        .route(
            "/api/u501/feeds/:id/cancel",
            post(handlers::u501_amazon_feed_sync::cancel_feed),
        )
}
