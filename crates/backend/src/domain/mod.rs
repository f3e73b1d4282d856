pub mod a001_sync_queue_item;
pub mod a002_sync_feed;
