pub mod a001_sync_queue_item;
pub mod u501_amazon_feed_sync;
