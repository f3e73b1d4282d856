pub mod common;
pub mod u501_amazon_feed_sync;
