pub mod worker;

pub use worker::FeedPollWorker;
