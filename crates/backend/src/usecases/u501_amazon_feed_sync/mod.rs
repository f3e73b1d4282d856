pub mod aggregator;
pub mod executor;
pub mod orchestrator;
pub mod poller;

pub use executor::FeedSyncExecutor;
pub use orchestrator::SyncOrchestrator;
pub use poller::VerificationPoller;
