pub mod automation;
pub mod coordinator;
pub mod downloader;
pub mod extractor;
mod media;
pub mod publisher;
pub mod relay;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use automation::{AutomationHost, Automator, ResultSink, TaskHost};
pub use coordinator::{
    PendingExtraction, PendingSummary, RequestCoordinator, DEFAULT_EXTRACTION_TIMEOUT,
};
pub use downloader::{Downloader, FsDownloader};
pub use extractor::extract_post;
pub use publisher::{GraphApi, Publisher};
pub use relay::{PreviewReport, Relay, RelayDeps, SubmitReport};
pub use store::{Store, StoreChange};
