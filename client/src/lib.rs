// Feed client: connects to an upstream event source over TCP, normalizes TLV
// frames into Events and pushes them into the pipeline's bounded queue.

pub mod backoff;
pub mod feed_client;

pub use backoff::BackoffState;
pub use feed_client::{FeedClient, FeedConnection};
