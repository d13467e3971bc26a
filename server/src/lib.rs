// Feed server: accepts client connections and streams an ordered event
// sequence to each of them, either replayed from a file or synthesized from
// a seed.

pub mod feed_server;
pub mod source;

pub use feed_server::FeedServer;
pub use source::{EventSource, ReplaySource, SyntheticSource};
