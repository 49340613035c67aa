//! tickflow-pipeline: ticker ingestion, dispatch, and persistence
//!
//! The core of the service: classifies raw feed payloads, extracts decimal
//! fields without ever failing a whole record on one bad field, and
//! persists ticker snapshots. Messages arrive over two independent paths:
//! an in-process event bus (at-most-once) and a partitioned durable log
//! with explicit acknowledgment (at-least-once; duplicates are expected
//! under redelivery).

pub mod bus;
pub mod consumer;
pub mod decimal;
pub mod dispatcher;
pub mod fanout;
pub mod frame;
pub mod metrics;
pub mod pg;
pub mod producer;
pub mod snapshot;
pub mod store;

pub use bus::EventBus;
pub use consumer::{ConsumerPool, ConsumerSettings};
pub use decimal::parse_decimal;
pub use dispatcher::{DispatchOutcome, Dispatcher, FailureKind};
pub use fanout::FanoutWriter;
pub use frame::{classify, ClassifyError, FeedFrame, TickerFields};
pub use pg::PgTickerStore;
pub use producer::LogProducer;
pub use snapshot::TickerSnapshot;
pub use store::{MemoryTickerStore, StoreError, TickerStore};
