//! classpulse-ingest: turns queue batches into stored behavior.
//!
//! - [`BatchDispatcher`] decodes a batch of raw queue messages, groups the
//!   envelopes by kind and processes each group concurrently
//! - [`ConsumerManager`] polls the queue under a consumer group and hands each
//!   batch to the dispatcher, committing offsets as it goes
//!
//! ```text
//! ┌──────────────┐  poll   ┌─────────────────┐  fan-out  ┌───────────────────┐
//! │  EventLog    │────────►│ ConsumerManager │──────────►│ teacher_behavior  │
//! │ (per topic)  │◄────────│                 │           │ student_behavior  │
//! └──────────────┘ commit  └─────────────────┘           │ communication     │
//!                                                        └───────────────────┘
//! ```

pub mod consumer;
pub mod dispatcher;
pub mod report;

pub use consumer::{ConsumerConfig, ConsumerError, ConsumerManager};
pub use dispatcher::{BatchDispatcher, BatchHandler, DispatchError, DispatcherConfig};
pub use report::{BatchReport, GroupReport};
