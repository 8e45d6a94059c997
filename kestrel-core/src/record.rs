//! Records of training metrics.
//!
//! * [`Record`] - named values produced by agents and the rollout
//! * [`Recorder`] - destination of records, keyed by a step index
//! * [`RecordStorage`] - aggregates a number of records into one
//! * [`BufferedRecorder`] - keeps records in memory
//! * [`NullRecorder`] - discards records
//!
//! ```rust
//! use kestrel_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss", 0.5);
//! record.insert("epsilon", RecordValue::Scalar(0.9));
//! assert_eq!(record.get_scalar("loss").unwrap(), 0.5);
//! ```
//!
//! Writing a record never fails. A recorder that cannot reach its backend
//! drops the record, so reporting never interrupts training.
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
pub use storage::RecordStorage;
