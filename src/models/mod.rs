//! # Data Model
//!
//! Records exchanged between the engine's components. Each type here is either
//! immutable once created ([`WorkItem`], [`ResultRecord`]) or a snapshot that is
//! replaced wholesale ([`Checkpoint`], [`ProgressSnapshot`]).

pub mod checkpoint;
pub mod progress;
pub mod result_record;
pub mod work_item;

pub use checkpoint::Checkpoint;
pub use progress::ProgressSnapshot;
pub use result_record::{ErrorKind, ResultRecord, ResultStatus};
pub use work_item::WorkItem;
