//! Data models for rankqueue.

mod message;
mod progress;
mod work;

pub use message::{BatchSummary, DispatchOutcome, DrainReport, Message, MessageId};
pub use progress::ProgressRecord;
pub use work::{NotificationTarget, Tracker};
