//! Queued writes module
//!
//! Lets the application own GATT long writes and reliable writes to a set of
//! registered attributes: it authorizes every execute write before the staged
//! data is applied, and is notified of each attribute that changed.

pub mod coordinator;
pub mod handler;
pub mod pool;
pub mod queue;

pub use coordinator::{QueuedWrites, QwrInit, QwrState};
pub use handler::{QwrEvent, QwrEventType, QwrHandler};
pub use pool::QwrPool;
pub use queue::{PrepareQueue, PreparedWrite};
