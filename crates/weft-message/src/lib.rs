//! Weft Message
//!
//! This crate provides the [`ControlMessage`], the unit of work that flows
//! into and out of the weft engine. A control message carries:
//! - per-type FIFO task queues (`add_task` / `remove_task`)
//! - a metadata map
//! - a JSON payload, typically an object of columns
//! - an opaque attachment for host objects
//!
//! Messages are shared as `Arc<ControlMessage>` and are internally
//! synchronized, so every method takes `&self`.
//!
//! # Config format
//!
//! ```json
//! {
//!   "type": "inference",
//!   "tasks": [
//!     { "type": "llm_engine", "properties": { "task_type": "template", "task_dict": {} } }
//!   ],
//!   "metadata": { "source": "batch-7" }
//! }
//! ```

mod error;
mod message;

pub use error::MessageError;
pub use message::{Attachment, ControlMessage, ControlMessageType};
