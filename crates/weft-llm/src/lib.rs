//! Weft LLM Engine
//!
//! Runs a graph of computation nodes against a [`ControlMessage`] and turns
//! the results into follow-on messages.
//!
//! For every queued task of the engine's type, [`LlmEngine::run`]:
//! 1. builds a root [`LlmContext`] from the task and the message
//! 2. executes the root node against it; nodes push a child context per
//!    delegated node and publish into a run-wide scratch store
//! 3. offers the outputs to each registered [`LlmTaskHandler`] in order until
//!    one claims them
//!
//! Nodes read inputs by path (`/extracter/questions`) through the wiring set
//! up with [`process_input_names`]; see [`input_map`] for the wiring rules.

mod context;
mod engine;
mod error;
pub mod handlers;
pub mod input_map;
mod node;
pub mod nodes;
mod scratch;
mod task;
mod task_handler;

pub use context::{LlmContext, LlmContextState, OutputsHandle};
pub use engine::{DEFAULT_TASK_TYPE, EngineConfig, LlmEngine};
pub use error::LlmError;
pub use input_map::{InputMap, InputMappings, UserInputMapping, process_input_names};
pub use node::{LlmNode, LlmNodeBase, LlmNodeRunner};
pub use scratch::ScratchStore;
pub use task::LlmTask;
pub use task_handler::{HANDLER_CONTEXT_NAME, LlmTaskHandler, LlmTaskHandlerRunner};

pub use weft_message::ControlMessage;
