//! Stock task handlers.

mod simple;

pub use simple::SimpleTaskHandler;
