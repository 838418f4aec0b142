//! Historian Core: configuration, observability and the tool response envelope.
//!
//! Shared by every other crate in the workspace. Nothing here talks to the
//! database or the LLM.

pub mod config;
pub mod observability;
pub mod response;

pub use response::{ErrorDto, ErrorType, ResponseDto, ResponseStatus};
