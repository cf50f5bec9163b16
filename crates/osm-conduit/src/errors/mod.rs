//! Centralized error handling for the conduit pipeline
//!
//! Every library operation returns [`PipelineResult`]. Errors fall into four
//! groups:
//!
//! - **Configuration errors**: raised while registering tasks and orderings or
//!   while assembling a pipeline, always before any task starts
//! - **I/O errors**: spill storage, dataset files, record serialization
//! - **Runtime errors**: failures observed while the task graph is running,
//!   including cancellation and upstream failure
//! - **Contract violations**: defects in calling code, never recoverable
//!
//! # Usage
//!
//! ```rust
//! use osm_conduit::errors::{PipelineError, PipelineResult};
//!
//! fn check_buffer(size: usize) -> PipelineResult<usize> {
//!     if size == 0 {
//!         return Err(PipelineError::config_error("buffer size must be positive"));
//!     }
//!     Ok(size)
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;
