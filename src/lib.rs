//! A cross-platform filesystem-notification watch engine: observes a set of
//! paths, coalesces and debounces raw OS notifications, filters the result,
//! and hands typed [`event::Event`] batches to a consumer through
//! [`port::ConsumerPort`].
//!
//! The engine is synchronous and runtime-agnostic: the producer runs on a
//! dedicated OS thread and the only contract offered upward is a blocking
//! `pull`, so any async runtime or cooperative scheduler can drive it from
//! a helper thread without the engine depending on that runtime itself.

mod backend;
mod debounce;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod port;
mod queue;
mod registry;

pub use backend::BackendConfig;
pub use engine::{Config, EngineState, PollOutcome, WatchEngine};
pub use error::{EngineError, Result};
pub use event::{AccessMode, AccessType, Batch, DataType, Event, MetadataType, ObjectKind};
pub use filter::{common_filter, Filter, FilterBuilder};
pub use port::{CancelToken, ConsumerPort, Pulled};
