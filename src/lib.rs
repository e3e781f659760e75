//! frametrack - Frame-aware execution time profiler
//!
//! Measures how long tracked operations take, separates self time from
//! total time across nested calls and deferred continuations, groups the
//! measurements into frames delimited by a boundary operation, and keeps
//! rolling statistics that flag frames over budget.

pub mod accounting;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod csv_output;
pub mod demo;
pub mod error;
pub mod event_loop;
pub mod frames;
pub mod json_output;
pub mod palette;
pub mod profiler;
pub mod registry;
pub mod stats;
pub mod text_output;
pub mod tracked;

pub use error::{ProfilerError, Result};
pub use profiler::Profiler;
pub use tracked::{Continuation, InvocationScope, Trackable, Tracked};
