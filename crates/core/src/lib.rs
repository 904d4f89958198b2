#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and pure logic for the powerctl control layer.
//!
//! Everything in this crate is synchronous and free of I/O; the async shell
//! (network, timers) lives in `powerctl-client`.

pub mod api;
pub mod backoff;
pub mod model;
pub mod normalize;
pub mod outcome;
pub mod session;
pub mod tracker;
pub mod view;

mod util;

pub use outcome::{Failure, FailureKind, Outcome};
pub use util::now_ms;
