#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Async shell of the powerctl control layer: bounded HTTP attempts, retry,
//! status polling, and the controller the UI talks to.

pub mod config;
pub mod controller;
pub mod device;
pub mod executor;
pub mod poll;
pub mod retry;

pub use config::{ClientConfig, ConfigError, DeviceConfig};
pub use controller::Controller;
pub use device::DeviceClient;
pub use executor::{ApiRequest, RawResponse, RequestExecutor};
pub use poll::{PollEvent, PollHandle, PollLoop};
pub use retry::{with_retry, RetryPolicy};
