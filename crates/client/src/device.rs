//! Single-device variant: one endpoint that reports power state on GET and
//! accepts a turn-on command on POST. No session is involved.

use std::time::Duration;

use powerctl_core::api::DeviceCommand;
use powerctl_core::model::CommandOutcome;
use powerctl_core::tracker::OperationTracker;
use powerctl_core::{now_ms, Failure, Outcome};

use crate::config::{ClientConfig, ConfigError};
use crate::executor::{ApiRequest, RequestExecutor};
use crate::retry::RetryPolicy;

/// Client for one power-controlled device.
pub struct DeviceClient {
    executor: RequestExecutor,
    endpoint: String,
    source: String,
    timeout: Duration,
    retry: RetryPolicy,
    in_flight: OperationTracker<()>,
}

impl DeviceClient {
    /// Fails if `config` has no `[device]` section.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let device = config
            .device
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("no [device] section configured".into()))?;
        Ok(Self {
            executor: RequestExecutor::new(config.base_url.clone()),
            endpoint: device.endpoint.clone(),
            source: device.source.clone(),
            timeout: config.request_timeout(),
            retry: config.retry_policy(),
            in_flight: OperationTracker::new(),
        })
    }

    /// Resolved device URL.
    pub fn endpoint_url(&self) -> String {
        self.executor.url(&self.endpoint)
    }

    /// Whether a turn-on is in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_active(&())
    }

    /// Current power state, read from whichever field the device reports.
    pub async fn status(&self) -> Outcome<bool> {
        let req = ApiRequest::get(self.endpoint.clone(), self.timeout);
        let executor = &self.executor;
        let raw = self
            .retry
            .run("device status", |_| executor.execute(&req))
            .await?;
        raw.is_on()
    }

    /// Sends `turn_on`; a second press while the first is in flight is
    /// dropped.
    pub async fn turn_on(&self) -> Outcome<CommandOutcome> {
        let Some(_guard) = self.in_flight.begin_scoped(()) else {
            tracing::debug!("turn_on already in flight; skipping");
            return Ok(CommandOutcome::AlreadyInFlight);
        };

        let command = DeviceCommand::turn_on(self.source.clone(), now_ms());
        let body = serde_json::to_value(&command)
            .map_err(|e| Failure::malformed(format!("encode device command: {e}")))?;
        let req = ApiRequest::post(self.endpoint.clone(), self.timeout).json(body);
        let executor = &self.executor;
        let raw = self
            .retry
            .run("device turn_on", |_| executor.execute(&req))
            .await?;
        let ack = raw.ack()?;
        tracing::info!(success = ack.success, message = %ack.message, "device acknowledged turn_on");
        Ok(CommandOutcome::Acknowledged(ack))
    }
}
