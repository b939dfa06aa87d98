//! Coordinator health gate.

use super::abort::AbortSignal;
use super::Phase;
use crate::error::{MinitrinoError, Result};
use crate::runtime::ContainerRuntime;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Probe run inside the coordinator.
pub const HEALTH_PROBE: [&str; 5] =
    ["curl", "-sf", "--max-time", "10", "http://localhost:8080/v1/info"];

/// Whether a `/v1/info` body reports a started server.
pub fn is_ready(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|info| info.get("starting").and_then(serde_json::Value::as_bool))
        == Some(false)
}

/// Poll the coordinator until it reports ready.
///
/// Returns the number of attempts used. Fails with `HealthTimeout` once
/// `retries` probes have failed, or `Aborted` if the signal fires.
#[instrument(skip(runtime, abort))]
pub async fn wait_until_ready(
    runtime: &dyn ContainerRuntime,
    container: &str,
    retries: u32,
    interval: Duration,
    abort: &AbortSignal,
) -> Result<u32> {
    let retries = retries.max(1);
    for attempt in 1..=retries {
        if abort.is_aborted() {
            return Err(MinitrinoError::Aborted { phase: Phase::HealthGating.to_string() });
        }

        let probed = tokio::select! {
            _ = abort.aborted() => {
                return Err(MinitrinoError::Aborted { phase: Phase::HealthGating.to_string() });
            }
            probed = runtime.exec(container, &HEALTH_PROBE) => probed,
        };

        match probed {
            Ok(output) if output.success() && is_ready(&output.stdout) => {
                info!(attempts = attempt, "Coordinator is ready");
                return Ok(attempt);
            }
            Ok(output) => debug!(attempt, exit_code = output.exit_code, "Coordinator not ready"),
            Err(e) => debug!(attempt, error = %e, "Health probe failed"),
        }

        if attempt < retries {
            tokio::select! {
                _ = abort.aborted() => {
                    return Err(MinitrinoError::Aborted { phase: Phase::HealthGating.to_string() });
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    Err(MinitrinoError::HealthTimeout { container: container.to_string(), attempts: retries })
}
