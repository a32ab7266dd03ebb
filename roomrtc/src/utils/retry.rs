// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! A bounded, predicate-gated retry driver.

use crate::error::EngineError;
use std::future::Future;
use std::time::Duration;

const LOG_TARGET: &str = "roomrtc-retry";

/// Run `body` up to `attempts` times.
///
/// After a failed attempt the driver sleeps for `delay` and then
/// consults `condition(tries_left, last_error)`; a `false` answer stops
/// the driver early. The last error is surfaced to the caller either
/// way. `attempts` is clamped to at least one.
pub async fn retry<T, F, Fut, C>(
    attempts: u32,
    delay: Duration,
    mut condition: C,
    mut body: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
    C: FnMut(u32, &EngineError) -> bool,
{
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        match body().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let tries_left = attempts - attempt;
                if tries_left == 0 {
                    return Err(error);
                }

                tracing::debug!(
                    target: LOG_TARGET,
                    %error,
                    tries_left,
                    "attempt {attempt} failed, retrying in {delay:?}",
                );

                tokio::time::sleep(delay).await;

                if !condition(tries_left, &error) {
                    return Err(error);
                }
            }
        }
    }

    unreachable!("the final attempt either returned or surfaced its error")
}
