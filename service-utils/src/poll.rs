// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polling a condition until it holds.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Result of one check of a condition.
#[derive(Debug)]
pub enum CondCheckError<E> {
    /// The condition does not hold yet; check again after the interval.
    NotYet,
    /// The condition can never hold; stop polling.
    Failed(E),
}

impl<E> From<E> for CondCheckError<E> {
    fn from(error: E) -> Self {
        CondCheckError::Failed(error)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error<E: std::error::Error + 'static> {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("condition check failed")]
    PermanentError(#[source] E),
}

/// Checks `cond` immediately and then every `poll_interval` until it
/// returns a value or a permanent error.
///
/// With `max_wait` of `None` this waits forever.
pub async fn wait_for_condition<O, E, Func, Fut>(
    mut cond: Func,
    poll_interval: &Duration,
    max_wait: Option<&Duration>,
) -> Result<O, Error<E>>
where
    E: std::error::Error + 'static,
    Func: FnMut() -> Fut,
    Fut: Future<Output = Result<O, CondCheckError<E>>>,
{
    let start = Instant::now();
    loop {
        match cond().await {
            Ok(output) => return Ok(output),
            Err(CondCheckError::Failed(e)) => {
                return Err(Error::PermanentError(e))
            }
            Err(CondCheckError::NotYet) => {}
        }

        let elapsed = start.elapsed();
        if let Some(max_wait) = max_wait {
            if elapsed >= *max_wait {
                return Err(Error::TimedOut(elapsed));
            }
        }

        tokio::time::sleep(*poll_interval).await;
    }
}
