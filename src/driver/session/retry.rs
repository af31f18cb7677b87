// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::result::Result as StdResult;
use std::thread::sleep;
use std::time::{Duration, Instant};

use log::warn;
use rand::Rng;
use thiserror::Error;

use crate::{Neo4jError, Result};

/// Decides whether and when a failed unit of work is attempted again.
pub trait RetryPolicy {
    type Error;

    fn execute<R>(&self, work: impl FnMut() -> Result<R>) -> StdResult<R, Self::Error>;
}

/// Retries errors for which [`Neo4jError::is_retryable()`] holds, waiting exponentially longer
/// between attempts.
///
/// Defaults: the first retry waits 1 second, every further one twice as long as the previous,
/// each delay jittered by ±20 %.
/// It gives up once 30 seconds have passed since the first attempt failed or after 10
/// attempts, whichever comes first.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_retry_time: Duration,
    max_attempts: usize,
    factor: f64,
    jitter: f64,
}

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("non-retryable error occurred: {0}")]
    Neo4jError(#[from] Neo4jError),
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

impl RetryError {
    /// The error that ended the retries.
    pub fn last_error(&self) -> &Neo4jError {
        match self {
            RetryError::Neo4jError(err) => err,
            RetryError::Timeout(TimeoutError { errors }) => {
                errors.last().unwrap_or_else(|| unreachable!("timeout without errors"))
            }
        }
    }
}

/// The retry budget ran out. Holds the errors of every attempt, oldest first.
#[derive(Error, Debug)]
#[error(
    "gave up retrying after {} attempts, last error: {}",
    .errors.len(),
    .errors.last().map(ToString::to_string).unwrap_or_default()
)]
pub struct TimeoutError {
    errors: Vec<Neo4jError>,
}

impl TimeoutError {
    pub fn errors(&self) -> &[Neo4jError] {
        &self.errors
    }
}

impl From<TimeoutError> for Vec<Neo4jError> {
    fn from(value: TimeoutError) -> Self {
        value.errors
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_delay(self, initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            ..self
        }
    }

    pub fn with_max_retry_time(self, max_retry_time: Duration) -> Self {
        Self {
            max_retry_time,
            ..self
        }
    }

    /// At least one attempt is always made.
    pub fn with_max_attempts(self, max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_retry_time: Duration::from_secs(30),
            max_attempts: 10,
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy for &ExponentialBackoff {
    type Error = RetryError;

    fn execute<R>(&self, mut work: impl FnMut() -> Result<R>) -> StdResult<R, Self::Error> {
        let mut time_start = None;
        let mut errors = Vec::new();
        let mut current_delay = self.initial_delay.as_secs_f64();
        let mut rng = rand::thread_rng();
        loop {
            let res = work();
            let time_start = *time_start.get_or_insert_with(Instant::now);
            let err = match res {
                Err(e) if e.is_retryable() => e,
                _ => return res.map_err(Into::into),
            };
            errors.push(err);
            if errors.len() >= self.max_attempts || time_start.elapsed() >= self.max_retry_time {
                return Err(TimeoutError { errors }.into());
            }
            let jitter_factor = 1.0 + rng.gen_range(-self.jitter..=self.jitter);
            let jittered_delay = current_delay * jitter_factor;
            warn!(
                "transaction failed and will be retried in {:.4} seconds: {}",
                jittered_delay,
                errors.last().map(ToString::to_string).unwrap_or_default()
            );
            sleep(Duration::try_from_secs_f64(jittered_delay).unwrap_or(Duration::MAX));
            current_delay *= self.factor;
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    type Error = <&'static ExponentialBackoff as RetryPolicy>::Error;

    fn execute<R>(&self, work: impl FnMut() -> Result<R>) -> StdResult<R, Self::Error> {
        (&self).execute(work)
    }
}
