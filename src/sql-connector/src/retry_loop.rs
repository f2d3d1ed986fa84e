// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::Result;
use crate::backoff_policy::BackoffPolicy;
use crate::error::Error;
use crate::retry_policy::{RetryPolicy, RetryResult, RetryState};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs the retry loop for a given function.
///
/// This functions calls an inner function until (1) the inner function
/// returns a successful response, (2) the retry policy stops the loop, or
/// (3) `cancel` is triggered.
///
/// In between calls the function waits the amount of time prescribed by the
/// backoff policy, using `sleep` to implement any sleep. Cancellation aborts
/// both the attempts and the sleeps, the loop then returns an error where
/// [Error::is_cancelled] is true.
pub(crate) async fn retry_loop<F, Fut, S, SFut, Response>(
    mut inner: F,
    sleep: S,
    method: http::Method,
    cancel: &CancellationToken,
    retry_policy: &dyn RetryPolicy,
    backoff_policy: &dyn BackoffPolicy,
) -> Result<Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Response>>,
    S: Fn(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let mut state = RetryState::new(method);
    state.start = tokio::time::Instant::now().into_std();
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            r = inner() => r,
        };
        let error = match result {
            Ok(r) => return Ok(r),
            Err(e) => e,
        };
        state.on_failure(&error);
        let error = match retry_policy.on_error(&state, error) {
            RetryResult::Permanent(e) | RetryResult::Exhausted(e) => return Err(e),
            RetryResult::Continue(e) => e,
        };
        let delay = backoff_policy.on_failure(state.start, state.attempt_count);
        tracing::debug!(
            attempt_count = state.attempt_count,
            ?delay,
            %error,
            "retrying SQL Admin API request"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled()),
            _ = sleep(delay) => {},
        }
    }
}
