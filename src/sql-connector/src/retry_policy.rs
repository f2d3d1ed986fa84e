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

//! Defines the trait for retry policies and the SQL Admin API policy.
//!
//! The connector retries SQL Admin API requests that fail with transient
//! errors: any 5xx response, and failures where no response was received at
//! all. Requests rejected by the service (4xx), credential failures, and
//! validation failures are never retried.
//!
//! Retry policies are stateless. The retry loop keeps the per-request state in
//! a [RetryState], so a single policy can be shared by concurrent requests.

use crate::error::Error;
use http::Method;
use std::time::Instant;

/// The result of a retry policy decision.
///
/// In all variants the result includes the error, so the retry loop can
/// return it or report it before the next attempt.
#[derive(Debug)]
pub enum RetryResult {
    /// The error is non-retryable, stop the loop.
    Permanent(Error),

    /// The error is retryable, but the policy is stopping the loop.
    ///
    /// The policy only allows a limited number of attempts.
    Exhausted(Error),

    /// The error was retryable, continue the loop.
    Continue(Error),
}

impl RetryResult {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue(_))
    }
}

/// The input into a retry policy query.
///
/// The retry loop creates one instance per request and updates it after each
/// failed attempt.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct RetryState {
    /// The HTTP method of the request.
    pub method: Method,

    /// The start time for this retry loop.
    pub start: Instant,

    /// The number of times the request has been attempted.
    pub attempt_count: u32,

    /// The number of attempts that failed without receiving a response.
    pub no_response_count: u32,
}

impl RetryState {
    /// Create a new instance.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            start: Instant::now(),
            attempt_count: 0,
            no_response_count: 0,
        }
    }

    /// Update the attempt count, useful in mocks.
    pub fn set_attempt_count<T: Into<u32>>(mut self, v: T) -> Self {
        self.attempt_count = v.into();
        self
    }

    /// Update the count of attempts without a response, useful in mocks.
    pub fn set_no_response_count<T: Into<u32>>(mut self, v: T) -> Self {
        self.no_response_count = v.into();
        self
    }

    /// Records a failed attempt.
    pub(crate) fn on_failure(&mut self, error: &Error) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        if is_no_response(error) {
            self.no_response_count = self.no_response_count.saturating_add(1);
        }
    }
}

/// Controls the retry loop behavior.
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Query the retry policy after an error.
    ///
    /// # Parameters
    /// * `state` - the request method and the attempt counts, including the
    ///   attempt that just failed.
    /// * `error` - the last error received. Not all are service errors, the
    ///   request may have failed before a response was received.
    fn on_error(&self, state: &RetryState, error: Error) -> RetryResult;
}

const DEFAULT_MAXIMUM_RETRIES: u32 = 5;
const DEFAULT_MAXIMUM_NO_RESPONSE_RETRIES: u32 = 3;

/// The retry policy for SQL Admin API requests.
///
/// Retries `GET`, `HEAD`, `PUT`, `OPTIONS`, `DELETE`, and `POST` requests.
/// Certificate issuance is a `POST`, and it is safe to repeat.
///
/// * Responses with a 5xx status code are retried up to 5 times.
/// * Requests that fail without a response (connection refused or reset,
///   timeouts) are retried while the total number of failed attempts, of any
///   kind, is at most 3. After three 5xx responses a connection reset is not
///   retried.
/// * Any other error is permanent.
///
/// # Example
/// ```
/// # use google_cloud_sql_connector::retry_policy::*;
/// # use google_cloud_sql_connector::error::Error;
/// let policy = SqlAdminRetryPolicy::default().with_maximum_retries(2);
/// let state = RetryState::new(http::Method::GET).set_attempt_count(1_u32);
/// let result = policy.on_error(&state, Error::http(503, bytes::Bytes::new()));
/// assert!(result.is_continue());
/// let state = state.set_attempt_count(3_u32);
/// let result = policy.on_error(&state, Error::http(503, bytes::Bytes::new()));
/// assert!(result.is_exhausted());
/// ```
#[derive(Clone, Debug)]
pub struct SqlAdminRetryPolicy {
    maximum_retries: u32,
    maximum_no_response_retries: u32,
}

impl SqlAdminRetryPolicy {
    /// Change the maximum number of retries for 5xx responses.
    pub fn with_maximum_retries(mut self, v: u32) -> Self {
        self.maximum_retries = v;
        self
    }

    /// Change the maximum number of retries for requests without a response.
    ///
    /// The limit applies to the total number of failed attempts, so earlier
    /// 5xx responses count against it.
    pub fn with_maximum_no_response_retries(mut self, v: u32) -> Self {
        self.maximum_no_response_retries = v;
        self
    }
}

impl Default for SqlAdminRetryPolicy {
    fn default() -> Self {
        Self {
            maximum_retries: DEFAULT_MAXIMUM_RETRIES,
            maximum_no_response_retries: DEFAULT_MAXIMUM_NO_RESPONSE_RETRIES,
        }
    }
}

impl RetryPolicy for SqlAdminRetryPolicy {
    fn on_error(&self, state: &RetryState, error: Error) -> RetryResult {
        if !is_retryable_method(&state.method) {
            return RetryResult::Permanent(error);
        }
        if let Some(status_code) = error.http_status_code() {
            if !(500..600).contains(&status_code) {
                return RetryResult::Permanent(error);
            }
            // The first attempt is not a retry.
            return if state.attempt_count > self.maximum_retries {
                RetryResult::Exhausted(error)
            } else {
                RetryResult::Continue(error)
            };
        }
        if is_no_response(&error) {
            // Counts all the failed attempts, not only those without a response.
            return if state.attempt_count > self.maximum_no_response_retries {
                RetryResult::Exhausted(error)
            } else {
                RetryResult::Continue(error)
            };
        }
        RetryResult::Permanent(error)
    }
}

fn is_retryable_method(method: &Method) -> bool {
    [
        Method::GET,
        Method::HEAD,
        Method::PUT,
        Method::OPTIONS,
        Method::DELETE,
        Method::POST,
    ]
    .contains(method)
}

fn is_no_response(error: &Error) -> bool {
    error.is_io() || error.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use test_case::test_case;

    fn http_error(status_code: u16) -> Error {
        Error::http(status_code, bytes::Bytes::from_static(b"test-only"))
    }

    fn state(method: Method, attempt_count: u32, no_response_count: u32) -> RetryState {
        RetryState::new(method)
            .set_attempt_count(attempt_count)
            .set_no_response_count(no_response_count)
    }

    #[test_case(Method::GET)]
    #[test_case(Method::HEAD)]
    #[test_case(Method::PUT)]
    #[test_case(Method::OPTIONS)]
    #[test_case(Method::DELETE)]
    #[test_case(Method::POST)]
    fn retryable_methods(method: Method) {
        let p = SqlAdminRetryPolicy::default();
        let r = p.on_error(&state(method, 1, 0), http_error(503));
        assert!(r.is_continue(), "{r:?}");
    }

    #[test_case(Method::PATCH)]
    #[test_case(Method::TRACE)]
    fn non_retryable_methods(method: Method) {
        let p = SqlAdminRetryPolicy::default();
        let r = p.on_error(&state(method, 1, 0), http_error(503));
        assert!(r.is_permanent(), "{r:?}");
    }

    #[test_case(500)]
    #[test_case(502)]
    #[test_case(503)]
    #[test_case(504)]
    #[test_case(599)]
    fn server_errors(status_code: u16) {
        let p = SqlAdminRetryPolicy::default();
        for attempt_count in 1..=5 {
            let r = p.on_error(&state(Method::GET, attempt_count, 0), http_error(status_code));
            assert!(r.is_continue(), "{attempt_count} {r:?}");
        }
        let r = p.on_error(&state(Method::GET, 6, 0), http_error(status_code));
        assert!(r.is_exhausted(), "{r:?}");
    }

    #[test_case(400)]
    #[test_case(401)]
    #[test_case(403)]
    #[test_case(404)]
    #[test_case(429)]
    fn client_errors(status_code: u16) {
        let p = SqlAdminRetryPolicy::default();
        let r = p.on_error(&state(Method::GET, 1, 0), http_error(status_code));
        assert!(r.is_permanent(), "{r:?}");
    }

    #[test]
    fn no_response() {
        let p = SqlAdminRetryPolicy::default();
        for count in 1..=3 {
            let r = p.on_error(&state(Method::POST, count, count), Error::io("test-only"));
            assert!(r.is_continue(), "{count} {r:?}");
            let r = p.on_error(&state(Method::POST, count, count), Error::timeout("test-only"));
            assert!(r.is_continue(), "{count} {r:?}");
        }
        let r = p.on_error(&state(Method::POST, 4, 4), Error::io("test-only"));
        assert!(r.is_exhausted(), "{r:?}");
    }

    #[test]
    fn no_response_after_server_errors() {
        let p = SqlAdminRetryPolicy::default();
        let r = p.on_error(&state(Method::GET, 3, 1), Error::io("test-only"));
        assert!(r.is_continue(), "{r:?}");
        let r = p.on_error(&state(Method::GET, 4, 1), Error::io("test-only"));
        assert!(r.is_exhausted(), "{r:?}");
        let r = p.on_error(&state(Method::GET, 4, 0), http_error(503));
        assert!(r.is_continue(), "{r:?}");
    }

    #[test]
    fn permanent_kinds() {
        let p = SqlAdminRetryPolicy::default();
        let errors = [
            Error::authentication("test-only"),
            Error::cancelled(),
            Error::connector(ErrorCode::NoRegion, "test-only"),
            Error::tls("test-only"),
        ];
        for e in errors {
            let r = p.on_error(&state(Method::GET, 1, 0), e);
            assert!(r.is_permanent(), "{r:?}");
        }
    }

    #[test]
    fn custom_limits() {
        let p = SqlAdminRetryPolicy::default()
            .with_maximum_retries(1)
            .with_maximum_no_response_retries(0);
        let r = p.on_error(&state(Method::GET, 1, 0), http_error(500));
        assert!(r.is_continue(), "{r:?}");
        let r = p.on_error(&state(Method::GET, 2, 0), http_error(500));
        assert!(r.is_exhausted(), "{r:?}");
        let r = p.on_error(&state(Method::GET, 1, 1), Error::io("test-only"));
        assert!(r.is_exhausted(), "{r:?}");
    }

    #[test]
    fn state_on_failure() {
        let mut s = RetryState::new(Method::GET);
        s.on_failure(&http_error(503));
        assert_eq!((s.attempt_count, s.no_response_count), (1, 0));
        s.on_failure(&Error::io("test-only"));
        assert_eq!((s.attempt_count, s.no_response_count), (2, 1));
        s.on_failure(&Error::timeout("test-only"));
        assert_eq!((s.attempt_count, s.no_response_count), (3, 2));
    }
}
