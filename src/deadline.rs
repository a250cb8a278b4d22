//! Request-scoped deadline.
//!
//! A request runs up to three sequential external calls (token validation,
//! directory lookup, store operation). Each call has its own budget, and
//! all of them share the request's overall deadline: a step gets
//! `min(step budget, time left on the request)`.
//!
//! ```
//! # use std::time::Duration;
//! # use simple_vault::deadline::Deadline;
//! # tokio_test::block_on(async {
//! let deadline = Deadline::after(Duration::from_secs(10));
//! let n = deadline
//!     .run("lookup", Duration::from_secs(2), async { Ok(7) })
//!     .await?;
//! assert_eq!(n, 7);
//! # Ok::<(), simple_vault::Error>(())
//! # }).unwrap();
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::{Error, Result};

/// Absolute point in time by which the current request must finish.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
        }
    }

    /// Time left before the deadline (zero once passed).
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Run `fut` bounded by `step` and by the time left on the request.
    ///
    /// Expiry surfaces as [`Error::Upstream`] naming the step; nothing is retried.
    pub async fn run<T, F>(&self, step: &str, limit: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let budget = limit.min(self.remaining());
        if budget.is_zero() {
            return Err(Error::Upstream(format!("{step}: request deadline exceeded")));
        }

        match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Upstream(format!(
                "{step}: timed out after {}ms",
                budget.as_millis()
            ))),
        }
    }
}
