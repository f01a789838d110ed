//! Three-phase call bridge: validate, execute, complete.
//!
//! ```text
//! caller task          blocking worker          caller task
//! ───────────          ───────────────          ───────────
//! validate(args) ──►   execute(input)   ──►     complete(raw)
//!   │ Err                                         │
//!   └──► Parameter error, nothing else runs       └──► caller's result
//! ```
//!
//! Validate reads caller-owned arguments and must produce owned input; only
//! that input crosses to the worker. Once execute has started it runs to
//! completion even if the caller stops waiting; its result is then dropped.

use datashare_common::protocol::{DataShareError, Result};
use tracing::error;

/// One bridged call. Build with [`AsyncCall::new`], run with
/// [`AsyncCall::call`].
pub struct AsyncCall<V, E, C> {
    validate: V,
    execute: E,
    complete: C,
}

impl<V, E, C, I, R, T> AsyncCall<V, E, C>
where
    V: FnOnce() -> Result<I>,
    E: FnOnce(I) -> R + Send + 'static,
    C: FnOnce(R) -> Result<T>,
    I: Send + 'static,
    R: Send + 'static,
{
    pub fn new(validate: V, execute: E, complete: C) -> Self {
        Self { validate, execute, complete }
    }

    pub async fn call(self) -> Result<T> {
        let AsyncCall { validate, execute, complete } = self;

        let input = validate().map_err(|e| match e {
            DataShareError::Parameter(_) => e,
            other => DataShareError::Parameter(other.to_string()),
        })?;

        let raw = tokio::task::spawn_blocking(move || execute(input))
            .await
            .map_err(|e| {
                error!(error = %e, "execute phase did not finish");
                DataShareError::Transport(format!("execute phase failed: {}", e))
            })?;

        complete(raw)
    }
}
