use super::types::BreakerState;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Observer notified on every breaker state transition.
///
/// Listeners run while the breaker's lock is held, so they must not call back
/// into the same breaker.
pub trait StateChangeListener: Send + Sync {
    fn on_state_change(
        &self,
        name: &str,
        from: BreakerState,
        to: BreakerState,
    ) -> anyhow::Result<()>;
}

/// Adapter for plain closures that cannot fail
pub(crate) struct FnListener<F>(pub(crate) F);

impl<F> StateChangeListener for FnListener<F>
where
    F: Fn(&str, BreakerState, BreakerState) + Send + Sync,
{
    fn on_state_change(
        &self,
        name: &str,
        from: BreakerState,
        to: BreakerState,
    ) -> anyhow::Result<()> {
        (self.0)(name, from, to);
        Ok(())
    }
}

/// Registered listeners of one breaker
#[derive(Default, Clone)]
pub(crate) struct Listeners {
    inner: Vec<Arc<dyn StateChangeListener>>,
}

impl Listeners {
    pub(crate) fn push(&mut self, listener: Arc<dyn StateChangeListener>) {
        self.inner.push(listener);
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    /// Invoke every listener, isolating errors and panics per listener
    pub(crate) fn notify(&self, name: &str, from: BreakerState, to: BreakerState) {
        for (index, listener) in self.inner.iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| {
                listener.on_state_change(name, from, to)
            }));

            match result {
                Ok(Ok(())) => {
                    debug!(breaker = %name, listener = index, %from, %to, "Listener notified");
                }
                Ok(Err(e)) => {
                    warn!(
                        breaker = %name,
                        listener = index,
                        %from,
                        %to,
                        error = %e,
                        "State change listener failed"
                    );
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    warn!(
                        breaker = %name,
                        listener = index,
                        %from,
                        %to,
                        panic = %message,
                        "State change listener panicked"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.inner.len())
            .finish()
    }
}
