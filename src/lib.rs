//! Concurrency-safe circuit breaker with adaptive tripping.
//!
//! A [`Breaker`] trips open on a run of consecutive failures or when the error
//! rate over a rolling window crosses a threshold, rejects calls while open,
//! and lets a bounded number of trial calls through once the recovery timeout
//! has elapsed. All bookkeeping happens on the caller's thread at admission and
//! outcome time; there are no background timers.
//!
//! ```no_run
//! use breaker::{Breaker, BreakerConfig, CallError};
//!
//! # #[derive(Debug, thiserror::Error)]
//! # #[error("upstream down")]
//! # struct UpstreamError;
//! # async fn fetch_quote() -> Result<u64, UpstreamError> { Ok(1) }
//! # async fn run() {
//! let breaker = Breaker::new("quotes", BreakerConfig::default());
//!
//! let price = match breaker.call(|| fetch_quote()).await {
//!     Ok(price) => price,
//!     // Fallback lives at the call site
//!     Err(CallError::Open(_)) => 0,
//!     Err(CallError::Inner(e)) => {
//!         eprintln!("quote service failed: {}", e);
//!         0
//!     }
//! };
//! # let _ = price;
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod observability;

pub use crate::circuit_breaker::{
    Breaker, BreakerConfig, BreakerMetrics, BreakerRegistry, BreakerState, Permit,
    RetryConfig, RetryExecutor, StateChangeListener,
};
pub use crate::config::BreakerSettings;
pub use crate::error::{BreakerError, BreakerOpen, CallError, Result};
pub use crate::metrics::MetricsListener;
pub use crate::observability::{init_tracing, TracingConfig};
