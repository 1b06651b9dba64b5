pub mod breaker;
pub mod listener;
pub mod registry;
pub mod retry;
pub mod types;
pub mod window;

pub use breaker::{effective_state, Breaker, Classifier, Permit};
pub use listener::StateChangeListener;
pub use registry::BreakerRegistry;
pub use retry::RetryExecutor;
pub use types::{BreakerConfig, BreakerMetrics, BreakerState, RetryConfig};
pub use window::{Outcome, RollingWindow};
