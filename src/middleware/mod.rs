pub mod logging;
pub mod metrics;

pub use logging::{InvocationId, InvocationLogging};
pub use metrics::MetricsMiddleware;
