//! Admission control for inbound operations.

pub mod clock;
pub mod rate_limiter;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limiter::{RateLimitConfig, RateLimiter, RateWindow};
