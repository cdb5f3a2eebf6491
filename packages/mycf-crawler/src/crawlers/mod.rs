//! Request construction and pacing.
//!
//! - `FetchRouter` - builds the redundant request variants for a page
//! - `AutoThrottle` - concurrency bound, floor delay and adaptive backoff
//! - `RobotsGate` - robots.txt checks, cached per origin

pub mod robots;
pub mod router;
pub mod throttle;

pub use robots::{RobotsGate, RobotsTxt};
pub use router::FetchRouter;
pub use throttle::{AutoThrottle, Outcome, ThrottlePermit};
