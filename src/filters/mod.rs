pub mod location;
pub mod motion;

pub use location::{LocationFilter, RejectReason};
pub use motion::MotionSmoother;
