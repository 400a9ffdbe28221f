//! Testing utilities and harness for Ripple

mod clock;
mod rule;

pub use clock::ManualClock;
pub use rule::{run_test_runtime, RecordingScheduler, RuntimeTestRule};

pub mod prelude {
    pub use crate::clock::ManualClock;
    pub use crate::rule::{run_test_runtime, RecordingScheduler, RuntimeTestRule};
}
