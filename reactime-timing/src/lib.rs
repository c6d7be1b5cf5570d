pub mod queue;
pub mod timer;

pub use queue::{TimerId, TimerQueue};
pub use timer::{CalibrationStats, HighPrecisionTimer, ManualTimer, Timer};
