pub mod scheduler;
pub mod stats;
pub mod timer;

pub use scheduler::{CancelToken, PhaseTimer, TimerError};
pub use stats::{LatenessWindow, TimingStats};
pub use timer::{Clock, HighPrecisionTimer, ManualClock};
