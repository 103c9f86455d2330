pub mod board;
pub mod duration;
pub mod machine;

pub use board::OvertimeBoard;
pub use duration::{project, span_between, DurationProjection, Elapsed};
pub use machine::{truncate_to_second, Transition};
