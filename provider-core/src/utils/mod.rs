pub mod duration;

pub use duration::{durations_equivalent, parse_duration};
