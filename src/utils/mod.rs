pub mod duration;

pub use duration::parse_duration_ms;
