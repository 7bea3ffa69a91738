#![forbid(unsafe_code)]

pub mod model;
pub mod time;
pub mod translate;

pub use time::Clock;
