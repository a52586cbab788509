pub mod error_tracker;

pub use error_tracker::{tags, ErrorCapture, ErrorTracker, Tags};
