pub mod traits;

pub use traits::{MetricsSink, Publisher};
