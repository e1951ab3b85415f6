pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod signal;

pub use detectors::*;
pub use error::DetectionError;
pub use metrics::*;
pub use signal::*;
