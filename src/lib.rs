pub mod calibration;
pub mod config;
pub mod error;
pub mod imaging;
pub mod logging;
pub mod measure;
pub mod pose;
pub mod protocol;
pub mod report;
pub mod service;

pub use error::{MeasureError, MeasureResult};
pub use service::MeasurementService;
