pub mod conditioning;
pub mod ecg;
pub mod fiducials;
pub mod peaks;
