pub mod artifact;
pub mod features;
pub mod metrics;
pub mod regressor;
pub mod scorer;
pub mod target;
pub mod trainer;
