pub mod provider;
pub mod rest;

pub use provider::{GameFilter, RecordStore};
pub use rest::RestStore;
