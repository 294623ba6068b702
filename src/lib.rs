pub mod batch;
pub mod config;
pub mod error;
pub mod features;
pub mod lookup;
pub mod model;
pub mod report;
pub mod schema;
pub mod state;
pub mod valuation;

pub use error::ValueError;
