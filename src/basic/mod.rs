pub mod aux_node;
pub mod config;
pub mod convert;
pub mod coords;
pub mod derived;
pub mod error;
pub mod naming;
pub mod parallel;
pub mod summary;
pub mod volt_lvl;

pub use config::ConversionConfig;
pub use convert::TopologyConversion;
pub use error::TopologyError;
