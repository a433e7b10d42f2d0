pub mod charges;
pub mod errors;
pub mod ladder;
pub mod ports;
pub mod registry;
pub mod types;
