pub mod console;
pub mod kite;
pub mod mock;
pub mod persistence;
