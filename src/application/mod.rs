pub mod deleter;
pub mod scheduler;
pub mod sell;
