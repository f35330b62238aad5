pub mod cache;
pub mod usage;
