pub mod suite;
pub mod types;
