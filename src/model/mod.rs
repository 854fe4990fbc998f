pub mod quiz;
pub mod submission;
pub mod types;
