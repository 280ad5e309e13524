pub mod ab_batch;
pub mod batch;
pub mod diff;
pub mod status;
pub mod summarize;
