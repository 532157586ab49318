pub mod classifier;
pub mod pipeline;
