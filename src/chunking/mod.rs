//! Text chunking into the tree's leaf segments

pub mod chunker;
pub mod token_estimator;

pub use chunker::Chunker;
pub use token_estimator::TokenEstimator;
