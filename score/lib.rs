#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod contribution;
pub mod data;
pub mod eras;
pub mod gaussian;
pub mod neutralize;
pub mod orthogonal;
pub mod rank;
pub mod stats;
pub mod types;

pub use contribution::{
    PreparedTarget, TcScorer, calculate_feature_neutralized_tc, calculate_tc, calculate_tc_batch,
};
pub use gaussian::gaussianize;
pub use orthogonal::orthogonalize;
pub use rank::rank;
pub use types::{ScoreError, ScoringOptions};
