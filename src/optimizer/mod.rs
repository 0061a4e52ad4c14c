pub mod elasticity;
pub mod pricing;

pub use elasticity::{estimate_elasticity, ElasticityEstimate};
pub use pricing::*;
