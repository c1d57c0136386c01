pub mod mean_variance;

pub use mean_variance::{FrontierPoint, MeanVarianceOptimizer};
