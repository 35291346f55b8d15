pub mod caching;
pub mod math;
pub mod monitoring;
pub mod time;

pub use caching::{CacheConfig, CacheStats, CacheStore, MultiLayerCache, RedisStore};
pub use monitoring::AssessmentMetrics;
