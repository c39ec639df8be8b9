pub mod color_cache;
pub mod color_service;
pub mod prefetch;

pub use color_cache::{CacheStats, ColorCache};
pub use color_service::{ColorService, ServiceStats};
pub use prefetch::Prefetcher;
