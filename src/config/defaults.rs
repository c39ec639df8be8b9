/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
use std::time::Duration;

// Upstream listing defaults
pub const DEFAULT_API_URL: &str = "https://commons.wikimedia.org/w/api.php";
/// Most results the allimages listing returns per request
pub const DEFAULT_PAGE_LIMIT_MAX: usize = 500;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_LISTING_BYTES: usize = 4 * 1024 * 1024; // 4MB

// Worker pool defaults
pub const DEFAULT_WORKERS: usize = 25;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024; // 20MB

// Cache defaults
pub const DEFAULT_CACHE_CAPACITY: usize = 50_000;

// Session defaults
pub const DEFAULT_MAX_IMAGES: usize = 100;
pub const DEFAULT_MAX_IMAGES_CAP: usize = 1000;
pub const DEFAULT_SESSION_DEADLINE: Duration = Duration::from_secs(20);
pub const DEFAULT_SESSION_MAX_DEADLINE: Duration = Duration::from_secs(10 * 60);

// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

// Background prefetch defaults
pub const DEFAULT_PREFETCH_ENABLED: bool = false;
pub const DEFAULT_PREFETCH_MAX_IMAGES: usize = 1000;
pub const DEFAULT_PREFETCH_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_PREFETCH_DEADLINE: Duration = Duration::from_secs(10 * 60);
