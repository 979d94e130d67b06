use axum::body::Bytes;
use quick_cache::sync::Cache;
use quick_cache::Weighter;
use std::sync::Arc;

/// Served image bytes, keyed by image id and weighed by size.
pub type ImageCache = Arc<Cache<i64, Bytes, ImageWeighter>>;

pub fn new_cache() -> ImageCache {
    Arc::new(Cache::with_weighter(10, 50 << 20, ImageWeighter))
}

/// Drop images that no longer exist, so they stop being served.
pub fn evict(cache: &ImageCache, image_ids: impl IntoIterator<Item = i64>) {
    for image_id in image_ids {
        cache.remove(&image_id);
    }
}

#[derive(Clone)]
pub struct ImageWeighter;

impl Weighter<i64, Bytes> for ImageWeighter {
    fn weight(&self, _key: &i64, val: &Bytes) -> u64 {
        tracing::debug!("Image length: {}", val.len());
        // Zero-weight entries are never evicted
        (val.len() as u64).max(1)
    }
}
