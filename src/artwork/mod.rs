// Artwork module
// Turns a track's album/track identifier into a publicly reachable image

pub mod cache;
pub mod publisher;

pub use cache::ArtCache;
pub use publisher::{CatboxPublisher, ImagePublisher};

/// Resolves artwork URLs, publishing each identifier at most once
///
/// Successful uploads are remembered in the cache (and on disk); failures are
/// not, so the next call for the same identifier tries again.
pub struct ArtResolver<P> {
    cache: ArtCache,
    publisher: P,
    server_url: String,
    placeholder: String,
}

impl<P: ImagePublisher> ArtResolver<P> {
    pub fn new(
        cache: ArtCache,
        publisher: P,
        server_url: impl Into<String>,
        placeholder: impl Into<String>,
    ) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self {
            cache,
            publisher,
            server_url,
            placeholder: placeholder.into(),
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &ArtCache {
        &self.cache
    }

    /// Where the media server serves the primary image for `key`
    pub fn source_url(&self, key: &str) -> String {
        format!("{}/Items/{}/Images/Primary", self.server_url, key)
    }

    /// Public URL for the artwork, or the placeholder key if there is none
    pub fn resolve(&mut self, album_id: Option<&str>, track_id: Option<&str>) -> String {
        let Some(key) = artwork_key(album_id, track_id) else {
            return self.placeholder.clone();
        };

        if let Some(url) = self.cache.get(key) {
            return url.to_string();
        }

        let source = self.source_url(key);
        match self.publisher.publish(&source) {
            Ok(url) => {
                self.cache.insert_and_persist(key, url.as_str());
                url
            }
            Err(e) => {
                log::warn!("Could not publish artwork for {}: {}", key, e);
                self.placeholder.clone()
            }
        }
    }
}

/// Album identifier when present, otherwise the track identifier
pub fn artwork_key<'a>(album_id: Option<&'a str>, track_id: Option<&'a str>) -> Option<&'a str> {
    album_id
        .filter(|id| !id.is_empty())
        .or(track_id.filter(|id| !id.is_empty()))
}
