//! TTL-aware media URL resolution
//!
//! Resolved URLs expire on the provider side. Each cached URL carries the
//! instant it was resolved; before use:
//!
//! - remaining life below the renewal threshold: re-resolve, keeping the
//!   still-valid URL if that fails
//! - age at or past the TTL: the entry is discarded and re-resolved before
//!   anything downloads or streams it

use super::PreloadManager;
use crate::cache::UrlFreshness;
use crate::error::{Error, Result};
use crate::providers::Track;
use crate::state::SessionToken;
use tracing::{debug, warn};

impl PreloadManager {
    /// A URL for `query` that is safe to hand to a download or playback call
    pub async fn ensure_fresh_url(&self, token: &SessionToken, query: &str) -> Result<String> {
        let media = &self.config.media;
        match self
            .cache
            .url_freshness(query, media.url_ttl(), media.url_renew_threshold())
        {
            UrlFreshness::Fresh(url) => Ok(url),
            UrlFreshness::Renew(url) => match self.resolve_url(token, query).await {
                Ok(renewed) => {
                    debug!("Renewed URL for '{}'", query);
                    Ok(renewed)
                }
                Err(Error::SessionExpired(id)) => Err(Error::SessionExpired(id)),
                Err(e) => {
                    warn!("URL renewal for '{}' failed, keeping current URL: {}", query, e);
                    Ok(url)
                }
            },
            UrlFreshness::Expired => {
                debug!("URL for '{}' expired, re-resolving", query);
                self.resolve_url(token, query).await
            }
            UrlFreshness::Missing => self.resolve_url(token, query).await,
        }
    }

    /// Resolve a fresh URL for `query` and cache it
    async fn resolve_url(&self, token: &SessionToken, query: &str) -> Result<String> {
        let track = self.resolve_track(token, query).await?;
        let source = if track.source.is_empty() {
            self.config.media.source.as_str()
        } else {
            track.source.as_str()
        };

        let url = self
            .media
            .resolve_url(&track.id, self.config.media.bitrate, source)
            .await?;
        if url.is_empty() {
            return Err(Error::Media(format!("empty URL for track {}", track.id)));
        }

        token.ensure_current()?;
        self.cache.commit_url(token, query, url.clone());
        Ok(url)
    }

    /// Catalog entry for `query`, searching once and caching the result
    pub async fn resolve_track(&self, token: &SessionToken, query: &str) -> Result<Track> {
        if let Some(track) = self.cache.track(query) {
            return Ok(track);
        }

        let track = self
            .media
            .search(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Media(format!("no results for '{}'", query)))?;

        token.ensure_current()?;
        self.cache.commit_track(token, query, track.clone());
        debug!("Resolved '{}' to {}", query, track.display_name());

        if let Some(lyric_id) = &track.lyric_id {
            match self.media.lyrics(lyric_id, &track.source).await {
                Ok(Some(lyrics)) => {
                    self.cache.commit_lyrics(token, query, lyrics);
                }
                Ok(None) => {}
                Err(e) => debug!("No lyrics for '{}': {}", query, e),
            }
        }

        Ok(track)
    }
}
