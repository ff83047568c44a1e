use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

use super::{
    bridge::{self, BridgeMetadata, TrackSearch},
    Resolver, SourceKind, Track,
};
use crate::error::ResolutionError;

static TRACK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"tidal\.com/(?:browse/)?track/(\d+)").expect("tidal track regex"));

static COLLECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"tidal\.com/(?:browse/)?(album|playlist|mix|artist|video)/").expect("tidal collection regex")
});

static OG_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<meta\s+(?:property="og:(title|image)"\s+content="([^"]*)"|content="([^"]*)"\s+property="og:(title|image)")"#,
    )
    .expect("og tag regex")
});

/// Metadata Open Graph de la página pública del track
#[derive(Debug, Default, PartialEq)]
struct OpenGraph {
    title: Option<String>,
    image: Option<String>,
}

fn parse_open_graph(html: &str) -> OpenGraph {
    let mut og = OpenGraph::default();

    for caps in OG_TAG.captures_iter(html) {
        let (name, value) = match (caps.get(1), caps.get(2), caps.get(3), caps.get(4)) {
            (Some(name), Some(value), _, _) => (name.as_str(), value.as_str()),
            (_, _, Some(value), Some(name)) => (name.as_str(), value.as_str()),
            _ => continue,
        };

        let value = decode_entities(value);
        match name {
            "title" if og.title.is_none() => og.title = Some(value),
            "image" if og.image.is_none() => og.image = Some(value),
            _ => {}
        }
    }

    og
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Quita el sufijo " on TIDAL" que añade la página
fn strip_site_suffix(title: &str) -> &str {
    title
        .trim()
        .trim_end_matches(" on TIDAL")
        .trim_end_matches(" | TIDAL")
        .trim()
}

pub fn parse_track_id(url: &str) -> Option<String> {
    TRACK_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub struct TidalResolver {
    http: reqwest::Client,
    search: Arc<dyn TrackSearch>,
}

impl TidalResolver {
    pub fn new(http: reqwest::Client, search: Arc<dyn TrackSearch>) -> Self {
        Self { http, search }
    }
}

#[async_trait]
impl Resolver for TidalResolver {
    fn is_non_playable(&self, url: &str) -> bool {
        COLLECTION.is_match(url)
    }

    async fn resolve(&self, input: &str) -> Result<Track, ResolutionError> {
        let id = parse_track_id(input).ok_or_else(|| ResolutionError::InvalidUrl {
            kind: SourceKind::TidalBridge,
            url: input.to_string(),
        })?;

        let page_url = format!("https://tidal.com/browse/track/{}", id);
        info!("🌊 Leyendo página de Tidal: {}", page_url);

        let html = self
            .http
            .get(&page_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let og = parse_open_graph(&html);
        let Some(title) = og.title.as_deref().map(strip_site_suffix).filter(|t| !t.is_empty()) else {
            warn!("⚠️ Tidal {} sin og:title", id);
            return Err(ResolutionError::MissingMetadata {
                kind: SourceKind::TidalBridge,
                reason: "la página no tiene og:title".to_string(),
            });
        };

        let metadata = BridgeMetadata::from_combined(title).with_artwork(og.image);
        bridge::finish(self.search.as_ref(), SourceKind::TidalBridge, &page_url, metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::bridge::{tests::FakeSearch, UNKNOWN_ARTIST};
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"<html><head>
        <meta property="og:title" content="Around the World by Daft Punk on TIDAL">
        <meta content="https://resources.tidal.com/images/abc/1280x1280.jpg" property="og:image">
        </head></html>"#;

    #[test]
    fn test_parse_track_id() {
        assert_eq!(parse_track_id("https://tidal.com/browse/track/77646168"), Some("77646168".to_string()));
        assert_eq!(parse_track_id("https://listen.tidal.com/track/77646168?u"), Some("77646168".to_string()));
        assert_eq!(parse_track_id("https://tidal.com/browse/album/77646164"), None);
    }

    #[test]
    fn test_collections_are_not_playable() {
        let resolver = TidalResolver::new(reqwest::Client::new(), Arc::new(FakeSearch::default()));

        assert!(resolver.is_non_playable("https://tidal.com/browse/album/77646164"));
        assert!(resolver.is_non_playable("https://listen.tidal.com/playlist/abc-def"));
        assert!(resolver.is_non_playable("https://tidal.com/browse/mix/0123"));
        assert!(resolver.is_non_playable("https://tidal.com/browse/artist/8847"));
        assert!(!resolver.is_non_playable("https://tidal.com/browse/track/77646168"));
    }

    #[test]
    fn test_open_graph_scraping() {
        let og = parse_open_graph(PAGE);

        let title = og.title.as_deref().map(strip_site_suffix).unwrap();
        assert_eq!(title, "Around the World by Daft Punk");
        assert_eq!(
            og.image.as_deref(),
            Some("https://resources.tidal.com/images/abc/1280x1280.jpg")
        );
        assert_eq!(
            BridgeMetadata::from_combined(title),
            BridgeMetadata::new("Around the World", "Daft Punk")
        );
    }

    #[test]
    fn test_entities_are_decoded() {
        let og = parse_open_graph(r#"<meta property="og:title" content="Rock &amp; Roll &quot;Live&quot;">"#);
        let metadata = BridgeMetadata::from_combined(og.title.as_deref().unwrap());

        assert_eq!(metadata.title, "Rock & Roll \"Live\"");
        assert_eq!(metadata.artist, UNKNOWN_ARTIST);
    }

    #[test]
    fn test_page_without_tags() {
        assert_eq!(parse_open_graph("<html></html>"), OpenGraph::default());
    }
}
