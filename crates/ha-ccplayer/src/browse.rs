//! Browse-media tree: sources from the media queue, playlists from MQTT

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const ROOT_ID: &str = "media_player";
pub const MEDIA_SOURCES_ID: &str = "ha_media_source";
pub const SOURCES_ID: &str = "ccplayer_sources";
pub const PLAYLISTS_ID: &str = "ccplayer_playlists";

pub const PLAYLIST_PREFIX: &str = "playlist:";
pub const SOURCE_PREFIX: &str = "source:";

const FALLBACK_BASE_URL: &str = "http://localhost:8123";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrowseError {
    #[error("unknown media id: {0}")]
    UnknownMediaId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaClass {
    Directory,
    Video,
    Playlist,
}

/// One node of the browse tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseMedia {
    pub title: String,
    pub media_class: MediaClass,
    pub media_content_id: String,
    pub media_content_type: String,
    pub can_play: bool,
    pub can_expand: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub children: Vec<BrowseMedia>,
}

impl BrowseMedia {
    fn directory(title: &str, content_id: &str, content_type: &str, children: Vec<BrowseMedia>) -> Self {
        Self {
            title: title.to_string(),
            media_class: MediaClass::Directory,
            media_content_id: content_id.to_string(),
            media_content_type: content_type.to_string(),
            can_play: false,
            can_expand: true,
            thumbnail: None,
            children,
        }
    }

    fn playable(
        title: String,
        media_class: MediaClass,
        content_id: String,
        content_type: &str,
        thumbnail: Option<String>,
    ) -> Self {
        Self {
            title,
            media_class,
            media_content_id: content_id,
            media_content_type: content_type.to_string(),
            can_play: true,
            can_expand: false,
            thumbnail,
            children: Vec::new(),
        }
    }
}

/// What the tree is built from
pub struct BrowseSource<'a> {
    pub playlists: &'a [Value],
    pub queue: &'a [Value],
    /// Prefix for thumbnails given as absolute paths
    pub base_url: Option<&'a str>,
}

impl BrowseSource<'_> {
    pub fn browse(&self, content_id: Option<&str>) -> Result<BrowseMedia, BrowseError> {
        match content_id {
            None | Some("") | Some(ROOT_ID) => Ok(root()),
            Some(MEDIA_SOURCES_ID) => Ok(BrowseMedia::directory(
                "Media Sources",
                MEDIA_SOURCES_ID,
                "directory",
                Vec::new(),
            )),
            Some(SOURCES_ID) => Ok(self.sources()),
            Some(PLAYLISTS_ID) => Ok(self.playlists()),
            Some(other) => Err(BrowseError::UnknownMediaId(other.to_string())),
        }
    }

    fn sources(&self) -> BrowseMedia {
        let children = self
            .queue
            .iter()
            .map(|item| {
                let title = item
                    .get("title")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| format!("Item {}", plain(item.get("index"))));
                let thumbnail = item
                    .get("thumbnail")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .map(|t| absolute_thumbnail(t, self.base_url));
                BrowseMedia::playable(
                    title.clone(),
                    MediaClass::Video,
                    format!("{SOURCE_PREFIX}{title}"),
                    "video",
                    thumbnail,
                )
            })
            .collect();
        BrowseMedia::directory("Sources", SOURCES_ID, "directory", children)
    }

    fn playlists(&self) -> BrowseMedia {
        let children = self
            .playlists
            .iter()
            .map(|playlist| {
                BrowseMedia::playable(
                    playlist_title(playlist),
                    MediaClass::Playlist,
                    format!("{PLAYLIST_PREFIX}{}", plain(playlist.get("index"))),
                    "playlist",
                    playlist
                        .get("thumbnail")
                        .and_then(Value::as_str)
                        .map(String::from),
                )
            })
            .collect();
        BrowseMedia::directory("Playlists", PLAYLISTS_ID, "directory", children)
    }
}

fn root() -> BrowseMedia {
    BrowseMedia::directory(
        "Media",
        ROOT_ID,
        "directory",
        vec![
            BrowseMedia::directory("Media Sources", MEDIA_SOURCES_ID, "directory", Vec::new()),
            BrowseMedia::directory("Sources", SOURCES_ID, "video", Vec::new()),
            BrowseMedia::directory("Playlists", PLAYLISTS_ID, "directory", Vec::new()),
        ],
    )
}

/// Display name: `title` or `name` without a `.json` suffix, followed by
/// the description in parentheses.
fn playlist_title(playlist: &Value) -> String {
    let name = ["title", "name"]
        .iter()
        .find_map(|key| playlist.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .unwrap_or_default();
    let name = name.strip_suffix(".json").unwrap_or(name);
    match playlist
        .get("description")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
    {
        Some(description) => format!("{name} ({description})"),
        None => name.to_string(),
    }
}

fn absolute_thumbnail(thumbnail: &str, base_url: Option<&str>) -> String {
    if thumbnail.starts_with("http://") || thumbnail.starts_with("https://") {
        thumbnail.to_string()
    } else if thumbnail.starts_with('/') {
        format!("{}{thumbnail}", base_url.unwrap_or(FALLBACK_BASE_URL))
    } else {
        format!("http://{thumbnail}")
    }
}

/// String form of an index that may arrive as a number or a string
pub fn plain(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Title of the playlist whose index matches `index`
pub fn find_playlist<'a>(playlists: &'a [Value], index: &str) -> Option<&'a str> {
    playlists
        .iter()
        .find(|p| plain(p.get("index")) == index)
        .and_then(|p| p.get("title"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source<'a>(playlists: &'a [Value], queue: &'a [Value]) -> BrowseSource<'a> {
        BrowseSource {
            playlists,
            queue,
            base_url: Some("https://ha.example.com"),
        }
    }

    #[test]
    fn test_root() {
        let root = source(&[], &[]).browse(None).unwrap();
        assert_eq!(root.title, "Media");
        let ids: Vec<_> = root.children.iter().map(|c| c.media_content_id.as_str()).collect();
        assert_eq!(ids, [MEDIA_SOURCES_ID, SOURCES_ID, PLAYLISTS_ID]);
        assert_eq!(root.children[1].media_content_type, "video");
        assert_eq!(source(&[], &[]).browse(Some("media_player")).unwrap(), root);
    }

    #[test]
    fn test_sources_from_queue() {
        let queue = vec![
            json!({"title": "Intro", "index": 0, "mediaId": "a", "thumbnail": "/local/a.jpg"}),
            json!({"index": 1, "thumbnail": "cdn.example.com/b.jpg"}),
            json!({"title": "Outro", "thumbnail": "https://cdn.example.com/c.jpg"}),
        ];
        let sources = source(&[], &queue).browse(Some(SOURCES_ID)).unwrap();

        assert_eq!(sources.children.len(), 3);
        let intro = &sources.children[0];
        assert_eq!(intro.media_content_id, "source:Intro");
        assert_eq!(intro.media_class, MediaClass::Video);
        assert!(intro.can_play && !intro.can_expand);
        assert_eq!(intro.thumbnail.as_deref(), Some("https://ha.example.com/local/a.jpg"));
        assert_eq!(sources.children[1].title, "Item 1");
        assert_eq!(
            sources.children[1].thumbnail.as_deref(),
            Some("http://cdn.example.com/b.jpg")
        );
        assert_eq!(
            sources.children[2].thumbnail.as_deref(),
            Some("https://cdn.example.com/c.jpg")
        );
    }

    #[test]
    fn test_thumbnail_fallback_base() {
        assert_eq!(absolute_thumbnail("/x.png", None), "http://localhost:8123/x.png");
    }

    #[test]
    fn test_playlists() {
        let playlists = vec![
            json!({"title": "Morning.json", "description": "weekdays", "index": 2}),
            json!({"name": "Evening", "index": "3", "thumbnail": "http://t/e.png"}),
        ];
        let tree = source(&playlists, &[]).browse(Some(PLAYLISTS_ID)).unwrap();

        assert_eq!(tree.children[0].title, "Morning (weekdays)");
        assert_eq!(tree.children[0].media_content_id, "playlist:2");
        assert_eq!(tree.children[1].title, "Evening");
        assert_eq!(tree.children[1].media_content_id, "playlist:3");
        assert_eq!(tree.children[1].thumbnail.as_deref(), Some("http://t/e.png"));

        assert_eq!(find_playlist(&playlists, "2"), Some("Morning.json"));
        assert_eq!(find_playlist(&playlists, "3"), None);
        assert_eq!(find_playlist(&playlists, "9"), None);
    }

    #[test]
    fn test_media_sources_and_unknown() {
        let media = source(&[], &[]).browse(Some(MEDIA_SOURCES_ID)).unwrap();
        assert!(media.children.is_empty());
        assert_eq!(
            source(&[], &[]).browse(Some("elsewhere")),
            Err(BrowseError::UnknownMediaId("elsewhere".into()))
        );
    }
}
