//! Topics and payloads of the player's MQTT companion

use serde::Deserialize;
use serde_json::{json, Value};

pub const CMD_LOAD_PLAYLIST: &str = "media_load_playlist";
pub const CMD_PLAY_FROM_QUEUE: &str = "media_play_from_queue";
pub const CMD_LOAD_URL: &str = "media_load_url";
pub const CMD_GET_PLAYLISTS: &str = "media_get_playlists";

/// Topic layout under `yan/{base}/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn playlists(&self) -> String {
        format!("yan/{}/status/playlists/available", self.base)
    }

    pub fn media_queue(&self) -> String {
        format!("yan/{}/status/media_queue", self.base)
    }

    pub fn command(&self, command: &str) -> String {
        format!("yan/{}/command/{command}", self.base)
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistsPayload {
    #[serde(default)]
    playlists: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct QueuePayload {
    #[serde(default)]
    playlist: Vec<Value>,
}

/// `{"playlists": [...]}`; a missing key reads as an empty list
pub fn parse_playlists(payload: &str) -> serde_json::Result<Vec<Value>> {
    serde_json::from_str::<PlaylistsPayload>(payload).map(|p| p.playlists)
}

/// `{"playlist": [...]}`; a missing key reads as an empty list
pub fn parse_queue(payload: &str) -> serde_json::Result<Vec<Value>> {
    serde_json::from_str::<QueuePayload>(payload).map(|p| p.playlist)
}

pub fn load_playlist_payload(title: &str) -> String {
    json!({ "playlist": title }).to_string()
}

pub fn play_from_queue_payload(title: &str) -> String {
    json!({ "title": title }).to_string()
}

pub fn load_url_payload(url: &str) -> String {
    json!({ "url": url }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        let topics = Topics::new("living");
        assert_eq!(topics.playlists(), "yan/living/status/playlists/available");
        assert_eq!(topics.media_queue(), "yan/living/status/media_queue");
        assert_eq!(topics.command(CMD_LOAD_URL), "yan/living/command/media_load_url");
    }

    #[test]
    fn test_parse_payloads() {
        let playlists = parse_playlists(r#"{"playlists": [{"title": "a", "index": 1}]}"#).unwrap();
        assert_eq!(playlists.len(), 1);
        assert!(parse_playlists("{}").unwrap().is_empty());
        assert!(parse_playlists("not json").is_err());

        let queue = parse_queue(r#"{"playlist": [{"title": "x"}, {"title": "y"}]}"#).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_command_payloads() {
        assert_eq!(load_playlist_payload("Morning"), r#"{"playlist":"Morning"}"#);
        assert_eq!(play_from_queue_payload("Intro"), r#"{"title":"Intro"}"#);
        assert_eq!(load_url_payload("http://x/y.mp4"), r#"{"url":"http://x/y.mp4"}"#);
    }
}
