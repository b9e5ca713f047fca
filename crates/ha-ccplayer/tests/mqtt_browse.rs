//! Playlists and the play queue from the MQTT companion, browsing them and
//! playing from them

mod common;

use common::{wait_for, TestHass};
use ha_ccplayer::HassUrls;
use serde_json::json;

const PLAYER: &str = "media_player.tv";

#[tokio::test]
async fn test_subscribes_under_device_base() {
    let t = TestHass::new().await;
    t.add_player("TV", json!({})).await;
    assert_eq!(t.mqtt.subscription_count("yan/ccplayer/status/playlists/available"), 1);
    assert_eq!(t.mqtt.subscription_count("yan/ccplayer/status/media_queue"), 1);

    t.add_player_with_data(json!({"name": "Den", "device_id": "den-box"}), json!({}))
        .await;
    assert_eq!(t.mqtt.subscription_count("yan/den-box/status/media_queue"), 1);
}

#[tokio::test]
async fn test_playlists_feed_and_browse() {
    let t = TestHass::new().await;
    let player = t.add_player("TV", json!({})).await;

    // nothing known yet: browsing asks the companion
    let root = t.browse(json!({"entity_id": PLAYER})).await;
    assert_eq!(root["title"], "Media");
    assert_eq!(root["children"].as_array().unwrap().len(), 3);
    let asked = t.mqtt.published_to("yan/ccplayer/command/media_get_playlists");
    assert_eq!(asked.len(), 1);
    assert_eq!(asked[0].payload, "");

    t.mqtt.inject(
        "yan/ccplayer/status/playlists/available",
        r#"{"playlists": [
            {"index": 0, "title": "Road Trip.json", "description": "Summer"},
            {"index": 1, "name": "Chill"}
        ]}"#,
    );
    assert!(wait_for(|| async { player.playlists().await.len() == 2 }).await);

    let playlists = t
        .browse(json!({"entity_id": PLAYER, "media_content_id": "ccplayer_playlists"}))
        .await;
    let children = playlists["children"].as_array().unwrap();
    assert_eq!(children[0]["title"], "Road Trip (Summer)");
    assert_eq!(children[0]["media_content_id"], "playlist:0");
    assert_eq!(children[0]["media_class"], "playlist");
    assert_eq!(children[1]["title"], "Chill");

    // known playlists: no further request
    t.browse(json!({"entity_id": PLAYER})).await;
    assert_eq!(t.mqtt.published_to("yan/ccplayer/command/media_get_playlists").len(), 1);

    t.call(
        "play_media",
        json!({"entity_id": PLAYER, "media_content_type": "playlist", "media_content_id": "playlist:0"}),
    )
    .await;
    let loaded = t.mqtt.published_to("yan/ccplayer/command/media_load_playlist");
    assert_eq!(loaded.len(), 1);
    let payload: serde_json::Value = serde_json::from_str(&loaded[0].payload).unwrap();
    assert_eq!(payload, json!({"playlist": "Road Trip.json"}));

    // unknown index publishes nothing
    t.call(
        "play_media",
        json!({"entity_id": PLAYER, "media_content_type": "playlist", "media_content_id": "playlist:7"}),
    )
    .await;
    assert_eq!(t.mqtt.published_to("yan/ccplayer/command/media_load_playlist").len(), 1);
}

#[tokio::test]
async fn test_queue_feed_and_sources() {
    let t = TestHass::with_urls(HassUrls {
        external_url: None,
        internal_url: Some("http://10.0.0.2:8123".into()),
    })
    .await;
    let player = t.add_player("TV", json!({})).await;

    t.mqtt.inject(
        "yan/ccplayer/status/media_queue",
        r#"{"playlist": [
            {"index": 0, "title": "Intro", "thumbnail": "/local/intro.jpg"},
            {"index": 1}
        ]}"#,
    );
    assert!(wait_for(|| async { player.queue().await.len() == 2 }).await);

    let sources = t
        .browse(json!({"entity_id": PLAYER, "media_content_id": "ccplayer_sources"}))
        .await;
    let children = sources["children"].as_array().unwrap();
    assert_eq!(children[0]["media_content_id"], "source:Intro");
    assert_eq!(children[0]["thumbnail"], "http://10.0.0.2:8123/local/intro.jpg");
    assert_eq!(children[1]["title"], "Item 1");

    t.call(
        "play_media",
        json!({"entity_id": PLAYER, "media_content_type": "video", "media_content_id": "source:Intro"}),
    )
    .await;
    let played = t.mqtt.published_to("yan/ccplayer/command/media_play_from_queue");
    assert_eq!(played.len(), 1);
    assert_eq!(played[0].payload, json!({"title": "Intro"}).to_string());
}

#[tokio::test]
async fn test_bad_payload_keeps_lists() {
    let t = TestHass::new().await;
    let player = t.add_player("TV", json!({})).await;

    t.mqtt
        .inject("yan/ccplayer/status/media_queue", r#"{"playlist": [{"title": "A"}]}"#);
    assert!(wait_for(|| async { player.queue().await.len() == 1 }).await);

    t.mqtt.inject("yan/ccplayer/status/media_queue", "{broken");
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(player.queue().await.len(), 1);
}

#[tokio::test]
async fn test_play_url_without_action() {
    let t = TestHass::new().await;
    t.add_player("TV", json!({})).await;

    t.call(
        "play_media",
        json!({"entity_id": PLAYER, "media_content_type": "music", "media_content_id": "https://example.com/a.mp3"}),
    )
    .await;
    let urls = t.mqtt.published_to("yan/ccplayer/command/media_load_url");
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].payload, json!({"url": "https://example.com/a.mp3"}).to_string());

    // neither a URL nor a known prefix
    t.call(
        "play_media",
        json!({"entity_id": PLAYER, "media_content_type": "music", "media_content_id": "spotify:track:1"}),
    )
    .await;
    assert_eq!(t.mqtt.published().len(), 1);
}

#[tokio::test]
async fn test_unknown_browse_id_fails() {
    let t = TestHass::new().await;
    t.add_player("TV", json!({})).await;
    let err = t
        .hass
        .services
        .call(
            "media_player",
            "browse_media",
            json!({"entity_id": PLAYER, "media_content_id": "nowhere"}),
            ha_core::Context::new(),
            true,
            true,
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nowhere"));

    let media_sources = t
        .browse(json!({"entity_id": PLAYER, "media_content_id": "ha_media_source"}))
        .await;
    assert_eq!(media_sources["title"], "Media Sources");
    assert!(media_sources["children"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_browse_needs_a_player_target() {
    let t = TestHass::new().await;
    t.add_player("TV", json!({})).await;
    let err = t
        .hass
        .services
        .call(
            "media_player",
            "browse_media",
            json!({"entity_id": "media_player.kitchen"}),
            ha_core::Context::new(),
            true,
            true,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ha_service_registry::ServiceError::InvalidData(_)));
}
