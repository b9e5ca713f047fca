//! Topic filter matching (`+` single level, `#` remaining levels)

use crate::error::{MqttError, MqttResult};

pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut topic_levels = topic.split('/');
    for level in filter.split('/') {
        match level {
            "#" => return true,
            "+" => {
                if topic_levels.next().is_none() {
                    return false;
                }
            }
            literal => {
                if topic_levels.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    topic_levels.next().is_none()
}

/// `#` only as the last level, wildcards only as whole levels
pub fn validate_filter(filter: &str) -> MqttResult<()> {
    let invalid = || MqttError::InvalidFilter(filter.to_string());
    if filter.is_empty() {
        return Err(invalid());
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        let has_wildcard = level.contains('#') || level.contains('+');
        if has_wildcard && level.len() != 1 {
            return Err(invalid());
        }
        if *level == "#" && i != levels.len() - 1 {
            return Err(invalid());
        }
    }
    Ok(())
}

pub fn validate_topic(topic: &str) -> MqttResult<()> {
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(MqttError::InvalidTopic(topic.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_wildcards() {
        assert!(topic_matches("yan/tv/status/media_queue", "yan/tv/status/media_queue"));
        assert!(!topic_matches("yan/tv/status/media_queue", "yan/tv/status"));
        assert!(topic_matches("yan/+/status/media_queue", "yan/tv/status/media_queue"));
        assert!(!topic_matches("yan/+/status", "yan/tv/status/media_queue"));
        assert!(topic_matches("yan/#", "yan/tv/status/playlists/available"));
        assert!(topic_matches("yan/tv/#", "yan/tv"));
        assert!(!topic_matches("yan/tv/#", "yan/radio/status"));
    }

    #[test]
    fn test_validation() {
        assert!(validate_filter("yan/+/status/#").is_ok());
        assert!(validate_filter("yan/#/status").is_err());
        assert!(validate_filter("yan/tv+").is_err());
        assert!(validate_filter("").is_err());
        assert!(validate_topic("yan/tv/command/media_load_url").is_ok());
        assert!(validate_topic("yan/+/command").is_err());
    }
}
