//! Media player state, device class and feature flags

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaPlayerState {
    Off,
    On,
    Idle,
    Playing,
    Paused,
    Buffering,
}

impl MediaPlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Buffering => "buffering",
        }
    }

    /// Map the raw value of a player-state entity, case-insensitively.
    /// Returns `None` for values with no known meaning.
    pub fn from_reported(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "playing" | "play" => Some(Self::Playing),
            "paused" | "pause" => Some(Self::Paused),
            "stopped" | "stop" | "idle" => Some(Self::Idle),
            "buffering" => Some(Self::Buffering),
            "on" | "true" => Some(Self::On),
            "off" | "false" => Some(Self::Off),
            _ => None,
        }
    }
}

impl fmt::Display for MediaPlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Tv,
    Receiver,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tv => "tv",
            Self::Receiver => "receiver",
        }
    }
}

/// `supported_features` bit set, using the media player feature values
/// frontends expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaPlayerFeature(u32);

impl MediaPlayerFeature {
    pub const PAUSE: Self = Self(1);
    pub const SEEK: Self = Self(2);
    pub const VOLUME_SET: Self = Self(4);
    pub const VOLUME_MUTE: Self = Self(8);
    pub const PREVIOUS_TRACK: Self = Self(16);
    pub const NEXT_TRACK: Self = Self(32);
    pub const TURN_ON: Self = Self(128);
    pub const TURN_OFF: Self = Self(256);
    pub const PLAY_MEDIA: Self = Self(512);
    pub const VOLUME_STEP: Self = Self(1024);
    pub const SELECT_SOURCE: Self = Self(2048);
    pub const STOP: Self = Self(4096);
    pub const CLEAR_PLAYLIST: Self = Self(8192);
    pub const PLAY: Self = Self(16384);
    pub const SHUFFLE_SET: Self = Self(32768);
    pub const SELECT_SOUND_MODE: Self = Self(65536);
    pub const BROWSE_MEDIA: Self = Self(131072);
    pub const REPEAT_SET: Self = Self(262144);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MediaPlayerFeature {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MediaPlayerFeature {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
