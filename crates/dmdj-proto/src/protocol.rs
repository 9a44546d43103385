use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::effect::EffectParams;

// ── Channels ──────────────────────────────────────────────────────────────────

/// One of the four controllable audio domains on the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Music,
    Ambient,
    Fx,
    /// The voice modulator.  Shown as "voice" in the navbar.
    Modulator,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Music,
        Channel::Ambient,
        Channel::Fx,
        Channel::Modulator,
    ];

    /// Wire name, used in paths, push messages and request keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Music => "music",
            Channel::Ambient => "ambient",
            Channel::Fx => "fx",
            Channel::Modulator => "modulator",
        }
    }

    /// Anchor of the channel's section in the operator view.
    pub fn section_id(&self) -> &'static str {
        match self {
            Channel::Music => "section-music",
            Channel::Ambient => "section-ambient",
            Channel::Fx => "section-fx",
            Channel::Modulator => "section-voice",
        }
    }

    /// Channels backed by a folder of audio files (`/tracks/{channel}`).
    pub fn has_tracks(&self) -> bool {
        !matches!(self, Channel::Modulator)
    }

    /// Channels with stop / loop mode / crossfade controls.
    pub fn has_playlist_controls(&self) -> bool {
        matches!(self, Channel::Music | Channel::Ambient)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "music" => Ok(Channel::Music),
            "ambient" => Ok(Channel::Ambient),
            "fx" => Ok(Channel::Fx),
            "modulator" | "voice" => Ok(Channel::Modulator),
            other => anyhow::bail!("unknown channel '{}'", other),
        }
    }
}

/// Playback repeat policy for music / ambient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    #[serde(alias = "null")]
    Off,
    Track,
    /// Whole-folder repeat.
    List,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Track => "track",
            LoopMode::List => "list",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "null" => Ok(LoopMode::Off),
            "track" => Ok(LoopMode::Track),
            "list" | "folder" => Ok(LoopMode::List),
            other => anyhow::bail!("unknown loop mode '{}'", other),
        }
    }
}

// ── Pushed state ──────────────────────────────────────────────────────────────

/// Server-confirmed state of one channel.  Fields a channel does not have
/// (e.g. `effect` on music) stay at their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelState {
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub playing: bool,
    #[serde(default)]
    pub volume: Option<f64>,
    /// music / ambient only.
    #[serde(default)]
    pub loop_mode: Option<LoopMode>,
    /// Seconds; music / ambient only.
    #[serde(default)]
    pub crossfade_time: Option<f64>,
    /// Active preset name or `"off"`; modulator only.
    #[serde(default)]
    pub effect: Option<String>,
}

impl ChannelState {
    /// True when a voice effect other than `"off"` is reported.
    pub fn effect_active(&self) -> bool {
        matches!(self.effect.as_deref(), Some(e) if e != EFFECT_OFF)
    }
}

/// Preset name that disables the voice modulator.
pub const EFFECT_OFF: &str = "off";

/// Authoritative state for all channels, as last pushed by the server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub music: ChannelState,
    #[serde(default)]
    pub ambient: ChannelState,
    #[serde(default)]
    pub fx: ChannelState,
    #[serde(default)]
    pub modulator: ChannelState,
}

impl Snapshot {
    pub fn channel(&self, channel: Channel) -> &ChannelState {
        match channel {
            Channel::Music => &self.music,
            Channel::Ambient => &self.ambient,
            Channel::Fx => &self.fx,
            Channel::Modulator => &self.modulator,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::Music => &mut self.music,
            Channel::Ambient => &mut self.ambient,
            Channel::Fx => &mut self.fx,
            Channel::Modulator => &mut self.modulator,
        }
    }

    /// Shallow merge at the channel level: every channel present in
    /// `update` replaces the whole stored object, the rest are untouched.
    /// Returns the channels that were replaced.
    pub fn merge(&mut self, update: SnapshotUpdate) -> Vec<Channel> {
        let mut touched = Vec::new();
        for (channel, state) in update.into_channels() {
            *self.channel_mut(channel) = state;
            touched.push(channel);
        }
        touched
    }
}

/// One push message: complete objects for the channels it mentions.
/// Keys the client does not know (`available`, ...) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotUpdate {
    #[serde(default)]
    pub music: Option<ChannelState>,
    #[serde(default)]
    pub ambient: Option<ChannelState>,
    #[serde(default)]
    pub fx: Option<ChannelState>,
    #[serde(default)]
    pub modulator: Option<ChannelState>,
}

impl SnapshotUpdate {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn into_channels(self) -> impl Iterator<Item = (Channel, ChannelState)> {
        [
            (Channel::Music, self.music),
            (Channel::Ambient, self.ambient),
            (Channel::Fx, self.fx),
            (Channel::Modulator, self.modulator),
        ]
        .into_iter()
        .filter_map(|(channel, state)| state.map(|s| (channel, s)))
    }

    pub fn is_empty(&self) -> bool {
        self.music.is_none()
            && self.ambient.is_none()
            && self.fx.is_none()
            && self.modulator.is_none()
    }
}

// ── Listings ──────────────────────────────────────────────────────────────────

/// Body of `GET /tracks/{channel}`.  Newer servers answer with a bare array,
/// older ones wrap it as `{"tracks": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TrackListing {
    Paths(Vec<String>),
    Wrapped { tracks: Vec<String> },
}

impl TrackListing {
    pub fn into_paths(self) -> Vec<String> {
        match self {
            TrackListing::Paths(p) => p,
            TrackListing::Wrapped { tracks } => tracks,
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// HTTP verb of a remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one logical command for busy tracking, e.g. `music_volume`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every control action the remote service understands.  All parameters
/// travel as query pairs; every response is JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ListTracks { channel: Channel },
    ListVoiceEffects,
    Play { channel: Channel, track: String },
    Stop { channel: Channel },
    SetVolume { channel: Channel, volume: f64 },
    SetLoopMode { channel: Channel, mode: LoopMode },
    SetCrossfade { channel: Channel, seconds: f64 },
    /// Load a saved preset, or `"off"`.
    LoadVoiceEffect { effect: String },
    SetCustomEffect { params: EffectParams },
    /// Save the current custom parameters under `name`.
    SaveVoiceEffect { name: String },
    DeleteVoiceEffect { name: String },
}

impl Command {
    /// Channel the command targets.
    pub fn channel(&self) -> Channel {
        match self {
            Command::ListTracks { channel }
            | Command::Play { channel, .. }
            | Command::Stop { channel }
            | Command::SetVolume { channel, .. }
            | Command::SetLoopMode { channel, .. }
            | Command::SetCrossfade { channel, .. } => *channel,
            Command::ListVoiceEffects
            | Command::LoadVoiceEffect { .. }
            | Command::SetCustomEffect { .. }
            | Command::SaveVoiceEffect { .. }
            | Command::DeleteVoiceEffect { .. } => Channel::Modulator,
        }
    }

    /// Short action name, used in request keys and error messages.
    pub fn action(&self) -> &'static str {
        match self {
            Command::ListTracks { .. } | Command::ListVoiceEffects => "list",
            Command::Play { .. } => "play",
            Command::Stop { .. } => "stop",
            Command::SetVolume { .. } => "volume",
            Command::SetLoopMode { .. } => "loop",
            Command::SetCrossfade { .. } => "crossfade",
            Command::LoadVoiceEffect { .. } => "load",
            Command::SetCustomEffect { .. } => "custom",
            Command::SaveVoiceEffect { .. } => "save",
            Command::DeleteVoiceEffect { .. } => "delete",
        }
    }

    /// Whether the target channel offers this action at all.
    pub fn is_supported(&self) -> bool {
        match self {
            Command::ListTracks { channel }
            | Command::Play { channel, .. }
            | Command::SetVolume { channel, .. } => channel.has_tracks(),
            Command::Stop { channel }
            | Command::SetLoopMode { channel, .. }
            | Command::SetCrossfade { channel, .. } => channel.has_playlist_controls(),
            Command::ListVoiceEffects
            | Command::LoadVoiceEffect { .. }
            | Command::SetCustomEffect { .. }
            | Command::SaveVoiceEffect { .. }
            | Command::DeleteVoiceEffect { .. } => true,
        }
    }

    pub fn key(&self) -> RequestKey {
        match self {
            Command::ListTracks { channel } => RequestKey::new(format!("tracks_{}", channel)),
            _ => RequestKey::new(format!("{}_{}", self.channel(), self.action())),
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Command::ListTracks { .. } | Command::ListVoiceEffects => Method::Get,
            Command::SaveVoiceEffect { .. } => Method::Put,
            Command::DeleteVoiceEffect { .. } => Method::Delete,
            _ => Method::Post,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Command::ListTracks { channel } => format!("/tracks/{}", channel),
            Command::Play { channel, .. } => format!("/{}/play", channel),
            Command::Stop { channel } => format!("/{}/stop", channel),
            Command::SetVolume { channel, .. } => format!("/{}/volume", channel),
            Command::SetLoopMode { channel, .. } => format!("/{}/loop_mode", channel),
            Command::SetCrossfade { channel, .. } => format!("/{}/crossfade_time", channel),
            Command::ListVoiceEffects
            | Command::LoadVoiceEffect { .. }
            | Command::SaveVoiceEffect { .. }
            | Command::DeleteVoiceEffect { .. } => "/modulator".to_string(),
            Command::SetCustomEffect { .. } => "/modulator/custom".to_string(),
        }
    }

    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Command::ListTracks { .. } | Command::ListVoiceEffects | Command::Stop { .. } => {
                Vec::new()
            }
            Command::Play { track, .. } => vec![("track", track.clone())],
            Command::SetVolume { volume, .. } => vec![("volume", volume.to_string())],
            Command::SetLoopMode { mode, .. } => vec![("mode", mode.to_string())],
            Command::SetCrossfade { seconds, .. } => {
                vec![("crossfade_time", seconds.to_string())]
            }
            Command::LoadVoiceEffect { effect } => vec![("effect", effect.clone())],
            Command::SetCustomEffect { params } => params.query_pairs(),
            Command::SaveVoiceEffect { name } | Command::DeleteVoiceEffect { name } => {
                vec![("name", name.clone())]
            }
        }
    }
}
