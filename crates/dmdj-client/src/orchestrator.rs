//! Request orchestrator — issues control commands against the remote
//! service and tracks which ones are in flight.
//!
//! Every command goes through [`Orchestrator::send`]:
//!
//! 1. reject actions the channel does not offer (no I/O, no busy flag)
//! 2. mark the command's `RequestKey` busy (guard released on every path)
//! 3. issue the request; non-2xx or transport failure → `Err`, no retry
//! 4. log + publish failures on the failure channel
//!
//! The orchestrator also owns the track catalog.  `bootstrap` fetches all
//! four listings concurrently; a failed listing is logged and left empty
//! without holding back the others.

use std::sync::Arc;

use dmdj_proto::effect::{EffectParams, VoiceEffects, VoiceListing};
use dmdj_proto::protocol::{Channel, Command, LoopMode, Method, RequestKey, TrackListing};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::busy::{BusyGuard, BusyMap};
use crate::error::{ClientError, Result};

/// Published for every command that did not take effect.
#[derive(Debug, Clone)]
pub struct CommandFailure {
    pub key: RequestKey,
    pub message: String,
}

/// Flat path listings per channel.  Hierarchy lives inside each path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackCatalog {
    pub music: Vec<String>,
    pub ambient: Vec<String>,
    pub fx: Vec<String>,
    pub modulator: VoiceEffects,
}

impl TrackCatalog {
    /// Paths to build a tree from.  Modulator presets are listed by name.
    pub fn paths(&self, channel: Channel) -> Vec<String> {
        match channel {
            Channel::Music => self.music.clone(),
            Channel::Ambient => self.ambient.clone(),
            Channel::Fx => self.fx.clone(),
            Channel::Modulator => self.modulator.names().map(str::to_string).collect(),
        }
    }
}

struct Inner {
    http: reqwest::Client,
    base: Option<Url>,
    busy: BusyMap<RequestKey>,
    initial_load: watch::Sender<bool>,
    catalog: watch::Sender<TrackCatalog>,
    failures: broadcast::Sender<CommandFailure>,
}

/// Cheap to clone; all clones share flags and catalog.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// `base_url` of `None` leaves the orchestrator usable but every command
    /// fails with `NotConfigured`.
    pub fn new(base_url: Option<&str>) -> Self {
        let base = match base_url {
            Some(raw) => match Url::parse(&format!("{}/", raw.trim_end_matches('/'))) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("orchestrator: invalid base URL {:?}: {}", raw, e);
                    None
                }
            },
            None => {
                warn!("orchestrator: no base URL configured, remote control disabled");
                None
            }
        };

        let (initial_load, _) = watch::channel(true);
        let (catalog, _) = watch::channel(TrackCatalog::default());
        let (failures, _) = broadcast::channel(64);

        Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                base,
                busy: BusyMap::new(),
                initial_load,
                catalog,
                failures,
            }),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.base.is_some()
    }

    // ── Observation ──────────────────────────────────────────────────────────

    pub fn is_busy(&self, key: &RequestKey) -> bool {
        self.inner.busy.is_busy(key)
    }

    pub fn request_loading(&self) -> BusyMap<RequestKey> {
        self.inner.busy.clone()
    }

    /// True until the first `bootstrap` completes.
    pub fn is_loading(&self) -> bool {
        *self.inner.initial_load.borrow()
    }

    pub fn catalog(&self) -> TrackCatalog {
        self.inner.catalog.borrow().clone()
    }

    pub fn subscribe_catalog(&self) -> watch::Receiver<TrackCatalog> {
        self.inner.catalog.subscribe()
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<CommandFailure> {
        self.inner.failures.subscribe()
    }

    // ── Core request path ────────────────────────────────────────────────────

    /// Issue one command and return the decoded JSON body.
    pub async fn send(&self, cmd: Command) -> Result<Value> {
        if !cmd.is_supported() {
            return Err(ClientError::Unsupported {
                channel: cmd.channel(),
                action: cmd.action(),
            });
        }

        let key = cmd.key();
        let _guard: BusyGuard<RequestKey> = self.inner.busy.acquire(key.clone());

        match self.execute(&cmd).await {
            Ok(body) => {
                debug!("{} {} ok", cmd.method(), cmd.path());
                Ok(body)
            }
            Err(e) => {
                error!("command {} failed: {}", key, e);
                let _ = self.inner.failures.send(CommandFailure {
                    key,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute(&self, cmd: &Command) -> Result<Value> {
        let base = self.inner.base.as_ref().ok_or(ClientError::NotConfigured)?;
        let path = cmd.path();
        let mut url = base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Decode(format!("bad path {}: {}", path, e)))?;
        {
            let query = cmd.query();
            if !query.is_empty() {
                let mut pairs = url.query_pairs_mut();
                for (k, v) in &query {
                    pairs.append_pair(k, v);
                }
            }
        }

        let method = match cmd.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let response = self.inner.http.request(method, url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                method: cmd.method(),
                path,
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn send_as<T: DeserializeOwned>(&self, cmd: Command) -> Result<T> {
        let body = self.send(cmd).await?;
        serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    // ── Listings ─────────────────────────────────────────────────────────────

    pub async fn list_tracks(&self, channel: Channel) -> Result<Vec<String>> {
        let listing: Option<TrackListing> = self.send_as(Command::ListTracks { channel }).await?;
        Ok(listing.map(TrackListing::into_paths).unwrap_or_default())
    }

    pub async fn list_voice_effects(&self) -> Result<VoiceEffects> {
        let listing: Option<VoiceListing> = self.send_as(Command::ListVoiceEffects).await?;
        Ok(listing.map(VoiceListing::into_effects).unwrap_or_default())
    }

    /// Initial catalog load: all four listings in parallel, partial results
    /// kept.  Clears the initial-load flag when done.
    pub async fn bootstrap(&self) {
        if !self.is_configured() {
            warn!("bootstrap: remote not configured, catalog stays empty");
            self.inner.initial_load.send_replace(false);
            return;
        }

        let (music, ambient, fx, modulator) = tokio::join!(
            self.list_tracks(Channel::Music),
            self.list_tracks(Channel::Ambient),
            self.list_tracks(Channel::Fx),
            self.list_voice_effects(),
        );

        self.inner.catalog.send_modify(|catalog| {
            match music {
                Ok(paths) => catalog.music = paths,
                Err(e) => error!("bootstrap: music listing failed: {}", e),
            }
            match ambient {
                Ok(paths) => catalog.ambient = paths,
                Err(e) => error!("bootstrap: ambient listing failed: {}", e),
            }
            match fx {
                Ok(paths) => catalog.fx = paths,
                Err(e) => error!("bootstrap: fx listing failed: {}", e),
            }
            match modulator {
                Ok(effects) => catalog.modulator = effects,
                Err(e) => error!("bootstrap: voice effect listing failed: {}", e),
            }
        });

        let catalog = self.catalog();
        info!(
            "bootstrap: {} music, {} ambient, {} fx, {} voice presets",
            catalog.music.len(),
            catalog.ambient.len(),
            catalog.fx.len(),
            catalog.modulator.len()
        );
        self.inner.initial_load.send_replace(false);
    }

    /// Re-list one channel's catalog.  Callers do this explicitly after a
    /// mutation (save/delete preset); push state never triggers it.
    pub async fn refresh(&self, channel: Channel) -> Result<()> {
        match channel {
            Channel::Modulator => {
                let effects = self.list_voice_effects().await?;
                self.inner.catalog.send_modify(|c| c.modulator = effects);
            }
            _ => {
                let paths = self.list_tracks(channel).await?;
                self.inner.catalog.send_modify(|c| match channel {
                    Channel::Music => c.music = paths,
                    Channel::Ambient => c.ambient = paths,
                    _ => c.fx = paths,
                });
            }
        }
        Ok(())
    }

    // ── Playback ─────────────────────────────────────────────────────────────

    pub async fn play(&self, channel: Channel, track: &str) -> Result<Value> {
        self.send(Command::Play {
            channel,
            track: track.to_string(),
        })
        .await
    }

    pub async fn stop(&self, channel: Channel) -> Result<Value> {
        self.send(Command::Stop { channel }).await
    }

    pub async fn set_volume(&self, channel: Channel, volume: f64) -> Result<Value> {
        self.send(Command::SetVolume { channel, volume }).await
    }

    pub async fn set_loop_mode(&self, channel: Channel, mode: LoopMode) -> Result<Value> {
        self.send(Command::SetLoopMode { channel, mode }).await
    }

    pub async fn set_crossfade(&self, channel: Channel, seconds: f64) -> Result<Value> {
        self.send(Command::SetCrossfade { channel, seconds }).await
    }

    // ── Voice modulator ──────────────────────────────────────────────────────

    /// Load a saved preset, or `"off"`.
    pub async fn load_voice_effect(&self, effect: &str) -> Result<Value> {
        self.send(Command::LoadVoiceEffect {
            effect: effect.to_string(),
        })
        .await
    }

    pub async fn set_custom_effect(&self, params: &EffectParams) -> Result<Value> {
        self.send(Command::SetCustomEffect { params: *params }).await
    }

    pub async fn save_voice_effect(&self, name: &str) -> Result<Value> {
        self.send(Command::SaveVoiceEffect {
            name: name.to_string(),
        })
        .await
    }

    pub async fn delete_voice_effect(&self, name: &str) -> Result<Value> {
        self.send(Command::DeleteVoiceEffect {
            name: name.to_string(),
        })
        .await
    }
}
