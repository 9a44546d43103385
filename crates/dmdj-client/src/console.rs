//! Line-oriented operator console.
//!
//! Reads commands from stdin and prints pushed state, tree views and
//! command failures to stdout.  Network commands are spawned so a slow
//! server never stalls input; only editor actions await inline because
//! they mutate the draft.

use std::collections::HashMap;
use std::sync::Arc;

use dmdj_proto::config::Config;
use dmdj_proto::protocol::{Channel, LoopMode, Snapshot};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::debounce::{commit_fn, DebouncedControl};
use crate::editor::VoiceEditor;
use crate::gesture::{Navbar, Navigator, PressOutcome};
use crate::orchestrator::{CommandFailure, Orchestrator};
use crate::playlist::{build_tree, PlaylistView, RowKind};
use crate::push::{PushHandle, PushReducer, WsTransport};

// ── Commands ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum EffectAction {
    Load(String),
    Preset(String),
    Set { key: String, value: f64 },
    Name(String),
    Play,
    Save,
    Delete(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Status,
    Tree(Channel),
    Open { channel: Channel, folder: String },
    Play { channel: Channel, track: String },
    Stop(Channel),
    Volume { channel: Channel, value: f64 },
    Crossfade { channel: Channel, seconds: f64 },
    Loop { channel: Channel, mode: LoopMode },
    Press(Channel),
    Release(Channel),
    Effect(EffectAction),
    Refresh,
    Help,
    Quit,
}

pub const USAGE: &str = "\
commands:
  status                       channel states + connection
  tree <ch>                    show the playlist tree
  open <ch> <folder>           expand / collapse a folder
  play <ch> <track>            play a track (music, ambient, fx)
  stop <ch>                    stop music / ambient
  vol <ch> <0-100>             volume (debounced)
  xfade <ch> <0-10>            crossfade seconds (debounced)
  loop <ch> off|track|list     loop mode
  press <ch> / release <ch>    navbar button (hold = mute)
  effect load <name>           load a voice preset or 'off'
  effect preset <name>         edit a preset ('' clears, 'off' silences)
  effect set <param> <value>   tweak a knob of the draft
  effect name <name>           name the draft
  effect play | save           apply / save the draft
  effect delete <name>         delete a preset
  refresh                      re-list every catalog
  quit";

fn channel_arg(arg: Option<&str>) -> anyhow::Result<Channel> {
    arg.ok_or_else(|| anyhow::anyhow!("missing channel"))?.parse()
}

fn number_arg(arg: Option<&str>) -> anyhow::Result<f64> {
    let raw = arg.ok_or_else(|| anyhow::anyhow!("missing number"))?;
    let value: f64 = raw
        .parse()
        .map_err(|_| anyhow::anyhow!("'{}' is not a number", raw))?;
    if !value.is_finite() {
        anyhow::bail!("'{}' is not a finite number", raw);
    }
    Ok(value)
}

/// Everything after the first `n` words, so track names may contain spaces.
fn rest_after(line: &str, n: usize) -> Option<String> {
    let mut rest = line.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    let rest = rest.trim_end();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

pub fn parse_line(line: &str) -> anyhow::Result<ConsoleCommand> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        anyhow::bail!("empty command");
    };

    let cmd = match verb {
        "status" | "s" => ConsoleCommand::Status,
        "tree" | "ls" => ConsoleCommand::Tree(channel_arg(words.next())?),
        "open" => {
            let channel = channel_arg(words.next())?;
            let folder = rest_after(line, 2).ok_or_else(|| anyhow::anyhow!("missing folder"))?;
            ConsoleCommand::Open { channel, folder }
        }
        "play" => {
            let channel = channel_arg(words.next())?;
            let track = rest_after(line, 2).ok_or_else(|| anyhow::anyhow!("missing track"))?;
            ConsoleCommand::Play { channel, track }
        }
        "stop" => ConsoleCommand::Stop(channel_arg(words.next())?),
        "vol" | "volume" => ConsoleCommand::Volume {
            channel: channel_arg(words.next())?,
            value: number_arg(words.next())?.clamp(0.0, 100.0),
        },
        "xfade" | "crossfade" => ConsoleCommand::Crossfade {
            channel: channel_arg(words.next())?,
            seconds: number_arg(words.next())?.clamp(0.0, 10.0),
        },
        "loop" => ConsoleCommand::Loop {
            channel: channel_arg(words.next())?,
            mode: words
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing loop mode"))?
                .parse()?,
        },
        "press" => ConsoleCommand::Press(channel_arg(words.next())?),
        "release" => ConsoleCommand::Release(channel_arg(words.next())?),
        "effect" | "fx-edit" => {
            let action = match words.next() {
                Some("load") => EffectAction::Load(
                    words.next().ok_or_else(|| anyhow::anyhow!("missing preset"))?.to_string(),
                ),
                Some("preset") => EffectAction::Preset(rest_after(line, 2).unwrap_or_default()),
                Some("set") => EffectAction::Set {
                    key: words
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("missing parameter"))?
                        .to_string(),
                    value: number_arg(words.next())?,
                },
                Some("name") => EffectAction::Name(rest_after(line, 2).unwrap_or_default()),
                Some("play") => EffectAction::Play,
                Some("save") => EffectAction::Save,
                Some("delete") => EffectAction::Delete(
                    rest_after(line, 2).ok_or_else(|| anyhow::anyhow!("missing preset"))?,
                ),
                Some(other) => anyhow::bail!("unknown effect action '{}'", other),
                None => anyhow::bail!("missing effect action"),
            };
            ConsoleCommand::Effect(action)
        }
        "refresh" => ConsoleCommand::Refresh,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => anyhow::bail!("unknown command '{}'", other),
    };
    Ok(cmd)
}

// ── Console ───────────────────────────────────────────────────────────────────

struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, channel: Channel) {
        println!("→ {}", channel.section_id());
    }
}

pub struct Console {
    config: Config,
    orchestrator: Orchestrator,
    push: Option<PushHandle>,
    snapshot: watch::Receiver<Snapshot>,
    navbar: Navbar,
    editor: VoiceEditor,
    views: HashMap<Channel, PlaylistView>,
    volumes: HashMap<Channel, DebouncedControl<f64>>,
    crossfades: HashMap<Channel, DebouncedControl<f64>>,
}

impl Console {
    pub fn new(config: Config) -> Self {
        let orchestrator = Orchestrator::new(config.base_url().as_deref());

        let push = match config.push_url() {
            Some(url) => Some(PushReducer::new(WsTransport, url, config.timing.reconnect()).spawn()),
            None => {
                warn!("console: no base URL, push channel disabled");
                None
            }
        };
        // Without a push channel the snapshot simply stays at its default.
        let snapshot = match &push {
            Some(handle) => handle.subscribe(),
            None => watch::channel(Snapshot::default()).1,
        };

        let navbar = Navbar::new(
            orchestrator.clone(),
            snapshot.clone(),
            Arc::new(PrintNavigator),
            config.timing.hold(),
        );
        let editor = VoiceEditor::new(orchestrator.clone());

        let mut volumes = HashMap::new();
        let mut crossfades = HashMap::new();
        for channel in Channel::ALL {
            if channel.has_tracks() {
                let orch = orchestrator.clone();
                let commit = commit_fn(move |v: f64| {
                    let orch = orch.clone();
                    async move {
                        orch.set_volume(channel, v).await?;
                        Ok::<(), anyhow::Error>(())
                    }
                });
                volumes.insert(
                    channel,
                    DebouncedControl::new(0.0, config.timing.debounce(), commit),
                );
            }
            if channel.has_playlist_controls() {
                let orch = orchestrator.clone();
                let commit = commit_fn(move |v: f64| {
                    let orch = orch.clone();
                    async move {
                        orch.set_crossfade(channel, v).await?;
                        Ok::<(), anyhow::Error>(())
                    }
                });
                crossfades.insert(
                    channel,
                    DebouncedControl::new(0.0, config.timing.debounce(), commit),
                );
            }
        }

        Self {
            config,
            orchestrator,
            push,
            snapshot,
            navbar,
            editor,
            views: HashMap::new(),
            volumes,
            crossfades,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        if !self.orchestrator.is_configured() {
            println!(
                "warning: no remote configured; set $DMDJ_API or edit {}",
                Config::config_path().display()
            );
        }

        self.orchestrator.bootstrap().await;
        self.rebuild_views();
        println!("{}", USAGE);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut catalog_rx = self.orchestrator.subscribe_catalog();
        let mut failures = self.orchestrator.subscribe_failures();
        let mut snapshot_rx = self.snapshot.clone();
        let mut push_alive = self.push.is_some();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_line(&line) {
                        Ok(ConsoleCommand::Quit) => break,
                        Ok(cmd) => self.handle(cmd).await,
                        Err(e) => println!("error: {} (try 'help')", e),
                    }
                }

                changed = snapshot_rx.changed(), if push_alive => {
                    match changed {
                        Ok(()) => self.on_snapshot(),
                        // Reducer gone; stop watching.
                        Err(_) => push_alive = false,
                    }
                }

                changed = catalog_rx.changed() => {
                    if changed.is_ok() {
                        self.rebuild_views();
                    }
                }

                failure = failures.recv() => {
                    match failure {
                        Ok(CommandFailure { key, message }) => println!("! {}: {}", key, message),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("console: missed {} failure reports", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {}
                    }
                }
            }
        }

        info!("console: exiting");
        if let Some(push) = &self.push {
            push.shutdown();
        }
        Ok(())
    }

    fn on_snapshot(&mut self) {
        let snap = self.snapshot.borrow().clone();
        for (channel, ctl) in self.volumes.iter_mut() {
            if let Some(volume) = snap.channel(*channel).volume {
                ctl.sync(volume);
            }
        }
        for (channel, ctl) in self.crossfades.iter_mut() {
            if let Some(seconds) = snap.channel(*channel).crossfade_time {
                ctl.sync(seconds);
            }
        }
        for channel in Channel::ALL {
            let state = snap.channel(channel);
            println!(
                "[{:<9}] {:<7} {}",
                channel.as_str(),
                self.navbar.status(channel).as_str(),
                match channel {
                    Channel::Modulator => state.effect.clone().unwrap_or_else(|| "-".into()),
                    _ => state.track.clone().unwrap_or_else(|| "-".into()),
                }
            );
        }
    }

    /// Rebuild trees whose listing changed; rebuilt trees start collapsed.
    fn rebuild_views(&mut self) {
        let catalog = self.orchestrator.catalog();
        for channel in Channel::ALL {
            let paths = catalog.paths(channel);
            match self.views.get_mut(&channel) {
                Some(view) if *view.root() == build_tree(&paths) => {}
                Some(view) => view.rebuild(&paths),
                None => {
                    self.views.insert(channel, PlaylistView::new(&paths));
                }
            }
        }
    }

    fn print_tree(&self, channel: Channel) {
        let Some(view) = self.views.get(&channel) else {
            return;
        };
        let snap = self.snapshot.borrow();
        let state = snap.channel(channel);
        let current = match channel {
            Channel::Modulator => state.effect.as_deref(),
            _ => state.track.as_deref(),
        };
        let rows = view.rows(current, state.loop_mode);
        if rows.is_empty() {
            println!("({} is empty)", channel);
        }
        for row in rows {
            let icon = match row.kind {
                RowKind::Folder { expanded: true } => "▾",
                RowKind::Folder { expanded: false } => "▸",
                RowKind::Track => "♪",
            };
            let mark = if row.class.highlighted {
                " ◀"
            } else if row.class.dimmed {
                " ·"
            } else {
                ""
            };
            println!("{}{} {}{}", "  ".repeat(row.depth), icon, row.name, mark);
        }
    }

    fn spawn_command<F>(&self, fut: F)
    where
        F: std::future::Future<Output = crate::error::Result<serde_json::Value>> + Send + 'static,
    {
        // Failures are reported through the orchestrator's failure channel.
        tokio::spawn(async move {
            let _ = fut.await;
        });
    }

    async fn handle(&mut self, cmd: ConsoleCommand) {
        match cmd {
            ConsoleCommand::Status => {
                let connected = self.push.as_ref().map(|p| p.is_connected()).unwrap_or(false);
                println!(
                    "remote: {}  push: {}  loading: {}",
                    self.config.base_url().unwrap_or_else(|| "-".into()),
                    if connected { "connected" } else { "disconnected" },
                    self.orchestrator.is_loading()
                );
                self.on_snapshot();
                let busy: Vec<String> = self
                    .orchestrator
                    .request_loading()
                    .snapshot()
                    .into_iter()
                    .filter(|(_, busy)| *busy)
                    .map(|(k, _)| k.to_string())
                    .collect();
                if !busy.is_empty() {
                    println!("in flight: {}", busy.join(", "));
                }
            }
            ConsoleCommand::Tree(channel) => self.print_tree(channel),
            ConsoleCommand::Open { channel, folder } => {
                if let Some(view) = self.views.get_mut(&channel) {
                    view.toggle(folder.trim_end_matches('/'));
                }
                self.print_tree(channel);
            }
            ConsoleCommand::Play { channel, track } => {
                let orch = self.orchestrator.clone();
                if channel == Channel::Modulator {
                    self.spawn_command(async move { orch.load_voice_effect(&track).await });
                } else {
                    self.spawn_command(async move { orch.play(channel, &track).await });
                }
            }
            ConsoleCommand::Stop(channel) => {
                let orch = self.orchestrator.clone();
                self.spawn_command(async move { orch.stop(channel).await });
            }
            ConsoleCommand::Volume { channel, value } => match self.volumes.get_mut(&channel) {
                Some(ctl) => ctl.input(value),
                None => println!("{} has no volume control", channel),
            },
            ConsoleCommand::Crossfade { channel, seconds } => {
                match self.crossfades.get_mut(&channel) {
                    Some(ctl) => ctl.input(seconds),
                    None => println!("{} has no crossfade control", channel),
                }
            }
            ConsoleCommand::Loop { channel, mode } => {
                let orch = self.orchestrator.clone();
                self.spawn_command(async move { orch.set_loop_mode(channel, mode).await });
            }
            ConsoleCommand::Press(channel) => self.navbar.press_start(channel),
            ConsoleCommand::Release(channel) => match self.navbar.press_end(channel) {
                Some(PressOutcome::Held) => println!("{}: held", channel),
                Some(PressOutcome::Tap) => {}
                None => println!("{} was not pressed", channel),
            },
            ConsoleCommand::Effect(action) => self.handle_effect(action).await,
            ConsoleCommand::Refresh => {
                for channel in Channel::ALL {
                    if let Err(e) = self.orchestrator.refresh(channel).await {
                        println!("! refresh {}: {}", channel, e);
                    }
                }
            }
            ConsoleCommand::Help => println!("{}", USAGE),
            ConsoleCommand::Quit => {}
        }
    }

    async fn handle_effect(&mut self, action: EffectAction) {
        let result = match action {
            EffectAction::Load(name) => self
                .orchestrator
                .load_voice_effect(&name)
                .await
                .map(|_| ()),
            EffectAction::Preset(name) => {
                let presets = self.orchestrator.catalog().modulator;
                self.editor.select_preset(&name, &presets).await
            }
            EffectAction::Set { key, value } => {
                match self.editor.set_param(&key, value) {
                    Some(stored) => println!("{} = {}", key, stored),
                    None => println!("unknown parameter '{}'", key),
                }
                Ok(())
            }
            EffectAction::Name(name) => {
                self.editor.set_name(&name);
                Ok(())
            }
            EffectAction::Play => self.editor.play().await,
            EffectAction::Save => match self.editor.save().await {
                Ok(false) => {
                    println!("name the effect first ('effect name <name>')");
                    Ok(())
                }
                Ok(true) => Ok(()),
                Err(e) => Err(e),
            },
            EffectAction::Delete(name) => self.editor.delete(&name).await,
        };
        if let Err(e) = result {
            println!("! effect: {}", e);
        }
    }
}
