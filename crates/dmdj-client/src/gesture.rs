//! Navbar press gestures.
//!
//! Each channel button tells a tap from a hold:
//!
//! ```text
//!  Idle ──press──► PressedWaiting ──hold timer fires──► Held (mute toggle)
//!                        │                                  │
//!                        └──release──► ReleasedAsTap        │
//!                                      (navigate)           │
//!                  ◄───────────── release ──────────────────┘
//!  back to Idle
//! ```
//!
//! fx has no mute toggle, so its hold timer is never armed.  The button
//! status (`on` / `off` / `loading`) is derived on demand from live push
//! state and the in-flight mute toggles; nothing is stored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dmdj_proto::protocol::{Channel, Snapshot, EFFECT_OFF};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::busy::BusyMap;
use crate::orchestrator::Orchestrator;

/// Press duration that turns a tap into a mute toggle.
pub const HOLD_TIME: Duration = Duration::from_millis(500);

/// Moves the operator's view to a channel's section.
pub trait Navigator: Send + Sync {
    fn navigate(&self, channel: Channel);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    PressedWaiting,
    Held,
}

/// How a completed press was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    Tap,
    Held,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    On,
    Off,
    Loading,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::On => "on",
            ChannelStatus::Off => "off",
            ChannelStatus::Loading => "loading",
        }
    }
}

/// One press-release cycle.  `was_held` is claimed exactly once, either
/// by the hold timer (held) or by the release/cancel (tap); whoever swaps
/// it first decides the outcome.
struct Press {
    timer: Option<JoinHandle<()>>,
    was_held: Arc<AtomicBool>,
}

#[derive(Clone)]
struct MuteToggle {
    orchestrator: Orchestrator,
    snapshot: watch::Receiver<Snapshot>,
    navigator: Arc<dyn Navigator>,
    muting: BusyMap<Channel>,
}

impl MuteToggle {
    /// Stop what the channel is doing, or navigate there if it is idle.
    /// Never starts playback.
    async fn run(&self, channel: Channel) {
        if channel == Channel::Fx {
            return;
        }
        let _guard = self.muting.acquire(channel);
        let state = self.snapshot.borrow().channel(channel).clone();

        let result = match channel {
            Channel::Music | Channel::Ambient if state.playing => {
                info!("navbar: hold on {} → stop", channel);
                self.orchestrator.stop(channel).await.map(|_| ())
            }
            // Only a confirmed "off" counts as silent here; an effect the
            // server has not reported yet is turned off too.
            Channel::Modulator if state.effect.as_deref() != Some(EFFECT_OFF) => {
                info!("navbar: hold on voice → effect off");
                self.orchestrator.load_voice_effect(EFFECT_OFF).await.map(|_| ())
            }
            _ => {
                self.navigator.navigate(channel);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("navbar: mute toggle on {} failed: {}", channel, e);
        }
    }
}

pub struct Navbar {
    toggle: MuteToggle,
    hold_time: Duration,
    presses: HashMap<Channel, Press>,
}

impl Navbar {
    pub fn new(
        orchestrator: Orchestrator,
        snapshot: watch::Receiver<Snapshot>,
        navigator: Arc<dyn Navigator>,
        hold_time: Duration,
    ) -> Self {
        Self {
            toggle: MuteToggle {
                orchestrator,
                snapshot,
                navigator,
                muting: BusyMap::new(),
            },
            hold_time,
            presses: HashMap::new(),
        }
    }

    pub fn press_start(&mut self, channel: Channel) {
        // A second press without a release replaces the first.
        if let Some(old) = self.presses.remove(&channel) {
            cancel_unfired(old);
        }

        let was_held = Arc::new(AtomicBool::new(false));
        let timer = if channel == Channel::Fx {
            None
        } else {
            let held = Arc::clone(&was_held);
            let toggle = self.toggle.clone();
            let hold_time = self.hold_time;
            Some(tokio::spawn(async move {
                tokio::time::sleep(hold_time).await;
                if held.swap(true, Ordering::SeqCst) {
                    // Released first.
                    return;
                }
                toggle.run(channel).await;
            }))
        };
        debug!("navbar: press {}", channel);
        self.presses.insert(channel, Press { timer, was_held });
    }

    /// Release.  A release with no matching press is ignored (`None`).
    pub fn press_end(&mut self, channel: Channel) -> Option<PressOutcome> {
        let press = self.presses.remove(&channel)?;
        let held = cancel_unfired(press);

        if held {
            Some(PressOutcome::Held)
        } else {
            debug!("navbar: tap {}", channel);
            self.toggle.navigator.navigate(channel);
            Some(PressOutcome::Tap)
        }
    }

    pub fn phase(&self, channel: Channel) -> GesturePhase {
        match self.presses.get(&channel) {
            None => GesturePhase::Idle,
            Some(p) if p.was_held.load(Ordering::SeqCst) => GesturePhase::Held,
            Some(_) => GesturePhase::PressedWaiting,
        }
    }

    pub fn status(&self, channel: Channel) -> ChannelStatus {
        if self.toggle.muting.is_busy(&channel) {
            return ChannelStatus::Loading;
        }
        let snapshot = self.toggle.snapshot.borrow();
        let state = snapshot.channel(channel);
        let active = match channel {
            Channel::Fx => false,
            Channel::Music | Channel::Ambient => state.track.is_some(),
            Channel::Modulator => state.effect_active(),
        };
        if active {
            ChannelStatus::On
        } else {
            ChannelStatus::Off
        }
    }

    pub fn statuses(&self) -> Vec<(Channel, ChannelStatus)> {
        Channel::ALL.iter().map(|&c| (c, self.status(c))).collect()
    }
}

/// Claim the press for the release side and abort the hold timer.  Returns
/// `true` when the timer claimed it first; that timer is running the mute
/// toggle, which must complete.
fn cancel_unfired(press: Press) -> bool {
    let held = press.was_held.swap(true, Ordering::SeqCst);
    if !held {
        if let Some(timer) = press.timer {
            timer.abort();
        }
    }
    held
}

impl Drop for Navbar {
    fn drop(&mut self) {
        for (_, press) in self.presses.drain() {
            cancel_unfired(press);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNavigator {
        visits: Mutex<Vec<Channel>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, channel: Channel) {
            self.visits.lock().unwrap().push(channel);
        }
    }

    fn navbar(snapshot: Snapshot) -> (Navbar, Arc<RecordingNavigator>, watch::Sender<Snapshot>) {
        let (tx, rx) = watch::channel(snapshot);
        let nav = Arc::new(RecordingNavigator::default());
        let bar = Navbar::new(Orchestrator::new(None), rx, nav.clone(), HOLD_TIME);
        (bar, nav, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_press_is_tap() {
        let (mut bar, nav, _tx) = navbar(Snapshot::default());
        bar.press_start(Channel::Modulator);
        assert_eq!(bar.phase(Channel::Modulator), GesturePhase::PressedWaiting);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(bar.press_end(Channel::Modulator), Some(PressOutcome::Tap));
        assert_eq!(bar.phase(Channel::Modulator), GesturePhase::Idle);
        assert_eq!(*nav.visits.lock().unwrap(), vec![Channel::Modulator]);

        // Cancelled timer never fires afterwards.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(nav.visits.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_on_idle_channel_navigates_once() {
        let (mut bar, nav, _tx) = navbar(Snapshot::default());
        bar.press_start(Channel::Music);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(bar.phase(Channel::Music), GesturePhase::Held);

        assert_eq!(bar.press_end(Channel::Music), Some(PressOutcome::Held));
        // Navigated by the toggle (nothing playing), not again by release.
        assert_eq!(*nav.visits.lock().unwrap(), vec![Channel::Music]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fx_never_holds() {
        let (mut bar, nav, _tx) = navbar(Snapshot::default());
        bar.press_start(Channel::Fx);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(bar.phase(Channel::Fx), GesturePhase::PressedWaiting);
        assert_eq!(bar.press_end(Channel::Fx), Some(PressOutcome::Tap));
        assert_eq!(*nav.visits.lock().unwrap(), vec![Channel::Fx]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_without_press_ignored() {
        let (mut bar, nav, _tx) = navbar(Snapshot::default());
        assert_eq!(bar.press_end(Channel::Ambient), None);
        assert!(nav.visits.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_derived_from_live_state() {
        let (bar, _nav, tx) = navbar(Snapshot::default());
        assert_eq!(bar.status(Channel::Music), ChannelStatus::Off);
        assert_eq!(bar.status(Channel::Modulator), ChannelStatus::Off);

        tx.send_modify(|s| {
            s.music.track = Some("a/b".into());
            s.modulator.effect = Some("robot".into());
            s.fx.track = Some("boom".into());
        });
        assert_eq!(bar.status(Channel::Music), ChannelStatus::On);
        assert_eq!(bar.status(Channel::Modulator), ChannelStatus::On);
        assert_eq!(bar.status(Channel::Fx), ChannelStatus::Off);

        tx.send_modify(|s| s.modulator.effect = Some("off".into()));
        assert_eq!(bar.status(Channel::Modulator), ChannelStatus::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_toggle_releases_loading() {
        let mut snap = Snapshot::default();
        snap.music.playing = true;
        snap.music.track = Some("a/b".into());
        let (mut bar, nav, _tx) = navbar(snap);

        bar.press_start(Channel::Music);
        tokio::time::sleep(Duration::from_millis(600)).await;
        bar.press_end(Channel::Music);

        // The stop failed (no remote configured); status falls back to state.
        assert_eq!(bar.status(Channel::Music), ChannelStatus::On);
        assert!(nav.visits.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_hold_before_any_push_turns_effect_off() {
        let orch = Orchestrator::new(None);
        let mut failures = orch.subscribe_failures();
        let (_tx, rx) = watch::channel(Snapshot::default());
        let nav = Arc::new(RecordingNavigator::default());
        let mut bar = Navbar::new(orch, rx, nav.clone(), HOLD_TIME);

        bar.press_start(Channel::Modulator);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(bar.press_end(Channel::Modulator), Some(PressOutcome::Held));

        // The load was attempted (and failed: no remote) instead of navigating.
        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.key.as_str(), "modulator_load");
        assert!(nav.visits.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_release_racing_hold_timer_runs_one_action() {
        const CYCLES: usize = 40;
        let orch = Orchestrator::new(None);
        let mut failures = orch.subscribe_failures();
        let (_tx, rx) = watch::channel(Snapshot::default());
        let nav = Arc::new(RecordingNavigator::default());
        let mut bar = Navbar::new(orch, rx, nav.clone(), Duration::from_millis(2));

        let mut taps = 0;
        let mut holds = 0;
        for i in 0..CYCLES {
            bar.press_start(Channel::Modulator);
            // Release around the hold deadline.
            tokio::time::sleep(Duration::from_micros((i as u64 % 5) * 800)).await;
            match bar.press_end(Channel::Modulator) {
                Some(PressOutcome::Tap) => taps += 1,
                Some(PressOutcome::Held) => holds += 1,
                None => panic!("press was registered"),
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut toggles = 0;
        while failures.try_recv().is_ok() {
            toggles += 1;
        }
        assert_eq!(taps + holds, CYCLES);
        assert_eq!(nav.visits.lock().unwrap().len(), taps);
        assert_eq!(toggles, holds);
    }
}
