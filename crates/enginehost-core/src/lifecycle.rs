//! Host lifecycle state machine.
//!
//! `next_state` is a total function of (state, event, host foreground). It never performs side
//! effects; the bridge executes the returned effects in order.

use log::debug;

use crate::core_invariants::require;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    AwaitingAsset,
    Initializing,
    Running,
    Paused,
    Destroyed,
}

impl LifecycleState {
    #[inline]
    pub fn engine_exists(self) -> bool {
        matches!(
            self,
            LifecycleState::Initializing | LifecycleState::Running | LifecycleState::Paused
        )
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Destroyed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Required package absent or corrupt.
    AssetUnavailable,
    /// Package present, fetched, or not required.
    AssetReady,
    /// Engine finished setup and its first main-loop step.
    EngineStarted,
    HostResumed,
    HostPaused,
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    AwaitAsset,
    StartEngine,
    PauseEngine,
    ResumeEngine,
    EnableSensors,
    DisableSensors,
    ApplyImmersive,
    BroadcastPause,
    BroadcastResume,
    BroadcastDestroy,
    StopEngine,
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub effects: Vec<Effect>,
}

impl Transition {
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.effects.is_empty()
    }
}

const PAUSE: &[Effect] = &[
    Effect::PauseEngine,
    Effect::DisableSensors,
    Effect::BroadcastPause,
];

const RESUME: &[Effect] = &[
    Effect::ResumeEngine,
    Effect::EnableSensors,
    Effect::ApplyImmersive,
    Effect::BroadcastResume,
];

pub fn next_state(
    state: LifecycleState,
    event: LifecycleEvent,
    host_foreground: bool,
) -> (LifecycleState, Vec<Effect>) {
    use LifecycleEvent as E;
    use LifecycleState as S;

    match (state, event) {
        (S::Destroyed, _) => (S::Destroyed, Vec::new()),

        (_, E::Destroy) => {
            let mut effects = vec![Effect::BroadcastDestroy];
            if state.engine_exists() {
                effects.push(Effect::StopEngine);
            }
            effects.push(Effect::Terminate);
            (S::Destroyed, effects)
        }

        (S::Uninitialized, E::AssetUnavailable) => (S::AwaitingAsset, vec![Effect::AwaitAsset]),
        (S::Uninitialized | S::AwaitingAsset, E::AssetReady) => {
            (S::Initializing, vec![Effect::StartEngine])
        }

        (S::Initializing, E::EngineStarted) if host_foreground => {
            (S::Running, vec![Effect::EnableSensors, Effect::ApplyImmersive])
        }
        // Backgrounded while the engine was starting: enter Running, then pause right away.
        (S::Initializing, E::EngineStarted) => (S::Paused, PAUSE.to_vec()),

        (S::Running, E::HostPaused) => (S::Paused, PAUSE.to_vec()),
        (S::Paused, E::HostResumed) => (S::Running, RESUME.to_vec()),

        (s, _) => (s, Vec::new()),
    }
}

/// One lifecycle per bridge.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: LifecycleState,
    host_foreground: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            host_foreground: false,
        }
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[inline]
    pub fn host_foreground(&self) -> bool {
        self.host_foreground
    }

    pub fn apply(&mut self, event: LifecycleEvent) -> Transition {
        if !self.state.is_terminal() {
            match event {
                LifecycleEvent::HostResumed => self.host_foreground = true,
                LifecycleEvent::HostPaused => self.host_foreground = false,
                _ => {}
            }
        }

        let from = self.state;
        let (to, effects) = next_state(from, event, self.host_foreground);
        require(!from.is_terminal() || to.is_terminal(), "lifecycle left Destroyed");
        self.state = to;

        if from != to {
            debug!("lifecycle: {from:?} -> {to:?} on {event:?} effects={effects:?}");
        }

        Transition { from, to, effects }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleEvent as E;
    use LifecycleState as S;

    const ALL_STATES: [S; 6] = [
        S::Uninitialized,
        S::AwaitingAsset,
        S::Initializing,
        S::Running,
        S::Paused,
        S::Destroyed,
    ];

    const ALL_EVENTS: [E; 6] = [
        E::AssetUnavailable,
        E::AssetReady,
        E::EngineStarted,
        E::HostResumed,
        E::HostPaused,
        E::Destroy,
    ];

    fn started(foreground: bool) -> Lifecycle {
        let mut lc = Lifecycle::new();
        if foreground {
            lc.apply(E::HostResumed);
        }
        lc.apply(E::AssetReady);
        lc.apply(E::EngineStarted);
        lc
    }

    #[test]
    fn asset_gate_path() {
        let mut lc = Lifecycle::new();
        assert_eq!(lc.apply(E::AssetUnavailable).effects, vec![Effect::AwaitAsset]);
        assert_eq!(lc.state(), S::AwaitingAsset);
        assert_eq!(lc.apply(E::AssetReady).effects, vec![Effect::StartEngine]);
        assert_eq!(lc.state(), S::Initializing);
    }

    #[test]
    fn repeated_pause_and_resume_are_noops() {
        let mut lc = started(true);
        assert_eq!(lc.state(), S::Running);
        assert!(lc.apply(E::HostResumed).is_noop());

        assert_eq!(lc.apply(E::HostPaused).effects, PAUSE.to_vec());
        assert!(lc.apply(E::HostPaused).is_noop());

        assert_eq!(lc.apply(E::HostResumed).effects, RESUME.to_vec());
        assert!(lc.apply(E::HostResumed).is_noop());
    }

    #[test]
    fn foreground_start_enables_sensors_and_immersive() {
        let mut lc = Lifecycle::new();
        lc.apply(E::HostResumed);
        lc.apply(E::AssetReady);
        let t = lc.apply(E::EngineStarted);
        assert_eq!(t.to, S::Running);
        assert_eq!(t.effects, vec![Effect::EnableSensors, Effect::ApplyImmersive]);
    }

    #[test]
    fn pause_before_running_is_applied_on_start() {
        let mut lc = Lifecycle::new();
        lc.apply(E::HostResumed);
        lc.apply(E::AssetReady);
        assert!(lc.apply(E::HostPaused).is_noop());

        let t = lc.apply(E::EngineStarted);
        assert_eq!(t.to, S::Paused);
        assert_eq!(t.effects, PAUSE.to_vec());
    }

    #[test]
    fn destroy_is_terminal_and_once() {
        let mut lc = started(true);
        let t = lc.apply(E::Destroy);
        assert_eq!(
            t.effects,
            vec![Effect::BroadcastDestroy, Effect::StopEngine, Effect::Terminate]
        );
        for ev in ALL_EVENTS {
            assert!(lc.apply(ev).is_noop());
        }
    }

    #[test]
    fn destroy_without_engine_skips_stop() {
        let mut lc = Lifecycle::new();
        lc.apply(E::AssetUnavailable);
        assert_eq!(
            lc.apply(E::Destroy).effects,
            vec![Effect::BroadcastDestroy, Effect::Terminate]
        );
    }

    #[test]
    fn transition_function_is_total_and_deterministic() {
        for s in ALL_STATES {
            for e in ALL_EVENTS {
                for fg in [false, true] {
                    assert_eq!(next_state(s, e, fg), next_state(s, e, fg));
                }
            }
        }
        assert_eq!(next_state(S::Running, E::AssetReady, true), (S::Running, vec![]));
        assert_eq!(next_state(S::Paused, E::EngineStarted, true), (S::Paused, vec![]));
    }
}
