//! Orchestration phase state machine
//!
//! A fixed graph of legal transitions with per-phase enter/exit hooks,
//! per-edge actions, guard conditions, a bounded history, and listener
//! notification. `force_state` bypasses the graph and is reserved for
//! recovery.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// History bound
const MAX_HISTORY: usize = 100;

/// A state in the orchestration state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Research,
    Planning,
    Building,
    Verifying,
    Handoff,
    Cooldown,
    Error,
}

impl Phase {
    /// Legal successor phases
    pub fn legal_successors(&self) -> &'static [Phase] {
        use Phase::*;
        match self {
            Idle => &[Loading],
            Loading => &[Research, Error, Idle],
            Research => &[Planning, Error, Idle],
            Planning => &[Building, Error, Idle],
            Building => &[Verifying, Cooldown, Error, Idle],
            Verifying => &[Building, Handoff, Error, Idle],
            Handoff => &[Loading, Idle],
            Cooldown => &[Building, Idle],
            Error => &[Idle, Loading],
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Loading => "loading",
            Phase::Research => "research",
            Phase::Planning => "planning",
            Phase::Building => "building",
            Phase::Verifying => "verifying",
            Phase::Handoff => "handoff",
            Phase::Cooldown => "cooldown",
            Phase::Error => "error",
        };
        write!(f, "{}", s)
    }
}

type Hook = Box<dyn Fn() + Send>;
type Guard = Box<dyn Fn(Phase, Phase) -> bool + Send>;
type Listener = Box<dyn Fn(Phase, Phase) + Send>;

/// The phase machine
pub struct PhaseMachine {
    state: Phase,
    history: VecDeque<Phase>,
    on_enter: HashMap<Phase, Hook>,
    on_exit: HashMap<Phase, Hook>,
    actions: HashMap<(Phase, Phase), Hook>,
    guards: Vec<Guard>,
    listeners: Vec<Listener>,
}

impl PhaseMachine {
    /// Create a machine starting at idle
    pub fn new() -> Self {
        Self {
            state: Phase::Idle,
            history: VecDeque::new(),
            on_enter: HashMap::new(),
            on_exit: HashMap::new(),
            actions: HashMap::new(),
            guards: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> Phase {
        self.state
    }

    /// Previous states, oldest first
    pub fn history(&self) -> impl Iterator<Item = &Phase> {
        self.history.iter()
    }

    /// Register an on-enter hook for a phase
    pub fn on_enter(&mut self, phase: Phase, hook: impl Fn() + Send + 'static) {
        self.on_enter.insert(phase, Box::new(hook));
    }

    /// Register an on-exit hook for a phase
    pub fn on_exit(&mut self, phase: Phase, hook: impl Fn() + Send + 'static) {
        self.on_exit.insert(phase, Box::new(hook));
    }

    /// Register an action to run when a specific edge is taken
    pub fn on_transition(&mut self, from: Phase, to: Phase, action: impl Fn() + Send + 'static) {
        self.actions.insert((from, to), Box::new(action));
    }

    /// Register a guard; any guard returning false denies a transition
    pub fn add_guard(&mut self, guard: impl Fn(Phase, Phase) -> bool + Send + 'static) {
        self.guards.push(Box::new(guard));
    }

    /// Register a listener notified with (new, previous) after each change
    pub fn add_listener(&mut self, listener: impl Fn(Phase, Phase) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Attempt a transition.
    ///
    /// Fails (no state change, no history entry, no hooks) when the target
    /// is not a legal successor or a guard denies it.
    pub fn transition(&mut self, to: Phase) -> bool {
        let from = self.state;

        if !from.legal_successors().contains(&to) {
            debug!(%from, %to, "Illegal phase transition rejected");
            return false;
        }
        if self.guards.iter().any(|guard| !guard(from, to)) {
            debug!(%from, %to, "Phase transition denied by guard");
            return false;
        }

        if let Some(hook) = self.on_exit.get(&from) {
            hook();
        }

        self.push_history(from);
        self.state = to;

        if let Some(action) = self.actions.get(&(from, to)) {
            action();
        }
        if let Some(hook) = self.on_enter.get(&to) {
            hook();
        }
        for listener in &self.listeners {
            listener(to, from);
        }

        debug!(%from, %to, "Phase transition");
        true
    }

    /// Set the state directly, bypassing the graph and guards. Recovery
    /// only. Hooks do not run; the history still records the change.
    pub fn force_state(&mut self, state: Phase) {
        let from = self.state;
        self.push_history(from);
        self.state = state;
        debug!(%from, to = %state, "Phase forced");
    }

    fn push_history(&mut self, phase: Phase) {
        if self.history.len() == MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(phase);
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ALL_PHASES: [Phase; 9] = [
        Phase::Idle,
        Phase::Loading,
        Phase::Research,
        Phase::Planning,
        Phase::Building,
        Phase::Verifying,
        Phase::Handoff,
        Phase::Cooldown,
        Phase::Error,
    ];

    #[test]
    fn test_happy_path_through_pipeline() {
        let mut machine = PhaseMachine::new();
        for to in [
            Phase::Loading,
            Phase::Research,
            Phase::Planning,
            Phase::Building,
            Phase::Verifying,
            Phase::Handoff,
            Phase::Idle,
        ] {
            assert!(machine.transition(to), "transition to {:?} should succeed", to);
        }
        assert_eq!(machine.state(), Phase::Idle);
        assert_eq!(machine.history().count(), 7);
    }

    #[test]
    fn test_illegal_transition_rejected_without_side_effects() {
        let mut machine = PhaseMachine::new();
        assert!(!machine.transition(Phase::Building));
        assert_eq!(machine.state(), Phase::Idle);
        assert_eq!(machine.history().count(), 0);
    }

    #[test]
    fn test_guard_denies_transition() {
        let mut machine = PhaseMachine::new();
        machine.add_guard(|_, to| to != Phase::Loading);

        assert!(!machine.transition(Phase::Loading));
        assert_eq!(machine.state(), Phase::Idle);
    }

    #[test]
    fn test_hooks_and_actions_fire_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut machine = PhaseMachine::new();

        let o = order.clone();
        machine.on_exit(Phase::Idle, move || o.lock().unwrap().push("exit"));
        let o = order.clone();
        machine.on_transition(Phase::Idle, Phase::Loading, move || o.lock().unwrap().push("action"));
        let o = order.clone();
        machine.on_enter(Phase::Loading, move || o.lock().unwrap().push("enter"));
        let o = order.clone();
        machine.add_listener(move |_, _| o.lock().unwrap().push("listener"));

        assert!(machine.transition(Phase::Loading));
        assert_eq!(*order.lock().unwrap(), vec!["exit", "action", "enter", "listener"]);
    }

    #[test]
    fn test_listener_receives_new_and_previous() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let mut machine = PhaseMachine::new();
        let s = seen.clone();
        machine.add_listener(move |new, prev| *s.lock().unwrap() = Some((new, prev)));

        machine.transition(Phase::Loading);
        assert_eq!(*seen.lock().unwrap(), Some((Phase::Loading, Phase::Idle)));
    }

    #[test]
    fn test_force_state_bypasses_graph_but_keeps_enforcement() {
        let mut machine = PhaseMachine::new();
        machine.force_state(Phase::Building);
        assert_eq!(machine.state(), Phase::Building);

        // Legal transitions from the forced state still apply
        assert!(machine.transition(Phase::Verifying));
        assert!(!machine.transition(Phase::Research));
    }

    #[test]
    fn test_cooldown_edges() {
        let mut machine = PhaseMachine::new();
        machine.force_state(Phase::Building);
        assert!(machine.transition(Phase::Cooldown));
        assert!(machine.transition(Phase::Building));
    }

    #[test]
    fn test_history_bounded_at_100() {
        let mut machine = PhaseMachine::new();
        for _ in 0..120 {
            assert!(machine.transition(Phase::Loading));
            assert!(machine.transition(Phase::Idle));
        }
        assert_eq!(machine.history().count(), MAX_HISTORY);
    }

    #[test]
    fn test_hooks_do_not_fire_on_failed_transition() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut machine = PhaseMachine::new();
        let c = count.clone();
        machine.on_enter(Phase::Building, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!machine.transition(Phase::Building));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    proptest::proptest! {
        // Any sequence of attempted transitions leaves only legal edges in
        // the recorded walk
        #[test]
        fn prop_history_contains_only_legal_edges(indices in proptest::collection::vec(0usize..9, 0..200)) {
            let mut machine = PhaseMachine::new();
            let mut walk = vec![machine.state()];

            for i in indices {
                let to = ALL_PHASES[i];
                if machine.transition(to) {
                    walk.push(to);
                }
            }

            for pair in walk.windows(2) {
                proptest::prop_assert!(
                    pair[0].legal_successors().contains(&pair[1]),
                    "illegal edge {:?} -> {:?}",
                    pair[0],
                    pair[1]
                );
            }
        }
    }
}
