//! Trigger parsing and debounce gates
//!
//! Trigger parameters accept semantic tokens (`trigger`/`on` fire,
//! `idle`/`off` don't) and, for older hosts, a monotonic integer
//! counter where any increase fires. Each debounced action then passes
//! a per-action gate that swallows repeats inside its window.

use std::time::{Duration, Instant};

/// Tracks one trigger parameter's legacy counter
#[derive(Debug, Default)]
pub struct TriggerTracker {
    last_step: i64,
}

impl TriggerTracker {
    /// Whether this value fires the trigger.
    pub fn fires(&mut self, value: &str) -> bool {
        match value.trim() {
            "trigger" | "on" => true,
            "idle" | "off" | "" => false,
            other => {
                let step = other.parse::<i64>().unwrap_or(0);
                let fired = step > self.last_step;
                self.last_step = step;
                fired
            }
        }
    }
}

/// Swallows trigger repeats inside a debounce window
#[derive(Debug, Default)]
pub struct DebounceGate {
    last_allowed: Option<Instant>,
}

impl DebounceGate {
    /// Whether an action is allowed now; allowing starts the window.
    pub fn allow(&mut self, window: Duration) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_allowed {
            if now.duration_since(last) < window {
                return false;
            }
        }
        self.last_allowed = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_tokens() {
        let mut t = TriggerTracker::default();
        assert!(t.fires("trigger"));
        assert!(t.fires("on"));
        assert!(!t.fires("idle"));
        assert!(!t.fires("off"));
        assert!(!t.fires(""));
        assert!(t.fires(" trigger "));
    }

    #[test]
    fn counter_edges_fire_once_per_increase() {
        let mut t = TriggerTracker::default();
        assert!(t.fires("1"));
        assert!(!t.fires("1"));
        assert!(t.fires("2"));
        assert!(!t.fires("2"));
        assert!(t.fires("5"));
        // Counter reset (host restart) doesn't fire until it climbs again
        assert!(!t.fires("0"));
        assert!(t.fires("1"));
    }

    #[test]
    fn garbage_counter_values_do_not_fire() {
        let mut t = TriggerTracker::default();
        assert!(t.fires("3"));
        assert!(!t.fires("bogus"));
        assert!(t.fires("1"));
    }

    #[test]
    fn gate_swallows_repeats_inside_window() {
        let mut gate = DebounceGate::default();
        let window = Duration::from_millis(200);
        assert!(gate.allow(window));
        assert!(!gate.allow(window));
        std::thread::sleep(Duration::from_millis(210));
        assert!(gate.allow(window));
    }

    #[test]
    fn zero_window_always_allows() {
        let mut gate = DebounceGate::default();
        assert!(gate.allow(Duration::ZERO));
        assert!(gate.allow(Duration::ZERO));
    }
}
