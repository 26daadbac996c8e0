//! Startup-notification cycles: one entry per launch in flight, a busy
//! cursor while any cycle is unresolved, and a root property advertising
//! the launches still pending so a session manager can restart them.

use std::process::Command;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::context::Wm;
use crate::display::{CursorKind, DisplayServer, WindowHandle};
use crate::window::manager;
use crate::window::registry::MatchMode;
use crate::window::WmFlags;

/// How long an unresolved cycle keeps the busy cursor alive. The clock
/// restarts whenever some cycle resolves, so a burst of launches extends
/// the window instead of truncating it.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupCycle {
    pub bin_name: String,
    pub sequence: Option<String>,
    /// Window that satisfied the cycle, once one has.
    pub window: Option<WindowHandle>,
}

impl StartupCycle {
    fn resolved(&self) -> bool {
        self.window.is_some()
    }
}

#[derive(Debug, Default)]
pub struct StartupTracker {
    cycles: Vec<StartupCycle>,
    busy_count: u32,
    clock_start: Option<Instant>,
    launches: u64,
}

impl StartupTracker {
    pub fn new() -> Self {
        StartupTracker::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy_count > 0
    }

    pub fn cycles(&self) -> &[StartupCycle] {
        &self.cycles
    }

    /// A launch began. Duplicate binaries never get a second cycle.
    pub fn begin(&mut self, sequence: Option<&str>, bin_name: &str) {
        if self
            .cycles
            .iter()
            .any(|c| c.bin_name == bin_name && !c.resolved())
        {
            debug!(bin_name, "startup cycle already pending, not adding another");
            return;
        }
        debug!(bin_name, ?sequence, "startup cycle opened");
        self.cycles.push(StartupCycle {
            bin_name: bin_name.to_owned(),
            sequence: sequence.map(str::to_owned),
            window: None,
        });
        self.busy_count += 1;
        self.clock_start = Some(Instant::now());
    }

    /// A window arrived for `sequence`. Returns true when a cycle resolved.
    pub fn resolve(&mut self, sequence: &str, window: WindowHandle) -> bool {
        let Some(cycle) = self
            .cycles
            .iter_mut()
            .find(|c| c.sequence.as_deref() == Some(sequence) && !c.resolved())
        else {
            return false;
        };
        debug!(bin = %cycle.bin_name, window, "startup cycle resolved");
        cycle.window = Some(window);
        self.decrement();
        true
    }

    /// The launch was abandoned before any window appeared.
    pub fn cancel(&mut self, sequence: &str) {
        let before = self.cycles.len();
        self.cycles
            .retain(|c| c.resolved() || c.sequence.as_deref() != Some(sequence));
        if self.cycles.len() < before {
            self.decrement();
        }
    }

    /// The resolved window went away; its cycle goes with it.
    pub fn forget_window(&mut self, window: WindowHandle) {
        self.cycles.retain(|c| c.window != Some(window));
    }

    /// Cycle already resolved for this binary, if any.
    pub fn resolved_window(&self, bin_name: &str) -> Option<WindowHandle> {
        self.cycles
            .iter()
            .find(|c| c.bin_name == bin_name)
            .and_then(|c| c.window)
    }

    pub fn has_pending(&self, bin_name: &str) -> bool {
        self.cycles
            .iter()
            .any(|c| c.bin_name == bin_name && !c.resolved())
    }

    /// Watchdog, run on each loop tick. Once the shared clock runs out it
    /// gives up on the oldest unresolved cycle and restarts the clock, so
    /// each remaining cycle gets its own timeout window. Returns true if a
    /// cycle was dropped.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if self.busy_count == 0 {
            return false;
        }
        let expired = self
            .clock_start
            .is_some_and(|start| now.duration_since(start) >= STARTUP_TIMEOUT);
        if !expired {
            return false;
        }
        if let Some(pos) = self.cycles.iter().position(|c| !c.resolved()) {
            warn!(bin = %self.cycles[pos].bin_name, "startup cycle timed out");
            self.cycles.remove(pos);
        }
        self.busy_count = self.busy_count.saturating_sub(1);
        self.clock_start = if self.busy_count > 0 { Some(now) } else { None };
        true
    }

    /// Pipe-delimited list of binaries still launching, oldest first, each
    /// at most once. `None` when nothing is pending.
    pub fn launch_list(&self) -> Option<String> {
        let mut names: Vec<&str> = Vec::new();
        for c in &self.cycles {
            if !c.resolved() && !names.contains(&c.bin_name.as_str()) {
                names.push(&c.bin_name);
            }
        }
        if names.is_empty() {
            None
        } else {
            Some(names.join("|"))
        }
    }

    fn next_sequence(&mut self, bin_name: &str) -> String {
        self.launches += 1;
        format!("pocketwm/{}/{}-{}", bin_name, std::process::id(), self.launches)
    }

    fn decrement(&mut self) {
        self.busy_count = self.busy_count.saturating_sub(1);
        // Restart, not stop: other pending cycles get a fresh window.
        self.clock_start = Some(Instant::now());
    }
}

/// Push the pending-launch list (or clear it) and pick the matching cursor.
pub fn publish_state(wm: &mut Wm, srv: &mut dyn DisplayServer) {
    let Some(tracker) = wm.startup.as_ref() else { return };
    let list = tracker.launch_list();
    srv.set_startup_list(list.as_deref());
    if tracker.is_busy() {
        wm.flags.insert(WmFlags::STARTUP_BUSY);
        if !wm.config.no_cursor {
            srv.define_cursor(CursorKind::Busy);
        }
    } else {
        wm.flags.remove(WmFlags::STARTUP_BUSY);
        srv.define_cursor(if wm.config.no_cursor {
            CursorKind::Hidden
        } else {
            CursorKind::Normal
        });
    }
}

/// Single-instance launch: while a cycle for `bin_name` is pending this is
/// a no-op; when one already resolved, its client is re-activated instead
/// of spawning a second copy.
pub fn launch_single(wm: &mut Wm, srv: &mut dyn DisplayServer, bin_name: &str) {
    let (pending, resolved) = match wm.startup.as_ref() {
        Some(t) => (t.has_pending(bin_name), t.resolved_window(bin_name)),
        None => return,
    };
    if pending {
        debug!(bin_name, "launch ignored, cycle still pending");
        return;
    }
    if let Some(window) = resolved {
        if let Some(id) = wm.registry.find(window, MatchMode::Window) {
            debug!(bin_name, window, "launch re-activates existing client");
            manager::activate(wm, srv, Some(id));
            return;
        }
        // Stale cycle; the window is gone.
        if let Some(t) = wm.startup.as_mut() {
            t.forget_window(window);
        }
    }

    let sequence = match wm.startup.as_mut() {
        Some(t) => {
            let s = t.next_sequence(bin_name);
            t.begin(Some(&s), bin_name);
            s
        }
        None => return,
    };
    match Command::new(bin_name)
        .env("DESKTOP_STARTUP_ID", &sequence)
        .spawn()
    {
        Ok(child) => debug!(bin_name, pid = child.id(), "launched"),
        Err(e) => {
            warn!(bin_name, error = %e, "launch failed");
            if let Some(tracker) = wm.startup.as_mut() {
                tracker.cancel(&sequence);
            }
        }
    }
    publish_state(wm, srv);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_binaries_share_one_cycle() {
        let mut t = StartupTracker::new();
        t.begin(Some("s1"), "browser");
        t.begin(Some("s2"), "browser");
        t.begin(Some("s3"), "editor");
        assert_eq!(t.cycles().len(), 2);
        assert_eq!(t.launch_list().as_deref(), Some("browser|editor"));
    }

    #[test]
    fn resolution_removes_from_launch_list_but_keeps_cycle() {
        let mut t = StartupTracker::new();
        t.begin(Some("s1"), "browser");
        t.begin(Some("s2"), "editor");
        assert!(t.resolve("s1", 42));
        assert_eq!(t.launch_list().as_deref(), Some("editor"));
        assert_eq!(t.resolved_window("browser"), Some(42));
        assert!(t.is_busy());
        assert!(t.resolve("s2", 43));
        assert!(!t.is_busy());
        assert_eq!(t.launch_list(), None);
    }

    #[test]
    fn unknown_sequences_resolve_nothing() {
        let mut t = StartupTracker::new();
        t.begin(Some("s1"), "browser");
        assert!(!t.resolve("nope", 42));
        assert!(t.is_busy());
    }

    #[test]
    fn cancel_drops_only_the_named_cycle() {
        let mut t = StartupTracker::new();
        t.begin(Some("s1"), "browser");
        t.begin(Some("s2"), "editor");
        t.cancel("s1");
        assert_eq!(t.launch_list().as_deref(), Some("editor"));
        assert!(t.is_busy());
    }

    #[test]
    fn watchdog_drops_one_cycle_per_timeout() {
        let mut t = StartupTracker::new();
        t.begin(Some("s0"), "term");
        t.begin(Some("s1"), "browser");
        t.begin(Some("s2"), "editor");
        assert!(t.resolve("s0", 42));

        let later = Instant::now() + STARTUP_TIMEOUT + Duration::from_secs(1);
        // Only the oldest unresolved cycle is given up on.
        assert!(t.check_timeout(later));
        assert!(t.is_busy());
        assert_eq!(t.launch_list().as_deref(), Some("editor"));
        // The clock restarted: the next cycle gets its own window.
        assert!(!t.check_timeout(later + Duration::from_secs(1)));
        assert!(t.check_timeout(later + STARTUP_TIMEOUT));
        assert!(!t.is_busy());
        assert_eq!(t.launch_list(), None);
        // Resolved cycles survive for single-instance lookups.
        assert_eq!(t.resolved_window("term"), Some(42));
    }

    #[test]
    fn vanished_window_drops_its_cycle() {
        let mut t = StartupTracker::new();
        t.begin(Some("s1"), "browser");
        assert!(t.resolve("s1", 42));
        t.forget_window(42);
        assert_eq!(t.resolved_window("browser"), None);
    }
}
