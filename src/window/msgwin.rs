//! Message-window queue: message-typed windows wait here and only the
//! head of the queue exists as a real client at any moment.

use std::collections::VecDeque;

use tracing::debug;

use crate::core::context::Wm;
use crate::display::{DisplayServer, WindowHandle};
use crate::window::classify;
use crate::window::ops;
use crate::window::registry::MatchMode;
use crate::window::ClientType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgWinEntry {
    pub window: WindowHandle,
    /// Remaining lifetime in ticks; `-1` never expires.
    pub timeout_ticks: i32,
}

#[derive(Debug, Default)]
pub struct MessageWinQueue {
    entries: VecDeque<MsgWinEntry>,
}

impl MessageWinQueue {
    pub fn new() -> Self {
        MessageWinQueue::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn push(&mut self, window: WindowHandle, timeout_ticks: i32) {
        debug!(window, timeout_ticks, "message window queued");
        self.entries.push_back(MsgWinEntry {
            window,
            timeout_ticks,
        });
    }

    pub fn head(&self) -> Option<MsgWinEntry> {
        self.entries.front().copied()
    }

    pub fn is_head(&self, window: WindowHandle) -> bool {
        self.head().is_some_and(|e| e.window == window)
    }

    pub fn contains(&self, window: WindowHandle) -> bool {
        self.entries.iter().any(|e| e.window == window)
    }

    pub fn pop_front(&mut self) -> Option<MsgWinEntry> {
        self.entries.pop_front()
    }

    pub fn remove(&mut self, window: WindowHandle) {
        self.entries.retain(|e| e.window != window);
    }

    /// Count down the head's lifetime. Returns the head's window once its
    /// timeout hits zero.
    fn tick(&mut self) -> Option<WindowHandle> {
        let head = self.entries.front_mut()?;
        if head.timeout_ticks < 0 {
            return None;
        }
        head.timeout_ticks -= 1;
        if head.timeout_ticks <= 0 {
            Some(head.window)
        } else {
            None
        }
    }
}

/// The head client went away: drop it from the queue and realize the next
/// entry whose window still exists. Entries that vanished while waiting
/// are skipped silently.
pub fn queue_pop(wm: &mut Wm, srv: &mut dyn DisplayServer) {
    let Some(queue) = wm.msg_queue.as_mut() else { return };
    queue.pop_front();
    loop {
        let Some(next) = wm.msg_queue.as_ref().and_then(|q| q.head()) else {
            return;
        };
        if srv.window_exists(next.window) {
            debug!(window = next.window, "realizing next message window");
            if classify::make_new_client(wm, srv, next.window)
                .ok()
                .flatten()
                .is_some()
            {
                return;
            }
        }
        if let Some(queue) = wm.msg_queue.as_mut() {
            queue.pop_front();
        }
    }
}

/// One-second tick: expire the visible head when its time runs out.
pub fn queue_process(wm: &mut Wm, srv: &mut dyn DisplayServer) {
    let Some(expired) = wm.msg_queue.as_mut().and_then(|q| q.tick()) else {
        return;
    };
    debug!(window = expired, "message window timed out");
    match wm.registry.find(expired, MatchMode::Window) {
        // The dialog's destroy pops the queue and realizes the successor.
        Some(id) => ops::ops_for(ClientType::Dialog).destroy(wm, srv, id),
        None => queue_pop(wm, srv),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_kept() {
        let mut q = MessageWinQueue::new();
        q.push(1, 5);
        q.push(2, -1);
        q.push(3, 2);
        assert_eq!(q.head().map(|e| e.window), Some(1));
        q.pop_front();
        assert_eq!(q.head().map(|e| e.window), Some(2));
        q.pop_front();
        assert_eq!(q.head().map(|e| e.window), Some(3));
    }

    #[test]
    fn sticky_head_never_expires() {
        let mut q = MessageWinQueue::new();
        q.push(1, -1);
        for _ in 0..100 {
            assert_eq!(q.tick(), None);
        }
    }

    #[test]
    fn timed_head_expires_after_its_ticks() {
        let mut q = MessageWinQueue::new();
        q.push(7, 3);
        assert_eq!(q.tick(), None);
        assert_eq!(q.tick(), None);
        assert_eq!(q.tick(), Some(7));
    }

    #[test]
    fn only_the_head_counts_down() {
        let mut q = MessageWinQueue::new();
        q.push(1, -1);
        q.push(2, 1);
        assert_eq!(q.tick(), None);
        q.pop_front();
        // Entry 2 has not been counted down yet.
        assert_eq!(q.tick(), Some(2));
    }
}
