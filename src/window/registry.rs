use std::collections::HashMap;

use tracing::trace;

use crate::display::{DisplayServer, WindowHandle};
use crate::window::client::Client;
use crate::window::{ClientType, TypeSet};

/// Stable handle into the client arena. Never reused for the lifetime of
/// the process, so a stale handle held across a removal simply fails the
/// liveness check instead of aliasing a new client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

/// Which window handle a lookup should match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Window,
    Frame,
}

/// The client arena plus the stacking order, bottom to top.
///
/// Membership and ordering always agree: every arena entry appears exactly
/// once in `stacking` and vice versa.
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<ClientId, Client>,
    stacking: Vec<ClientId>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Add a client, stacked directly above `after` when given, otherwise
    /// on top of everything.
    pub fn insert(&mut self, client: Client, after: Option<ClientId>) -> ClientId {
        let id = ClientId(self.next_id);
        self.next_id += 1;
        trace!(?id, window = client.window, kind = ?client.kind, "registry insert");
        self.clients.insert(id, client);
        match after.and_then(|a| self.position(a)) {
            Some(pos) => self.stacking.insert(pos + 1, id),
            None => self.stacking.push(id),
        }
        id
    }

    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        self.stacking.retain(|c| *c != id);
        trace!(?id, window = client.window, "registry remove");
        Some(client)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Look up a client by one of its window handles.
    pub fn find(&self, handle: WindowHandle, mode: MatchMode) -> Option<ClientId> {
        self.stacking.iter().copied().find(|id| {
            self.clients.get(id).is_some_and(|c| match mode {
                MatchMode::Window => c.window == handle,
                MatchMode::Frame => c.frame == handle,
            })
        })
    }

    /// Current stacking order, bottom to top.
    pub fn stacking(&self) -> &[ClientId] {
        &self.stacking
    }

    /// Owned copy of the stacking order, for traversals that may remove
    /// the element being visited.
    pub fn stacking_snapshot(&self) -> Vec<ClientId> {
        self.stacking.clone()
    }

    pub fn kind_of(&self, id: ClientId) -> Option<ClientType> {
        self.clients.get(&id).map(|c| c.kind)
    }

    /// Topmost client of the given variant, if any.
    pub fn topmost_of(&self, kind: ClientType) -> Option<ClientId> {
        self.stacking
            .iter()
            .rev()
            .copied()
            .find(|id| self.kind_of(*id) == Some(kind))
    }

    fn position(&self, id: ClientId) -> Option<usize> {
        self.stacking.iter().position(|c| *c == id)
    }

    pub fn move_to_top(&mut self, id: ClientId) {
        if let Some(pos) = self.position(id) {
            let id = self.stacking.remove(pos);
            self.stacking.push(id);
        }
    }

    pub fn move_to_bottom(&mut self, id: ClientId) {
        if let Some(pos) = self.position(id) {
            let id = self.stacking.remove(pos);
            self.stacking.insert(0, id);
        }
    }

    /// Place `id` directly above `anchor`. No-op when either is missing or
    /// they are the same client.
    pub fn move_above(&mut self, id: ClientId, anchor: ClientId) {
        if id == anchor {
            return;
        }
        let Some(pos) = self.position(id) else { return };
        if self.position(anchor).is_none() {
            return;
        }
        let id = self.stacking.remove(pos);
        // Anchor position may have shifted by the removal.
        match self.position(anchor) {
            Some(a) => self.stacking.insert(a + 1, id),
            None => self.stacking.push(id),
        }
    }

    /// Place `id` directly below `anchor`.
    pub fn move_below(&mut self, id: ClientId, anchor: ClientId) {
        if id == anchor {
            return;
        }
        let Some(pos) = self.position(id) else { return };
        if self.position(anchor).is_none() {
            return;
        }
        let id = self.stacking.remove(pos);
        match self.position(anchor) {
            Some(a) => self.stacking.insert(a, id),
            None => self.stacking.push(id),
        }
    }

    /// Move every client whose variant is in `kinds` to sit directly above
    /// `anchor`, preserving their relative order.
    pub fn move_type_above(&mut self, kinds: TypeSet, anchor: ClientId) {
        let Some(_) = self.position(anchor) else { return };
        let moved: Vec<ClientId> = self
            .stacking
            .iter()
            .copied()
            .filter(|id| {
                *id != anchor
                    && self
                        .kind_of(*id)
                        .is_some_and(|k| kinds.contains(k.as_set()))
            })
            .collect();
        if moved.is_empty() {
            return;
        }
        self.stacking.retain(|id| !moved.contains(id));
        let base = self.position(anchor).unwrap_or(self.stacking.len() - 1);
        for (i, id) in moved.into_iter().enumerate() {
            self.stacking.insert(base + 1 + i, id);
        }
    }

    /// Move every client whose variant is in `kinds` to sit directly below
    /// `anchor`, preserving their relative order.
    pub fn move_type_below(&mut self, kinds: TypeSet, anchor: ClientId) {
        let Some(_) = self.position(anchor) else { return };
        let moved: Vec<ClientId> = self
            .stacking
            .iter()
            .copied()
            .filter(|id| {
                *id != anchor
                    && self
                        .kind_of(*id)
                        .is_some_and(|k| kinds.contains(k.as_set()))
            })
            .collect();
        if moved.is_empty() {
            return;
        }
        self.stacking.retain(|id| !moved.contains(id));
        let base = self.position(anchor).unwrap_or(0);
        for (i, id) in moved.into_iter().enumerate() {
            self.stacking.insert(base + i, id);
        }
    }

    /// Rotate the lowest client of `kind` to the top and return it.
    pub fn cycle_forward(&mut self, kind: ClientType) -> Option<ClientId> {
        let lowest = self
            .stacking
            .iter()
            .copied()
            .find(|id| self.kind_of(*id) == Some(kind))?;
        self.move_to_top(lowest);
        Some(lowest)
    }

    /// Rotate the topmost client of `kind` to the bottom and return the
    /// client of that variant now on top.
    pub fn cycle_backward(&mut self, kind: ClientType) -> Option<ClientId> {
        let top = self.topmost_of(kind)?;
        self.move_to_bottom(top);
        self.topmost_of(kind)
    }

    /// Commit the whole order to the server in one restack, then block on
    /// the server's ack so later queries observe the new order.
    pub fn sync_to_display(&self, srv: &mut dyn DisplayServer) {
        let top_to_bottom: Vec<WindowHandle> = self
            .stacking
            .iter()
            .rev()
            .filter_map(|id| self.clients.get(id).map(|c| c.frame))
            .collect();
        srv.restack(&top_to_bottom);
        srv.sync();
    }

    /// Membership/order agreement check, used by tests.
    pub fn is_consistent(&self) -> bool {
        if self.stacking.len() != self.clients.len() {
            return false;
        }
        let mut seen = std::collections::HashSet::new();
        self.stacking
            .iter()
            .all(|id| self.clients.contains_key(id) && seen.insert(*id))
    }
}
