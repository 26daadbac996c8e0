use crate::display::{Rect, WindowHandle};
use crate::window::registry::ClientId;
use crate::window::{ClientFlags, ClientType, DockEdge};

/// One managed top-level window.
///
/// `window` is the client's own window; `frame` is the decoration window it
/// was reparented into. Undecorated variants (Override, undecorated docks)
/// keep the two handles equal.
#[derive(Debug, Clone)]
pub struct Client {
    pub window: WindowHandle,
    pub frame: WindowHandle,
    pub kind: ClientType,
    pub name: String,

    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Size the client originally asked for; dialogs fall back to this when
    /// the screen grows again.
    pub init_width: u32,
    pub init_height: u32,

    pub dock_edge: Option<DockEdge>,
    pub flags: ClientFlags,
    pub transient_for: Option<ClientId>,
    pub startup_id: Option<String>,

    pub mapped: bool,
    /// Number of upcoming UnmapNotify events to swallow; bumped when we
    /// reparent or adopt a window, since both synthesize an unmap we did
    /// not mean as a withdrawal.
    pub ignore_unmap: u8,
}

impl Client {
    pub fn new(window: WindowHandle, kind: ClientType, geometry: Rect) -> Self {
        Client {
            window,
            frame: window,
            kind,
            name: String::new(),
            x: geometry.x,
            y: geometry.y,
            width: geometry.width,
            height: geometry.height,
            init_width: geometry.width,
            init_height: geometry.height,
            dock_edge: None,
            flags: ClientFlags::default(),
            transient_for: None,
            startup_id: None,
            mapped: false,
            ignore_unmap: 0,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn set_rect(&mut self, rect: Rect) {
        self.x = rect.x;
        self.y = rect.y;
        self.width = rect.width;
        self.height = rect.height;
    }

    pub fn is_docked_at(&self, edge: DockEdge) -> bool {
        self.dock_edge == Some(edge)
    }

    /// Whether this client owns its own decoration window.
    pub fn is_framed(&self) -> bool {
        self.frame != self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_starts_unframed_and_unmapped() {
        let c = Client::new(7, ClientType::App, Rect::new(10, 20, 300, 200));
        assert!(!c.is_framed());
        assert!(!c.mapped);
        assert_eq!(c.rect(), Rect::new(10, 20, 300, 200));
        assert_eq!((c.init_width, c.init_height), (300, 200));
    }
}
