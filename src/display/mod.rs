//! The seam between the management core and the window server.
//!
//! Everything above this module speaks in semantic operations and
//! [`ServerEvent`]s; the X11 backend translates them to protocol requests,
//! the mock backend records them for tests.

pub mod mock;
pub mod x11;

use std::time::Duration;

use crate::core::error::Result;

/// Opaque server-side window identifier.
pub type WindowHandle = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Rect { x, y, width, height }
    }
}

bitflags::bitflags! {
    /// Which fields of a configure request the requester actually set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConfigureMask: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const WIDTH = 1 << 2;
        const HEIGHT = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    Normal,
    Busy,
    Hidden,
}

/// Declared window type, as read from the server at classification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    Dock,
    Toolbar,
    Input,
    Desktop,
    Splash,
    Dialog,
    Message,
    MessageStaticHi,
    MessageStaticLo,
}

/// One-shot snapshot of everything classification needs to know about a
/// window. Gathered in a single batch so a vanishing window fails the whole
/// query instead of half of it.
#[derive(Debug, Clone)]
pub struct WindowHints {
    pub name: String,
    pub type_hint: Option<TypeHint>,
    pub transient_for: Option<WindowHandle>,
    pub group_leader: Option<WindowHandle>,
    /// Decoration hints requested "no frame at all".
    pub undecorated: bool,
    /// Decoration hints requested "border only, no title".
    pub border_only: bool,
    pub startup_id: Option<String>,
    /// Message-window lifetime in seconds; `Some(-1)` means sticky.
    pub message_timeout: Option<i32>,
    pub geometry: Rect,
    pub override_redirect: bool,
    pub viewable: bool,
    pub wants_focus: bool,
    /// Window opted into the ping protocol via WM_PROTOCOLS.
    pub supports_ping: bool,
    /// Dock asks to live in the titlebar strip rather than a screen edge.
    pub dock_titlebar: bool,
    /// Titlebar dock stays visible while the desktop is raised.
    pub show_on_desktop: bool,
}

impl Default for WindowHints {
    fn default() -> Self {
        WindowHints {
            name: String::new(),
            type_hint: None,
            transient_for: None,
            group_leader: None,
            undecorated: false,
            border_only: false,
            startup_id: None,
            message_timeout: None,
            geometry: Rect::default(),
            override_redirect: false,
            viewable: false,
            // ICCCM: absent input hints mean the window takes focus.
            wants_focus: true,
            supports_ping: false,
            dock_titlebar: false,
            show_on_desktop: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Normal,
    Iconic,
    Withdrawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedAction {
    Close,
    Move,
    Fullscreen,
}

/// External control messages sent to the root window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmCommand {
    Exit,
    Next,
    Prev,
    ShowDesktop,
    SetTheme,
    Misc,
}

/// How a state-change request wants a flag applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    Remove,
    Add,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Name,
    SubName,
    State,
    Translucency,
    Other,
}

/// Startup-notification traffic decoded by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupEvent {
    Initiated { sequence: String, binary: String },
    Completed { sequence: String },
    Canceled { sequence: String },
}

/// Abstract event stream consumed by the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    MapRequest { window: WindowHandle },
    MapNotify { window: WindowHandle },
    UnmapNotify { window: WindowHandle },
    DestroyNotify { window: WindowHandle },
    ConfigureRequest {
        window: WindowHandle,
        rect: Rect,
        mask: ConfigureMask,
    },
    RootGeometryChanged { width: u32, height: u32 },
    PropertyChanged {
        window: WindowHandle,
        kind: PropertyKind,
    },
    Command {
        window: WindowHandle,
        command: WmCommand,
    },
    IconifyRequest { window: WindowHandle },
    FullscreenRequest {
        window: WindowHandle,
        mode: SetMode,
    },
    ButtonPress {
        window: WindowHandle,
        x: i32,
        y: i32,
        time_ms: u32,
    },
    KeyPress { keycode: u8, modifiers: u16 },
    MappingChanged,
    Startup(StartupEvent),
}

/// Semantic window-server operations.
///
/// Methods that only queue protocol traffic are infallible here; the
/// backend traps and logs asynchronous errors. Round-trip queries return
/// `Result` so callers can distinguish a vanished window from a dead
/// connection.
pub trait DisplayServer {
    fn screen_size(&self) -> (u32, u32);

    /// Begin an exclusive server grab. Always paired through
    /// [`with_server_grab`]; never call `ungrab` manually from core code.
    fn grab(&mut self);
    fn ungrab(&mut self);

    /// Block until the server has processed everything sent so far.
    fn sync(&mut self);
    fn flush(&mut self);

    /// Wait for the next event, up to `timeout`. `None` timeout blocks
    /// indefinitely; `Ok(None)` reports that the timeout elapsed.
    fn next_event(&mut self, timeout: Option<Duration>) -> Result<Option<ServerEvent>>;

    fn list_windows(&mut self) -> Result<Vec<WindowHandle>>;
    fn query_hints(&mut self, window: WindowHandle) -> Result<WindowHints>;
    fn window_exists(&mut self, window: WindowHandle) -> bool;

    fn create_frame(&mut self, rect: Rect) -> Result<WindowHandle>;
    fn destroy_window(&mut self, window: WindowHandle);
    fn reparent(&mut self, window: WindowHandle, parent: WindowHandle, x: i32, y: i32);
    fn reparent_to_root(&mut self, window: WindowHandle, x: i32, y: i32);
    fn map(&mut self, window: WindowHandle);
    fn unmap(&mut self, window: WindowHandle);
    fn move_resize(&mut self, window: WindowHandle, rect: Rect);
    /// Forward an unmanaged configure request verbatim.
    fn configure_passthrough(&mut self, window: WindowHandle, rect: Rect, mask: ConfigureMask);
    /// Tell a client where its window really is (synthetic configure).
    fn send_configure(&mut self, window: WindowHandle, rect: Rect);
    /// Commit a whole stacking order in one pass, top to bottom.
    fn restack(&mut self, top_to_bottom: &[WindowHandle]);

    fn set_input_focus(&mut self, window: WindowHandle);
    fn define_cursor(&mut self, cursor: CursorKind);
    fn set_window_cursor(&mut self, window: WindowHandle, cursor: CursorKind);
    fn grab_button(&mut self, window: WindowHandle);
    fn replay_pointer(&mut self);
    fn refresh_mapping(&mut self);
    fn send_ping(&mut self, window: WindowHandle);

    fn set_active_window(&mut self, window: Option<WindowHandle>);
    fn set_client_list(&mut self, windows: &[WindowHandle]);
    fn set_workarea(&mut self, area: Rect);
    fn set_startup_list(&mut self, list: Option<&str>);
    fn set_window_state(&mut self, window: WindowHandle, state: WindowState);
    fn set_allowed_actions(&mut self, window: WindowHandle, actions: &[AllowedAction]);
    /// Stamp the single-workspace desktop index onto a freshly managed window.
    fn stamp_desktop(&mut self, window: WindowHandle);
    /// Read and clear the theme-switch side property, if one was posted.
    fn read_theme_request(&mut self) -> Option<String>;
}

struct GrabGuard<'a>(&'a mut dyn DisplayServer);

impl Drop for GrabGuard<'_> {
    fn drop(&mut self) {
        self.0.ungrab();
        self.0.flush();
    }
}

/// Run `f` under an exclusive server grab, releasing on every exit path,
/// unwinding included.
pub fn with_server_grab<R>(
    srv: &mut dyn DisplayServer,
    f: impl FnOnce(&mut dyn DisplayServer) -> R,
) -> R {
    srv.grab();
    let mut guard = GrabGuard(srv);
    f(&mut *guard.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hints_accept_focus() {
        assert!(WindowHints::default().wants_focus);
    }
}
