//! Recording in-memory backend. Tests seed windows with hints, push
//! events, and assert on what the core asked the server to do.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crate::core::error::{Result, WmError};

use super::{
    AllowedAction, ConfigureMask, CursorKind, DisplayServer, Rect, ServerEvent, WindowHandle,
    WindowHints, WindowState,
};

#[derive(Debug, Default)]
pub struct MockServer {
    width: u32,
    height: u32,
    next_handle: WindowHandle,
    hints: HashMap<WindowHandle, WindowHints>,

    events: VecDeque<ServerEvent>,

    pub mapped: HashSet<WindowHandle>,
    pub destroyed: Vec<WindowHandle>,
    pub parents: HashMap<WindowHandle, WindowHandle>,
    pub geometries: HashMap<WindowHandle, Rect>,
    pub delivered_configures: Vec<(WindowHandle, Rect)>,
    /// Every restack committed, top to bottom.
    pub restacks: Vec<Vec<WindowHandle>>,
    pub states: HashMap<WindowHandle, WindowState>,
    pub actions: HashMap<WindowHandle, Vec<AllowedAction>>,
    pub desktop_stamps: Vec<WindowHandle>,
    pub active_window: Option<WindowHandle>,
    pub client_list: Vec<WindowHandle>,
    pub workarea: Option<Rect>,
    pub startup_list: Option<String>,
    pub root_cursor: Option<CursorKind>,
    pub window_cursors: HashMap<WindowHandle, CursorKind>,
    pub focused: Option<WindowHandle>,
    pub pings: Vec<WindowHandle>,
    pub replayed_pointers: u32,
    pub theme_request: Option<String>,
    pub syncs: u32,

    grab_depth: i32,
    pub max_grab_depth: i32,
}

impl MockServer {
    pub fn new(width: u32, height: u32) -> Self {
        MockServer {
            width,
            height,
            next_handle: 0x1000,
            ..MockServer::default()
        }
    }

    /// Seed a window the server "knows about" and hand back its handle.
    pub fn add_window(&mut self, hints: WindowHints) -> WindowHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.geometries.insert(handle, hints.geometry);
        self.hints.insert(handle, hints);
        handle
    }

    /// Make the window vanish server-side, as if the application exited.
    pub fn vanish_window(&mut self, window: WindowHandle) {
        self.hints.remove(&window);
        self.mapped.remove(&window);
    }

    pub fn push_event(&mut self, event: ServerEvent) {
        self.events.push_back(event);
    }

    pub fn last_restack(&self) -> Option<&[WindowHandle]> {
        self.restacks.last().map(|v| v.as_slice())
    }

    /// True while no grab is outstanding; every test should end balanced.
    pub fn grab_balanced(&self) -> bool {
        self.grab_depth == 0
    }
}

impl DisplayServer for MockServer {
    fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn grab(&mut self) {
        self.grab_depth += 1;
        self.max_grab_depth = self.max_grab_depth.max(self.grab_depth);
    }

    fn ungrab(&mut self) {
        self.grab_depth -= 1;
    }

    fn sync(&mut self) {
        self.syncs += 1;
    }

    fn flush(&mut self) {}

    fn next_event(&mut self, _timeout: Option<Duration>) -> Result<Option<ServerEvent>> {
        Ok(self.events.pop_front())
    }

    fn list_windows(&mut self) -> Result<Vec<WindowHandle>> {
        let mut windows: Vec<WindowHandle> = self.hints.keys().copied().collect();
        windows.sort_unstable();
        Ok(windows)
    }

    fn query_hints(&mut self, window: WindowHandle) -> Result<WindowHints> {
        self.hints
            .get(&window)
            .cloned()
            .ok_or(WmError::WindowGone(window))
    }

    fn window_exists(&mut self, window: WindowHandle) -> bool {
        self.hints.contains_key(&window)
    }

    fn create_frame(&mut self, rect: Rect) -> Result<WindowHandle> {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.geometries.insert(handle, rect);
        self.hints.insert(handle, WindowHints::default());
        Ok(handle)
    }

    fn destroy_window(&mut self, window: WindowHandle) {
        self.destroyed.push(window);
        self.hints.remove(&window);
        self.mapped.remove(&window);
    }

    fn reparent(&mut self, window: WindowHandle, parent: WindowHandle, x: i32, y: i32) {
        let _ = (x, y);
        self.parents.insert(window, parent);
    }

    fn reparent_to_root(&mut self, window: WindowHandle, _x: i32, _y: i32) {
        self.parents.remove(&window);
    }

    fn map(&mut self, window: WindowHandle) {
        self.mapped.insert(window);
    }

    fn unmap(&mut self, window: WindowHandle) {
        self.mapped.remove(&window);
    }

    fn move_resize(&mut self, window: WindowHandle, rect: Rect) {
        self.geometries.insert(window, rect);
    }

    fn configure_passthrough(&mut self, window: WindowHandle, rect: Rect, mask: ConfigureMask) {
        let entry = self.geometries.entry(window).or_default();
        if mask.contains(ConfigureMask::X) {
            entry.x = rect.x;
        }
        if mask.contains(ConfigureMask::Y) {
            entry.y = rect.y;
        }
        if mask.contains(ConfigureMask::WIDTH) {
            entry.width = rect.width;
        }
        if mask.contains(ConfigureMask::HEIGHT) {
            entry.height = rect.height;
        }
    }

    fn send_configure(&mut self, window: WindowHandle, rect: Rect) {
        self.delivered_configures.push((window, rect));
    }

    fn restack(&mut self, top_to_bottom: &[WindowHandle]) {
        self.restacks.push(top_to_bottom.to_vec());
    }

    fn set_input_focus(&mut self, window: WindowHandle) {
        self.focused = Some(window);
    }

    fn define_cursor(&mut self, cursor: CursorKind) {
        self.root_cursor = Some(cursor);
    }

    fn set_window_cursor(&mut self, window: WindowHandle, cursor: CursorKind) {
        self.window_cursors.insert(window, cursor);
    }

    fn grab_button(&mut self, _window: WindowHandle) {}

    fn replay_pointer(&mut self) {
        self.replayed_pointers += 1;
    }

    fn refresh_mapping(&mut self) {}

    fn send_ping(&mut self, window: WindowHandle) {
        self.pings.push(window);
    }

    fn set_active_window(&mut self, window: Option<WindowHandle>) {
        self.active_window = window;
    }

    fn set_client_list(&mut self, windows: &[WindowHandle]) {
        self.client_list = windows.to_vec();
    }

    fn set_workarea(&mut self, area: Rect) {
        self.workarea = Some(area);
    }

    fn set_startup_list(&mut self, list: Option<&str>) {
        self.startup_list = list.map(str::to_owned);
    }

    fn set_window_state(&mut self, window: WindowHandle, state: WindowState) {
        self.states.insert(window, state);
    }

    fn set_allowed_actions(&mut self, window: WindowHandle, actions: &[AllowedAction]) {
        self.actions.insert(window, actions.to_vec());
    }

    fn stamp_desktop(&mut self, window: WindowHandle) {
        self.desktop_stamps.push(window);
    }

    fn read_theme_request(&mut self) -> Option<String> {
        self.theme_request.take()
    }
}
