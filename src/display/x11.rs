//! x11rb backend: translates the semantic [`DisplayServer`] operations to
//! protocol requests and raw X events to [`ServerEvent`]s.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{bail, Context as _};
use tracing::{debug, info, trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Allow, AtomEnum, ButtonIndex, ChangeWindowAttributesAux, ClientMessageEvent,
    ConfigWindow, ConfigureNotifyEvent, ConfigureWindowAux, ConnectionExt, CreateWindowAux,
    EventMask, GrabMode, InputFocus, MapState, ModMask, PropMode, StackMode, WindowClass,
    CONFIGURE_NOTIFY_EVENT,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperConnectionExt;
use x11rb::{COPY_DEPTH_FROM_PARENT, CURRENT_TIME, NONE};

use crate::core::error::{Result, WmError};

use super::{
    AllowedAction, ConfigureMask, CursorKind, DisplayServer, PropertyKind, Rect, ServerEvent,
    SetMode, StartupEvent, TypeHint, WindowHandle, WindowHints, WindowState, WmCommand,
};

x11rb::atom_manager! {
    pub Atoms:
    AtomsCookie {
        UTF8_STRING,
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        WM_STATE,
        WM_CHANGE_STATE,
        WM_NAME,
        WM_HINTS,
        WM_TRANSIENT_FOR,
        _MOTIF_WM_HINTS,
        _NET_WM_NAME,
        _NET_WM_PING,
        _NET_WM_DESKTOP,
        _NET_ACTIVE_WINDOW,
        _NET_CLIENT_LIST,
        _NET_WORKAREA,
        _NET_SUPPORTED,
        _NET_STARTUP_ID,
        _NET_STARTUP_INFO,
        _NET_STARTUP_INFO_BEGIN,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_DOCK,
        _NET_WM_WINDOW_TYPE_TOOLBAR,
        _NET_WM_WINDOW_TYPE_DESKTOP,
        _NET_WM_WINDOW_TYPE_SPLASH,
        _NET_WM_WINDOW_TYPE_DIALOG,
        _NET_WM_WINDOW_TYPE_NOTIFICATION,
        _NET_WM_STATE,
        _NET_WM_STATE_FULLSCREEN,
        _NET_WM_ALLOWED_ACTIONS,
        _NET_WM_ACTION_CLOSE,
        _NET_WM_ACTION_MOVE,
        _NET_WM_ACTION_FULLSCREEN,
        _PWM_COMMAND,
        _PWM_THEME,
        _PWM_SUB_NAME,
        _PWM_TRANSLUCENCY,
        _PWM_CLIENT_STARTUP_LIST,
        _PWM_MESSAGE_TIMEOUT,
        _PWM_DOCK_TITLEBAR,
        _PWM_DOCK_TITLEBAR_SHOW_ON_DESKTOP,
        _PWM_WINDOW_TYPE_INPUT,
        _PWM_WINDOW_TYPE_MESSAGE,
        _PWM_WINDOW_TYPE_MESSAGE_STATIC_HI,
        _PWM_WINDOW_TYPE_MESSAGE_STATIC_LO,
    }
}

// Motif decoration hints, field layout per the Motif reference.
const MWM_HINTS_DECORATIONS: u32 = 1 << 1;
const MWM_DECOR_ALL: u32 = 1 << 0;
const MWM_DECOR_TITLE: u32 = 1 << 3;

// WM_HINTS flag bits (ICCCM).
const ICCCM_INPUT_HINT: u32 = 1 << 0;
const ICCCM_GROUP_HINT: u32 = 1 << 6;

// Cursor-font glyphs.
const GLYPH_LEFT_PTR: u16 = 68;
const GLYPH_WATCH: u16 = 150;

pub struct X11DisplayServer {
    conn: RustConnection,
    root: WindowHandle,
    atoms: Atoms,
    width: u32,
    height: u32,
    cursor_normal: u32,
    cursor_busy: u32,
    cursor_hidden: u32,
    /// Startup-notification text accumulating per sender window.
    sn_partial: HashMap<WindowHandle, Vec<u8>>,
}

impl X11DisplayServer {
    /// Connect, acquire the WM_Sn selection, and claim the root event
    /// masks that make us the window manager.
    pub fn open(replace: bool) -> anyhow::Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("connecting to X server")?;
        let screen = conn.setup().roots[screen_num].clone();
        let atoms = Atoms::new(&conn)?.reply()?;
        info!(screen = screen_num, root = screen.root, "connected to X server");

        acquire_wm_selection(&conn, screen_num, screen.root, replace)?;

        let root_mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::STRUCTURE_NOTIFY
            | EventMask::PROPERTY_CHANGE
            | EventMask::BUTTON_PRESS
            | EventMask::KEY_PRESS;
        conn.change_window_attributes(
            screen.root,
            &ChangeWindowAttributesAux::new().event_mask(root_mask),
        )?
        .check()
        .context("another window manager is already running")?;

        let (cursor_normal, cursor_busy, cursor_hidden) =
            create_cursors(&conn, screen.root).context("creating cursors")?;

        conn.change_property32(
            PropMode::REPLACE,
            screen.root,
            atoms._NET_SUPPORTED,
            AtomEnum::ATOM,
            &[
                atoms._NET_ACTIVE_WINDOW,
                atoms._NET_CLIENT_LIST,
                atoms._NET_WORKAREA,
                atoms._NET_WM_WINDOW_TYPE,
                atoms._NET_WM_STATE,
                atoms._NET_WM_STATE_FULLSCREEN,
                atoms._NET_WM_ALLOWED_ACTIONS,
                atoms._NET_WM_PING,
            ],
        )?;
        conn.flush()?;

        Ok(X11DisplayServer {
            conn,
            root: screen.root,
            atoms,
            width: screen.width_in_pixels as u32,
            height: screen.height_in_pixels as u32,
            cursor_normal,
            cursor_busy,
            cursor_hidden,
            sn_partial: HashMap::new(),
        })
    }

    fn check(&self, what: &str, res: std::result::Result<x11rb::cookie::VoidCookie<'_, RustConnection>, x11rb::errors::ConnectionError>) {
        if let Err(e) = res {
            warn!(what, error = %e, "request failed");
        }
    }

    fn cursor_id(&self, cursor: CursorKind) -> u32 {
        match cursor {
            CursorKind::Normal => self.cursor_normal,
            CursorKind::Busy => self.cursor_busy,
            CursorKind::Hidden => self.cursor_hidden,
        }
    }

    fn get_property_u32s(&self, window: WindowHandle, atom: u32, kind: AtomEnum) -> Option<Vec<u32>> {
        let reply = self
            .conn
            .get_property(false, window, atom, kind, 0, 64)
            .ok()?
            .reply()
            .ok()?;
        reply.value32().map(|v| v.collect())
    }

    fn get_property_string(&self, window: WindowHandle, atom: u32, kind: u32) -> Option<String> {
        let reply = self
            .conn
            .get_property(false, window, atom, kind, 0, 1024)
            .ok()?
            .reply()
            .ok()?;
        if reply.value.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&reply.value).into_owned())
        }
    }

    fn window_name(&self, window: WindowHandle) -> String {
        self.get_property_string(window, self.atoms._NET_WM_NAME, self.atoms.UTF8_STRING)
            .or_else(|| {
                self.get_property_string(window, self.atoms.WM_NAME, AtomEnum::STRING.into())
            })
            .unwrap_or_default()
    }

    fn type_hint_of(&self, window: WindowHandle) -> Option<TypeHint> {
        let types = self.get_property_u32s(
            window,
            self.atoms._NET_WM_WINDOW_TYPE,
            AtomEnum::ATOM,
        )?;
        let a = &self.atoms;
        types.into_iter().find_map(|t| {
            if t == a._NET_WM_WINDOW_TYPE_DOCK {
                Some(TypeHint::Dock)
            } else if t == a._NET_WM_WINDOW_TYPE_TOOLBAR {
                Some(TypeHint::Toolbar)
            } else if t == a._PWM_WINDOW_TYPE_INPUT {
                Some(TypeHint::Input)
            } else if t == a._NET_WM_WINDOW_TYPE_DESKTOP {
                Some(TypeHint::Desktop)
            } else if t == a._NET_WM_WINDOW_TYPE_SPLASH {
                Some(TypeHint::Splash)
            } else if t == a._NET_WM_WINDOW_TYPE_DIALOG {
                Some(TypeHint::Dialog)
            } else if t == a._NET_WM_WINDOW_TYPE_NOTIFICATION
                || t == a._PWM_WINDOW_TYPE_MESSAGE
            {
                Some(TypeHint::Message)
            } else if t == a._PWM_WINDOW_TYPE_MESSAGE_STATIC_HI {
                Some(TypeHint::MessageStaticHi)
            } else if t == a._PWM_WINDOW_TYPE_MESSAGE_STATIC_LO {
                Some(TypeHint::MessageStaticLo)
            } else {
                None
            }
        })
    }

    fn translate(&mut self, event: Event) -> Option<ServerEvent> {
        match event {
            Event::MapRequest(e) => Some(ServerEvent::MapRequest { window: e.window }),
            Event::MapNotify(e) => Some(ServerEvent::MapNotify { window: e.window }),
            Event::UnmapNotify(e) => Some(ServerEvent::UnmapNotify { window: e.window }),
            Event::DestroyNotify(e) => Some(ServerEvent::DestroyNotify { window: e.window }),
            Event::ConfigureRequest(e) => {
                let requested = u16::from(e.value_mask);
                let mut mask = ConfigureMask::empty();
                if requested & u16::from(ConfigWindow::X) != 0 {
                    mask |= ConfigureMask::X;
                }
                if requested & u16::from(ConfigWindow::Y) != 0 {
                    mask |= ConfigureMask::Y;
                }
                if requested & u16::from(ConfigWindow::WIDTH) != 0 {
                    mask |= ConfigureMask::WIDTH;
                }
                if requested & u16::from(ConfigWindow::HEIGHT) != 0 {
                    mask |= ConfigureMask::HEIGHT;
                }
                Some(ServerEvent::ConfigureRequest {
                    window: e.window,
                    rect: Rect::new(
                        e.x as i32,
                        e.y as i32,
                        e.width.max(1) as u32,
                        e.height.max(1) as u32,
                    ),
                    mask,
                })
            }
            Event::ConfigureNotify(e) if e.window == self.root => {
                self.width = e.width as u32;
                self.height = e.height as u32;
                Some(ServerEvent::RootGeometryChanged {
                    width: e.width as u32,
                    height: e.height as u32,
                })
            }
            Event::PropertyNotify(e) => {
                let a = &self.atoms;
                let kind = if e.atom == a._NET_WM_NAME || e.atom == a.WM_NAME {
                    PropertyKind::Name
                } else if e.atom == a._PWM_SUB_NAME {
                    PropertyKind::SubName
                } else if e.atom == a.WM_STATE {
                    PropertyKind::State
                } else if e.atom == a._PWM_TRANSLUCENCY {
                    PropertyKind::Translucency
                } else {
                    PropertyKind::Other
                };
                Some(ServerEvent::PropertyChanged {
                    window: e.window,
                    kind,
                })
            }
            Event::ClientMessage(e) => self.translate_client_message(e),
            Event::ButtonPress(e) => Some(ServerEvent::ButtonPress {
                window: e.event,
                x: e.root_x as i32,
                y: e.root_y as i32,
                time_ms: e.time,
            }),
            Event::KeyPress(e) => Some(ServerEvent::KeyPress {
                keycode: e.detail,
                modifiers: u16::from(e.state),
            }),
            Event::MappingNotify(_) => Some(ServerEvent::MappingChanged),
            other => {
                trace!(?other, "ignored event");
                None
            }
        }
    }

    fn translate_client_message(&mut self, e: ClientMessageEvent) -> Option<ServerEvent> {
        let a = &self.atoms;
        if e.type_ == a._PWM_COMMAND {
            let command = match e.data.as_data32()[0] {
                1 => WmCommand::Exit,
                2 => WmCommand::Next,
                3 => WmCommand::Prev,
                4 => WmCommand::ShowDesktop,
                5 => WmCommand::SetTheme,
                6 => WmCommand::Misc,
                other => {
                    debug!(other, "unknown control command");
                    return None;
                }
            };
            return Some(ServerEvent::Command {
                window: e.window,
                command,
            });
        }
        if e.type_ == a.WM_CHANGE_STATE && e.data.as_data32()[0] == 3 {
            return Some(ServerEvent::IconifyRequest { window: e.window });
        }
        if e.type_ == a._NET_WM_STATE {
            let data = e.data.as_data32();
            if data[1] == a._NET_WM_STATE_FULLSCREEN || data[2] == a._NET_WM_STATE_FULLSCREEN {
                let mode = match data[0] {
                    0 => SetMode::Remove,
                    1 => SetMode::Add,
                    _ => SetMode::Toggle,
                };
                return Some(ServerEvent::FullscreenRequest {
                    window: e.window,
                    mode,
                });
            }
            return None;
        }
        if e.type_ == a._NET_STARTUP_INFO_BEGIN || e.type_ == a._NET_STARTUP_INFO {
            return self.accumulate_sn(e);
        }
        None
    }

    /// Startup-notification text arrives in 20-byte chunks; a NUL ends
    /// the message.
    fn accumulate_sn(&mut self, e: ClientMessageEvent) -> Option<ServerEvent> {
        let chunk = e.data.as_data8();
        let buf = if e.type_ == self.atoms._NET_STARTUP_INFO_BEGIN {
            self.sn_partial.insert(e.window, Vec::new());
            self.sn_partial.get_mut(&e.window)?
        } else {
            self.sn_partial.get_mut(&e.window)?
        };
        match chunk.iter().position(|b| *b == 0) {
            Some(end) => {
                buf.extend_from_slice(&chunk[..end]);
                let text = String::from_utf8_lossy(buf).into_owned();
                self.sn_partial.remove(&e.window);
                parse_sn_message(&text).map(ServerEvent::Startup)
            }
            None => {
                buf.extend_from_slice(&chunk);
                None
            }
        }
    }
}

/// Claim WM_Sn, the conventional manager-selection handshake.
fn acquire_wm_selection(
    conn: &RustConnection,
    screen_num: usize,
    root: WindowHandle,
    replace: bool,
) -> anyhow::Result<()> {
    let name = format!("WM_S{screen_num}");
    let selection = conn.intern_atom(false, name.as_bytes())?.reply()?.atom;
    let current = conn.get_selection_owner(selection)?.reply()?.owner;
    if current != NONE && !replace {
        bail!("another window manager owns {name} (use --replace)");
    }

    let owner = conn.generate_id()?;
    conn.create_window(
        COPY_DEPTH_FROM_PARENT,
        owner,
        root,
        -1,
        -1,
        1,
        1,
        0,
        WindowClass::INPUT_ONLY,
        0,
        &CreateWindowAux::new(),
    )?;
    conn.set_selection_owner(owner, selection, CURRENT_TIME)?;
    let now_owner = conn.get_selection_owner(selection)?.reply()?.owner;
    if now_owner != owner {
        bail!("failed to acquire {name}");
    }
    if current != NONE {
        info!(previous = current, "replacing running window manager");
    }
    Ok(())
}

fn create_cursors(conn: &RustConnection, root: WindowHandle) -> anyhow::Result<(u32, u32, u32)> {
    let font = conn.generate_id()?;
    conn.open_font(font, b"cursor")?;
    let normal = conn.generate_id()?;
    conn.create_glyph_cursor(
        normal,
        font,
        font,
        GLYPH_LEFT_PTR,
        GLYPH_LEFT_PTR + 1,
        0,
        0,
        0,
        0xffff,
        0xffff,
        0xffff,
    )?;
    let busy = conn.generate_id()?;
    conn.create_glyph_cursor(
        busy,
        font,
        font,
        GLYPH_WATCH,
        GLYPH_WATCH + 1,
        0,
        0,
        0,
        0xffff,
        0xffff,
        0xffff,
    )?;

    // A 1x1 transparent pixmap makes an invisible cursor.
    let pixmap = conn.generate_id()?;
    conn.create_pixmap(1, pixmap, root, 1, 1)?;
    let hidden = conn.generate_id()?;
    conn.create_cursor(hidden, pixmap, pixmap, 0, 0, 0, 0, 0, 0, 0, 0)?;
    conn.free_pixmap(pixmap)?;
    conn.close_font(font)?;
    Ok((normal, busy, hidden))
}

/// Minimal parse of the startup-notification wire text:
/// `new: ID="…" BIN="…"`, `change: …`, `remove: ID="…"`.
fn parse_sn_message(text: &str) -> Option<StartupEvent> {
    let (verb, rest) = text.split_once(':')?;
    let sequence = sn_value(rest, "ID")?;
    match verb.trim() {
        "new" => {
            let binary = sn_value(rest, "BIN")?;
            Some(StartupEvent::Initiated { sequence, binary })
        }
        "remove" => Some(StartupEvent::Completed { sequence }),
        _ => None,
    }
}

fn sn_value(rest: &str, key: &str) -> Option<String> {
    let prefix = format!("{key}=");
    let start = rest.find(&prefix)? + prefix.len();
    let tail = &rest[start..];
    if let Some(stripped) = tail.strip_prefix('"') {
        stripped.split('"').next().map(str::to_owned)
    } else {
        tail.split_whitespace().next().map(str::to_owned)
    }
}

impl DisplayServer for X11DisplayServer {
    fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn grab(&mut self) {
        let res = self.conn.grab_server();
        self.check("grab_server", res);
    }

    fn ungrab(&mut self) {
        let res = self.conn.ungrab_server();
        self.check("ungrab_server", res);
    }

    fn sync(&mut self) {
        // Any round-trip is a sync point.
        if let Ok(cookie) = self.conn.get_input_focus() {
            let _ = cookie.reply();
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.conn.flush() {
            warn!(error = %e, "flush failed");
        }
    }

    fn next_event(&mut self, timeout: Option<Duration>) -> Result<Option<ServerEvent>> {
        self.conn.flush().map_err(WmError::from)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let raw = match deadline {
                None => Some(self.conn.wait_for_event().map_err(WmError::from)?),
                Some(_) => self.conn.poll_for_event().map_err(WmError::from)?,
            };
            match raw {
                Some(event) => {
                    if let Some(translated) = self.translate(event) {
                        return Ok(Some(translated));
                    }
                }
                None => {
                    let Some(deadline) = deadline else { continue };
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    fn list_windows(&mut self) -> Result<Vec<WindowHandle>> {
        let tree = self.conn.query_tree(self.root)?.reply()?;
        Ok(tree.children)
    }

    fn query_hints(&mut self, window: WindowHandle) -> Result<WindowHints> {
        // Batched: both cookies go out before either reply is read.
        let attrs_cookie = self.conn.get_window_attributes(window)?;
        let geom_cookie = self.conn.get_geometry(window)?;
        let attrs = attrs_cookie.reply().map_err(|_| WmError::WindowGone(window))?;
        let geom = geom_cookie.reply().map_err(|_| WmError::WindowGone(window))?;

        let mut hints = WindowHints {
            name: self.window_name(window),
            type_hint: self.type_hint_of(window),
            geometry: Rect::new(
                geom.x as i32,
                geom.y as i32,
                geom.width.max(1) as u32,
                geom.height.max(1) as u32,
            ),
            override_redirect: attrs.override_redirect,
            viewable: attrs.map_state == MapState::VIEWABLE,
            ..WindowHints::default()
        };

        hints.supports_ping = self
            .get_property_u32s(window, self.atoms.WM_PROTOCOLS, AtomEnum::ATOM)
            .is_some_and(|protocols| protocols.contains(&self.atoms._NET_WM_PING));

        hints.transient_for = self
            .get_property_u32s(window, self.atoms.WM_TRANSIENT_FOR, AtomEnum::WINDOW)
            .and_then(|v| v.first().copied())
            .filter(|w| *w != 0);

        if let Some(wm_hints) =
            self.get_property_u32s(window, self.atoms.WM_HINTS, AtomEnum::WM_HINTS)
        {
            if wm_hints.len() >= 9 {
                let flags = wm_hints[0];
                if flags & ICCCM_INPUT_HINT != 0 {
                    hints.wants_focus = wm_hints[1] != 0;
                }
                if flags & ICCCM_GROUP_HINT != 0 && wm_hints[8] != 0 {
                    hints.group_leader = Some(wm_hints[8]);
                }
            }
        }

        if let Some(motif) =
            self.get_property_u32s(window, self.atoms._MOTIF_WM_HINTS, AtomEnum::ANY)
        {
            if motif.len() >= 3 && motif[0] & MWM_HINTS_DECORATIONS != 0 {
                let decor = motif[2];
                if decor == 0 {
                    hints.undecorated = true;
                } else if decor & (MWM_DECOR_ALL | MWM_DECOR_TITLE) == 0 {
                    hints.border_only = true;
                }
            }
        }

        hints.startup_id =
            self.get_property_string(window, self.atoms._NET_STARTUP_ID, self.atoms.UTF8_STRING);
        hints.message_timeout = self
            .get_property_u32s(window, self.atoms._PWM_MESSAGE_TIMEOUT, AtomEnum::CARDINAL)
            .and_then(|v| v.first().copied())
            .map(|t| t as i32);
        hints.dock_titlebar = self
            .get_property_u32s(window, self.atoms._PWM_DOCK_TITLEBAR, AtomEnum::CARDINAL)
            .is_some_and(|v| !v.is_empty());
        hints.show_on_desktop = self
            .get_property_u32s(
                window,
                self.atoms._PWM_DOCK_TITLEBAR_SHOW_ON_DESKTOP,
                AtomEnum::CARDINAL,
            )
            .is_some_and(|v| v.first().copied() == Some(1));

        Ok(hints)
    }

    fn window_exists(&mut self, window: WindowHandle) -> bool {
        self.conn
            .get_window_attributes(window)
            .ok()
            .and_then(|c| c.reply().ok())
            .is_some()
    }

    fn create_frame(&mut self, rect: Rect) -> Result<WindowHandle> {
        let frame = self.conn.generate_id().map_err(WmError::from)?;
        self.conn
            .create_window(
                COPY_DEPTH_FROM_PARENT,
                frame,
                self.root,
                rect.x as i16,
                rect.y as i16,
                rect.width.max(1) as u16,
                rect.height.max(1) as u16,
                0,
                WindowClass::INPUT_OUTPUT,
                0,
                &CreateWindowAux::new().event_mask(
                    EventMask::BUTTON_PRESS
                        | EventMask::EXPOSURE
                        | EventMask::SUBSTRUCTURE_NOTIFY,
                ),
            )
            .map_err(WmError::from)?
            .check()?;
        Ok(frame)
    }

    fn destroy_window(&mut self, window: WindowHandle) {
        let res = self.conn.destroy_window(window);
        self.check("destroy_window", res);
    }

    fn reparent(&mut self, window: WindowHandle, parent: WindowHandle, x: i32, y: i32) {
        let res = self
            .conn
            .reparent_window(window, parent, x as i16, y as i16);
        self.check("reparent_window", res);
    }

    fn reparent_to_root(&mut self, window: WindowHandle, x: i32, y: i32) {
        let root = self.root;
        let res = self.conn.reparent_window(window, root, x as i16, y as i16);
        self.check("reparent_to_root", res);
    }

    fn map(&mut self, window: WindowHandle) {
        let res = self.conn.map_window(window);
        self.check("map_window", res);
    }

    fn unmap(&mut self, window: WindowHandle) {
        let res = self.conn.unmap_window(window);
        self.check("unmap_window", res);
    }

    fn move_resize(&mut self, window: WindowHandle, rect: Rect) {
        let res = self.conn.configure_window(
            window,
            &ConfigureWindowAux::new()
                .x(rect.x)
                .y(rect.y)
                .width(rect.width.max(1))
                .height(rect.height.max(1)),
        );
        self.check("configure_window", res);
    }

    fn configure_passthrough(&mut self, window: WindowHandle, rect: Rect, mask: ConfigureMask) {
        let mut aux = ConfigureWindowAux::new();
        if mask.contains(ConfigureMask::X) {
            aux = aux.x(rect.x);
        }
        if mask.contains(ConfigureMask::Y) {
            aux = aux.y(rect.y);
        }
        if mask.contains(ConfigureMask::WIDTH) {
            aux = aux.width(rect.width.max(1));
        }
        if mask.contains(ConfigureMask::HEIGHT) {
            aux = aux.height(rect.height.max(1));
        }
        let res = self.conn.configure_window(window, &aux);
        self.check("configure_passthrough", res);
    }

    fn send_configure(&mut self, window: WindowHandle, rect: Rect) {
        let event = ConfigureNotifyEvent {
            response_type: CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: window,
            window,
            above_sibling: NONE,
            x: rect.x as i16,
            y: rect.y as i16,
            width: rect.width as u16,
            height: rect.height as u16,
            border_width: 0,
            override_redirect: false,
        };
        let res = self
            .conn
            .send_event(false, window, EventMask::STRUCTURE_NOTIFY, event);
        self.check("send_configure", res);
    }

    fn restack(&mut self, top_to_bottom: &[WindowHandle]) {
        let mut above: Option<WindowHandle> = None;
        for window in top_to_bottom {
            let aux = match above {
                None => ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
                Some(sibling) => ConfigureWindowAux::new()
                    .sibling(sibling)
                    .stack_mode(StackMode::BELOW),
            };
            let res = self.conn.configure_window(*window, &aux);
            self.check("restack", res);
            above = Some(*window);
        }
    }

    fn set_input_focus(&mut self, window: WindowHandle) {
        let res = self
            .conn
            .set_input_focus(InputFocus::POINTER_ROOT, window, CURRENT_TIME);
        self.check("set_input_focus", res);
    }

    fn define_cursor(&mut self, cursor: CursorKind) {
        let id = self.cursor_id(cursor);
        let root = self.root;
        let res = self
            .conn
            .change_window_attributes(root, &ChangeWindowAttributesAux::new().cursor(id));
        self.check("define_cursor", res);
    }

    fn set_window_cursor(&mut self, window: WindowHandle, cursor: CursorKind) {
        let id = self.cursor_id(cursor);
        let res = self
            .conn
            .change_window_attributes(window, &ChangeWindowAttributesAux::new().cursor(id));
        self.check("set_window_cursor", res);
    }

    fn grab_button(&mut self, window: WindowHandle) {
        // Sync pointer grab so a press can be replayed into the client.
        let res = self.conn.grab_button(
            false,
            window,
            EventMask::BUTTON_PRESS,
            GrabMode::SYNC,
            GrabMode::ASYNC,
            NONE,
            NONE,
            ButtonIndex::M1,
            ModMask::ANY,
        );
        self.check("grab_button", res);
    }

    fn replay_pointer(&mut self) {
        let res = self.conn.allow_events(Allow::REPLAY_POINTER, CURRENT_TIME);
        self.check("allow_events", res);
    }

    fn refresh_mapping(&mut self) {
        if let Ok(cookie) = self.conn.get_keyboard_mapping(8, 248) {
            let _ = cookie.reply();
        }
    }

    fn send_ping(&mut self, window: WindowHandle) {
        let data = [self.atoms._NET_WM_PING, CURRENT_TIME, window, 0, 0];
        let event = ClientMessageEvent::new(32, window, self.atoms.WM_PROTOCOLS, data);
        let res = self
            .conn
            .send_event(false, window, EventMask::NO_EVENT, event);
        self.check("send_ping", res);
    }

    fn set_active_window(&mut self, window: Option<WindowHandle>) {
        let root = self.root;
        let res = self.conn.change_property32(
            PropMode::REPLACE,
            root,
            self.atoms._NET_ACTIVE_WINDOW,
            AtomEnum::WINDOW,
            &[window.unwrap_or(NONE)],
        );
        self.check("set_active_window", res);
    }

    fn set_client_list(&mut self, windows: &[WindowHandle]) {
        let root = self.root;
        let res = self.conn.change_property32(
            PropMode::REPLACE,
            root,
            self.atoms._NET_CLIENT_LIST,
            AtomEnum::WINDOW,
            windows,
        );
        self.check("set_client_list", res);
    }

    fn set_workarea(&mut self, area: Rect) {
        let root = self.root;
        let res = self.conn.change_property32(
            PropMode::REPLACE,
            root,
            self.atoms._NET_WORKAREA,
            AtomEnum::CARDINAL,
            &[area.x as u32, area.y as u32, area.width, area.height],
        );
        self.check("set_workarea", res);
    }

    fn set_startup_list(&mut self, list: Option<&str>) {
        let root = self.root;
        match list {
            Some(text) => {
                let res = self.conn.change_property8(
                    PropMode::REPLACE,
                    root,
                    self.atoms._PWM_CLIENT_STARTUP_LIST,
                    self.atoms.UTF8_STRING,
                    text.as_bytes(),
                );
                self.check("set_startup_list", res);
            }
            None => {
                let res = self
                    .conn
                    .delete_property(root, self.atoms._PWM_CLIENT_STARTUP_LIST);
                self.check("clear_startup_list", res);
            }
        }
    }

    fn set_window_state(&mut self, window: WindowHandle, state: WindowState) {
        let value = match state {
            WindowState::Normal => 1,
            WindowState::Iconic => 3,
            WindowState::Withdrawn => 0,
        };
        let res = self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms.WM_STATE,
            self.atoms.WM_STATE,
            &[value, NONE],
        );
        self.check("set_window_state", res);
    }

    fn set_allowed_actions(&mut self, window: WindowHandle, actions: &[AllowedAction]) {
        let atoms: Vec<u32> = actions
            .iter()
            .map(|a| match a {
                AllowedAction::Close => self.atoms._NET_WM_ACTION_CLOSE,
                AllowedAction::Move => self.atoms._NET_WM_ACTION_MOVE,
                AllowedAction::Fullscreen => self.atoms._NET_WM_ACTION_FULLSCREEN,
            })
            .collect();
        let res = self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms._NET_WM_ALLOWED_ACTIONS,
            AtomEnum::ATOM,
            &atoms,
        );
        self.check("set_allowed_actions", res);
    }

    fn stamp_desktop(&mut self, window: WindowHandle) {
        let res = self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms._NET_WM_DESKTOP,
            AtomEnum::CARDINAL,
            &[0],
        );
        self.check("stamp_desktop", res);
    }

    fn read_theme_request(&mut self) -> Option<String> {
        let name = self.get_property_string(self.root, self.atoms._PWM_THEME, self.atoms.UTF8_STRING);
        if name.is_some() {
            let res = self.conn.delete_property(self.root, self.atoms._PWM_THEME);
            self.check("clear_theme_request", res);
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sn_new_message_parses_id_and_bin() {
        let ev = parse_sn_message(r#"new: ID="seq-1" BIN="browser" NAME="Browser""#);
        assert_eq!(
            ev,
            Some(StartupEvent::Initiated {
                sequence: "seq-1".into(),
                binary: "browser".into(),
            })
        );
    }

    #[test]
    fn sn_remove_message_parses_id() {
        let ev = parse_sn_message(r#"remove: ID="seq-1""#);
        assert_eq!(
            ev,
            Some(StartupEvent::Completed {
                sequence: "seq-1".into()
            })
        );
    }

    #[test]
    fn sn_unquoted_values_parse_too() {
        let ev = parse_sn_message("new: ID=seq-2 BIN=editor");
        assert_eq!(
            ev,
            Some(StartupEvent::Initiated {
                sequence: "seq-2".into(),
                binary: "editor".into(),
            })
        );
    }

    #[test]
    fn sn_garbage_is_rejected() {
        assert_eq!(parse_sn_message("change: ID=x"), None);
        assert_eq!(parse_sn_message("not a message"), None);
        assert_eq!(parse_sn_message("new: BIN=only"), None);
    }
}
