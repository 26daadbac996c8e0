//! Activation choreography and the single-threaded dispatch loop.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::context::{FrameKind, Wm};
use crate::core::error::{Result, WmError};
use crate::display::{
    with_server_grab, ConfigureMask, CursorKind, DisplayServer, Rect, ServerEvent, SetMode,
    StartupEvent, WindowHandle, WmCommand,
};
use crate::ewmh;
use crate::window::classify;
use crate::window::layout;
use crate::window::msgwin;
use crate::window::ops::{self, ButtonAction};
use crate::window::placement;
use crate::window::registry::{ClientId, MatchMode};
use crate::window::startup;
use crate::window::{ClientFlags, ClientType, TypeSet, WmFlags};

/// Interval of the housekeeping tick while any timed subsystem is live.
const TICK: Duration = Duration::from_secs(1);
/// Hung-app probing runs on every other tick.
const HUNG_CHECK_TICKS: u64 = 2;

/// Make `target` the visible, usable client. Safe to call with a stale or
/// absent handle; calling it twice in a row settles into the same order.
pub fn activate(wm: &mut Wm, srv: &mut dyn DisplayServer, target: Option<ClientId>) {
    let Some(id) = target else { return };
    let Some(kind) = wm.registry.kind_of(id) else { return };

    with_server_grab(srv, |srv| {
        ops::ops_for(kind).show(wm, srv, id);
        match kind {
            ClientType::App | ClientType::Desktop => {
                let fullscreen = wm
                    .registry
                    .get(id)
                    .is_some_and(|c| c.flags.contains(ClientFlags::FULLSCREEN));
                wm.registry.move_to_top(id);
                // Fullscreen apps cover the panels instead of yielding.
                if !fullscreen {
                    wm.registry.move_type_above(TypeSet::PANEL, id);
                }
                wm.registry.move_type_above(TypeSet::TOOLBAR, id);
                raise_transients_of(wm, Some(id));
                // Dialogs with no owner sit above whichever main client
                // holds the screen.
                raise_transients_of(wm, None);

                if kind == ClientType::Desktop {
                    wm.flags.insert(WmFlags::DESKTOP_RAISED);
                    if let Some(strip) = wm.live(wm.titlebar_panel) {
                        let keep_visible = wm
                            .registry
                            .get(strip)
                            .is_some_and(|c| c.flags.contains(ClientFlags::SHOW_ON_DESKTOP));
                        if !keep_visible {
                            wm.registry.move_below(strip, id);
                        }
                    }
                } else {
                    wm.flags.remove(WmFlags::DESKTOP_RAISED);
                    wm.stack_top_app = Some(id);
                }
            }
            ClientType::Dialog => {
                wm.registry.move_to_top(id);
                raise_transients_of(wm, Some(id));
                // Only when the desktop is down does the dialog's base
                // window reclaim the strip docks beneath itself.
                if !wm.flags.contains(WmFlags::DESKTOP_RAISED) {
                    let anchor = wm
                        .registry
                        .get(id)
                        .and_then(|c| wm.live(c.transient_for))
                        .or_else(|| wm.visible_main_client())
                        .unwrap_or(id);
                    wm.registry
                        .move_type_below(TypeSet::TOOLBAR | TypeSet::PANEL, anchor);
                }
            }
            ClientType::Panel => {
                let keep_hidden = Some(id) == wm.live(wm.titlebar_panel)
                    && wm.flags.contains(WmFlags::DESKTOP_RAISED)
                    && !wm
                        .registry
                        .get(id)
                        .is_some_and(|c| c.flags.contains(ClientFlags::SHOW_ON_DESKTOP));
                if keep_hidden {
                    if let Some(desktop) = wm.live(wm.desktop) {
                        wm.registry.move_below(id, desktop);
                    }
                } else {
                    wm.registry.move_to_top(id);
                }
            }
            ClientType::Toolbar | ClientType::Override | ClientType::TaskMenu => {
                wm.registry.move_to_top(id);
            }
        }

        let focus_target = wm.registry.get(id).and_then(|c| {
            (c.flags.contains(ClientFlags::WANTS_FOCUS)
                && matches!(
                    kind,
                    ClientType::App | ClientType::Dialog | ClientType::Desktop
                ))
            .then_some(c.window)
        });
        if let Some(window) = focus_target {
            wm.focused_client = Some(id);
            srv.set_input_focus(window);
        }

        ewmh::update_lists(wm, srv);
        ewmh::set_active(wm, srv);
        wm.registry.sync_to_display(srv);
    });
}

/// Raise every dialog belonging to `owner` (directly or through another
/// dialog), preserving their relative order. `None` raises the root-owned
/// dialogs.
fn raise_transients_of(wm: &mut Wm, owner: Option<ClientId>) {
    for id in wm.registry.stacking_snapshot() {
        let is_child = wm
            .registry
            .get(id)
            .is_some_and(|c| c.kind == ClientType::Dialog && c.transient_for == owner);
        if is_child {
            wm.registry.move_to_top(id);
            raise_transients_of(wm, Some(id));
        }
    }
}

/// Flip between the desktop and the top application.
pub fn toggle_desktop(wm: &mut Wm, srv: &mut dyn DisplayServer) {
    if wm.flags.contains(WmFlags::DESKTOP_RAISED) {
        let next = wm
            .live(wm.stack_top_app)
            .or_else(|| wm.registry.topmost_of(ClientType::App));
        // Nothing to drop back to: the desktop keeps the screen.
        if next.is_some() {
            activate(wm, srv, next);
        }
    } else {
        let desktop = wm.live(wm.desktop);
        activate(wm, srv, desktop);
    }
}

/// Bring an externally rendered task-menu window under management, above
/// everything else, until a press dismisses it.
pub fn open_task_menu(
    wm: &mut Wm,
    srv: &mut dyn DisplayServer,
    window: WindowHandle,
    rect: Rect,
) -> ClientId {
    let client = crate::window::client::Client::new(window, ClientType::TaskMenu, rect);
    let id = wm.registry.insert(client, None);
    wm.flags.insert(WmFlags::MENU_OPEN);
    activate(wm, srv, Some(id));
    id
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopAction {
    Continue,
    Quit,
}

/// Owns the context and the display connection and runs the loop.
pub struct WindowManager<S: DisplayServer> {
    pub wm: Wm,
    pub srv: S,
    last_button: Option<(WindowHandle, u32)>,
}

impl<S: DisplayServer> WindowManager<S> {
    pub fn new(srv: S, config: crate::core::config::WmConfig) -> Self {
        let (width, height) = srv.screen_size();
        WindowManager {
            wm: Wm::new(config, width, height),
            srv,
            last_button: None,
        }
    }

    /// Publish initial state and adopt whatever was already on screen.
    pub fn startup(&mut self) -> Result<()> {
        if self.wm.config.no_cursor {
            self.srv.define_cursor(CursorKind::Hidden);
        } else {
            self.srv.define_cursor(CursorKind::Normal);
        }
        ewmh::init(&mut self.wm, &mut self.srv);
        classify::adopt_existing(&mut self.wm, &mut self.srv)?;
        let main = self.wm.visible_main_client();
        activate(&mut self.wm, &mut self.srv, main);
        info!(clients = self.wm.registry.len(), "takeover complete");
        Ok(())
    }

    /// The event loop: block while nothing is timed, tick once a second
    /// while the startup tracker, the message queue, or hung-app probing
    /// needs the clock.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let timeout = self.wm.needs_tick().then_some(TICK);
            match self.srv.next_event(timeout) {
                Ok(Some(event)) => {
                    if self.handle_event(event)? == LoopAction::Quit {
                        info!("exit requested");
                        return Ok(());
                    }
                }
                Ok(None) => self.on_tick(),
                Err(WmError::ConnectionLost(e)) => {
                    warn!(error = %e, "display connection lost, shutting down");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn on_tick(&mut self) {
        self.wm.ticks += 1;
        let timed_out = self
            .wm
            .startup
            .as_mut()
            .is_some_and(|t| t.check_timeout(Instant::now()));
        if timed_out {
            startup::publish_state(&mut self.wm, &mut self.srv);
        }
        msgwin::queue_process(&mut self.wm, &mut self.srv);
        if self.wm.ticks % HUNG_CHECK_TICKS == 0 {
            ewmh::hung_app_check(&mut self.wm, &mut self.srv);
        }
    }

    /// Feed one event through dispatch. Public so tests can drive the
    /// manager without a live connection.
    pub fn dispatch(&mut self, event: ServerEvent) -> Result<()> {
        self.handle_event(event).map(|_| ())
    }

    fn handle_event(&mut self, event: ServerEvent) -> Result<LoopAction> {
        let wm = &mut self.wm;
        let srv = &mut self.srv;
        match event {
            ServerEvent::MapRequest { window } => {
                match wm.registry.find(window, MatchMode::Window) {
                    Some(id) => activate(wm, srv, Some(id)),
                    None => {
                        classify::make_new_client(wm, srv, window)?;
                    }
                }
            }
            ServerEvent::MapNotify { window } => {
                // Unmanaged override-redirect windows still get tracked so
                // the compositor sees them.
                if wm.registry.find(window, MatchMode::Window).is_none() {
                    if let Ok(hints) = srv.query_hints(window) {
                        if hints.override_redirect {
                            let client = crate::window::client::Client::new(
                                window,
                                ClientType::Override,
                                hints.geometry,
                            );
                            let id = wm.registry.insert(client, None);
                            if let Some(c) = wm.registry.get(id) {
                                wm.comp.on_client_created(c.frame, c.rect());
                            }
                        }
                    }
                }
            }
            ServerEvent::UnmapNotify { window } => {
                if let Some(id) = wm.registry.find(window, MatchMode::Window) {
                    let suppressed = wm.registry.get_mut(id).is_some_and(|c| {
                        if c.ignore_unmap > 0 {
                            c.ignore_unmap -= 1;
                            true
                        } else {
                            false
                        }
                    });
                    if !suppressed {
                        if let Some(kind) = wm.registry.kind_of(id) {
                            ops::ops_for(kind).destroy(wm, srv, id);
                        }
                    }
                }
            }
            ServerEvent::DestroyNotify { window } => {
                match wm.registry.find(window, MatchMode::Window) {
                    Some(id) => {
                        if let Some(kind) = wm.registry.kind_of(id) {
                            ops::ops_for(kind).destroy(wm, srv, id);
                        }
                    }
                    None => {
                        // A message still waiting in the queue may die
                        // before it is ever realized.
                        let was_queued_head = wm
                            .msg_queue
                            .as_ref()
                            .is_some_and(|q| q.is_head(window));
                        if was_queued_head {
                            msgwin::queue_pop(wm, srv);
                        } else if let Some(q) = wm.msg_queue.as_mut() {
                            q.remove(window);
                        }
                    }
                }
            }
            ServerEvent::ConfigureRequest { window, rect, mask } => {
                self.handle_configure_request(window, rect, mask)?;
            }
            ServerEvent::RootGeometryChanged { width, height } => {
                layout::handle_root_resize(wm, srv, width, height);
            }
            ServerEvent::PropertyChanged { window, kind } => {
                if let Some(id) = wm.registry.find(window, MatchMode::Window) {
                    use crate::display::PropertyKind;
                    match kind {
                        PropertyKind::Name | PropertyKind::SubName => {
                            if let Ok(hints) = srv.query_hints(window) {
                                if let Some(c) = wm.registry.get_mut(id) {
                                    c.name = hints.name;
                                }
                            }
                            if let Some(k) = wm.registry.kind_of(id) {
                                ops::ops_for(k).redraw(wm, srv, id, false);
                            }
                        }
                        PropertyKind::Translucency => {
                            if let Some(c) = wm.registry.get(id) {
                                wm.comp.repaint(c.frame);
                            }
                        }
                        PropertyKind::State | PropertyKind::Other => {}
                    }
                }
            }
            ServerEvent::Command { window, command } => {
                let _ = window;
                return self.handle_command(command);
            }
            ServerEvent::IconifyRequest { window } => {
                if let Some(id) = wm.registry.find(window, MatchMode::Window) {
                    if let Some(kind) = wm.registry.kind_of(id) {
                        ops::ops_for(kind).iconize(wm, srv, id);
                    }
                }
            }
            ServerEvent::FullscreenRequest { window, mode } => {
                self.handle_fullscreen(window, mode);
            }
            ServerEvent::ButtonPress {
                window,
                x,
                y,
                time_ms,
            } => {
                self.handle_button(window, x, y, time_ms);
            }
            ServerEvent::KeyPress { keycode, modifiers } => {
                debug!(keycode, modifiers, "key press (no binding)");
            }
            ServerEvent::MappingChanged => srv.refresh_mapping(),
            ServerEvent::Startup(ev) => self.handle_startup(ev),
        }
        Ok(LoopAction::Continue)
    }

    fn handle_configure_request(
        &mut self,
        window: WindowHandle,
        rect: Rect,
        mask: ConfigureMask,
    ) -> Result<()> {
        let wm = &mut self.wm;
        let srv = &mut self.srv;
        let Some(id) = wm.registry.find(window, MatchMode::Window) else {
            srv.configure_passthrough(window, rect, mask);
            return Ok(());
        };
        let Some(kind) = wm.registry.kind_of(id) else {
            return Ok(());
        };
        match kind {
            // A dock that wants a new shape is simplest rebuilt: tear it
            // down (its space flows back) and classify it again with the
            // requested geometry.
            ClientType::Panel => {
                ops::ops_for(ClientType::Panel).destroy(wm, srv, id);
                srv.configure_passthrough(window, rect, mask);
                classify::make_new_client(wm, srv, window)?;
            }
            ClientType::Toolbar => {
                let old_height = wm.registry.get(id).map(|c| c.height).unwrap_or(0);
                if mask.contains(ConfigureMask::HEIGHT) && rect.height != old_height {
                    let delta = old_height as i32 - rect.height as i32;
                    if let Some(c) = wm.registry.get_mut(id) {
                        c.height = rect.height;
                        c.y += delta;
                    }
                    ops::ops_for(kind).move_resize(wm, srv, id);
                    ops::ops_for(kind).deliver_configure(wm, srv, id);
                    layout::update_layout(wm, srv, id, delta);
                } else {
                    ops::ops_for(kind).deliver_configure(wm, srv, id);
                }
            }
            ClientType::Dialog => {
                let Some(c) = wm.registry.get(id) else { return Ok(()) };
                let mut wanted = c.rect();
                if mask.contains(ConfigureMask::X) {
                    wanted.x = rect.x;
                }
                if mask.contains(ConfigureMask::Y) {
                    wanted.y = rect.y;
                }
                if mask.contains(ConfigureMask::WIDTH) {
                    wanted.width = rect.width;
                }
                if mask.contains(ConfigureMask::HEIGHT) {
                    wanted.height = rect.height;
                }
                placement::fit_dialog(wm, id, &mut wanted);
                if let Some(c) = wm.registry.get_mut(id) {
                    c.set_rect(wanted);
                }
                ops::ops_for(kind).move_resize(wm, srv, id);
                ops::ops_for(kind).deliver_configure(wm, srv, id);
            }
            // Main-window geometry is ours to decide; just restate it.
            ClientType::App | ClientType::Desktop | ClientType::TaskMenu => {
                ops::ops_for(kind).deliver_configure(wm, srv, id);
            }
            ClientType::Override => srv.configure_passthrough(window, rect, mask),
        }
        Ok(())
    }

    /// Only applications go fullscreen; the new geometry comes from the
    /// variant's own configure, then activation restacks it over (or back
    /// under) the docks.
    fn handle_fullscreen(&mut self, window: WindowHandle, mode: SetMode) {
        let wm = &mut self.wm;
        let srv = &mut self.srv;
        let Some(id) = wm.registry.find(window, MatchMode::Window) else {
            return;
        };
        if wm.registry.kind_of(id) != Some(ClientType::App) {
            return;
        }
        let Some(c) = wm.registry.get_mut(id) else { return };
        let was = c.flags.contains(ClientFlags::FULLSCREEN);
        let want = match mode {
            SetMode::Add => true,
            SetMode::Remove => false,
            SetMode::Toggle => !was,
        };
        if want == was {
            return;
        }
        c.flags.set(ClientFlags::FULLSCREEN, want);
        debug!(window, fullscreen = want, "fullscreen change");
        let table = ops::ops_for(ClientType::App);
        let _ = table.configure(wm, srv, id);
        table.move_resize(wm, srv, id);
        table.deliver_configure(wm, srv, id);
        activate(wm, srv, Some(id));
    }

    fn handle_command(&mut self, command: WmCommand) -> Result<LoopAction> {
        let wm = &mut self.wm;
        let srv = &mut self.srv;
        debug!(?command, "control command");
        match command {
            WmCommand::Exit => return Ok(LoopAction::Quit),
            WmCommand::Next => {
                let next = wm.registry.cycle_forward(ClientType::App);
                activate(wm, srv, next);
            }
            WmCommand::Prev => {
                let next = wm.registry.cycle_backward(ClientType::App);
                activate(wm, srv, next);
            }
            WmCommand::ShowDesktop => toggle_desktop(wm, srv),
            WmCommand::SetTheme => {
                if let Some(name) = srv.read_theme_request() {
                    wm.theme.set_theme(&name);
                    for kind in [
                        FrameKind::Main,
                        FrameKind::Dialog,
                        FrameKind::Panel,
                        FrameKind::Toolbar,
                    ] {
                        wm.theme.invalidate_decor_cache(kind);
                    }
                    if let Some(strip) = wm.live(wm.titlebar_panel) {
                        let _ = ops::ops_for(ClientType::Panel).configure(wm, srv, strip);
                        ops::ops_for(ClientType::Panel).move_resize(wm, srv, strip);
                    }
                    for id in wm.registry.stacking_snapshot() {
                        if let Some(k) = wm.registry.kind_of(id) {
                            ops::ops_for(k).redraw(wm, srv, id, false);
                        }
                    }
                }
            }
            WmCommand::Misc => {
                wm.flags.toggle(WmFlags::DEBUG_VISUAL);
                debug!(enabled = wm.flags.contains(WmFlags::DEBUG_VISUAL), "debug visuals");
            }
        }
        Ok(LoopAction::Continue)
    }

    fn handle_button(&mut self, window: WindowHandle, x: i32, y: i32, time_ms: u32) {
        let wm = &mut self.wm;
        let srv = &mut self.srv;

        // An open task menu swallows the press: on the menu it acts, off
        // the menu it just dismisses.
        if wm.flags.contains(WmFlags::MENU_OPEN) {
            if let Some(menu) = wm.registry.topmost_of(ClientType::TaskMenu) {
                let on_menu = wm.registry.find(window, MatchMode::Frame) == Some(menu)
                    || wm.registry.find(window, MatchMode::Window) == Some(menu);
                ops::ops_for(ClientType::TaskMenu).destroy(wm, srv, menu);
                if !on_menu {
                    return;
                }
            }
        }

        let frame_hit = wm.registry.find(window, MatchMode::Frame);
        if let Some(id) = frame_hit {
            let double = self
                .last_button
                .is_some_and(|(w, t)| w == window && time_ms.wrapping_sub(t) <= wm.config.dbl_click_time_ms);
            if double {
                if let Some(c) = wm.registry.get_mut(id) {
                    c.flags.insert(ClientFlags::DOUBLE_CLICKED);
                }
            }
            if let Some(kind) = wm.registry.kind_of(id) {
                match ops::ops_for(kind).button_press(wm, srv, id, x, y) {
                    ButtonAction::Activate => activate(wm, srv, Some(id)),
                    ButtonAction::Dismiss => ops::ops_for(kind).destroy(wm, srv, id),
                    ButtonAction::Ignore => {}
                }
            }
            if let Some(c) = wm.registry.get_mut(id) {
                c.flags.remove(ClientFlags::DOUBLE_CLICKED);
            }
        } else if let Some(id) = wm.registry.find(window, MatchMode::Window) {
            // Click straight into a dialog raises it, then the press is
            // replayed so the application still sees it.
            if wm.registry.kind_of(id) == Some(ClientType::Dialog) {
                activate(wm, srv, Some(id));
            }
            srv.replay_pointer();
        }
        self.last_button = Some((window, time_ms));
    }

    fn handle_startup(&mut self, event: StartupEvent) {
        let wm = &mut self.wm;
        let srv = &mut self.srv;
        match event {
            StartupEvent::Initiated { sequence, binary } => {
                if let Some(t) = wm.startup.as_mut() {
                    t.begin(Some(&sequence), &binary);
                }
            }
            StartupEvent::Completed { sequence } => {
                // A client may have beaten the completion message here; if
                // so its window satisfies the cycle, otherwise the cycle
                // just closes.
                let window = wm.registry.stacking_snapshot().into_iter().find_map(|id| {
                    wm.registry
                        .get(id)
                        .filter(|c| c.startup_id.as_deref() == Some(sequence.as_str()))
                        .map(|c| c.window)
                });
                if let Some(t) = wm.startup.as_mut() {
                    match window {
                        Some(w) => {
                            t.resolve(&sequence, w);
                        }
                        None => t.cancel(&sequence),
                    }
                }
            }
            StartupEvent::Canceled { sequence } => {
                if let Some(t) = wm.startup.as_mut() {
                    t.cancel(&sequence);
                }
            }
        }
        startup::publish_state(wm, srv);
    }
}
