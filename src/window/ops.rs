//! Per-variant client capabilities. One stateless table per [`ClientType`],
//! selected at classification and never swapped afterwards; every table is
//! usable the moment classification picks it.

use tracing::debug;

use crate::core::context::Wm;
use crate::core::error::Result;
use crate::display::{DisplayServer, Rect, WindowState};
use crate::ewmh;
use crate::window::client::Client;
use crate::window::layout::{self, reserved_extent};
use crate::window::registry::ClientId;
use crate::window::{manager, msgwin, placement};
use crate::window::{ClientFlags, ClientType, Direction, DockEdge, WmFlags};

/// What the dispatch loop should do after a frame button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Ignore,
    Activate,
    Dismiss,
}

pub trait ClientOps {
    fn show(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        show_common(wm, srv, id);
    }

    fn hide(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        hide_common(wm, srv, id);
    }

    /// Commit the client's stored geometry to the server.
    fn move_resize(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        move_resize_common(wm, srv, id);
    }

    /// Repaint decorations. `from_cache_only` skips the paint when the
    /// decoration cache was dropped (a full paint will follow anyway).
    fn redraw(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId, from_cache_only: bool) {
        let _ = srv;
        if from_cache_only {
            return;
        }
        if let Some(c) = wm.registry.get(id) {
            wm.comp.repaint(c.frame);
        }
    }

    /// Recompute the client's geometry from current screen state. Only
    /// updates the stored rect; `move_resize` commits it.
    fn configure(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) -> Result<()>;

    /// Wrap the client window in a frame. Variants that stay frameless
    /// override this with a no-op.
    fn reparent(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) -> Result<()> {
        reparent_common(wm, srv, id)
    }

    fn destroy(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        destroy_common(wm, srv, id);
    }

    fn button_press(
        &self,
        wm: &mut Wm,
        srv: &mut dyn DisplayServer,
        id: ClientId,
        x: i32,
        y: i32,
    ) -> ButtonAction {
        let _ = (wm, srv, id, x, y);
        ButtonAction::Ignore
    }

    /// Screen area this client's frame occupies.
    fn get_coverage(&self, wm: &Wm, id: ClientId) -> Option<Rect> {
        wm.registry.get(id).map(|c| c.rect())
    }

    /// Tell the client where its window really sits.
    fn deliver_configure(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        if let Some(c) = wm.registry.get(id) {
            srv.send_configure(c.window, c.rect());
        }
    }

    fn iconize(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        if let Some(c) = wm.registry.get_mut(id) {
            c.flags.insert(ClientFlags::MINIMIZED);
        }
        hide_common(wm, srv, id);
        if let Some(c) = wm.registry.get(id) {
            srv.set_window_state(c.window, WindowState::Iconic);
        }
    }
}

pub struct AppOps;
pub struct DialogOps;
pub struct ToolbarOps;
pub struct PanelOps;
pub struct DesktopOps;
pub struct OverrideOps;
pub struct TaskMenuOps;

pub fn ops_for(kind: ClientType) -> &'static dyn ClientOps {
    match kind {
        ClientType::App => &AppOps,
        ClientType::Dialog => &DialogOps,
        ClientType::Toolbar => &ToolbarOps,
        ClientType::Panel => &PanelOps,
        ClientType::Desktop => &DesktopOps,
        ClientType::Override => &OverrideOps,
        ClientType::TaskMenu => &TaskMenuOps,
    }
}

fn show_common(wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
    let Some(c) = wm.registry.get_mut(id) else { return };
    c.flags.remove(ClientFlags::MINIMIZED);
    c.mapped = true;
    let (frame, window, framed) = (c.frame, c.window, c.is_framed());
    srv.map(frame);
    if framed {
        srv.map(window);
    }
    srv.set_window_state(window, WindowState::Normal);
    wm.comp.on_client_shown(frame);
}

fn hide_common(wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
    let Some(c) = wm.registry.get_mut(id) else { return };
    if !c.mapped {
        return;
    }
    c.mapped = false;
    // Unmapping ourselves raises an UnmapNotify we must not read as a
    // withdrawal.
    c.ignore_unmap += 1;
    let (frame, window, framed) = (c.frame, c.window, c.is_framed());
    srv.unmap(frame);
    if framed {
        srv.unmap(window);
    }
    wm.comp.on_client_hidden(frame);
}

fn move_resize_common(wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
    let Some(c) = wm.registry.get(id) else { return };
    let rect = c.rect();
    srv.move_resize(c.frame, rect);
    if c.is_framed() {
        srv.move_resize(c.window, Rect::new(0, 0, rect.width, rect.height));
    }
    wm.comp.on_client_reconfigured(c.frame, rect);
}

fn reparent_common(wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) -> Result<()> {
    let Some(c) = wm.registry.get(id) else { return Ok(()) };
    let (window, rect) = (c.window, c.rect());
    let frame = srv.create_frame(rect)?;
    if let Some(c) = wm.registry.get_mut(id) {
        c.frame = frame;
        c.ignore_unmap += 1;
    }
    srv.reparent(window, frame, 0, 0);
    srv.grab_button(frame);
    Ok(())
}

/// Shared teardown: unmanage, unframe, fix every weak reference that
/// pointed at the departed client. Returns the removed record so variants
/// can run their follow-ups.
fn destroy_common(wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) -> Option<Client> {
    let c = wm.registry.remove(id)?;
    debug!(window = c.window, kind = ?c.kind, "unmanaging client");
    srv.unmap(c.frame);
    if c.is_framed() {
        srv.reparent_to_root(c.window, c.x, c.y);
        srv.destroy_window(c.frame);
    }
    srv.set_window_state(c.window, WindowState::Withdrawn);
    wm.comp.on_client_hidden(c.frame);

    if c.flags.contains(ClientFlags::PINGABLE) {
        wm.ping_clients = wm.ping_clients.saturating_sub(1);
    }
    if wm.focused_client == Some(id) {
        wm.focused_client = None;
    }
    if wm.desktop == Some(id) {
        wm.desktop = None;
    }
    if wm.titlebar_panel == Some(id) {
        wm.titlebar_panel = None;
    }
    if wm.stack_top_app == Some(id) {
        wm.stack_top_app = wm.registry.topmost_of(ClientType::App);
    }
    if let Some(tracker) = wm.startup.as_mut() {
        tracker.forget_window(c.window);
    }
    Some(c)
}

impl ClientOps for AppOps {
    fn configure(&self, wm: &mut Wm, _srv: &mut dyn DisplayServer, id: ClientId) -> Result<()> {
        let rect = if wm
            .registry
            .get(id)
            .is_some_and(|c| c.flags.contains(ClientFlags::FULLSCREEN))
        {
            Rect::new(0, 0, wm.screen_width, wm.screen_height)
        } else {
            layout::workarea(wm)
        };
        if let Some(c) = wm.registry.get_mut(id) {
            c.set_rect(rect);
        }
        Ok(())
    }

    fn destroy(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        destroy_common(wm, srv, id);
        let next = wm.visible_main_client();
        manager::activate(wm, srv, next);
    }

    fn iconize(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        if let Some(c) = wm.registry.get_mut(id) {
            c.flags.insert(ClientFlags::MINIMIZED);
        }
        hide_common(wm, srv, id);
        if let Some(c) = wm.registry.get(id) {
            srv.set_window_state(c.window, WindowState::Iconic);
        }
        // Something else has to own the screen now.
        wm.registry.move_to_bottom(id);
        if wm.stack_top_app == Some(id) {
            wm.stack_top_app = wm
                .registry
                .stacking()
                .iter()
                .rev()
                .copied()
                .find(|other| {
                    *other != id
                        && wm.registry.kind_of(*other) == Some(ClientType::App)
                        && wm.registry.get(*other).is_some_and(|c| {
                            !c.flags.contains(ClientFlags::MINIMIZED)
                        })
                });
        }
        let next = wm.visible_main_client().or(wm.live(wm.desktop));
        manager::activate(wm, srv, next);
    }
}

impl ClientOps for DialogOps {
    fn configure(&self, wm: &mut Wm, _srv: &mut dyn DisplayServer, id: ClientId) -> Result<()> {
        let Some(c) = wm.registry.get(id) else { return Ok(()) };
        let mut rect = c.rect();
        let flags = c.flags;
        if flags.contains(ClientFlags::MESSAGE_STATIC_HI) {
            placement::place_static_message(wm, true, &mut rect);
        } else if flags.contains(ClientFlags::MESSAGE_STATIC_LO) {
            placement::place_static_message(wm, false, &mut rect);
        } else {
            if rect.x == 0 && rect.y == 0 {
                placement::center_in_workarea(wm, &mut rect);
            }
            placement::fit_dialog(wm, id, &mut rect);
        }
        if let Some(c) = wm.registry.get_mut(id) {
            c.set_rect(rect);
        }
        Ok(())
    }

    fn destroy(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        let removed = destroy_common(wm, srv, id);
        let was_message = removed
            .is_some_and(|c| c.flags.contains(ClientFlags::IS_MESSAGE_DIALOG));
        if was_message {
            msgwin::queue_pop(wm, srv);
        }
    }

    fn button_press(
        &self,
        wm: &mut Wm,
        _srv: &mut dyn DisplayServer,
        id: ClientId,
        _x: i32,
        _y: i32,
    ) -> ButtonAction {
        let sticky = wm.registry.get(id).is_some_and(|c| {
            c.flags
                .intersects(ClientFlags::MESSAGE_STATIC_HI | ClientFlags::MESSAGE_STATIC_LO)
        });
        if sticky {
            ButtonAction::Ignore
        } else {
            ButtonAction::Activate
        }
    }
}

impl ClientOps for ToolbarOps {
    fn configure(&self, wm: &mut Wm, _srv: &mut dyn DisplayServer, id: ClientId) -> Result<()> {
        let Some(c) = wm.registry.get(id) else { return Ok(()) };
        let height = c.height;
        let west = reserved_extent(wm, Direction::West, Some(id), false);
        let east = reserved_extent(wm, Direction::East, Some(id), false);
        let below = reserved_extent(wm, Direction::South, Some(id), true);
        let rect = Rect {
            x: west,
            y: wm.screen_height as i32 - below - height as i32,
            width: (wm.screen_width as i32 - west - east).max(1) as u32,
            height,
        };
        if let Some(c) = wm.registry.get_mut(id) {
            c.set_rect(rect);
        }
        Ok(())
    }

    fn destroy(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        // Give the reserved strip back before the record disappears.
        let released = wm.registry.get(id).map(|c| c.height as i32);
        if let Some(delta) = released {
            layout::update_layout(wm, srv, id, delta);
        }
        destroy_common(wm, srv, id);
        // The work area computed during the release still counted this
        // toolbar; republish without it.
        ewmh::update_rects(wm, srv);
    }
}

impl ClientOps for PanelOps {
    fn configure(&self, wm: &mut Wm, _srv: &mut dyn DisplayServer, id: ClientId) -> Result<()> {
        let Some(c) = wm.registry.get(id) else { return Ok(()) };
        let (w, h) = (c.width, c.height);
        let edge = c.dock_edge.unwrap_or(DockEdge::South);
        let rect = match edge {
            DockEdge::North => Rect::new(
                0,
                reserved_extent(wm, Direction::North, Some(id), false),
                wm.screen_width,
                h,
            ),
            DockEdge::South => Rect::new(
                0,
                wm.screen_height as i32
                    - reserved_extent(wm, Direction::South, Some(id), false)
                    - h as i32,
                wm.screen_width,
                h,
            ),
            DockEdge::West => Rect::new(
                reserved_extent(wm, Direction::West, Some(id), false),
                0,
                w,
                wm.screen_height,
            ),
            DockEdge::East => Rect::new(
                wm.screen_width as i32
                    - reserved_extent(wm, Direction::East, Some(id), false)
                    - w as i32,
                0,
                w,
                wm.screen_height,
            ),
            DockEdge::Titlebar => {
                let mut rect = wm
                    .theme
                    .titlebar_panel_rect(wm.screen_width)
                    .unwrap_or_else(|| wm.config.fallback_titlebar_rect(wm.screen_width));
                rect.x += reserved_extent(wm, Direction::West, Some(id), false);
                rect
            }
        };
        if let Some(c) = wm.registry.get_mut(id) {
            c.set_rect(rect);
        }
        Ok(())
    }

    fn destroy(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        let released = wm.registry.get(id).and_then(|c| {
            c.dock_edge.map(|edge| match edge {
                DockEdge::North | DockEdge::South | DockEdge::Titlebar => c.height as i32,
                DockEdge::East | DockEdge::West => c.width as i32,
            })
        });
        if let Some(delta) = released {
            layout::update_layout(wm, srv, id, delta);
        }
        destroy_common(wm, srv, id);
        ewmh::update_rects(wm, srv);
    }
}

impl ClientOps for DesktopOps {
    fn configure(&self, wm: &mut Wm, _srv: &mut dyn DisplayServer, id: ClientId) -> Result<()> {
        let rect = Rect::new(0, 0, wm.screen_width, wm.screen_height);
        if let Some(c) = wm.registry.get_mut(id) {
            c.set_rect(rect);
        }
        Ok(())
    }

    fn reparent(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) -> Result<()> {
        // A plain desktop stays a direct child of the root.
        if wm.flags.contains(WmFlags::DESKTOP_DECORATED) {
            reparent_common(wm, srv, id)
        } else {
            Ok(())
        }
    }

    fn destroy(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        destroy_common(wm, srv, id);
        if wm.flags.contains(WmFlags::DESKTOP_RAISED) {
            wm.flags.remove(WmFlags::DESKTOP_RAISED);
            let next = wm.visible_main_client();
            manager::activate(wm, srv, next);
        }
    }
}

impl ClientOps for OverrideOps {
    fn configure(&self, _wm: &mut Wm, _srv: &mut dyn DisplayServer, _id: ClientId) -> Result<()> {
        // Override-redirect windows asked to be left alone.
        Ok(())
    }

    fn reparent(&self, _wm: &mut Wm, _srv: &mut dyn DisplayServer, _id: ClientId) -> Result<()> {
        Ok(())
    }

    fn redraw(
        &self,
        _wm: &mut Wm,
        _srv: &mut dyn DisplayServer,
        _id: ClientId,
        _from_cache_only: bool,
    ) {
    }

    fn deliver_configure(&self, _wm: &mut Wm, _srv: &mut dyn DisplayServer, _id: ClientId) {}
}

impl ClientOps for TaskMenuOps {
    fn configure(&self, _wm: &mut Wm, _srv: &mut dyn DisplayServer, _id: ClientId) -> Result<()> {
        Ok(())
    }

    fn reparent(&self, _wm: &mut Wm, _srv: &mut dyn DisplayServer, _id: ClientId) -> Result<()> {
        Ok(())
    }

    fn button_press(
        &self,
        _wm: &mut Wm,
        _srv: &mut dyn DisplayServer,
        _id: ClientId,
        _x: i32,
        _y: i32,
    ) -> ButtonAction {
        ButtonAction::Dismiss
    }

    fn destroy(&self, wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
        destroy_common(wm, srv, id);
        wm.flags.remove(WmFlags::MENU_OPEN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::WmConfig;
    use crate::display::mock::MockServer;
    use crate::window::client::Client;

    #[test]
    fn app_configure_fills_workarea() {
        let mut wm = Wm::new(WmConfig::default(), 640, 480);
        let mut srv = MockServer::new(640, 480);
        let mut panel = Client::new(1, ClientType::Panel, Rect::new(0, 450, 640, 30));
        panel.dock_edge = Some(DockEdge::South);
        panel.mapped = true;
        wm.registry.insert(panel, None);
        let app = wm
            .registry
            .insert(Client::new(2, ClientType::App, Rect::default()), None);

        ops_for(ClientType::App)
            .configure(&mut wm, &mut srv, app)
            .unwrap();
        assert_eq!(
            wm.registry.get(app).unwrap().rect(),
            Rect::new(0, 0, 640, 450)
        );
    }

    #[test]
    fn panels_stack_along_their_edge() {
        let mut wm = Wm::new(WmConfig::default(), 640, 480);
        let mut srv = MockServer::new(640, 480);
        let mut first = Client::new(1, ClientType::Panel, Rect::new(0, 0, 40, 480));
        first.dock_edge = Some(DockEdge::West);
        first.mapped = true;
        let first = wm.registry.insert(first, None);
        let mut second = Client::new(2, ClientType::Panel, Rect::new(0, 0, 30, 480));
        second.dock_edge = Some(DockEdge::West);
        let second = wm.registry.insert(second, None);

        ops_for(ClientType::Panel)
            .configure(&mut wm, &mut srv, first)
            .unwrap();
        ops_for(ClientType::Panel)
            .configure(&mut wm, &mut srv, second)
            .unwrap();
        assert_eq!(wm.registry.get(first).unwrap().x, 0);
        assert_eq!(wm.registry.get(second).unwrap().x, 40);
    }

    #[test]
    fn destroy_fixes_every_weak_reference() {
        let mut wm = Wm::new(WmConfig::default(), 640, 480);
        let mut srv = MockServer::new(640, 480);
        let a = wm
            .registry
            .insert(Client::new(1, ClientType::App, Rect::default()), None);
        let b = wm
            .registry
            .insert(Client::new(2, ClientType::App, Rect::default()), None);
        wm.focused_client = Some(b);
        wm.stack_top_app = Some(b);

        ops_for(ClientType::App).destroy(&mut wm, &mut srv, b);
        assert_eq!(wm.focused_client, None);
        assert_eq!(wm.stack_top_app, Some(a));
        assert!(!wm.registry.contains(b));
    }
}
