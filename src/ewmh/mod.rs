//! Published state: what other clients are allowed to observe about us.
//! Thin shims from core state onto the display seam's property setters.

use crate::core::context::Wm;
use crate::display::{AllowedAction, DisplayServer, WindowHandle};
use crate::window::layout;
use crate::window::registry::ClientId;
use crate::window::{ClientFlags, ClientType};

/// Everything published once at takeover.
pub fn init(wm: &mut Wm, srv: &mut dyn DisplayServer) {
    update_rects(wm, srv);
    update_lists(wm, srv);
    set_active(wm, srv);
}

/// Republish the work area after any reservation change.
pub fn update_rects(wm: &mut Wm, srv: &mut dyn DisplayServer) {
    srv.set_workarea(layout::workarea(wm));
}

/// Republish the client list in stacking order.
pub fn update_lists(wm: &mut Wm, srv: &mut dyn DisplayServer) {
    let windows: Vec<WindowHandle> = wm
        .registry
        .stacking()
        .iter()
        .filter_map(|id| wm.registry.get(*id))
        .filter(|c| c.kind != ClientType::Override)
        .map(|c| c.window)
        .collect();
    srv.set_client_list(&windows);
}

/// Advertise which client currently owns the screen.
pub fn set_active(wm: &mut Wm, srv: &mut dyn DisplayServer) {
    let active = wm
        .live(wm.focused_client)
        .or_else(|| wm.visible_main_client())
        .and_then(|id| wm.registry.get(id))
        .map(|c| c.window);
    srv.set_active_window(active);
}

/// Per-variant action set: what a pager or taskbar may ask of this client.
pub fn publish_allowed_actions(wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
    let Some(c) = wm.registry.get(id) else { return };
    let actions: &[AllowedAction] = match c.kind {
        ClientType::App => &[
            AllowedAction::Close,
            AllowedAction::Move,
            AllowedAction::Fullscreen,
        ],
        ClientType::Dialog => &[AllowedAction::Close, AllowedAction::Move],
        ClientType::Toolbar | ClientType::Panel => &[AllowedAction::Close],
        ClientType::Desktop | ClientType::Override | ClientType::TaskMenu => &[],
    };
    srv.set_allowed_actions(c.window, actions);
}

/// Poke applications that speak the ping protocol; the backend reports
/// the ones that stop answering.
pub fn hung_app_check(wm: &mut Wm, srv: &mut dyn DisplayServer) {
    if wm.ping_clients == 0 {
        return;
    }
    for id in wm.registry.stacking_snapshot() {
        if wm.registry.kind_of(id) != Some(ClientType::App) {
            continue;
        }
        if let Some(c) = wm.registry.get(id) {
            if c.flags.contains(ClientFlags::PINGABLE) {
                srv.send_ping(c.window);
            }
        }
    }
}
