//! Classification: one window in, at most one managed client out.
//!
//! Decision order: configured title filter, declared type hint, decoration
//! hints, transiency, and Application as the default. The
//! variant picked here is final for the client's lifetime.

use tracing::{debug, warn};

use crate::core::context::Wm;
use crate::core::error::{Result, WmError};
use crate::display::{
    with_server_grab, CursorKind, DisplayServer, TypeHint, WindowHandle, WindowHints,
};
use crate::ewmh;
use crate::window::client::Client;
use crate::window::manager;
use crate::window::ops;
use crate::window::registry::{ClientId, MatchMode};
use crate::window::{ClientFlags, ClientType, DockEdge};

/// Classify `window` and bring it under management. `Ok(None)` means no
/// client was produced: the window vanished mid-flight, was queued as a
/// pending message, or the server denied a request and everything was
/// rolled back.
pub fn make_new_client(
    wm: &mut Wm,
    srv: &mut dyn DisplayServer,
    window: WindowHandle,
) -> Result<Option<ClientId>> {
    with_server_grab(srv, |srv| {
        let hints = match srv.query_hints(window) {
            Ok(h) => h,
            Err(e) if e.is_transient() => {
                debug!(window, error = %e, "window vanished before classification");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let kind = decide_kind(wm, &hints);
        debug!(window, ?kind, name = %hints.name, "classified");

        // Message windows wait in the queue; only the head is realized.
        if is_message_hint(&hints) && !is_static_message(&hints) {
            if let Some(queue) = wm.msg_queue.as_mut() {
                if !queue.is_head(window) {
                    let already_queued = queue.contains(window);
                    let realize_now = queue.is_empty();
                    if !already_queued {
                        queue.push(window, hints.message_timeout.unwrap_or(-1));
                    }
                    if !realize_now {
                        return Ok(None);
                    }
                }
            }
        }

        match construct(wm, srv, window, kind, &hints) {
            Ok(id) => Ok(Some(id)),
            Err(e) if e.is_transient() => {
                warn!(window, error = %e, "client construction rolled back");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    })
}

fn is_message_hint(hints: &WindowHints) -> bool {
    matches!(
        hints.type_hint,
        Some(TypeHint::Message | TypeHint::MessageStaticHi | TypeHint::MessageStaticLo)
    )
}

fn is_static_message(hints: &WindowHints) -> bool {
    matches!(
        hints.type_hint,
        Some(TypeHint::MessageStaticHi | TypeHint::MessageStaticLo)
    )
}

/// The decision order itself. Pure; drives both real classification and
/// the classification tests.
pub fn decide_kind(wm: &Wm, hints: &WindowHints) -> ClientType {
    if hints.override_redirect {
        return ClientType::Override;
    }
    if wm.config.is_forced_dialog(&hints.name) {
        return ClientType::Dialog;
    }
    if let Some(hint) = hints.type_hint {
        return match hint {
            TypeHint::Dock => ClientType::Panel,
            TypeHint::Toolbar | TypeHint::Input => ClientType::Toolbar,
            TypeHint::Desktop => ClientType::Desktop,
            TypeHint::Splash
            | TypeHint::Dialog
            | TypeHint::Message
            | TypeHint::MessageStaticHi
            | TypeHint::MessageStaticLo => ClientType::Dialog,
        };
    }
    // No declared type: decoration hints asking for less than a full frame
    // read as a dialog.
    if hints.undecorated || hints.border_only {
        return ClientType::Dialog;
    }
    // A group leader alone is not a dialog signal: toolkits set one on
    // nearly every top-level. It only helps resolve the owner later.
    if hints.transient_for.is_some() {
        return ClientType::Dialog;
    }
    ClientType::App
}

fn dock_edge_for(wm: &Wm, hints: &WindowHints) -> DockEdge {
    if hints.dock_titlebar {
        return DockEdge::Titlebar;
    }
    let g = hints.geometry;
    if g.height > g.width {
        let mid = g.x + g.width as i32 / 2;
        if mid <= wm.screen_width as i32 / 2 {
            DockEdge::West
        } else {
            DockEdge::East
        }
    } else {
        let mid = g.y + g.height as i32 / 2;
        if mid <= wm.screen_height as i32 / 2 {
            DockEdge::North
        } else {
            DockEdge::South
        }
    }
}

fn construct(
    wm: &mut Wm,
    srv: &mut dyn DisplayServer,
    window: WindowHandle,
    kind: ClientType,
    hints: &WindowHints,
) -> Result<ClientId> {
    let mut client = Client::new(window, kind, hints.geometry);
    client.name = hints.name.clone();
    client.startup_id = hints.startup_id.clone();
    if hints.wants_focus {
        client.flags.insert(ClientFlags::WANTS_FOCUS);
    }
    if hints.supports_ping {
        client.flags.insert(ClientFlags::PINGABLE);
    }

    let mut owner = None;
    match kind {
        ClientType::Panel => {
            client.dock_edge = Some(dock_edge_for(wm, hints));
            if hints.show_on_desktop {
                client.flags.insert(ClientFlags::SHOW_ON_DESKTOP);
            }
        }
        ClientType::Toolbar => {
            client.dock_edge = Some(DockEdge::South);
        }
        ClientType::Dialog => {
            match hints.type_hint {
                Some(TypeHint::Message) => {
                    client.flags.insert(ClientFlags::IS_MESSAGE_DIALOG);
                }
                Some(TypeHint::MessageStaticHi) => {
                    client.flags.insert(ClientFlags::MESSAGE_STATIC_HI);
                }
                Some(TypeHint::MessageStaticLo) => {
                    client.flags.insert(ClientFlags::MESSAGE_STATIC_LO);
                }
                _ => {}
            }
            // Dialogs stack adjacent to the window they belong to. The
            // group leader stands in only when the transient-for target
            // is not a client of ours.
            owner = hints
                .transient_for
                .and_then(|w| wm.registry.find(w, MatchMode::Window));
            if owner.is_none() && hints.transient_for.is_some() {
                owner = hints
                    .group_leader
                    .and_then(|w| wm.registry.find(w, MatchMode::Window));
            }
            client.transient_for = owner;
        }
        _ => {}
    }

    let id = wm.registry.insert(client, owner);
    match wm.registry.kind_of(id) {
        Some(ClientType::Desktop) => wm.desktop = Some(id),
        Some(ClientType::Panel)
            if wm.registry.get(id).is_some_and(|c| {
                c.is_docked_at(DockEdge::Titlebar)
            }) =>
        {
            wm.titlebar_panel = Some(id)
        }
        _ => {}
    }

    if let Err(e) = finish_construction(wm, srv, id, window) {
        // Roll back: the arena never exposes a half-built client.
        wm.registry.remove(id);
        if wm.desktop == Some(id) {
            wm.desktop = None;
        }
        if wm.titlebar_panel == Some(id) {
            wm.titlebar_panel = None;
        }
        return Err(e);
    }

    if hints.supports_ping {
        wm.ping_clients += 1;
    }

    manager::activate(wm, srv, Some(id));

    // A new dock claims its strip from everything already laid out; this
    // runs after activation so the now-mapped dock counts as reserved.
    let claimed = wm.registry.get(id).and_then(|c| match (c.kind, c.dock_edge) {
        (ClientType::Toolbar, _) => Some(c.height as i32),
        (ClientType::Panel, Some(DockEdge::North | DockEdge::South | DockEdge::Titlebar)) => {
            Some(c.height as i32)
        }
        (ClientType::Panel, Some(DockEdge::East | DockEdge::West)) => Some(c.width as i32),
        _ => None,
    });
    if let Some(extent) = claimed {
        crate::window::layout::update_layout(wm, srv, id, -extent);
    }

    resolve_startup(wm, srv, id);
    Ok(id)
}

fn finish_construction(
    wm: &mut Wm,
    srv: &mut dyn DisplayServer,
    id: ClientId,
    window: WindowHandle,
) -> Result<()> {
    srv.stamp_desktop(window);
    ewmh::publish_allowed_actions(wm, srv, id);
    let kind = match wm.registry.kind_of(id) {
        Some(k) => k,
        None => return Err(WmError::WindowGone(window)),
    };
    if wm.config.no_cursor && kind != ClientType::Panel {
        srv.set_window_cursor(window, CursorKind::Hidden);
    }
    let table = ops::ops_for(kind);
    table.configure(wm, srv, id)?;
    if let Some(c) = wm.registry.get(id) {
        wm.comp.on_client_created(c.frame, c.rect());
    }
    table.reparent(wm, srv, id)?;
    table.move_resize(wm, srv, id);
    // Late existence check: the grab stops new requests being processed,
    // not a destroy already queued ahead of ours.
    if !srv.window_exists(window) {
        return Err(WmError::WindowGone(window));
    }
    Ok(())
}

/// Match a freshly managed client against the startup cycles awaiting it.
fn resolve_startup(wm: &mut Wm, srv: &mut dyn DisplayServer, id: ClientId) {
    let Some((window, sequence)) = wm
        .registry
        .get(id)
        .and_then(|c| c.startup_id.clone().map(|s| (c.window, s)))
    else {
        return;
    };
    let resolved = wm
        .startup
        .as_mut()
        .is_some_and(|t| t.resolve(&sequence, window));
    if resolved {
        crate::window::startup::publish_state(wm, srv);
    }
}

/// Adopt windows that already existed when we took over: everything
/// viewable and not override-redirect becomes a client, with one pending
/// unmap swallowed since reparenting synthesizes it.
pub fn adopt_existing(wm: &mut Wm, srv: &mut dyn DisplayServer) -> Result<()> {
    let windows = srv.list_windows()?;
    debug!(count = windows.len(), "scanning pre-existing windows");
    for window in windows {
        let hints = match srv.query_hints(window) {
            Ok(h) => h,
            Err(e) if e.is_transient() => continue,
            Err(e) => return Err(e),
        };
        if !hints.viewable || hints.override_redirect {
            continue;
        }
        if let Some(id) = make_new_client(wm, srv, window)? {
            if let Some(c) = wm.registry.get_mut(id) {
                c.ignore_unmap += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::WmConfig;
    use crate::display::Rect;

    fn wm() -> Wm {
        Wm::new(WmConfig::default(), 640, 480)
    }

    fn hints() -> WindowHints {
        WindowHints {
            geometry: Rect::new(0, 0, 200, 150),
            ..WindowHints::default()
        }
    }

    #[test]
    fn default_is_application() {
        assert_eq!(decide_kind(&wm(), &hints()), ClientType::App);
    }

    #[test]
    fn title_filter_beats_type_hint() {
        let mut wm = wm();
        wm.config.force_dialogs = vec!["Stubborn".into()];
        let mut h = hints();
        h.name = "Stubborn".into();
        h.type_hint = Some(TypeHint::Desktop);
        assert_eq!(decide_kind(&wm, &h), ClientType::Dialog);
    }

    #[test]
    fn type_hints_map_to_variants() {
        let wm = wm();
        for (hint, kind) in [
            (TypeHint::Dock, ClientType::Panel),
            (TypeHint::Toolbar, ClientType::Toolbar),
            (TypeHint::Input, ClientType::Toolbar),
            (TypeHint::Desktop, ClientType::Desktop),
            (TypeHint::Splash, ClientType::Dialog),
            (TypeHint::Dialog, ClientType::Dialog),
            (TypeHint::Message, ClientType::Dialog),
        ] {
            let mut h = hints();
            h.type_hint = Some(hint);
            assert_eq!(decide_kind(&wm, &h), kind, "{hint:?}");
        }
    }

    #[test]
    fn decoration_and_transiency_fall_back_to_dialog() {
        let wm = wm();
        let mut h = hints();
        h.undecorated = true;
        assert_eq!(decide_kind(&wm, &h), ClientType::Dialog);

        let mut h = hints();
        h.transient_for = Some(99);
        assert_eq!(decide_kind(&wm, &h), ClientType::Dialog);
    }

    #[test]
    fn group_leader_alone_stays_application() {
        let wm = wm();
        let mut h = hints();
        h.group_leader = Some(0xdead);
        assert_eq!(decide_kind(&wm, &h), ClientType::App);
    }

    #[test]
    fn override_redirect_wins_over_everything() {
        let mut wm = wm();
        wm.config.force_dialogs = vec!["x".into()];
        let mut h = hints();
        h.name = "x".into();
        h.override_redirect = true;
        assert_eq!(decide_kind(&wm, &h), ClientType::Override);
    }

    #[test]
    fn dock_edges_follow_shape_and_position() {
        let wm = wm();
        let mut h = hints();
        h.geometry = Rect::new(0, 0, 30, 400);
        assert_eq!(dock_edge_for(&wm, &h), DockEdge::West);
        h.geometry = Rect::new(600, 0, 30, 400);
        assert_eq!(dock_edge_for(&wm, &h), DockEdge::East);
        h.geometry = Rect::new(0, 0, 600, 30);
        assert_eq!(dock_edge_for(&wm, &h), DockEdge::North);
        h.geometry = Rect::new(0, 440, 600, 30);
        assert_eq!(dock_edge_for(&wm, &h), DockEdge::South);
        h.dock_titlebar = true;
        assert_eq!(dock_edge_for(&wm, &h), DockEdge::Titlebar);
    }
}
