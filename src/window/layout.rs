//! Layout recalculation: reserved-edge accounting, the compensation pass
//! run when a dock changes size, and whole-screen reshuffles on root
//! geometry changes.

use tracing::debug;

use crate::core::context::{FrameKind, Wm};
use crate::display::{with_server_grab, DisplayServer, Rect};
use crate::ewmh;
use crate::window::manager;
use crate::window::ops;
use crate::window::placement;
use crate::window::registry::ClientId;
use crate::window::{ClientType, Direction, DockEdge};

/// Total space reserved by mapped docks along `direction`, in pixels from
/// that screen edge. Hidden docks reserve nothing. `ignore` excludes one
/// client (typically the dock being resized); `include_toolbars` folds
/// south-docked toolbars into the south figure.
pub fn reserved_extent(
    wm: &Wm,
    direction: Direction,
    ignore: Option<ClientId>,
    include_toolbars: bool,
) -> i32 {
    let mut total = 0i32;
    for id in wm.registry.stacking() {
        if Some(*id) == ignore {
            continue;
        }
        let Some(c) = wm.registry.get(*id) else {
            continue;
        };
        if !c.mapped {
            continue;
        }
        match (c.kind, direction) {
            (ClientType::Panel, _) => {
                let counts = match direction {
                    Direction::North => {
                        c.is_docked_at(DockEdge::North) || c.is_docked_at(DockEdge::Titlebar)
                    }
                    Direction::South => c.is_docked_at(DockEdge::South),
                    Direction::East => c.is_docked_at(DockEdge::East),
                    Direction::West => c.is_docked_at(DockEdge::West),
                };
                if counts {
                    total += match direction {
                        Direction::North | Direction::South => c.height as i32,
                        Direction::East | Direction::West => c.width as i32,
                    };
                }
            }
            (ClientType::Toolbar, Direction::South) if include_toolbars => {
                total += c.height as i32;
            }
            _ => {}
        }
    }
    total
}

/// Screen area left for applications once every dock is accounted for.
pub fn workarea(wm: &Wm) -> Rect {
    let west = reserved_extent(wm, Direction::West, None, false);
    let east = reserved_extent(wm, Direction::East, None, false);
    let north = reserved_extent(wm, Direction::North, None, false);
    let south = reserved_extent(wm, Direction::South, None, true);
    Rect {
        x: west,
        y: north,
        width: (wm.screen_width as i32 - west - east).max(1) as u32,
        height: (wm.screen_height as i32 - north - south).max(1) as u32,
    }
}

/// Compensate every affected client after `changed` released (positive
/// `delta`) or claimed (negative) space along its dock edge. One pass over
/// the stacking order adjusts applications and same-side docks; dialogs are
/// re-fitted afterwards, the work area republished, and the visible main
/// client reasserted.
pub fn update_layout(
    wm: &mut Wm,
    srv: &mut dyn DisplayServer,
    changed: ClientId,
    delta: i32,
) {
    if delta == 0 {
        return;
    }
    let Some(c) = wm.registry.get(changed) else {
        return;
    };
    let edge = match c.kind {
        ClientType::Toolbar => DockEdge::South,
        // The titlebar strip reserves from the top like a north dock.
        _ => match c.dock_edge {
            Some(DockEdge::Titlebar) => DockEdge::North,
            Some(e) => e,
            None => return,
        },
    };
    let (changed_x, changed_y) = (c.x, c.y);
    debug!(?changed, ?edge, delta, "updating layout");

    wm.theme.invalidate_decor_cache(FrameKind::Main);

    for id in wm.registry.stacking_snapshot() {
        if id == changed {
            continue;
        }
        let Some(p) = wm.registry.get(id) else {
            continue;
        };
        let affected = match edge {
            DockEdge::West => p.x >= changed_x,
            DockEdge::East => p.x <= changed_x,
            DockEdge::North => p.y >= changed_y,
            DockEdge::South | DockEdge::Titlebar => p.y <= changed_y,
        };
        if !affected {
            continue;
        }
        let kind = p.kind;
        let dock = p.dock_edge;
        let adjusted = match kind {
            ClientType::App => {
                if let Some(p) = wm.registry.get_mut(id) {
                    match edge {
                        DockEdge::West => {
                            p.width = (p.width as i32 + delta).max(1) as u32;
                            p.x -= delta;
                        }
                        DockEdge::East => {
                            p.width = (p.width as i32 + delta).max(1) as u32;
                        }
                        DockEdge::North => {
                            p.height = (p.height as i32 + delta).max(1) as u32;
                            p.y -= delta;
                        }
                        DockEdge::South | DockEdge::Titlebar => {
                            p.height = (p.height as i32 + delta).max(1) as u32;
                        }
                    }
                    true
                } else {
                    false
                }
            }
            ClientType::Toolbar | ClientType::Panel => {
                adjust_dock(wm, srv, id, kind, dock, edge, delta)
            }
            // Dialogs get the dedicated re-fit pass below.
            _ => false,
        };
        if adjusted {
            ops::ops_for(kind).move_resize(wm, srv, id);
            ops::ops_for(kind).deliver_configure(wm, srv, id);
            ops::ops_for(kind).redraw(wm, srv, id, false);
        }
    }

    refit_dialogs(wm, srv);
    ewmh::update_rects(wm, srv);
    let main = wm.visible_main_client();
    manager::activate(wm, srv, main);
}

/// Same-side docks shift with the change; opposite-side docks are
/// untouched. Titlebar strips re-derive their geometry instead.
fn adjust_dock(
    wm: &mut Wm,
    srv: &mut dyn DisplayServer,
    id: ClientId,
    kind: ClientType,
    dock: Option<DockEdge>,
    edge: DockEdge,
    delta: i32,
) -> bool {
    let _ = srv;
    if dock == Some(DockEdge::Titlebar) {
        // On released space the strip re-derives from the theme, offset by
        // what the west edge still reserves.
        if delta > 0 {
            if let Some(mut rect) = wm.theme.titlebar_panel_rect(wm.screen_width) {
                rect.x += reserved_extent(wm, Direction::West, None, false);
                if let Some(p) = wm.registry.get_mut(id) {
                    p.set_rect(rect);
                }
                return true;
            }
        }
        return false;
    }
    match edge {
        DockEdge::West => {
            if dock == Some(DockEdge::East) {
                return false;
            }
            if let Some(p) = wm.registry.get_mut(id) {
                if kind == ClientType::Toolbar {
                    p.width = (p.width as i32 + delta).max(1) as u32;
                    p.x -= delta;
                } else {
                    p.x -= delta;
                }
                return true;
            }
            false
        }
        DockEdge::East => {
            if dock == Some(DockEdge::West) {
                return false;
            }
            if let Some(p) = wm.registry.get_mut(id) {
                if kind == ClientType::Toolbar {
                    p.width = (p.width as i32 + delta).max(1) as u32;
                } else {
                    p.x += delta;
                }
                return true;
            }
            false
        }
        DockEdge::North => {
            if dock == Some(DockEdge::North) {
                if let Some(p) = wm.registry.get_mut(id) {
                    p.y -= delta;
                    return true;
                }
            }
            false
        }
        DockEdge::South | DockEdge::Titlebar => {
            let same_side = kind == ClientType::Toolbar || dock == Some(DockEdge::South);
            if same_side {
                if let Some(p) = wm.registry.get_mut(id) {
                    p.y += delta;
                    return true;
                }
            }
            false
        }
    }
}

fn refit_dialogs(wm: &mut Wm, srv: &mut dyn DisplayServer) {
    for id in wm.registry.stacking_snapshot() {
        if wm.registry.kind_of(id) != Some(ClientType::Dialog) {
            continue;
        }
        let Some(c) = wm.registry.get(id) else { continue };
        let mut rect = c.rect();
        if placement::fit_dialog(wm, id, &mut rect) {
            if let Some(c) = wm.registry.get_mut(id) {
                c.set_rect(rect);
            }
            ops::ops_for(ClientType::Dialog).move_resize(wm, srv, id);
            ops::ops_for(ClientType::Dialog).deliver_configure(wm, srv, id);
        }
    }
}

/// Root geometry changed (resolution switch or rotation). Everything is
/// re-dimensioned under one grab; the desktop and the titlebar strip go
/// last so intermediate states never flash through.
pub fn handle_root_resize(wm: &mut Wm, srv: &mut dyn DisplayServer, width: u32, height: u32) {
    let dw = width as i32 - wm.screen_width as i32;
    let dh = height as i32 - wm.screen_height as i32;
    if dw == 0 && dh == 0 {
        return;
    }
    debug!(width, height, dw, dh, "root geometry changed");
    wm.screen_width = width;
    wm.screen_height = height;

    with_server_grab(srv, |srv| {
        for kind in [
            FrameKind::Main,
            FrameKind::Dialog,
            FrameKind::Panel,
            FrameKind::Toolbar,
        ] {
            wm.theme.invalidate_decor_cache(kind);
        }

        let mut deferred_desktop = None;
        let mut deferred_titlebar = None;
        for id in wm.registry.stacking_snapshot() {
            let Some(c) = wm.registry.get(id) else { continue };
            let kind = c.kind;
            let dock = c.dock_edge;
            if kind == ClientType::Desktop {
                deferred_desktop = Some(id);
                continue;
            }
            if dock == Some(DockEdge::Titlebar) {
                deferred_titlebar = Some(id);
                continue;
            }
            let adjusted = if let Some(c) = wm.registry.get_mut(id) {
                match kind {
                    ClientType::App => {
                        c.width = (c.width as i32 + dw).max(1) as u32;
                        c.height = (c.height as i32 + dh).max(1) as u32;
                        true
                    }
                    ClientType::Toolbar => {
                        c.width = (c.width as i32 + dw).max(1) as u32;
                        c.y += dh;
                        true
                    }
                    ClientType::Panel => match dock {
                        Some(DockEdge::North) => {
                            c.width = (c.width as i32 + dw).max(1) as u32;
                            true
                        }
                        Some(DockEdge::South) => {
                            c.width = (c.width as i32 + dw).max(1) as u32;
                            c.y += dh;
                            true
                        }
                        Some(DockEdge::East) => {
                            c.height = (c.height as i32 + dh).max(1) as u32;
                            c.x += dw;
                            true
                        }
                        Some(DockEdge::West) => {
                            c.height = (c.height as i32 + dh).max(1) as u32;
                            true
                        }
                        _ => false,
                    },
                    _ => false,
                }
            } else {
                false
            };
            if adjusted {
                ops::ops_for(kind).move_resize(wm, srv, id);
                ops::ops_for(kind).redraw(wm, srv, id, false);
                ops::ops_for(kind).deliver_configure(wm, srv, id);
            }
        }

        if let Some(id) = deferred_desktop {
            if let Some(c) = wm.registry.get_mut(id) {
                c.set_rect(Rect::new(0, 0, width, height));
            }
            ops::ops_for(ClientType::Desktop).move_resize(wm, srv, id);
            ops::ops_for(ClientType::Desktop).redraw(wm, srv, id, false);
            ops::ops_for(ClientType::Desktop).deliver_configure(wm, srv, id);
        }
        if let Some(id) = deferred_titlebar {
            let _ = ops::ops_for(ClientType::Panel).configure(wm, srv, id);
            ops::ops_for(ClientType::Panel).move_resize(wm, srv, id);
            ops::ops_for(ClientType::Panel).deliver_configure(wm, srv, id);
        }

        refit_dialogs(wm, srv);
        ewmh::update_rects(wm, srv);
        let main = wm.visible_main_client();
        manager::activate(wm, srv, main);
        wm.registry.sync_to_display(srv);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::WmConfig;
    use crate::display::mock::MockServer;
    use crate::window::client::Client;

    fn wm_640() -> Wm {
        Wm::new(WmConfig::default(), 640, 480)
    }

    fn insert(wm: &mut Wm, kind: ClientType, rect: Rect, edge: Option<DockEdge>) -> ClientId {
        static NEXT: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(100);
        let win = NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut c = Client::new(win, kind, rect);
        c.dock_edge = edge;
        c.mapped = true;
        wm.registry.insert(c, None)
    }

    #[test]
    fn unmapped_docks_reserve_nothing() {
        let mut wm = wm_640();
        let p = insert(
            &mut wm,
            ClientType::Panel,
            Rect::new(0, 0, 40, 480),
            Some(DockEdge::West),
        );
        if let Some(c) = wm.registry.get_mut(p) {
            c.mapped = false;
        }
        assert_eq!(reserved_extent(&wm, Direction::West, None, false), 0);
        if let Some(c) = wm.registry.get_mut(p) {
            c.mapped = true;
        }
        assert_eq!(reserved_extent(&wm, Direction::West, None, false), 40);
    }

    #[test]
    fn reserved_extents_sum_per_edge() {
        let mut wm = wm_640();
        insert(
            &mut wm,
            ClientType::Panel,
            Rect::new(0, 0, 40, 480),
            Some(DockEdge::West),
        );
        insert(
            &mut wm,
            ClientType::Panel,
            Rect::new(0, 450, 640, 30),
            Some(DockEdge::South),
        );
        insert(
            &mut wm,
            ClientType::Toolbar,
            Rect::new(0, 400, 640, 50),
            None,
        );

        assert_eq!(reserved_extent(&wm, Direction::West, None, false), 40);
        assert_eq!(reserved_extent(&wm, Direction::South, None, false), 30);
        assert_eq!(reserved_extent(&wm, Direction::South, None, true), 80);
        assert_eq!(reserved_extent(&wm, Direction::North, None, false), 0);
    }

    #[test]
    fn west_release_grows_apps_and_shifts_same_side_docks() {
        let mut wm = wm_640();
        let panel = insert(
            &mut wm,
            ClientType::Panel,
            Rect::new(0, 0, 40, 480),
            Some(DockEdge::West),
        );
        let app = insert(&mut wm, ClientType::App, Rect::new(40, 0, 600, 480), None);
        let bar = insert(
            &mut wm,
            ClientType::Toolbar,
            Rect::new(40, 430, 600, 50),
            None,
        );

        let mut srv = MockServer::new(640, 480);
        update_layout(&mut wm, &mut srv, panel, 20);

        let a = wm.registry.get(app).unwrap();
        assert_eq!((a.x, a.width), (20, 620));
        let t = wm.registry.get(bar).unwrap();
        assert_eq!((t.x, t.width), (20, 620));
    }

    #[test]
    fn toolbar_shrink_gives_height_back_to_apps() {
        let mut wm = wm_640();
        let app = insert(&mut wm, ClientType::App, Rect::new(0, 0, 640, 430), None);
        let bar = insert(
            &mut wm,
            ClientType::Toolbar,
            Rect::new(0, 430, 640, 50),
            None,
        );
        // The toolbar shrank from 50 to 30: 20px released.
        if let Some(t) = wm.registry.get_mut(bar) {
            t.height = 30;
            t.y += 20;
        }

        let mut srv = MockServer::new(640, 480);
        update_layout(&mut wm, &mut srv, bar, 20);

        let a = wm.registry.get(app).unwrap();
        assert_eq!(a.height, 450);
        assert_eq!(a.y, 0);
    }

    #[test]
    fn root_resize_rescales_every_variant() {
        let mut wm = wm_640();
        let app = insert(&mut wm, ClientType::App, Rect::new(0, 20, 640, 410), None);
        let desktop = insert(&mut wm, ClientType::Desktop, Rect::new(0, 0, 640, 480), None);
        let south = insert(
            &mut wm,
            ClientType::Panel,
            Rect::new(0, 450, 640, 30),
            Some(DockEdge::South),
        );

        let mut srv = MockServer::new(640, 480);
        handle_root_resize(&mut wm, &mut srv, 480, 640);

        assert_eq!((wm.screen_width, wm.screen_height), (480, 640));
        let a = wm.registry.get(app).unwrap();
        assert_eq!((a.width, a.height), (480, 570));
        let d = wm.registry.get(desktop).unwrap();
        assert_eq!(d.rect(), Rect::new(0, 0, 480, 640));
        let s = wm.registry.get(south).unwrap();
        assert_eq!((s.y, s.width), (610, 480));
    }
}
