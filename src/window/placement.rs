//! Dialog fitting. Pure geometry; the configured [`DialogStrategy`]
//! decides how much of the requested rectangle survives.

use crate::core::config::DialogStrategy;
use crate::core::context::Wm;
use crate::display::Rect;
use crate::window::layout;
use crate::window::registry::ClientId;
use crate::window::ClientFlags;

/// Fit `rect` for the given dialog according to the active strategy.
/// Returns true when the rectangle was changed.
pub fn fit_dialog(wm: &Wm, id: ClientId, rect: &mut Rect) -> bool {
    let Some(client) = wm.registry.get(id) else {
        return false;
    };
    // Sticky messages pin themselves; never reposition them.
    if client
        .flags
        .intersects(ClientFlags::MESSAGE_STATIC_HI | ClientFlags::MESSAGE_STATIC_LO)
    {
        return false;
    }
    let before = *rect;
    match wm.config.dialog_strategy {
        DialogStrategy::Static => {}
        DialogStrategy::Free => clamp_to(rect, full_screen(wm)),
        DialogStrategy::Constrained => {
            // A dialog shrunk earlier may grow back toward its requested
            // size when space returns.
            rect.width = rect.width.max(client.init_width);
            rect.height = rect.height.max(client.init_height);
            clamp_to(rect, layout::workarea(wm));
        }
        DialogStrategy::ConstrainedHoriz => {
            rect.width = rect.width.max(client.init_width);
            let area = layout::workarea(wm);
            let screen = full_screen(wm);
            clamp_axis(
                &mut rect.x,
                &mut rect.width,
                area.x,
                area.x + area.width as i32,
            );
            clamp_axis(
                &mut rect.y,
                &mut rect.height,
                screen.y,
                screen.y + screen.height as i32,
            );
        }
    }
    *rect != before
}

/// Center `rect` inside the work area; used for dialogs that never asked
/// for a position.
pub fn center_in_workarea(wm: &Wm, rect: &mut Rect) {
    let area = layout::workarea(wm);
    rect.x = area.x + (area.width.saturating_sub(rect.width) / 2) as i32;
    rect.y = area.y + (area.height.saturating_sub(rect.height) / 2) as i32;
}

/// Fixed placement for sticky messages: horizontally centered, pinned to
/// the top or bottom of the work area.
pub fn place_static_message(wm: &Wm, high: bool, rect: &mut Rect) {
    let area = layout::workarea(wm);
    rect.x = area.x + (area.width.saturating_sub(rect.width) / 2) as i32;
    rect.y = if high {
        area.y
    } else {
        area.y + area.height as i32 - rect.height as i32
    };
}

fn full_screen(wm: &Wm) -> Rect {
    Rect::new(0, 0, wm.screen_width, wm.screen_height)
}

fn clamp_to(rect: &mut Rect, bounds: Rect) {
    clamp_axis(
        &mut rect.x,
        &mut rect.width,
        bounds.x,
        bounds.x + bounds.width as i32,
    );
    clamp_axis(
        &mut rect.y,
        &mut rect.height,
        bounds.y,
        bounds.y + bounds.height as i32,
    );
}

fn clamp_axis(pos: &mut i32, size: &mut u32, lo: i32, hi: i32) {
    let avail = (hi - lo).max(1) as u32;
    if *size > avail {
        *size = avail;
    }
    if *pos < lo {
        *pos = lo;
    }
    if *pos + *size as i32 > hi {
        *pos = hi - *size as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::WmConfig;
    use crate::display::Rect;
    use crate::window::client::Client;
    use crate::window::{ClientType, DockEdge};

    fn wm_with_west_panel() -> (Wm, ClientId) {
        let mut wm = Wm::new(WmConfig::default(), 640, 480);
        let mut panel = Client::new(1, ClientType::Panel, Rect::new(0, 0, 40, 480));
        panel.dock_edge = Some(DockEdge::West);
        panel.mapped = true;
        wm.registry.insert(panel, None);
        let dialog = Client::new(2, ClientType::Dialog, Rect::new(-30, 10, 700, 200));
        let id = wm.registry.insert(dialog, None);
        (wm, id)
    }

    #[test]
    fn constrained_dialog_fits_workarea() {
        let (wm, id) = wm_with_west_panel();
        let mut rect = Rect::new(-30, 10, 700, 200);
        assert!(fit_dialog(&wm, id, &mut rect));
        // Work area starts east of the 40px panel.
        assert_eq!(rect.x, 40);
        assert_eq!(rect.width, 600);
        assert_eq!(rect.y, 10);
    }

    #[test]
    fn static_strategy_never_moves_anything() {
        let (mut wm, id) = wm_with_west_panel();
        wm.config.dialog_strategy = DialogStrategy::Static;
        let mut rect = Rect::new(-30, 10, 700, 200);
        assert!(!fit_dialog(&wm, id, &mut rect));
        assert_eq!(rect, Rect::new(-30, 10, 700, 200));
    }

    #[test]
    fn horiz_strategy_leaves_vertical_free() {
        let (mut wm, id) = wm_with_west_panel();
        wm.config.dialog_strategy = DialogStrategy::ConstrainedHoriz;
        let mut rect = Rect::new(-30, 90, 700, 200);
        assert!(fit_dialog(&wm, id, &mut rect));
        assert_eq!(rect.x, 40);
        assert_eq!(rect.y, 90);
    }
}
