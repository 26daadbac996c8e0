//! End-to-end behavior: events in through the dispatcher, decisions
//! observed on the mock display and in the client registry.

use pocketwm::core::config::WmConfig;
use pocketwm::core::context::Wm;
use pocketwm::display::mock::MockServer;
use pocketwm::display::{
    Rect, ServerEvent, SetMode, StartupEvent, TypeHint, WindowHandle, WindowHints, WmCommand,
};
use pocketwm::window::manager::{self, WindowManager};
use pocketwm::window::startup;
use pocketwm::window::registry::{ClientId, MatchMode};
use pocketwm::window::{ClientType, WmFlags};

fn manager() -> WindowManager<MockServer> {
    WindowManager::new(MockServer::new(640, 480), WmConfig::default())
}

fn app_hints(name: &str) -> WindowHints {
    WindowHints {
        name: name.into(),
        geometry: Rect::new(0, 0, 320, 240),
        wants_focus: true,
        ..WindowHints::default()
    }
}

fn typed_hints(hint: TypeHint, geometry: Rect) -> WindowHints {
    WindowHints {
        type_hint: Some(hint),
        geometry,
        wants_focus: true,
        ..WindowHints::default()
    }
}

fn map(m: &mut WindowManager<MockServer>, window: WindowHandle) {
    m.dispatch(ServerEvent::MapRequest { window }).unwrap();
}

fn id_of(wm: &Wm, window: WindowHandle) -> ClientId {
    wm.registry.find(window, MatchMode::Window).unwrap()
}

fn pos(wm: &Wm, id: ClientId) -> usize {
    wm.registry.stacking().iter().position(|c| *c == id).unwrap()
}

#[test]
fn mapped_app_fills_workarea_and_covers_desktop() {
    let mut m = manager();
    let desktop = m
        .srv
        .add_window(typed_hints(TypeHint::Desktop, Rect::new(0, 0, 640, 480)));
    map(&mut m, desktop);
    let app = m.srv.add_window(app_hints("term"));
    map(&mut m, app);

    let wm = &m.wm;
    assert_eq!(wm.registry.len(), 2);
    let desktop_id = id_of(wm, desktop);
    let app_id = id_of(wm, app);
    assert_eq!(wm.registry.kind_of(desktop_id), Some(ClientType::Desktop));
    assert_eq!(wm.registry.kind_of(app_id), Some(ClientType::App));

    // The application owns the whole screen and sits above the desktop.
    assert_eq!(wm.registry.get(app_id).unwrap().rect(), Rect::new(0, 0, 640, 480));
    assert!(pos(wm, app_id) > pos(wm, desktop_id));
    assert!(!wm.flags.contains(WmFlags::DESKTOP_RAISED));
    assert_eq!(m.srv.active_window, Some(app));
    assert!(m.srv.grab_balanced());
    assert!(m.srv.syncs > 0);
}

#[test]
fn transient_chain_raises_with_its_main_window() {
    let mut m = manager();
    let a = m.srv.add_window(app_hints("a"));
    let b = m.srv.add_window(app_hints("b"));
    map(&mut m, a);
    map(&mut m, b);

    let mut dialog_hints = typed_hints(TypeHint::Dialog, Rect::new(50, 50, 200, 100));
    dialog_hints.transient_for = Some(a);
    let d = m.srv.add_window(dialog_hints);
    map(&mut m, d);

    // Re-activating `a` carries its dialog back above everything.
    map(&mut m, a);
    let wm = &m.wm;
    let (a_id, b_id, d_id) = (id_of(wm, a), id_of(wm, b), id_of(wm, d));
    assert!(pos(wm, a_id) > pos(wm, b_id));
    assert!(pos(wm, d_id) > pos(wm, a_id));
    assert_eq!(wm.registry.get(d_id).unwrap().transient_for, Some(a_id));
    assert!(m.srv.grab_balanced());
}

#[test]
fn activation_is_idempotent() {
    let mut m = manager();
    let a = m.srv.add_window(app_hints("a"));
    let b = m.srv.add_window(app_hints("b"));
    map(&mut m, a);
    map(&mut m, b);

    map(&mut m, b);
    let once: Vec<ClientId> = m.wm.registry.stacking().to_vec();
    let restack_once = m.srv.last_restack().unwrap().to_vec();
    map(&mut m, b);
    assert_eq!(m.wm.registry.stacking(), once.as_slice());
    assert_eq!(m.srv.last_restack().unwrap(), restack_once.as_slice());
}

#[test]
fn toolbar_lifecycle_shrinks_and_restores_apps() {
    let mut m = manager();
    let app = m.srv.add_window(app_hints("editor"));
    map(&mut m, app);
    let app_id = id_of(&m.wm, app);
    assert_eq!(m.wm.registry.get(app_id).unwrap().height, 480);

    let bar = m
        .srv
        .add_window(typed_hints(TypeHint::Input, Rect::new(0, 0, 640, 50)));
    map(&mut m, bar);
    let bar_id = id_of(&m.wm, bar);
    assert_eq!(
        m.wm.registry.get(bar_id).unwrap().rect(),
        Rect::new(0, 430, 640, 50)
    );
    // The toolbar's strip came out of the application.
    assert_eq!(m.wm.registry.get(app_id).unwrap().height, 430);
    assert_eq!(m.srv.workarea, Some(Rect::new(0, 0, 640, 430)));

    // First unmap is the reparent echo; the second is the withdrawal.
    m.dispatch(ServerEvent::UnmapNotify { window: bar }).unwrap();
    assert!(m.wm.registry.contains(bar_id));
    m.dispatch(ServerEvent::UnmapNotify { window: bar }).unwrap();
    assert!(!m.wm.registry.contains(bar_id));
    assert_eq!(m.wm.registry.get(app_id).unwrap().height, 480);
    assert_eq!(m.srv.workarea, Some(Rect::new(0, 0, 640, 480)));
    assert!(m.srv.grab_balanced());
}

#[test]
fn west_panel_reserves_and_apps_compensate() {
    let mut m = manager();
    let app = m.srv.add_window(app_hints("browser"));
    map(&mut m, app);
    let panel = m
        .srv
        .add_window(typed_hints(TypeHint::Dock, Rect::new(0, 100, 40, 300)));
    map(&mut m, panel);

    let wm = &m.wm;
    let panel_id = id_of(wm, panel);
    let app_id = id_of(wm, app);
    // Tall and on the left: a west dock spanning the screen height.
    assert_eq!(
        wm.registry.get(panel_id).unwrap().rect(),
        Rect::new(0, 0, 40, 480)
    );
    let a = wm.registry.get(app_id).unwrap();
    assert_eq!((a.x, a.width), (40, 600));
    assert_eq!(m.srv.workarea, Some(Rect::new(40, 0, 600, 480)));
}

#[test]
fn desktop_toggle_round_trips() {
    let mut m = manager();
    let desktop = m
        .srv
        .add_window(typed_hints(TypeHint::Desktop, Rect::new(0, 0, 640, 480)));
    map(&mut m, desktop);
    let app = m.srv.add_window(app_hints("term"));
    map(&mut m, app);

    let desktop_id = id_of(&m.wm, desktop);
    let app_id = id_of(&m.wm, app);
    assert!(pos(&m.wm, app_id) > pos(&m.wm, desktop_id));

    m.dispatch(ServerEvent::Command {
        window: 0,
        command: WmCommand::ShowDesktop,
    })
    .unwrap();
    assert!(m.wm.flags.contains(WmFlags::DESKTOP_RAISED));
    assert!(pos(&m.wm, desktop_id) > pos(&m.wm, app_id));
    assert_eq!(m.srv.active_window, Some(desktop));

    m.dispatch(ServerEvent::Command {
        window: 0,
        command: WmCommand::ShowDesktop,
    })
    .unwrap();
    assert!(!m.wm.flags.contains(WmFlags::DESKTOP_RAISED));
    assert!(pos(&m.wm, app_id) > pos(&m.wm, desktop_id));
    assert_eq!(m.srv.active_window, Some(app));
}

#[test]
fn dialog_pushdown_only_when_desktop_is_down() {
    let mut m = manager();
    let desktop = m
        .srv
        .add_window(typed_hints(TypeHint::Desktop, Rect::new(0, 0, 640, 480)));
    map(&mut m, desktop);
    let app = m.srv.add_window(app_hints("mail"));
    map(&mut m, app);
    let bar = m
        .srv
        .add_window(typed_hints(TypeHint::Input, Rect::new(0, 0, 640, 40)));
    map(&mut m, bar);

    let mut dialog_hints = typed_hints(TypeHint::Dialog, Rect::new(50, 50, 200, 100));
    dialog_hints.transient_for = Some(app);
    let dialog = m.srv.add_window(dialog_hints);

    // Desktop down: the dialog's anchor reclaims the toolbar beneath it.
    map(&mut m, dialog);
    let (app_id, bar_id, dialog_id) =
        (id_of(&m.wm, app), id_of(&m.wm, bar), id_of(&m.wm, dialog));
    assert!(pos(&m.wm, bar_id) < pos(&m.wm, app_id));
    assert!(pos(&m.wm, dialog_id) > pos(&m.wm, app_id));

    // Desktop raised: activating the dialog leaves the toolbar alone.
    m.dispatch(ServerEvent::Command {
        window: 0,
        command: WmCommand::ShowDesktop,
    })
    .unwrap();
    assert!(pos(&m.wm, bar_id) > pos(&m.wm, app_id));
    map(&mut m, dialog);
    assert!(pos(&m.wm, bar_id) > pos(&m.wm, app_id));
    assert!(m.srv.grab_balanced());
}

#[test]
fn message_queue_realizes_head_only_and_skips_vanished() {
    let mut m = manager();
    fn message(geometry: Rect) -> WindowHints {
        WindowHints {
            type_hint: Some(TypeHint::Message),
            message_timeout: Some(-1),
            geometry,
            ..WindowHints::default()
        }
    }
    let first = m.srv.add_window(message(Rect::new(10, 10, 100, 50)));
    let second = m.srv.add_window(message(Rect::new(10, 10, 100, 50)));
    let third = m.srv.add_window(message(Rect::new(10, 10, 100, 50)));

    map(&mut m, first);
    assert!(m.wm.registry.find(first, MatchMode::Window).is_some());
    map(&mut m, second);
    map(&mut m, third);
    // Only the head exists as a client.
    assert!(m.wm.registry.find(second, MatchMode::Window).is_none());
    assert!(m.wm.registry.find(third, MatchMode::Window).is_none());
    assert_eq!(m.wm.registry.len(), 1);

    // The second message dies while still queued; the third takes over
    // when the head goes away.
    m.srv.vanish_window(second);
    m.dispatch(ServerEvent::DestroyNotify { window: first }).unwrap();
    assert!(m.wm.registry.find(first, MatchMode::Window).is_none());
    assert!(m.wm.registry.find(third, MatchMode::Window).is_some());
    assert_eq!(m.wm.registry.len(), 1);
    assert!(m.srv.grab_balanced());
}

#[test]
fn startup_cycles_publish_and_clear_the_launch_list() {
    let mut m = manager();
    m.dispatch(ServerEvent::Startup(StartupEvent::Initiated {
        sequence: "s1".into(),
        binary: "browser".into(),
    }))
    .unwrap();
    m.dispatch(ServerEvent::Startup(StartupEvent::Initiated {
        sequence: "s2".into(),
        binary: "editor".into(),
    }))
    .unwrap();
    assert_eq!(m.srv.startup_list.as_deref(), Some("browser|editor"));
    assert_eq!(
        m.srv.root_cursor,
        Some(pocketwm::display::CursorKind::Busy)
    );

    // The browser window arrives carrying its startup id.
    let mut hints = app_hints("browser");
    hints.startup_id = Some("s1".into());
    let win = m.srv.add_window(hints);
    map(&mut m, win);
    assert_eq!(m.srv.startup_list.as_deref(), Some("editor"));

    // The editor launch completes without a matching window.
    m.dispatch(ServerEvent::Startup(StartupEvent::Completed {
        sequence: "s2".into(),
    }))
    .unwrap();
    assert_eq!(m.srv.startup_list, None);
    assert_eq!(
        m.srv.root_cursor,
        Some(pocketwm::display::CursorKind::Normal)
    );
}

#[test]
fn vanishing_window_mid_classification_rolls_back() {
    let mut m = manager();
    let ghost = m.srv.add_window(app_hints("ghost"));
    // Present for the hint query, gone before construction finishes:
    // MockServer keeps hints, so emulate by vanishing first. The map
    // request then produces no client and no error.
    m.srv.vanish_window(ghost);
    map(&mut m, ghost);
    assert_eq!(m.wm.registry.len(), 0);
    assert!(m.srv.grab_balanced());
}

#[test]
fn ping_capable_apps_are_pinged_and_unregistered() {
    let mut m = manager();
    let mut hints = app_hints("term");
    hints.supports_ping = true;
    let win = m.srv.add_window(hints);
    map(&mut m, win);
    assert!(m.wm.needs_tick());

    pocketwm::ewmh::hung_app_check(&mut m.wm, &mut m.srv);
    assert_eq!(m.srv.pings, vec![win]);

    // Apps that never opted in are left alone.
    let quiet = m.srv.add_window(app_hints("quiet"));
    map(&mut m, quiet);
    pocketwm::ewmh::hung_app_check(&mut m.wm, &mut m.srv);
    assert_eq!(m.srv.pings, vec![win, win]);

    m.dispatch(ServerEvent::DestroyNotify { window: win }).unwrap();
    m.dispatch(ServerEvent::DestroyNotify { window: quiet }).unwrap();
    assert!(!m.wm.needs_tick());
}

#[test]
fn task_menu_press_off_the_menu_only_dismisses() {
    let mut m = manager();
    let app = m.srv.add_window(app_hints("term"));
    map(&mut m, app);

    let menu = m.srv.add_window(app_hints("menu"));
    let menu_id = manager::open_task_menu(&mut m.wm, &mut m.srv, menu, Rect::new(0, 0, 200, 300));
    assert!(m.wm.flags.contains(WmFlags::MENU_OPEN));
    assert_eq!(m.wm.registry.kind_of(menu_id), Some(ClientType::TaskMenu));

    // Press lands on the application underneath: the menu goes away and
    // the press is swallowed, not forwarded.
    m.dispatch(ServerEvent::ButtonPress {
        window: app,
        x: 300,
        y: 200,
        time_ms: 1000,
    })
    .unwrap();
    assert!(!m.wm.flags.contains(WmFlags::MENU_OPEN));
    assert!(!m.wm.registry.contains(menu_id));
    assert_eq!(m.srv.replayed_pointers, 0);

    // Pressing the menu itself also closes it.
    let menu2 = m.srv.add_window(app_hints("menu"));
    let menu2_id = manager::open_task_menu(&mut m.wm, &mut m.srv, menu2, Rect::new(0, 0, 200, 300));
    m.dispatch(ServerEvent::ButtonPress {
        window: menu2,
        x: 20,
        y: 20,
        time_ms: 2000,
    })
    .unwrap();
    assert!(!m.wm.flags.contains(WmFlags::MENU_OPEN));
    assert!(!m.wm.registry.contains(menu2_id));
    assert!(m.srv.grab_balanced());
}

#[test]
fn single_instance_launch_opens_one_cycle_and_reactivates() {
    let mut m = manager();
    startup::launch_single(&mut m.wm, &mut m.srv, "true");
    assert_eq!(m.srv.startup_list.as_deref(), Some("true"));

    // A second request while the first is still pending is a no-op.
    startup::launch_single(&mut m.wm, &mut m.srv, "true");
    assert_eq!(m.wm.startup.as_ref().unwrap().cycles().len(), 1);

    // The launched client arrives carrying the generated sequence.
    let sequence = m.wm.startup.as_ref().unwrap().cycles()[0]
        .sequence
        .clone()
        .unwrap();
    let mut hints = app_hints("true");
    hints.startup_id = Some(sequence);
    let win = m.srv.add_window(hints);
    map(&mut m, win);
    assert_eq!(m.srv.startup_list, None);

    // Once resolved, asking again re-activates instead of spawning.
    m.srv.active_window = None;
    startup::launch_single(&mut m.wm, &mut m.srv, "true");
    assert_eq!(m.srv.active_window, Some(win));
    assert_eq!(m.wm.startup.as_ref().unwrap().cycles().len(), 1);
}

#[test]
fn fullscreen_toggle_covers_the_panels() {
    let mut m = manager();
    let panel = m
        .srv
        .add_window(typed_hints(TypeHint::Dock, Rect::new(0, 100, 40, 300)));
    map(&mut m, panel);
    let app = m.srv.add_window(app_hints("video"));
    map(&mut m, app);
    let app_id = id_of(&m.wm, app);
    let panel_id = id_of(&m.wm, panel);
    assert_eq!(
        m.wm.registry.get(app_id).unwrap().rect(),
        Rect::new(40, 0, 600, 480)
    );

    m.dispatch(ServerEvent::FullscreenRequest {
        window: app,
        mode: SetMode::Toggle,
    })
    .unwrap();
    assert_eq!(
        m.wm.registry.get(app_id).unwrap().rect(),
        Rect::new(0, 0, 640, 480)
    );
    assert!(pos(&m.wm, panel_id) < pos(&m.wm, app_id));

    m.dispatch(ServerEvent::FullscreenRequest {
        window: app,
        mode: SetMode::Remove,
    })
    .unwrap();
    assert_eq!(
        m.wm.registry.get(app_id).unwrap().rect(),
        Rect::new(40, 0, 600, 480)
    );
    assert!(pos(&m.wm, panel_id) > pos(&m.wm, app_id));
    assert!(m.srv.grab_balanced());
}

#[test]
fn next_and_prev_cycle_applications() {
    let mut m = manager();
    let a = m.srv.add_window(app_hints("a"));
    let b = m.srv.add_window(app_hints("b"));
    let c = m.srv.add_window(app_hints("c"));
    for w in [a, b, c] {
        map(&mut m, w);
    }
    let (a_id, c_id) = (id_of(&m.wm, a), id_of(&m.wm, c));
    assert_eq!(m.wm.stack_top_app, Some(c_id));

    m.dispatch(ServerEvent::Command {
        window: 0,
        command: WmCommand::Next,
    })
    .unwrap();
    // The lowest application rotated to the top.
    assert_eq!(m.wm.stack_top_app, Some(a_id));

    m.dispatch(ServerEvent::Command {
        window: 0,
        command: WmCommand::Prev,
    })
    .unwrap();
    assert_eq!(m.wm.stack_top_app, Some(c_id));
}
