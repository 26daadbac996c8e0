use tracing::debug;

use crate::core::config::WmConfig;
use crate::display::{Rect, WindowHandle};
use crate::window::msgwin::MessageWinQueue;
use crate::window::registry::{ClientId, Registry};
use crate::window::startup::StartupTracker;
use crate::window::{ClientType, WmFlags};

/// Which decoration cache a theme invalidation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Main,
    Dialog,
    Panel,
    Toolbar,
}

/// Decoration metrics consumed by the core. Rendering itself happens on the
/// other side of this trait.
pub trait ThemeEngine {
    fn invalidate_decor_cache(&mut self, kind: FrameKind);
    fn has_titlebar_panel(&self) -> bool;
    /// Geometry of the titlebar strip, before any west-edge offset.
    fn titlebar_panel_rect(&self, screen_width: u32) -> Option<Rect>;
    fn set_theme(&mut self, name: &str);
}

/// Notifications a compositor implementation may act on. The core calls
/// these at the same points it touches window visibility or geometry.
pub trait CompositorHooks {
    fn on_client_created(&mut self, window: WindowHandle, rect: Rect) {
        let _ = (window, rect);
    }
    fn on_client_shown(&mut self, window: WindowHandle) {
        let _ = window;
    }
    fn on_client_hidden(&mut self, window: WindowHandle) {
        let _ = window;
    }
    fn on_client_reconfigured(&mut self, window: WindowHandle, rect: Rect) {
        let _ = (window, rect);
    }
    fn repaint(&mut self, window: WindowHandle) {
        let _ = window;
    }
}

/// Built-in theme: flat decorations, titlebar strip geometry from config.
pub struct PlainTheme {
    name: String,
    titlebar_height: Option<u32>,
    invalidations: u32,
}

impl PlainTheme {
    pub fn new(config: &WmConfig) -> Self {
        PlainTheme {
            name: config.theme.clone().unwrap_or_else(|| "plain".into()),
            titlebar_height: config.use_titlebar.then_some(20),
            invalidations: 0,
        }
    }

    pub fn invalidations(&self) -> u32 {
        self.invalidations
    }
}

impl ThemeEngine for PlainTheme {
    fn invalidate_decor_cache(&mut self, kind: FrameKind) {
        self.invalidations += 1;
        debug!(?kind, "decoration cache invalidated");
    }

    fn has_titlebar_panel(&self) -> bool {
        self.titlebar_height.is_some()
    }

    fn titlebar_panel_rect(&self, screen_width: u32) -> Option<Rect> {
        self.titlebar_height
            .map(|h| Rect::new(0, 0, screen_width, h))
    }

    fn set_theme(&mut self, name: &str) {
        debug!(theme = name, "theme switched");
        self.name = name.to_owned();
    }
}

/// Compositor stub used when no compositor is wired in.
#[derive(Default)]
pub struct NullCompositor;

impl CompositorHooks for NullCompositor {}

/// Process context: everything the management core mutates, threaded
/// explicitly through every operation. The display connection lives
/// outside so the two can be borrowed independently.
pub struct Wm {
    pub config: WmConfig,
    pub flags: WmFlags,
    pub screen_width: u32,
    pub screen_height: u32,

    pub registry: Registry,

    // Weak references; checked for liveness at every use.
    pub focused_client: Option<ClientId>,
    pub stack_top_app: Option<ClientId>,
    pub desktop: Option<ClientId>,
    pub titlebar_panel: Option<ClientId>,

    pub startup: Option<StartupTracker>,
    pub msg_queue: Option<MessageWinQueue>,

    pub theme: Box<dyn ThemeEngine>,
    pub comp: Box<dyn CompositorHooks>,

    /// Clients advertising the ping protocol; hung-app checks only run
    /// while this is non-zero.
    pub ping_clients: u32,
    pub ticks: u64,
}

impl Wm {
    pub fn new(config: WmConfig, screen_width: u32, screen_height: u32) -> Self {
        let mut flags = WmFlags::default();
        if config.desktop_decorated {
            flags.insert(WmFlags::DESKTOP_DECORATED);
        }
        let theme = Box::new(PlainTheme::new(&config));
        Wm {
            config,
            flags,
            screen_width,
            screen_height,
            registry: Registry::new(),
            focused_client: None,
            stack_top_app: None,
            desktop: None,
            titlebar_panel: None,
            startup: Some(StartupTracker::new()),
            msg_queue: Some(MessageWinQueue::new()),
            theme,
            comp: Box::new(NullCompositor),
            ping_clients: 0,
            ticks: 0,
        }
    }

    /// Resolve a weak reference, returning it only while the client lives.
    pub fn live(&self, id: Option<ClientId>) -> Option<ClientId> {
        id.filter(|id| self.registry.contains(*id))
    }

    /// The client that should currently own the screen: the desktop while
    /// raised, otherwise the remembered top application.
    pub fn visible_main_client(&self) -> Option<ClientId> {
        if self.flags.contains(WmFlags::DESKTOP_RAISED) {
            self.live(self.desktop)
        } else {
            self.live(self.stack_top_app)
                .or_else(|| self.registry.topmost_of(ClientType::App))
        }
    }

    /// Whether the loop needs the one-second tick instead of blocking.
    pub fn needs_tick(&self) -> bool {
        self.startup.as_ref().is_some_and(|s| s.is_busy())
            || self.msg_queue.as_ref().is_some_and(|q| !q.is_empty())
            || self.ping_clients > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::Rect;
    use crate::window::client::Client;

    #[test]
    fn weak_refs_go_stale_on_removal() {
        let mut wm = Wm::new(WmConfig::default(), 640, 480);
        let id = wm.registry.insert(
            Client::new(1, ClientType::App, Rect::new(0, 0, 640, 480)),
            None,
        );
        wm.stack_top_app = Some(id);
        assert_eq!(wm.live(wm.stack_top_app), Some(id));
        wm.registry.remove(id);
        assert_eq!(wm.live(wm.stack_top_app), None);
    }

    #[test]
    fn visible_main_client_follows_desktop_raised() {
        let mut wm = Wm::new(WmConfig::default(), 640, 480);
        let desktop = wm.registry.insert(
            Client::new(1, ClientType::Desktop, Rect::new(0, 0, 640, 480)),
            None,
        );
        let app = wm.registry.insert(
            Client::new(2, ClientType::App, Rect::new(0, 0, 640, 480)),
            None,
        );
        wm.desktop = Some(desktop);
        wm.stack_top_app = Some(app);

        assert_eq!(wm.visible_main_client(), Some(app));
        wm.flags.insert(WmFlags::DESKTOP_RAISED);
        assert_eq!(wm.visible_main_client(), Some(desktop));
    }
}
