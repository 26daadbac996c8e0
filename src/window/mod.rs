pub mod classify;
pub mod client;
pub mod layout;
pub mod manager;
pub mod msgwin;
pub mod ops;
pub mod placement;
pub mod registry;
pub mod startup;

/// Behavioral variant assigned once at classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    App,
    Dialog,
    Toolbar,
    Panel,
    Desktop,
    Override,
    TaskMenu,
}

bitflags::bitflags! {
    /// Set of client variants, for bulk stacking moves.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeSet: u8 {
        const APP = 1 << 0;
        const DIALOG = 1 << 1;
        const TOOLBAR = 1 << 2;
        const PANEL = 1 << 3;
        const DESKTOP = 1 << 4;
        const OVERRIDE = 1 << 5;
        const TASK_MENU = 1 << 6;
    }
}

impl ClientType {
    pub fn as_set(self) -> TypeSet {
        match self {
            ClientType::App => TypeSet::APP,
            ClientType::Dialog => TypeSet::DIALOG,
            ClientType::Toolbar => TypeSet::TOOLBAR,
            ClientType::Panel => TypeSet::PANEL,
            ClientType::Desktop => TypeSet::DESKTOP,
            ClientType::Override => TypeSet::OVERRIDE,
            ClientType::TaskMenu => TypeSet::TASK_MENU,
        }
    }
}

/// Screen edge a panel or toolbar reserves space on. `Titlebar` is the
/// decoration strip above applications rather than a screen edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockEdge {
    North,
    South,
    East,
    West,
    Titlebar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClientFlags: u32 {
        const FULLSCREEN = 1 << 0;
        const MINIMIZED = 1 << 1;
        const TITLE_HIDDEN = 1 << 2;
        /// Dialog realized from the message-window queue.
        const IS_MESSAGE_DIALOG = 1 << 3;
        /// Sticky message pinned near the top of the screen.
        const MESSAGE_STATIC_HI = 1 << 4;
        /// Sticky message pinned near the bottom of the screen.
        const MESSAGE_STATIC_LO = 1 << 5;
        /// Titlebar dock stays visible while the desktop is raised.
        const SHOW_ON_DESKTOP = 1 << 6;
        const WANTS_FOCUS = 1 << 7;
        /// Frame button pressed twice within the double-click window.
        const DOUBLE_CLICKED = 1 << 8;
        /// Speaks the ping protocol; included in the hung-app sweep.
        const PINGABLE = 1 << 9;
    }
}

bitflags::bitflags! {
    /// Process-wide state bits on the `Wm` context.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WmFlags: u32 {
        const DESKTOP_RAISED = 1 << 0;
        /// At least one startup cycle is unresolved.
        const STARTUP_BUSY = 1 << 1;
        const MENU_OPEN = 1 << 2;
        const DESKTOP_DECORATED = 1 << 3;
        /// Painting debug overlays; toggled by the MISC command.
        const DEBUG_VISUAL = 1 << 4;
    }
}
