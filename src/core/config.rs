use clap::{Parser, ValueEnum};

use crate::display::Rect;

/// How dialog geometry is constrained when placed or re-fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialogStrategy {
    /// Keep the requested geometry, only clamped onto the screen.
    Free,
    /// Fit fully inside the work area (the screen minus reserved edges).
    Constrained,
    /// Constrain horizontally only; vertical placement is the dialog's own.
    ConstrainedHoriz,
    /// Never touch dialog geometry at all.
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DesktopMode {
    /// The desktop window is left undecorated.
    Plain,
    /// The desktop window gets a managed frame like an application.
    Decorated,
}

#[derive(Debug, Parser)]
#[command(name = "pocketwm", about = "A lightweight stacking window manager for small screens")]
pub struct Args {
    /// Theme name handed to the theme engine
    #[arg(long)]
    pub theme: Option<String>,

    /// Reserve a titlebar strip docked above applications
    #[arg(long, default_value_t = false)]
    pub use_titlebar: bool,

    /// Show a pointer cursor (disable for touchscreen devices)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub use_cursor: bool,

    /// Dialog placement strategy
    #[arg(long, value_enum, default_value_t = DialogStrategy::Constrained)]
    pub dialog_mode: DialogStrategy,

    /// Desktop window treatment
    #[arg(long, value_enum, default_value_t = DesktopMode::Plain)]
    pub desktop_mode: DesktopMode,

    /// Comma-separated window titles always classified as dialogs
    #[arg(long)]
    pub force_dialogs: Option<String>,

    /// Replace a running window manager instead of failing
    #[arg(long, default_value_t = false)]
    pub replace: bool,
}

/// Immutable configuration snapshot taken at startup.
#[derive(Debug, Clone)]
pub struct WmConfig {
    pub theme: Option<String>,
    pub use_titlebar: bool,
    pub no_cursor: bool,
    pub dialog_strategy: DialogStrategy,
    pub desktop_decorated: bool,
    pub force_dialogs: Vec<String>,
    /// Double-click window for frame buttons, in milliseconds.
    pub dbl_click_time_ms: u32,
}

impl Default for WmConfig {
    fn default() -> Self {
        WmConfig {
            theme: None,
            use_titlebar: false,
            no_cursor: false,
            dialog_strategy: DialogStrategy::Constrained,
            desktop_decorated: false,
            force_dialogs: Vec::new(),
            dbl_click_time_ms: 200,
        }
    }
}

impl From<&Args> for WmConfig {
    fn from(args: &Args) -> Self {
        WmConfig {
            theme: args.theme.clone(),
            use_titlebar: args.use_titlebar,
            no_cursor: !args.use_cursor,
            dialog_strategy: args.dialog_mode,
            desktop_decorated: matches!(args.desktop_mode, DesktopMode::Decorated),
            force_dialogs: args
                .force_dialogs
                .as_deref()
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            dbl_click_time_ms: 200,
        }
    }
}

impl WmConfig {
    /// Titles listed in `force_dialogs` override every other classification
    /// hint for a window with a matching name.
    pub fn is_forced_dialog(&self, title: &str) -> bool {
        self.force_dialogs.iter().any(|t| t == title)
    }

    /// Geometry reserved for the titlebar strip when no theme supplies one.
    pub fn fallback_titlebar_rect(&self, screen_width: u32) -> Rect {
        Rect {
            x: 0,
            y: 0,
            width: screen_width,
            height: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_dialogs_are_split_and_trimmed() {
        let args = Args::parse_from([
            "pocketwm",
            "--force-dialogs",
            "Calculator, Notes",
            "--dialog-mode",
            "free",
        ]);
        let cfg = WmConfig::from(&args);
        assert!(cfg.is_forced_dialog("Calculator"));
        assert!(cfg.is_forced_dialog("Notes"));
        assert!(!cfg.is_forced_dialog("Terminal"));
        assert_eq!(cfg.dialog_strategy, DialogStrategy::Free);
    }

    #[test]
    fn cursor_flag_inverts_into_no_cursor() {
        let args = Args::parse_from(["pocketwm", "--use-cursor", "false"]);
        let cfg = WmConfig::from(&args);
        assert!(cfg.no_cursor);
    }
}
