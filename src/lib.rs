//! pocketwm: the decision core of a stacking window manager for small
//! screens. One workspace, one visible main window, docks reserving the
//! edges, dialogs layered above. The library exposes the core so it can be
//! driven headlessly; the binary wires it to a real X server.

pub mod core;
pub mod display;
pub mod ewmh;
pub mod window;
