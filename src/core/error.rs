use thiserror::Error;

/// Errors surfaced by the display seam and the management core.
///
/// `WindowGone` and `RequestDenied` are recoverable races: a window can
/// vanish between us noticing it and finishing its bookkeeping. Callers in
/// the classification path treat both as "no client produced". Everything
/// else is trapped at the call site.
#[derive(Debug, Error)]
pub enum WmError {
    #[error("window {0} vanished before it could be managed")]
    WindowGone(u32),

    #[error("window server denied request: {0}")]
    RequestDenied(String),

    #[error("window server connection lost: {0}")]
    ConnectionLost(String),
}

pub type Result<T> = std::result::Result<T, WmError>;

impl WmError {
    /// True for the races that classification recovers from locally.
    pub fn is_transient(&self) -> bool {
        matches!(self, WmError::WindowGone(_) | WmError::RequestDenied(_))
    }
}

impl From<x11rb::errors::ConnectionError> for WmError {
    fn from(e: x11rb::errors::ConnectionError) -> Self {
        WmError::ConnectionLost(e.to_string())
    }
}

impl From<x11rb::errors::ReplyError> for WmError {
    fn from(e: x11rb::errors::ReplyError) -> Self {
        match e {
            x11rb::errors::ReplyError::ConnectionError(c) => {
                WmError::ConnectionLost(c.to_string())
            }
            x11rb::errors::ReplyError::X11Error(x) => {
                WmError::RequestDenied(format!("{:?}", x.error_kind))
            }
        }
    }
}

impl From<x11rb::errors::ReplyOrIdError> for WmError {
    fn from(e: x11rb::errors::ReplyOrIdError) -> Self {
        WmError::RequestDenied(e.to_string())
    }
}
