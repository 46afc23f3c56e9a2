//! Request handlers.
//!
//! # Data Flow
//! ```text
//! DispatchTable (directive line parsed)
//!     → register.rs (REGISTER: application + notification types → registry)
//!     → notify.rs (NOTIFY: registry lookup → Notification → sink)
//! ```
//!
//! # Design Decisions
//! - Handlers parse everything up front, then respond from the parsed
//!   request; a parse failure never produces a partial registration
//! - Icon references are resolved at parse time (embedded resources) or
//!   fetched in the background (URLs); neither blocks the response

pub mod notify;
pub mod register;

use tokio::sync::mpsc;

pub use notify::NotifyHandler;
pub use register::RegisterHandler;

/// A notification ready for display, decoupled from the wire request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub application: String,
    pub name: String,
    pub title: String,
    pub text: String,
    /// Cache key or URL for the icon, if any.
    pub icon: Option<String>,
    pub id: Option<String>,
    pub sticky: bool,
    pub priority: i32,
    pub coalescing: Option<String>,
    /// Whether the user has this notification type enabled. Disabled
    /// notifications are still delivered to the sink so consumers can decide
    /// to suppress them.
    pub enabled: bool,
}

/// Where accepted notifications go. The wire side never blocks on display.
pub type NotificationSink = mpsc::UnboundedSender<Notification>;

/// Parse a GNTP boolean header value. Accepts `1`, `t`, `true` and `yes`,
/// case-insensitively; everything else is false.
pub(crate) fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_accepts_truthy_spellings() {
        for v in ["1", "t", "T", "true", "True", "TRUE", "yes", "YES"] {
            assert!(parse_flag(v), "{:?} should be true", v);
        }
        for v in ["0", "false", "no", "", "2", "truee"] {
            assert!(!parse_flag(v), "{:?} should be false", v);
        }
    }
}
