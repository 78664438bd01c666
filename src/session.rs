//! Presentation hooks the client calls on auth failures.
//!
//! The client never renders anything itself. A 403 and an abandoned
//! re-authentication are reported here and the host decides what the user
//! sees (a dialog, a redirect, a line on stderr).

/// Receives session-level events raised by the response interceptor.
pub trait SessionObserver: Send + Sync {
    /// A request was rejected with 403.
    fn on_forbidden(&self, url: &str);

    /// Re-authentication was abandoned and the session has been cleared.
    /// The host should navigate to `login_route`.
    fn on_session_expired(&self, login_route: &str);
}

/// Default observer: records the events in the trace log and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_forbidden(&self, url: &str) {
        tracing::warn!(url, "access to resource is forbidden");
    }

    fn on_session_expired(&self, login_route: &str) {
        tracing::warn!(login_route, "session expired, redirecting to login");
    }
}
