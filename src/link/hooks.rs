//! Lifecycle hooks fired on link edges
//!
//! Each hook is owned by one supervisor and defaults to doing nothing. The
//! session-established hook receives the supervisor so it can subscribe and
//! publish.

use super::supervisor::LinkSupervisor;

/// Hook for network edges and session loss
pub type LinkHook = Box<dyn FnMut()>;

/// Hook run when a session is established
pub type SessionHook<N, S> = Box<dyn FnMut(&mut LinkSupervisor<N, S>)>;

/// The four edge hooks of one supervisor
pub struct LinkHooks<N, S> {
    pub(crate) network_established: Option<LinkHook>,
    pub(crate) network_lost: Option<LinkHook>,
    pub(crate) session_established: Option<SessionHook<N, S>>,
    pub(crate) session_lost: Option<LinkHook>,
}

impl<N, S> LinkHooks<N, S> {
    pub fn new() -> Self {
        Self {
            network_established: None,
            network_lost: None,
            session_established: None,
            session_lost: None,
        }
    }
}

impl<N, S> Default for LinkHooks<N, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, S> std::fmt::Debug for LinkHooks<N, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkHooks")
            .field("network_established", &self.network_established.is_some())
            .field("network_lost", &self.network_lost.is_some())
            .field("session_established", &self.session_established.is_some())
            .field("session_lost", &self.session_lost.is_some())
            .finish()
    }
}

/// Run a plain hook if one is set
pub(crate) fn fire(hook: &mut Option<LinkHook>) {
    if let Some(hook) = hook.as_mut() {
        hook();
    }
}
