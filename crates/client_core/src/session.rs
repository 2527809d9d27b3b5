//! Authenticated session shared by every component of the portal.
//!
//! A [`SessionState`] is created empty, filled at login and cleared at logout.
//! Components hold an `Arc<SessionState>` and read from it; only the portal's
//! login/logout actions replace its contents.

use std::collections::BTreeSet;

use shared::domain::Role;
use tokio::sync::RwLock;
use tracing::info;

/// Role set resolved once at login, exposed as named predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    roles: BTreeSet<Role>,
}

impl Capabilities {
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }

    pub fn from_server_role(role: &str) -> Self {
        Self::from_roles(Role::expand(role))
    }

    pub fn can_see_all_cases(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    pub fn can_edit_reference_data(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

}

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub capabilities: Capabilities,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Identity of the caller for authorization filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
    pub capabilities: Capabilities,
}

impl Caller {
    pub fn may_see(&self, case: &shared::protocol::Case) -> bool {
        self.capabilities.can_see_all_cases() || case.is_owned_by(&self.username)
    }
}

impl From<&Session> for Caller {
    fn from(session: &Session) -> Self {
        Self {
            username: session.username.clone(),
            capabilities: session.capabilities.clone(),
        }
    }
}

#[derive(Default)]
struct SessionSlot {
    epoch: u64,
    token: Option<String>,
    session: Option<Session>,
}

/// Process-wide holder of the current session.
///
/// Every `begin`/`clear` bumps the epoch, so work started under an older session can
/// recognize that it no longer speaks for the current one.
#[derive(Default)]
pub struct SessionState {
    slot: RwLock<SessionSlot>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a bearer token before the identity is resolved, so that the profile
    /// lookup made right after the token grant is authenticated.
    pub async fn stage_token(&self, token: String) -> u64 {
        let mut slot = self.slot.write().await;
        slot.epoch += 1;
        slot.token = Some(token);
        slot.session = None;
        slot.epoch
    }

    pub async fn begin(&self, session: Session) -> u64 {
        let mut slot = self.slot.write().await;
        slot.epoch += 1;
        info!(username = %session.username, epoch = slot.epoch, "session started");
        slot.token = Some(session.token.clone());
        slot.session = Some(session);
        slot.epoch
    }

    pub async fn clear(&self) {
        let mut slot = self.slot.write().await;
        slot.epoch += 1;
        slot.token = None;
        if let Some(session) = slot.session.take() {
            info!(username = %session.username, epoch = slot.epoch, "session cleared");
        }
    }

    /// Clears the session only if it is still the one identified by `epoch`.
    pub async fn invalidate(&self, epoch: u64) -> bool {
        let mut slot = self.slot.write().await;
        if slot.epoch != epoch || slot.token.is_none() {
            return false;
        }
        slot.epoch += 1;
        slot.token = None;
        slot.session = None;
        info!(epoch, "session invalidated after authorization failure");
        true
    }

    pub async fn epoch(&self) -> u64 {
        self.slot.read().await.epoch
    }

    pub async fn token(&self) -> Option<String> {
        self.slot.read().await.token.clone()
    }

    pub async fn current(&self) -> Option<Session> {
        self.slot.read().await.session.clone()
    }

    pub async fn caller(&self) -> Option<Caller> {
        self.slot.read().await.session.as_ref().map(Caller::from)
    }
}
