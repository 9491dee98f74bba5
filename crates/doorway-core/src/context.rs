//! Per-request context.
//!
//! A [`RequestContext`] is built fresh for every request and passed down
//! the handler's call chain. It holds who is signed in and where, along
//! with the client metadata recorded on new sessions.

use crate::models::{account::Account, identity::Identity, session::Session, user::User};

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub session: Option<Session>,
    pub identity: Option<Identity>,
    /// The session's active user, when the request is scoped to an
    /// account the identity belongs to.
    pub user: Option<User>,
    pub account: Option<Account>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl RequestContext {
    pub fn anonymous(user_agent: Option<String>, ip_address: Option<String>) -> Self {
        Self {
            user_agent,
            ip_address,
            ..Default::default()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some() && self.identity.is_some()
    }
}
