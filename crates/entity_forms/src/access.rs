//! Authentication and permission checks evaluated before a form is mounted.
//!
//! A page builds an [`AccessGate`] from an ordered [`GuardChain`]. The gate
//! either hands back an [`Admission`], which is the only way to mount an
//! [`EntityFormController`](crate::EntityFormController), or a [`Redirect`].

use chrono::{DateTime, Utc};
use shared::domain::{AccessOperation, Permission, Principal};
use tracing::warn;

use crate::navigation::NavigationContext;

/// Route unauthenticated or unauthorized callers are sent to.
pub const HOME_ROUTE: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub principal: Principal,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

#[derive(Debug, Clone)]
pub struct GateContext {
    session: Option<Session>,
    navigation: NavigationContext,
    now: DateTime<Utc>,
}

impl GateContext {
    pub fn new(session: Option<Session>, navigation: NavigationContext) -> Self {
        Self {
            session,
            navigation,
            now: Utc::now(),
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.session
            .as_ref()
            .filter(|session| session.is_active(self.now))
    }

    pub fn navigation(&self) -> &NavigationContext {
        &self.navigation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    SessionExpired,
    MissingPermission(Permission),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    pub reason: DenyReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Redirect(Redirect),
}

pub trait Guard: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, context: &GateContext) -> GateDecision;
}

/// Requires an active session.
#[derive(Debug, Clone)]
pub struct RequireSession {
    pub redirect_to: String,
}

impl Default for RequireSession {
    fn default() -> Self {
        Self {
            redirect_to: HOME_ROUTE.to_string(),
        }
    }
}

impl Guard for RequireSession {
    fn name(&self) -> &'static str {
        "require_session"
    }

    fn check(&self, context: &GateContext) -> GateDecision {
        let reason = match context.session() {
            None => DenyReason::Unauthenticated,
            Some(session) if !session.is_active(context.now) => DenyReason::SessionExpired,
            Some(_) => return GateDecision::Pass,
        };
        GateDecision::Redirect(Redirect {
            to: self.redirect_to.clone(),
            reason,
        })
    }
}

/// Requires the session principal to hold `permission`.
#[derive(Debug, Clone)]
pub struct RequirePermission {
    pub permission: Permission,
    pub redirect_to: String,
}

impl RequirePermission {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            redirect_to: HOME_ROUTE.to_string(),
        }
    }
}

impl Guard for RequirePermission {
    fn name(&self) -> &'static str {
        "require_permission"
    }

    fn check(&self, context: &GateContext) -> GateDecision {
        let granted = context
            .active_session()
            .is_some_and(|session| session.principal.can(&self.permission));
        if granted {
            GateDecision::Pass
        } else {
            GateDecision::Redirect(Redirect {
                to: self.redirect_to.clone(),
                reason: DenyReason::MissingPermission(self.permission.clone()),
            })
        }
    }
}

#[derive(Default)]
pub struct GuardChain {
    guards: Vec<Box<dyn Guard>>,
}

impl GuardChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Runs guards in order and stops at the first redirect.
    pub fn evaluate(&self, context: &GateContext) -> Result<(), Redirect> {
        for guard in &self.guards {
            if let GateDecision::Redirect(redirect) = guard.check(context) {
                warn!(
                    guard = guard.name(),
                    path = context.navigation().path(),
                    redirect_to = %redirect.to,
                    reason = ?redirect.reason,
                    "access gate redirected"
                );
                return Err(redirect);
            }
        }
        Ok(())
    }
}

/// Proof that a caller passed an [`AccessGate`].
#[derive(Debug, Clone)]
pub struct Admission {
    principal: Principal,
    navigation: NavigationContext,
}

impl Admission {
    pub(crate) fn new(principal: Principal, navigation: NavigationContext) -> Self {
        Self {
            principal,
            navigation,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn navigation(&self) -> &NavigationContext {
        &self.navigation
    }
}

pub struct AccessGate {
    chain: GuardChain,
}

impl AccessGate {
    pub fn new(chain: GuardChain) -> Self {
        Self { chain }
    }

    /// Session check followed by a project permission check for `entity`.
    pub fn for_entity(entity: &str, operation: AccessOperation) -> Self {
        Self::new(
            GuardChain::new()
                .then(RequireSession::default())
                .then(RequirePermission::new(Permission::project(entity, operation))),
        )
    }

    pub fn admit(&self, context: GateContext) -> Result<Admission, Redirect> {
        self.chain.evaluate(&context)?;
        let GateContext {
            session,
            navigation,
            ..
        } = context;
        match session {
            Some(session) => Ok(Admission::new(session.principal, navigation)),
            None => Err(Redirect {
                to: HOME_ROUTE.to_string(),
                reason: DenyReason::Unauthenticated,
            }),
        }
    }
}

#[cfg(test)]
#[path = "tests/access_tests.rs"]
mod tests;
