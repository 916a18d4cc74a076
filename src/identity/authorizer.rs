use tracing::debug;

use super::principal::{subscription_inactive, Role};
use super::session::{Session, SessionStore};

pub const LOGIN_PATH: &str = "/login";
pub const INACTIVE_SUBSCRIPTION_NOTICE: &str =
    "Your subscription is inactive. Please contact your administrator to restore access.";

/// Outcome of a navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    /// Send the user to the login screen. `return_to` is set when the user was not logged
    /// in, so the original destination can be resumed after login.
    RedirectToLogin { login_path: String, return_to: Option<String> },
    /// Terminal notice; no redirect.
    Blocked { notice: String },
}

impl NavigationDecision {
    pub fn is_allowed(&self) -> bool { matches!(self, NavigationDecision::Allow) }
}

/// Gate a single navigation given the roles a route requires.
///
/// Order: missing token, role membership, subscription state. A role mismatch redirects to
/// login rather than to a dedicated forbidden screen.
pub fn check_navigation(required: Option<&[Role]>, session: &Session, path: &str) -> NavigationDecision {
    if !session.is_authenticated() {
        return NavigationDecision::RedirectToLogin {
            login_path: LOGIN_PATH.to_string(),
            return_to: Some(path.to_string()),
        };
    }
    if let Some(roles) = required {
        let member = session.role().map(|r| roles.contains(&r)).unwrap_or(false);
        if !member {
            debug!(target: "navigation", "role {:?} not in {:?} for {}", session.role(), roles, path);
            return NavigationDecision::RedirectToLogin { login_path: LOGIN_PATH.to_string(), return_to: None };
        }
    }
    let inactive = session.profile().map(subscription_inactive).unwrap_or(false);
    if inactive && session.role() != Some(Role::Admin) {
        return NavigationDecision::Blocked { notice: INACTIVE_SUBSCRIPTION_NOTICE.to_string() };
    }
    NavigationDecision::Allow
}

#[derive(Debug, Clone)]
pub struct RouteRule {
    pub prefix: String,
    /// `None` means any authenticated user
    pub roles: Option<Vec<Role>>,
}

/// Prefix-matched route table in front of `check_navigation`. Paths that match no rule are
/// public.
#[derive(Debug, Clone, Default)]
pub struct NavigationGuard {
    rules: Vec<RouteRule>,
}

impl NavigationGuard {
    pub fn new() -> Self { Self::default() }

    pub fn with_rule(mut self, prefix: &str, roles: Option<&[Role]>) -> Self {
        self.rules.push(RouteRule { prefix: prefix.to_string(), roles: roles.map(|r| r.to_vec()) });
        self
    }

    /// Sections of the operations portal and who may open them.
    pub fn platform_default() -> Self {
        use Role::*;
        NavigationGuard::new()
            .with_rule("/admin", Some(&[Admin]))
            .with_rule("/back-office", Some(&[Admin, BackOffice]))
            .with_rule("/engineer", Some(&[FieldEngineer]))
            .with_rule("/customer", Some(&[Customer]))
            .with_rule("/proposals", Some(&[Admin, BackOffice, Customer]))
            .with_rule("/work-orders", Some(&[Admin, BackOffice, FieldEngineer]))
            .with_rule("/invoices", Some(&[Admin, BackOffice, Customer]))
            .with_rule("/profile", None)
    }

    /// Longest matching prefix on a segment boundary.
    pub fn rule_for(&self, path: &str) -> Option<&RouteRule> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        self.rules
            .iter()
            .filter(|r| {
                let p = r.prefix.trim_end_matches('/');
                path == p || path.strip_prefix(p).map(|rest| rest.starts_with('/')).unwrap_or(false)
            })
            .max_by_key(|r| r.prefix.len())
    }

    pub fn check(&self, session: &Session, path: &str) -> NavigationDecision {
        match self.rule_for(path) {
            Some(rule) => check_navigation(rule.roles.as_deref(), session, path),
            None => NavigationDecision::Allow,
        }
    }

    pub fn navigate(&self, store: &SessionStore, path: &str) -> NavigationDecision {
        self.check(&store.snapshot(), path)
    }
}

/// Landing page after login.
pub fn home_for(role: Option<Role>) -> &'static str {
    match role {
        Some(Role::Admin) => "/admin",
        Some(Role::BackOffice) => "/back-office",
        Some(Role::FieldEngineer) => "/engineer",
        Some(Role::Customer) => "/customer",
        None => "/profile",
    }
}
