//! Session, identity and route gating for the operations portal.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod claims;
mod session;
mod provider;
mod authorizer;

pub use principal::{display_name, subscription_inactive, Identity, Profile, Role};
pub use claims::{decode_claims, TokenClaims, ROLE_CLAIM_KEYS, TENANT_CLAIM_KEYS};
pub use session::{Session, SessionStore, PROFILE_KEY, TOKEN_KEY};
pub use provider::{AuthService, LoginRequest};
pub use authorizer::{check_navigation, home_for, NavigationDecision, NavigationGuard, RouteRule, INACTIVE_SUBSCRIPTION_NOTICE, LOGIN_PATH};

#[cfg(test)]
pub(crate) use claims::encode_test_token;
