use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::local_store::LocalStore;

use super::claims::{decode_claims, TokenClaims};
use super::principal::{Identity, Profile, Role};

/// Durable key holding the raw bearer token.
pub const TOKEN_KEY: &str = "fieldops.token";
/// Durable key holding the serialized user profile.
pub const PROFILE_KEY: &str = "fieldops.user";

/// Snapshot of the authentication state. Identity is always derived from the token;
/// without a token every identity field is absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub identity: Identity,
    pub claims: TokenClaims,
}

impl Session {
    pub fn anonymous() -> Self { Self::default() }

    pub fn from_token(token: String, profile: Option<Profile>) -> Self {
        let claims = decode_claims(&token);
        let identity = Identity {
            role: claims.role,
            tenant_id: claims.tenant_id.clone(),
            profile,
        };
        Self { token: Some(token), identity, claims }
    }

    pub fn is_authenticated(&self) -> bool { self.token.is_some() }
    pub fn role(&self) -> Option<Role> { self.identity.role }
    pub fn tenant_id(&self) -> Option<&str> { self.identity.tenant_id.as_deref() }
    pub fn profile(&self) -> Option<&Profile> { self.identity.profile.as_ref() }
}

struct State {
    session: Session,
    hydrated: bool,
}

/// Authoritative "who is logged in", kept in step with durable storage.
///
/// Shared as `Arc<SessionStore>` between the request gateway and navigation guards.
/// Every write takes the state lock first and holds it across the storage update, so no
/// reader observes memory and storage out of step.
pub struct SessionStore {
    state: RwLock<State>,
    storage: Arc<dyn LocalStore>,
}

impl SessionStore {
    /// Store that has not read durable storage yet. Token lookups fall back to storage
    /// until `hydrate` runs.
    pub fn new(storage: Arc<dyn LocalStore>) -> Self {
        Self {
            state: RwLock::new(State { session: Session::anonymous(), hydrated: false }),
            storage,
        }
    }

    /// Create the store and seed it from durable storage.
    pub fn open(storage: Arc<dyn LocalStore>) -> Arc<Self> {
        let store = Self::new(storage);
        store.hydrate();
        Arc::new(store)
    }

    /// Read durable storage once. Unreadable entries degrade to an anonymous session.
    pub fn hydrate(&self) {
        let mut st = self.state.write();
        if st.hydrated { return; }
        let token = match self.storage.get(TOKEN_KEY) {
            Ok(t) => t.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                warn!(target: "session", "failed to read stored token: {:#}", e);
                None
            }
        };
        st.session = match token {
            Some(token) => {
                let profile = self.read_profile();
                let s = Session::from_token(token, profile);
                info!(target: "session", "restored session role={:?} tenant={:?}", s.role(), s.tenant_id());
                s
            }
            None => Session::anonymous(),
        };
        st.hydrated = true;
    }

    fn read_profile(&self) -> Option<Profile> {
        let raw = match self.storage.get(PROFILE_KEY) {
            Ok(r) => r?,
            Err(e) => {
                warn!(target: "session", "failed to read stored profile: {:#}", e);
                return None;
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(m)) => Some(m),
            _ => {
                debug!(target: "session", "stored profile is not a JSON object; ignoring");
                None
            }
        }
    }

    pub fn is_hydrated(&self) -> bool { self.state.read().hydrated }

    pub fn snapshot(&self) -> Session { self.state.read().session.clone() }

    /// Token for outgoing requests. Before hydration the stored token is read directly.
    pub fn current_token(&self) -> Option<String> {
        {
            let st = self.state.read();
            if st.hydrated { return st.session.token.clone(); }
        }
        self.storage.get(TOKEN_KEY).ok().flatten().filter(|t| !t.trim().is_empty())
    }

    /// Replace the session with a freshly issued token and profile.
    pub fn set_credentials(&self, token: &str, profile: Option<Profile>) -> ApiResult<Session> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ApiError::validation("token", "token must not be empty"));
        }
        let next = Session::from_token(token.to_string(), profile);
        let mut st = self.state.write();
        self.write_entries(token, next.profile())?;
        st.session = next.clone();
        st.hydrated = true;
        info!(target: "session", "credentials set role={:?} tenant={:?}", next.role(), next.tenant_id());
        Ok(next)
    }

    /// Swap the profile while keeping the current token. No-op error when logged out.
    pub fn update_profile(&self, profile: Profile) -> ApiResult<Session> {
        let mut st = self.state.write();
        let Some(token) = st.session.token.clone() else {
            return Err(ApiError::validation("token", "no active session"));
        };
        let json = Value::Object(profile.clone()).to_string();
        self.storage.set(PROFILE_KEY, &json)?;
        st.session.identity.profile = Some(profile);
        debug!(target: "session", "profile refreshed for token ending ..{}", tail(&token));
        Ok(st.session.clone())
    }

    /// Clear memory and durable storage. The token entry goes first: while it cannot be
    /// removed (or blanked) the session stays as it is, so a restart never revives a
    /// session this process reported as cleared. Once the token is gone memory is cleared;
    /// a leftover profile entry is never read without a token.
    pub fn logout(&self) -> ApiResult<()> {
        let mut st = self.state.write();
        if let Err(e) = self.storage.remove(TOKEN_KEY) {
            warn!(target: "session", "failed to remove stored token: {:#}", e);
            self.storage.set(TOKEN_KEY, "")?;
        }
        st.session = Session::anonymous();
        st.hydrated = true;
        info!(target: "session", "session cleared");
        self.storage.remove(PROFILE_KEY)?;
        Ok(())
    }

    /// Profile first, token last. A failed token write restores the previous profile entry,
    /// so storage keeps describing the session that is still in memory.
    fn write_entries(&self, token: &str, profile: Option<&Profile>) -> ApiResult<()> {
        let previous_profile = self.storage.get(PROFILE_KEY)?;
        match profile {
            Some(p) => self.storage.set(PROFILE_KEY, &Value::Object(p.clone()).to_string())?,
            None => self.storage.remove(PROFILE_KEY)?,
        }
        if let Err(e) = self.storage.set(TOKEN_KEY, token) {
            let restored = match &previous_profile {
                Some(raw) => self.storage.set(PROFILE_KEY, raw),
                None => self.storage.remove(PROFILE_KEY),
            };
            if let Err(re) = restored {
                warn!(target: "session", "failed to restore stored profile: {:#}", re);
            }
            return Err(e.into());
        }
        Ok(())
    }
}

fn tail(token: &str) -> &str {
    let n = token.len();
    token.get(n.saturating_sub(6)..).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::claims::encode_test_token;
    use crate::local_store::MemoryStore;
    use serde_json::json;

    fn profile() -> Profile {
        json!({"email": "eng@example.com", "subscriptionStatus": "ACTIVE"}).as_object().cloned().unwrap()
    }

    /// Storage whose writes or removals fail for selected keys.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_set: Vec<&'static str>,
        fail_remove: Vec<&'static str>,
    }

    impl LocalStore for FlakyStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> { self.inner.get(key) }
        fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            if self.fail_set.contains(&key) { anyhow::bail!("disk full"); }
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> anyhow::Result<()> {
            if self.fail_remove.contains(&key) { anyhow::bail!("read-only"); }
            self.inner.remove(key)
        }
    }

    fn stored(s: &FlakyStore, key: &str) -> Option<String> { s.inner.get(key).unwrap() }

    #[test]
    fn failed_profile_write_changes_nothing() {
        let storage = Arc::new(FlakyStore { fail_set: vec![PROFILE_KEY], ..Default::default() });
        let store = SessionStore::open(storage.clone());
        assert!(store.set_credentials("new.tok.en", Some(profile())).is_err());
        assert_eq!(store.snapshot().token, None);
        assert_eq!(stored(&storage, TOKEN_KEY), None);
        assert!(!SessionStore::open(storage).snapshot().is_authenticated());
    }

    #[test]
    fn failed_token_write_restores_previous_profile() {
        let storage = Arc::new(FlakyStore { fail_set: vec![TOKEN_KEY], ..Default::default() });
        let before = Value::Object(profile()).to_string();
        storage.inner.set(TOKEN_KEY, "old.tok.en").unwrap();
        storage.inner.set(PROFILE_KEY, &before).unwrap();
        let store = SessionStore::open(storage.clone());

        let other = json!({"email": "someone@else.io"}).as_object().cloned().unwrap();
        assert!(store.set_credentials("new.tok.en", Some(other)).is_err());

        assert_eq!(store.snapshot().token.as_deref(), Some("old.tok.en"));
        assert_eq!(stored(&storage, TOKEN_KEY).as_deref(), Some("old.tok.en"));
        assert_eq!(stored(&storage, PROFILE_KEY), Some(before));
        assert_eq!(SessionStore::open(storage).snapshot(), store.snapshot());
    }

    #[test]
    fn logout_blanks_token_it_cannot_remove() {
        let storage = Arc::new(FlakyStore { fail_remove: vec![TOKEN_KEY], ..Default::default() });
        let store = SessionStore::open(storage.clone());
        store.set_credentials("a.b.c", Some(profile())).unwrap();
        store.logout().unwrap();
        assert!(!store.snapshot().is_authenticated());
        assert_eq!(stored(&storage, TOKEN_KEY).as_deref(), Some(""));
        assert!(!SessionStore::open(storage).snapshot().is_authenticated());
    }

    #[test]
    fn logout_keeps_session_when_token_is_stuck() {
        let storage = Arc::new(FlakyStore { fail_set: vec![TOKEN_KEY], fail_remove: vec![TOKEN_KEY], ..Default::default() });
        storage.inner.set(TOKEN_KEY, "a.b.c").unwrap();
        let store = SessionStore::open(storage.clone());
        assert!(store.logout().is_err());
        assert_eq!(store.snapshot().token.as_deref(), Some("a.b.c"));
        assert_eq!(SessionStore::open(storage).snapshot(), store.snapshot());
    }

    #[test]
    fn set_credentials_writes_memory_and_storage() {
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::open(storage.clone());
        let token = encode_test_token(&json!({"role": "FIELD_ENGINEER", "tenantId": "acme"}));
        let s = store.set_credentials(&token, Some(profile())).unwrap();
        assert_eq!(s.role(), Some(Role::FieldEngineer));
        assert_eq!(s.tenant_id(), Some("acme"));
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some(token.as_str()));
        let stored: Value = serde_json::from_str(&storage.get(PROFILE_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored["email"], "eng@example.com");
        assert_eq!(store.snapshot(), s);
    }

    #[test]
    fn malformed_token_keeps_token_without_identity() {
        let store = SessionStore::open(Arc::new(MemoryStore::new()));
        let s = store.set_credentials("not-a-jwt", None).unwrap();
        assert_eq!(s.token.as_deref(), Some("not-a-jwt"));
        assert_eq!(s.role(), None);
        assert_eq!(s.tenant_id(), None);
    }

    #[test]
    fn logout_clears_everything() {
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::open(storage.clone());
        let token = encode_test_token(&json!({"role": "ADMIN"}));
        store.set_credentials(&token, Some(profile())).unwrap();
        store.logout().unwrap();
        assert_eq!(store.snapshot(), Session::anonymous());
        assert!(storage.is_empty());
    }

    #[test]
    fn hydrate_restores_from_storage() {
        let storage = Arc::new(MemoryStore::new());
        let token = encode_test_token(&json!({"userRole": "CUSTOMER", "tenant_id": "t1"}));
        storage.set(TOKEN_KEY, &token).unwrap();
        storage.set(PROFILE_KEY, r#"{"name":"Kim"}"#).unwrap();

        let store = SessionStore::new(storage.clone());
        // before hydration the gateway still sees the stored token
        assert!(!store.is_hydrated());
        assert_eq!(store.current_token().as_deref(), Some(token.as_str()));
        assert_eq!(store.snapshot().token, None);

        store.hydrate();
        let s = store.snapshot();
        assert_eq!(s.role(), Some(Role::Customer));
        assert_eq!(s.tenant_id(), Some("t1"));
        assert_eq!(s.profile().and_then(|p| p.get("name")).and_then(|v| v.as_str()), Some("Kim"));
    }

    #[test]
    fn corrupt_profile_is_ignored() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(TOKEN_KEY, "x.y.z").unwrap();
        storage.set(PROFILE_KEY, "{not json").unwrap();
        let store = SessionStore::open(storage);
        let s = store.snapshot();
        assert!(s.is_authenticated());
        assert!(s.profile().is_none());
    }

    #[test]
    fn update_profile_requires_session() {
        let store = SessionStore::open(Arc::new(MemoryStore::new()));
        assert!(matches!(store.update_profile(profile()), Err(ApiError::Validation { .. })));
        store.set_credentials("a.b.c", None).unwrap();
        let s = store.update_profile(profile()).unwrap();
        assert_eq!(s.token.as_deref(), Some("a.b.c"));
        assert!(s.profile().is_some());
    }
}
