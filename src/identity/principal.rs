use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw user profile as returned by the login endpoint.
pub type Profile = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    BackOffice,
    FieldEngineer,
    Customer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::BackOffice, Role::FieldEngineer, Role::Customer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::BackOffice => "BACK_OFFICE",
            Role::FieldEngineer => "FIELD_ENGINEER",
            Role::Customer => "CUSTOMER",
        }
    }

    /// Lenient parse: case-insensitive, accepts a Spring `ROLE_` prefix and '-' or ' '
    /// in place of '_'.
    pub fn parse(s: &str) -> Option<Role> {
        let up = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        let up = up.strip_prefix("ROLE_").unwrap_or(&up);
        match up {
            "ADMIN" => Some(Role::Admin),
            "BACK_OFFICE" | "BACKOFFICE" => Some(Role::BackOffice),
            "FIELD_ENGINEER" | "ENGINEER" => Some(Role::FieldEngineer),
            "CUSTOMER" => Some(Role::Customer),
            _ => None,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| format!("unknown role: {}", s))
    }
}

/// Who is logged in, as far as the client can tell from token claims and the profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
    pub role: Option<Role>,
    pub tenant_id: Option<String>,
    pub profile: Option<Profile>,
}

const INACTIVE_STATUSES: [&str; 5] = ["INACTIVE", "EXPIRED", "SUSPENDED", "CANCELLED", "CANCELED"];

/// True when the profile reports a lapsed subscription, either as a boolean
/// `subscriptionActive: false` or as a status string (top level or nested under
/// `subscription`).
pub fn subscription_inactive(profile: &Profile) -> bool {
    if let Some(false) = profile.get("subscriptionActive").and_then(|v| v.as_bool()) {
        return true;
    }
    let status = profile
        .get("subscriptionStatus")
        .or_else(|| profile.get("subscription").and_then(|s| s.get("status")))
        .and_then(|v| v.as_str());
    match status {
        Some(s) => INACTIVE_STATUSES.iter().any(|x| x.eq_ignore_ascii_case(s.trim())),
        None => false,
    }
}

/// Best-effort human label for a profile.
pub fn display_name(profile: &Profile) -> Option<String> {
    ["fullName", "name", "username", "email"]
        .iter()
        .filter_map(|k| profile.get(*k).and_then(|v| v.as_str()))
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(v: Value) -> Profile { v.as_object().cloned().unwrap() }

    #[test]
    fn role_parse_tolerates_spellings() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("role_back_office"), Some(Role::BackOffice));
        assert_eq!(Role::parse("Field-Engineer"), Some(Role::FieldEngineer));
        assert_eq!(Role::parse(" customer "), Some(Role::Customer));
        assert_eq!(Role::parse("janitor"), None);
        assert_eq!("FIELD_ENGINEER".parse::<Role>().unwrap().to_string(), "FIELD_ENGINEER");
    }

    #[test]
    fn subscription_flags() {
        assert!(subscription_inactive(&profile(json!({"subscriptionActive": false}))));
        assert!(subscription_inactive(&profile(json!({"subscriptionStatus": "expired"}))));
        assert!(subscription_inactive(&profile(json!({"subscription": {"status": "SUSPENDED"}}))));
        assert!(!subscription_inactive(&profile(json!({"subscriptionStatus": "ACTIVE"}))));
        assert!(!subscription_inactive(&profile(json!({"name": "Ana"}))));
    }

    #[test]
    fn display_name_prefers_full_name() {
        assert_eq!(display_name(&profile(json!({"email": "a@x.io", "fullName": "Ana Lee"}))).as_deref(), Some("Ana Lee"));
        assert_eq!(display_name(&profile(json!({"email": "a@x.io"}))).as_deref(), Some("a@x.io"));
        assert_eq!(display_name(&profile(json!({}))), None);
    }
}
