use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::gateway::{ApiRequest, Gateway};

use super::principal::Profile;
use super::session::Session;

pub const LOGIN_ENDPOINT: &str = "auth/login";
pub const PROFILE_ENDPOINT: &str = "auth/me";

const TOKEN_FIELDS: [&str; 3] = ["token", "accessToken", "access_token"];
const PROFILE_FIELDS: [&str; 2] = ["user", "profile"];

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if self.email.trim().is_empty() {
            return Err(ApiError::validation("email", "email is required"));
        }
        if self.password.is_empty() {
            return Err(ApiError::validation("password", "password is required"));
        }
        Ok(())
    }
}

/// Login/logout flows on top of the gateway and its session store.
#[derive(Clone)]
pub struct AuthService {
    gateway: Arc<Gateway>,
}

impl AuthService {
    pub fn new(gateway: Arc<Gateway>) -> Self { Self { gateway } }

    /// Exchange credentials for a token and store it.
    pub async fn login(&self, req: &LoginRequest) -> ApiResult<Session> {
        req.validate()?;
        let body = json!({"email": req.email.trim(), "password": req.password});
        let resp = self.gateway.send(ApiRequest::post(LOGIN_ENDPOINT).json(body)).await?;
        let status = resp.status;
        let v = resp.into_json()?;
        let Some(token) = TOKEN_FIELDS.iter().find_map(|k| v.get(*k).and_then(|t| t.as_str())).filter(|t| !t.trim().is_empty()) else {
            return Err(ApiError::invalid_response(status, "login response did not include a token"));
        };
        let profile = profile_from(&v);
        let session = self.gateway.session().set_credentials(token, profile)?;
        info!(target: "auth", "logged in as {} role={:?}", req.email.trim(), session.role());
        Ok(session)
    }

    pub fn logout(&self) -> ApiResult<()> {
        info!(target: "auth", "logout");
        self.gateway.session().logout()
    }

    /// Reload the user profile, keeping the current token.
    pub async fn refresh_profile(&self) -> ApiResult<Session> {
        let resp = self.gateway.send(ApiRequest::get(PROFILE_ENDPOINT)).await?;
        let status = resp.status;
        let v = resp.into_json()?;
        // the endpoint may answer with the profile itself or wrap it like login does
        let profile = profile_from(&v).or_else(|| v.as_object().cloned());
        match profile {
            Some(p) => self.gateway.session().update_profile(p),
            None => Err(ApiError::invalid_response(status, "profile response was not an object")),
        }
    }
}

fn profile_from(v: &Value) -> Option<Profile> {
    PROFILE_FIELDS.iter().find_map(|k| v.get(*k).and_then(|p| p.as_object()).cloned())
}
