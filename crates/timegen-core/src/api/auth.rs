use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use timegen_types::{AuthTokens, UserIdentity};

use super::ApiError;
use crate::gateway::{ApiRequest, AuthGateway};
use crate::validation;

#[derive(Debug, Deserialize)]
struct ForgotPasswordResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Login, registration, logout and password reset.
#[derive(Debug, Clone)]
pub struct AuthService {
    gateway: Arc<AuthGateway>,
}

impl AuthService {
    pub fn new(gateway: Arc<AuthGateway>) -> Self {
        Self { gateway }
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.gateway.session().user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.gateway.session().is_authenticated()
    }

    /// Signs in and stores the returned identity and credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserIdentity, ApiError> {
        validation::validate_login(email, password)?;
        let request = ApiRequest::post("auth/login")
            .json(json!({ "email": email.trim(), "password": password }));
        self.start_session(&request, "Login failed").await
    }

    /// Creates an account and signs in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<UserIdentity, ApiError> {
        validation::validate_registration(email, password, name)?;
        let request = ApiRequest::post("auth/register").json(json!({
            "email": email.trim(),
            "password": password,
            "name": name.trim(),
        }));
        self.start_session(&request, "Registration failed").await
    }

    async fn start_session(
        &self,
        request: &ApiRequest,
        default: &str,
    ) -> Result<UserIdentity, ApiError> {
        let response = self.gateway.call_anonymous(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(&response, default));
        }

        let tokens: AuthTokens = response.json().map_err(ApiError::Decode)?;
        let Some(user) = tokens.user.clone() else {
            return Err(ApiError::Status {
                status: response.status().as_u16(),
                message: format!("{default}: response carried no user"),
            });
        };

        self.gateway
            .session()
            .establish(tokens)
            .map_err(ApiError::Session)?;
        tracing::info!(user = %user.id, "Signed in");
        Ok(user)
    }

    /// Ends the session.
    ///
    /// The server is told on a best-effort basis; local credentials and
    /// cookies are cleared whatever it answers.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let session = self.gateway.session();
        // sent even without a refresh token; the body then carries null
        let request = ApiRequest::post("auth/logout")
            .json(json!({ "refreshToken": session.refresh_token() }));
        match self.gateway.call(&request).await {
            Ok(response) if response.is_success() => {}
            Ok(response) => tracing::warn!(
                status = response.status().as_u16(),
                "Server logout rejected; clearing local session anyway"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                "Server logout failed; clearing local session anyway"
            ),
        }

        session.clear().map_err(ApiError::Session)?;
        if let Err(e) = self.gateway.cookies().clear() {
            tracing::warn!(error = %format!("{e:#}"), "Cookies were not cleared");
        }
        tracing::info!("Signed out");
        Ok(())
    }

    /// Starts a password reset. Returns the reset token when the server hands one back.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>, ApiError> {
        validation::validate_email(email)?;
        let request =
            ApiRequest::post("auth/forgot-password").json(json!({ "email": email.trim() }));
        let response = self.gateway.call_anonymous(&request).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(&response, "Failed"));
        }

        // older deployments answer with a bare message
        let body: Option<ForgotPasswordResponse> = response.json().ok();
        Ok(body
            .and_then(|b| b.token)
            .filter(|t| !t.trim().is_empty()))
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), ApiError> {
        validation::validate_reset(token, password)?;
        let request = ApiRequest::post("auth/reset-password")
            .json(json!({ "token": token.trim(), "password": password }));
        let response = self.gateway.call_anonymous(&request).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(&response, "Failed"));
        }
        Ok(())
    }
}
