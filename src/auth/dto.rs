use serde::{Deserialize, Serialize};

use crate::session::Flash;

/// Form body for login.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username_or_email: String,
    #[serde(default)]
    pub password: String,
}

/// Form body for registration.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Payload for the login/register pages: just the pending notices.
#[derive(Debug, Serialize)]
pub struct AuthPage {
    pub flash: Vec<Flash>,
}
