use serde::{Deserialize, Serialize};

use crate::session::Flash;
use crate::users::repo::User;

#[derive(Debug, Serialize)]
pub struct ProfilePage {
    pub user: User,
    pub flash: Vec<Flash>,
}

/// Form body for editing the logged-in user's own profile. No password and
/// no activation flag here.
#[derive(Debug, Deserialize)]
pub struct EditProfileForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordForm {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct ChangePasswordResponse {
    pub success: bool,
    pub message: String,
}
