use serde::{Deserialize, Serialize};

use crate::session::Flash;
use crate::users::repo::User;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}
fn default_per_page() -> i64 {
    10
}

/// Form body for the admin "create user" screen. The activation checkbox
/// follows HTML form semantics: present as "on" or absent.
#[derive(Debug, Deserialize)]
pub struct CreateUserForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_active: Option<String>,
}

/// Form body for the admin "edit user" screen. Absent fields stay untouched.
#[derive(Debug, Deserialize)]
pub struct EditUserForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_active: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserListPage {
    pub users: Vec<User>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub flash: Vec<Flash>,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub user: User,
    pub flash: Vec<Flash>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub total: i64,
}

/// Dashboard counters. `Default` doubles as the degraded all-zero snapshot.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct UserStatistics {
    pub total_users: i64,
    pub active_users: i64,
    pub inactive_users: i64,
    pub users_today: i64,
    pub users_week: i64,
    pub users_month: i64,
    pub active_percentage: f64,
}

/// One bar of the registrations-per-month chart.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyRegistration {
    pub month: String,
    pub year: i32,
    pub count: i64,
    /// Sortable `YYYY-MM` key.
    pub full_date: String,
}
