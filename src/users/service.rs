//! Business rules for user accounts: validation, uniqueness, authentication
//! and dashboard aggregation.

use std::collections::HashMap;

use sqlx::PgPool;
use time::{Date, Duration, Month, OffsetDateTime};
use tracing::{info, warn};

use crate::auth::password::{hash_password, verify_password};
use crate::error::ServiceError;
use crate::users::dto::{MonthlyRegistration, UserStatistics};
use crate::users::repo::{self, NewUser, User};

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub phone: Option<String>,
    pub is_active: bool,
}

/// Partial update: absent fields are left untouched, never nulled. An empty
/// password also leaves the stored hash unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn create_user(db: &PgPool, data: CreateUser) -> Result<User, ServiceError> {
    validate_new_user(&data)?;

    let email_taken = repo::exists_by_email(db, &data.email, None).await?;
    let username_taken =
        !email_taken && repo::exists_by_username(db, &data.username, None).await?;
    uniqueness_conflict(email_taken, username_taken)?;

    let password_hash = hash_password(&data.password)?;
    let user = repo::create(
        db,
        &NewUser {
            name: &data.name,
            email: &data.email,
            username: &data.username,
            password_hash: &password_hash,
            phone: data.phone.as_deref(),
            is_active: data.is_active,
        },
    )
    .await?;

    info!(user_id = user.id, username = %user.username, "user created");
    Ok(user)
}

pub async fn get_user_by_id(db: &PgPool, id: i64) -> Result<Option<User>, ServiceError> {
    Ok(repo::find_by_id(db, id).await?)
}

pub async fn get_all_users(
    db: &PgPool,
    page: i64,
    per_page: i64,
) -> Result<(Vec<User>, i64), ServiceError> {
    Ok(repo::find_all(db, page, per_page).await?)
}

pub async fn update_user(db: &PgPool, id: i64, patch: UserPatch) -> Result<User, ServiceError> {
    let mut user = repo::find_by_id(db, id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Usuário não encontrado"))?;

    // Uniqueness is only re-checked when the field actually changes, and the
    // probe excludes the record being edited.
    let email_taken = match patch.email.as_deref() {
        Some(email) if email != user.email => repo::exists_by_email(db, email, Some(id)).await?,
        _ => false,
    };
    let username_taken = match patch.username.as_deref() {
        Some(username) if username != user.username => {
            !email_taken && repo::exists_by_username(db, username, Some(id)).await?
        }
        _ => false,
    };
    uniqueness_conflict(email_taken, username_taken)?;

    apply_patch(&mut user, &patch)?;
    let updated = repo::update(db, &user).await?;
    info!(user_id = updated.id, "user updated");
    Ok(updated)
}

pub async fn delete_user(db: &PgPool, id: i64) -> Result<(), ServiceError> {
    if repo::find_by_id(db, id).await?.is_none() {
        return Err(ServiceError::not_found("Usuário não encontrado"));
    }
    repo::delete(db, id).await?;
    info!(user_id = id, "user deleted");
    Ok(())
}

pub async fn toggle_user_status(db: &PgPool, id: i64) -> Result<User, ServiceError> {
    let mut user = repo::find_by_id(db, id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Usuário não encontrado"))?;
    user.is_active = !user.is_active;
    let updated = repo::update(db, &user).await?;
    info!(user_id = updated.id, is_active = updated.is_active, "user status toggled");
    Ok(updated)
}

/// Authenticates by username first, falling back to email. Unknown account
/// and wrong password yield the same generic error; an inactive account gets
/// a distinct message.
pub async fn authenticate(
    db: &PgPool,
    identifier: &str,
    password: &str,
) -> Result<User, ServiceError> {
    let by_username = repo::find_by_username(db, identifier).await?;
    let by_email = if by_username.is_some() {
        None
    } else {
        repo::find_by_email(db, identifier).await?
    };
    check_login(lookup_account(by_username, by_email), password)
}

/// Dashboard counters. A data-layer failure degrades to the all-zero
/// snapshot instead of failing the page.
pub async fn get_user_statistics(db: &PgPool) -> UserStatistics {
    match load_statistics(db).await {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %e, "statistics query failed, returning empty snapshot");
            UserStatistics::default()
        }
    }
}

/// Registrations per calendar month, from `months` months before the current
/// month through the current month inclusive (`months + 1` entries), with
/// zero-count entries for empty months. Degrades to an empty series on
/// data-layer failure.
pub async fn get_monthly_user_registrations(db: &PgPool, months: u32) -> Vec<MonthlyRegistration> {
    match load_monthly(db, months).await {
        Ok(series) => series,
        Err(e) => {
            warn!(error = %e, "monthly registrations query failed, returning empty series");
            Vec::new()
        }
    }
}

async fn load_statistics(db: &PgPool) -> anyhow::Result<UserStatistics> {
    let total_users = repo::count(db).await?;
    let active_users = repo::count_active(db).await?;

    let now = OffsetDateTime::now_utc();
    let today = now.date().midnight().assume_utc();
    let users_today = repo::count_created_between(db, today, today + Duration::days(1)).await?;
    let users_week = repo::count_created_after(db, now - Duration::days(7)).await?;
    let users_month = repo::count_created_after(db, now - Duration::days(30)).await?;

    Ok(UserStatistics {
        total_users,
        active_users,
        inactive_users: total_users - active_users,
        users_today,
        users_week,
        users_month,
        active_percentage: active_percentage(active_users, total_users),
    })
}

async fn load_monthly(db: &PgPool, months: u32) -> anyhow::Result<Vec<MonthlyRegistration>> {
    let today = OffsetDateTime::now_utc().date();
    let (start_year, start_month) = shift_months(today.year(), u8::from(today.month()) as u32, months);
    let since = Date::from_calendar_date(start_year, Month::try_from(start_month as u8)?, 1)?
        .midnight()
        .assume_utc();
    let counts = repo::monthly_registration_counts(db, since).await?;
    Ok(fill_monthly_buckets(
        today.year(),
        u8::from(today.month()) as u32,
        months,
        &counts,
    ))
}

// ---- pure helpers ----

/// Validation order is fixed: name, email, username, password.
fn validate_new_user(data: &CreateUser) -> Result<(), ServiceError> {
    if data.name.trim().is_empty() {
        return Err(ServiceError::validation("Nome é obrigatório"));
    }
    if data.email.trim().is_empty() {
        return Err(ServiceError::validation("Email é obrigatório"));
    }
    if data.username.trim().is_empty() {
        return Err(ServiceError::validation("Username é obrigatório"));
    }
    if data.password.is_empty() {
        return Err(ServiceError::validation("Senha é obrigatória"));
    }
    Ok(())
}

fn apply_patch(user: &mut User, patch: &UserPatch) -> Result<(), ServiceError> {
    if let Some(name) = &patch.name {
        user.name = name.clone();
    }
    if let Some(email) = &patch.email {
        user.email = email.clone();
    }
    if let Some(username) = &patch.username {
        user.username = username.clone();
    }
    if let Some(phone) = &patch.phone {
        user.phone = Some(phone.clone());
    }
    if let Some(is_active) = patch.is_active {
        user.is_active = is_active;
    }
    if let Some(password) = &patch.password {
        if !password.is_empty() {
            user.password_hash = hash_password(password)?;
        }
    }
    Ok(())
}

/// Maps the uniqueness probe results to the conflict error. Email conflicts
/// are reported before username conflicts.
fn uniqueness_conflict(email_taken: bool, username_taken: bool) -> Result<(), ServiceError> {
    if email_taken {
        return Err(ServiceError::conflict("Email já cadastrado"));
    }
    if username_taken {
        return Err(ServiceError::conflict("Username já cadastrado"));
    }
    Ok(())
}

/// A username match wins over an email match.
fn lookup_account(by_username: Option<User>, by_email: Option<User>) -> Option<User> {
    by_username.or(by_email)
}

/// Check order: existence, active flag, password.
fn check_login(user: Option<User>, password: &str) -> Result<User, ServiceError> {
    let Some(user) = user else {
        return Err(ServiceError::InvalidCredentials);
    };
    if !user.is_active {
        return Err(ServiceError::InactiveAccount);
    }
    if !verify_password(password, &user.password_hash)? {
        return Err(ServiceError::InvalidCredentials);
    }
    Ok(user)
}

/// Share of active users, rounded to one decimal. Zero when there are no
/// users at all.
fn active_percentage(active: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (active as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Walks `back` calendar months backwards from `(year, month)`.
fn shift_months(year: i32, month: u32, back: u32) -> (i32, u32) {
    let total = year * 12 + (month as i32 - 1) - back as i32;
    (total.div_euclid(12), (total.rem_euclid(12) + 1) as u32)
}

/// Expands sparse `(year, month, count)` rows into a dense chronological
/// series ending at `(end_year, end_month)`, zero-filling empty months.
fn fill_monthly_buckets(
    end_year: i32,
    end_month: u32,
    months: u32,
    counts: &[(i32, i32, i64)],
) -> Vec<MonthlyRegistration> {
    let by_month: HashMap<(i32, u32), i64> = counts
        .iter()
        .map(|&(year, month, count)| ((year, month as u32), count))
        .collect();

    let (mut year, mut month) = shift_months(end_year, end_month, months);
    let mut series = Vec::with_capacity(months as usize + 1);
    loop {
        series.push(MonthlyRegistration {
            month: month_label(month).to_string(),
            year,
            count: by_month.get(&(year, month)).copied().unwrap_or(0),
            full_date: format!("{year:04}-{month:02}"),
        });
        if (year, month) == (end_year, end_month) {
            break;
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    series
}

fn month_label(month: u32) -> &'static str {
    match month {
        1 => "Jan",
        2 => "Feb",
        3 => "Mar",
        4 => "Apr",
        5 => "May",
        6 => "Jun",
        7 => "Jul",
        8 => "Aug",
        9 => "Sep",
        10 => "Oct",
        11 => "Nov",
        12 => "Dec",
        _ => "???",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    fn sample_create() -> CreateUser {
        CreateUser {
            name: "Maria Silva".into(),
            email: "maria@test.com".into(),
            username: "maria123".into(),
            password: "senha123".into(),
            phone: None,
            is_active: true,
        }
    }

    fn sample_user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: 1,
            name: "Maria Silva".into(),
            email: "maria@test.com".into(),
            username: "maria123".into(),
            password_hash: hash_password("senha123").expect("hash"),
            phone: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn validation_order_name_email_username_password() {
        let empty = CreateUser {
            name: String::new(),
            email: String::new(),
            username: String::new(),
            password: String::new(),
            phone: None,
            is_active: true,
        };
        assert_eq!(
            validate_new_user(&empty).unwrap_err().to_string(),
            "Nome é obrigatório"
        );

        let mut data = empty.clone();
        data.name = "Maria".into();
        assert_eq!(
            validate_new_user(&data).unwrap_err().to_string(),
            "Email é obrigatório"
        );

        data.email = "maria@test.com".into();
        assert_eq!(
            validate_new_user(&data).unwrap_err().to_string(),
            "Username é obrigatório"
        );

        data.username = "maria123".into();
        assert_eq!(
            validate_new_user(&data).unwrap_err().to_string(),
            "Senha é obrigatória"
        );

        data.password = "senha123".into();
        assert!(validate_new_user(&data).is_ok());
    }

    #[test]
    fn valid_input_passes_validation() {
        assert!(validate_new_user(&sample_create()).is_ok());
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut user = sample_user();
        let original_hash = user.password_hash.clone();
        let patch = UserPatch {
            phone: Some("11 99999-0000".into()),
            ..Default::default()
        };
        apply_patch(&mut user, &patch).expect("patch");

        assert_eq!(user.phone.as_deref(), Some("11 99999-0000"));
        assert_eq!(user.name, "Maria Silva");
        assert_eq!(user.email, "maria@test.com");
        assert_eq!(user.username, "maria123");
        assert_eq!(user.password_hash, original_hash);
        assert!(user.is_active);
    }

    #[test]
    fn empty_password_in_patch_keeps_hash() {
        let mut user = sample_user();
        let original_hash = user.password_hash.clone();
        let patch = UserPatch {
            password: Some(String::new()),
            ..Default::default()
        };
        apply_patch(&mut user, &patch).expect("patch");
        assert_eq!(user.password_hash, original_hash);
    }

    #[test]
    fn non_empty_password_in_patch_rehashes() {
        let mut user = sample_user();
        let patch = UserPatch {
            password: Some("nova-senha".into()),
            ..Default::default()
        };
        apply_patch(&mut user, &patch).expect("patch");
        assert!(verify_password("nova-senha", &user.password_hash).expect("verify"));
        assert!(!verify_password("senha123", &user.password_hash).expect("verify"));
    }

    #[test]
    fn toggling_is_active_twice_restores_it() {
        let mut user = sample_user();
        let original = user.is_active;
        for _ in 0..2 {
            let patch = UserPatch {
                is_active: Some(!user.is_active),
                ..Default::default()
            };
            apply_patch(&mut user, &patch).expect("patch");
        }
        assert_eq!(user.is_active, original);
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let err = uniqueness_conflict(true, false).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(err.to_string(), "Email já cadastrado");
    }

    #[test]
    fn duplicate_username_is_a_conflict() {
        let err = uniqueness_conflict(false, true).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(err.to_string(), "Username já cadastrado");
    }

    #[test]
    fn email_conflict_is_reported_before_username_conflict() {
        let err = uniqueness_conflict(true, true).unwrap_err();
        assert_eq!(err.to_string(), "Email já cadastrado");
    }

    #[test]
    fn unique_email_and_username_pass() {
        assert!(uniqueness_conflict(false, false).is_ok());
    }

    #[test]
    fn lookup_prefers_username_match() {
        let by_username = sample_user();
        let mut by_email = sample_user();
        by_email.id = 2;
        let found = lookup_account(Some(by_username), Some(by_email)).expect("account");
        assert_eq!(found.id, 1);
    }

    #[test]
    fn lookup_falls_back_to_email() {
        let found = lookup_account(None, Some(sample_user())).expect("account");
        assert_eq!(found.id, 1);
        assert!(lookup_account(None, None).is_none());
    }

    #[test]
    fn login_by_username_and_by_email_reach_the_same_account() {
        let user = sample_user();
        let via_username =
            check_login(lookup_account(Some(user.clone()), None), "senha123").expect("login");
        let via_email = check_login(lookup_account(None, Some(user)), "senha123").expect("login");
        assert_eq!(via_username.id, via_email.id);
        assert_eq!(via_username.username, via_email.username);
    }

    #[test]
    fn login_unknown_user_is_invalid_credentials() {
        let err = check_login(None, "senha123").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[test]
    fn login_wrong_password_is_invalid_credentials() {
        let err = check_login(Some(sample_user()), "wrong").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[test]
    fn unknown_user_and_wrong_password_share_one_message() {
        let a = check_login(None, "senha123").unwrap_err().to_string();
        let b = check_login(Some(sample_user()), "wrong")
            .unwrap_err()
            .to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn inactive_user_never_logs_in_even_with_correct_password() {
        let mut user = sample_user();
        user.is_active = false;
        let err = check_login(Some(user), "senha123").unwrap_err();
        assert!(matches!(err, ServiceError::InactiveAccount));
    }

    #[test]
    fn active_check_runs_before_password_check() {
        let mut user = sample_user();
        user.is_active = false;
        // Wrong password, but the inactive status wins.
        let err = check_login(Some(user), "wrong").unwrap_err();
        assert!(matches!(err, ServiceError::InactiveAccount));
    }

    #[test]
    fn correct_password_logs_in() {
        let user = check_login(Some(sample_user()), "senha123").expect("login");
        assert_eq!(user.username, "maria123");
    }

    #[test]
    fn percentage_rounds_to_one_decimal() {
        assert_eq!(active_percentage(0, 0), 0.0);
        assert_eq!(active_percentage(0, 10), 0.0);
        assert_eq!(active_percentage(10, 10), 100.0);
        assert_eq!(active_percentage(2, 3), 66.7);
        assert_eq!(active_percentage(1, 3), 33.3);
        assert_eq!(active_percentage(1, 8), 12.5);
    }

    #[test]
    fn shift_months_handles_year_boundaries() {
        assert_eq!(shift_months(2025, 8, 6), (2025, 2));
        assert_eq!(shift_months(2025, 3, 6), (2024, 9));
        assert_eq!(shift_months(2025, 1, 1), (2024, 12));
        assert_eq!(shift_months(2025, 12, 0), (2025, 12));
        assert_eq!(shift_months(2025, 6, 24), (2023, 6));
    }

    #[test]
    fn six_months_back_yields_seven_buckets() {
        let series = fill_monthly_buckets(2025, 8, 6, &[]);
        assert_eq!(series.len(), 7);
        assert_eq!(series.first().unwrap().full_date, "2025-02");
        assert_eq!(series.last().unwrap().full_date, "2025-08");
        assert!(series.iter().all(|m| m.count == 0));
    }

    #[test]
    fn buckets_are_chronological_and_gap_filled() {
        let counts = vec![(2024, 11, 3), (2025, 1, 5)];
        let series = fill_monthly_buckets(2025, 2, 4, &counts);
        assert_eq!(series.len(), 5);
        assert_eq!(
            series
                .iter()
                .map(|m| m.full_date.as_str())
                .collect::<Vec<_>>(),
            vec!["2024-10", "2024-11", "2024-12", "2025-01", "2025-02"]
        );
        assert_eq!(
            series.iter().map(|m| m.count).collect::<Vec<_>>(),
            vec![0, 3, 0, 5, 0]
        );
        assert_eq!(series[0].month, "Oct");
        assert_eq!(series[0].year, 2024);
        assert_eq!(series[3].month, "Jan");
        assert_eq!(series[3].year, 2025);
    }

    #[tokio::test]
    async fn statistics_degrade_to_zero_when_store_is_unreachable() {
        let state = AppState::fake();
        let stats = get_user_statistics(&state.db).await;
        assert_eq!(stats, UserStatistics::default());
        assert_eq!(stats.active_percentage, 0.0);
    }

    #[tokio::test]
    async fn monthly_series_degrades_to_empty_when_store_is_unreachable() {
        let state = AppState::fake();
        let series = get_monthly_user_registrations(&state.db, 6).await;
        assert!(series.is_empty());
    }
}
