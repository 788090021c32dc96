use axum::{
    extract::{FromRef, State},
    response::{IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::dto::{AuthPage, LoginForm, RegisterForm},
    session::{FlashLevel, Session, SessionKeys},
    state::AppState,
    users::service::{self, CreateUser},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Login and register, gated by `guest_only` in the app router.
pub fn guest_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login_page).post(login))
        .route("/auth/register", get(register_page).post(register))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/auth/logout", get(logout))
}

#[instrument(skip(state, session))]
pub async fn login_page(State(state): State<AppState>, mut session: Session) -> Response {
    let keys = SessionKeys::from_ref(&state);
    let flash = session.take_flash();
    (session.save(&keys), Json(AuthPage { flash })).into_response()
}

#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let keys = SessionKeys::from_ref(&state);
    let identifier = form.username_or_email.trim().to_string();

    if identifier.is_empty() || form.password.is_empty() {
        session.flash(FlashLevel::Danger, "Por favor, preencha todos os campos.");
        return session.redirect(&keys, "/auth/login");
    }

    match service::authenticate(&state.db, &identifier, &form.password).await {
        Ok(user) => {
            info!(user_id = user.id, username = %user.username, "login succeeded");
            session.login(user.id, &user.username, &user.name);
            let target = session.take_next().unwrap_or_else(|| "/".to_string());
            session.flash(FlashLevel::Success, format!("Bem-vindo(a), {}!", user.name));
            session.redirect(&keys, &target)
        }
        Err(err) => {
            warn!(identifier = %identifier, error = %err, "login failed");
            session.flash(FlashLevel::Danger, err.to_string());
            session.redirect(&keys, "/auth/login")
        }
    }
}

#[instrument(skip(state, session))]
pub async fn register_page(State(state): State<AppState>, mut session: Session) -> Response {
    let keys = SessionKeys::from_ref(&state);
    let flash = session.take_flash();
    (session.save(&keys), Json(AuthPage { flash })).into_response()
}

#[instrument(skip(state, session, form))]
pub async fn register(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    let keys = SessionKeys::from_ref(&state);

    if form.password != form.password_confirm {
        session.flash(FlashLevel::Danger, "As senhas não coincidem.");
        return session.redirect(&keys, "/auth/register");
    }

    if form.password.chars().count() < 6 {
        session.flash(
            FlashLevel::Danger,
            "A senha deve ter no mínimo 6 caracteres.",
        );
        return session.redirect(&keys, "/auth/register");
    }

    let email = form.email.trim().to_string();
    if !is_valid_email(&email) {
        session.flash(FlashLevel::Danger, "Email inválido.");
        return session.redirect(&keys, "/auth/register");
    }

    let data = CreateUser {
        name: form.name.trim().to_string(),
        email,
        username: form.username.trim().to_string(),
        password: form.password,
        phone: form.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
        // New accounts start active
        is_active: true,
    };

    match service::create_user(&state.db, data).await {
        Ok(user) => {
            info!(user_id = user.id, username = %user.username, "user registered");
            session.login(user.id, &user.username, &user.name);
            session.flash(
                FlashLevel::Success,
                "Conta criada com sucesso! Bem-vindo(a)!",
            );
            session.redirect(&keys, "/")
        }
        Err(err) => {
            warn!(error = %err, "registration failed");
            session.flash(FlashLevel::Danger, err.to_string());
            session.redirect(&keys, "/auth/register")
        }
    }
}

#[instrument(skip(state, session))]
pub async fn logout(State(state): State<AppState>, mut session: Session) -> Response {
    let keys = SessionKeys::from_ref(&state);
    let name = session
        .data
        .name
        .clone()
        .unwrap_or_else(|| "Usuário".to_string());
    session.clear();
    session.flash(FlashLevel::Info, format!("Até logo, {}!", name));
    session.redirect(&keys, "/")
}
