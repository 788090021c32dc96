use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use tracing::instrument;

use crate::{
    auth::password::verify_password,
    error::ServiceError,
    profile::dto::{ChangePasswordForm, ChangePasswordResponse, EditProfileForm, ProfilePage},
    session::{CurrentUser, FlashLevel, Session, SessionKeys},
    state::AppState,
    users::service::{self, UserPatch},
};

/// Profile of the logged-in user, gated by `login_required` in the app
/// router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile))
        .route("/profile/edit", post(edit_profile))
        .route("/profile/change-password", post(change_password))
}

#[instrument(skip(state, session))]
pub async fn profile(
    State(state): State<AppState>,
    mut session: Session,
    CurrentUser(user_id): CurrentUser,
) -> Response {
    let keys = SessionKeys::from_ref(&state);
    match service::get_user_by_id(&state.db, user_id).await {
        Ok(Some(user)) => {
            let flash = session.take_flash();
            (session.save(&keys), Json(ProfilePage { user, flash })).into_response()
        }
        Ok(None) => {
            // Session points at a row that no longer exists
            session.flash(FlashLevel::Danger, "Usuário não encontrado");
            session.redirect(&keys, "/dashboard")
        }
        Err(err) => err.into_response(),
    }
}

#[instrument(skip(state, session, form))]
pub async fn edit_profile(
    State(state): State<AppState>,
    mut session: Session,
    CurrentUser(user_id): CurrentUser,
    Form(form): Form<EditProfileForm>,
) -> Response {
    let keys = SessionKeys::from_ref(&state);
    let patch = UserPatch {
        name: form.name.map(|v| v.trim().to_string()),
        email: form.email.map(|v| v.trim().to_string()),
        username: form.username.map(|v| v.trim().to_string()),
        phone: form.phone.map(|v| v.trim().to_string()),
        ..Default::default()
    };

    match service::update_user(&state.db, user_id, patch).await {
        Ok(updated) => {
            // Keep the session copy of the name in sync
            session.data.username = Some(updated.username.clone());
            session.data.name = Some(updated.name.clone());
            session.flash(FlashLevel::Success, "Perfil atualizado com sucesso!");
            session.redirect(&keys, "/profile")
        }
        Err(err @ ServiceError::NotFound(_)) => {
            session.flash(FlashLevel::Danger, err.to_string());
            session.redirect(&keys, "/dashboard")
        }
        Err(err) => err.into_response(),
    }
}

#[instrument(skip(state, form))]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Form(form): Form<ChangePasswordForm>,
) -> Response {
    let user = match service::get_user_by_id(&state.db, user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return failure(StatusCode::NOT_FOUND, "Usuário não encontrado"),
        Err(err) => return err.into_response(),
    };

    match verify_password(&form.current_password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return failure(StatusCode::BAD_REQUEST, "Senha atual incorreta"),
        Err(err) => return ServiceError::Internal(err).into_response(),
    }

    if form.new_password.chars().count() < 6 {
        return failure(
            StatusCode::BAD_REQUEST,
            "Nova senha deve ter no mínimo 6 caracteres",
        );
    }
    if form.new_password != form.confirm_password {
        return failure(StatusCode::BAD_REQUEST, "Confirmação de senha não confere");
    }

    let patch = UserPatch {
        password: Some(form.new_password),
        ..Default::default()
    };
    match service::update_user(&state.db, user_id, patch).await {
        Ok(_) => Json(ChangePasswordResponse {
            success: true,
            message: "Senha alterada com sucesso!".into(),
        })
        .into_response(),
        Err(err) => failure(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

fn failure(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ChangePasswordResponse {
            success: false,
            message: message.to_string(),
        }),
    )
        .into_response()
}
