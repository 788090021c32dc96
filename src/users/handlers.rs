use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::json;
use tracing::instrument;

use crate::{
    error::ServiceError,
    session::{FlashLevel, Session, SessionKeys},
    state::AppState,
    users::dto::{
        CreateUserForm, EditUserForm, PageQuery, UserListPage, UserListResponse, UserPage,
    },
    users::service::{self, CreateUser, UserPatch},
};

/// Admin CRUD surface, gated by `login_required` in the app router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list))
        .route("/users/create", post(create))
        .route("/users/:id", get(show))
        .route("/users/:id/edit", post(edit))
        .route("/users/:id/delete", post(delete))
        .route("/users/:id/toggle-status", post(toggle_status))
        .route("/users/api", get(api_list))
        .route("/users/api/:id", get(api_get))
}

#[instrument(skip(state, session))]
pub async fn list(
    State(state): State<AppState>,
    mut session: Session,
    Query(query): Query<PageQuery>,
) -> Response {
    let keys = SessionKeys::from_ref(&state);
    let page = query.page.max(1);
    let per_page = query.per_page.clamp(1, 100);

    let (users, total) = match service::get_all_users(&state.db, page, per_page).await {
        Ok(result) => result,
        Err(err) => return err.into_response(),
    };
    let total_pages = (total + per_page - 1) / per_page;

    let flash = session.take_flash();
    (
        session.save(&keys),
        Json(UserListPage {
            users,
            page,
            per_page,
            total,
            total_pages,
            flash,
        }),
    )
        .into_response()
}

#[instrument(skip(state, session, form))]
pub async fn create(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<CreateUserForm>,
) -> Response {
    let keys = SessionKeys::from_ref(&state);
    let data = CreateUser {
        name: form.name,
        email: form.email,
        username: form.username,
        password: form.password,
        phone: form.phone.filter(|p| !p.is_empty()),
        is_active: form.is_active.as_deref() == Some("on"),
    };

    match service::create_user(&state.db, data).await {
        Ok(_) => {
            session.flash(FlashLevel::Success, "Usuário criado com sucesso!");
            session.redirect(&keys, "/users")
        }
        Err(err) => err.into_response(),
    }
}

#[instrument(skip(state, session))]
pub async fn show(
    State(state): State<AppState>,
    mut session: Session,
    Path(id): Path<i64>,
) -> Response {
    let keys = SessionKeys::from_ref(&state);
    match service::get_user_by_id(&state.db, id).await {
        Ok(Some(user)) => {
            let flash = session.take_flash();
            (session.save(&keys), Json(UserPage { user, flash })).into_response()
        }
        Ok(None) => {
            session.flash(FlashLevel::Danger, "Usuário não encontrado");
            session.redirect(&keys, "/users")
        }
        Err(err) => err.into_response(),
    }
}

#[instrument(skip(state, session, form))]
pub async fn edit(
    State(state): State<AppState>,
    mut session: Session,
    Path(id): Path<i64>,
    Form(form): Form<EditUserForm>,
) -> Response {
    let keys = SessionKeys::from_ref(&state);
    let patch = UserPatch {
        name: form.name,
        email: form.email,
        username: form.username,
        // The password field is only honored when filled in
        password: form.password.filter(|p| !p.is_empty()),
        phone: form.phone,
        is_active: form.is_active.map(|v| v == "on"),
    };

    match service::update_user(&state.db, id, patch).await {
        Ok(_) => {
            session.flash(FlashLevel::Success, "Usuário atualizado com sucesso!");
            session.redirect(&keys, &format!("/users/{id}"))
        }
        Err(err @ ServiceError::NotFound(_)) => {
            session.flash(FlashLevel::Danger, err.to_string());
            session.redirect(&keys, "/users")
        }
        Err(err) => err.into_response(),
    }
}

#[instrument(skip(state, session))]
pub async fn delete(
    State(state): State<AppState>,
    mut session: Session,
    Path(id): Path<i64>,
) -> Response {
    let keys = SessionKeys::from_ref(&state);
    match service::delete_user(&state.db, id).await {
        Ok(()) => session.flash(FlashLevel::Success, "Usuário removido com sucesso!"),
        Err(err) => session.flash(FlashLevel::Danger, err.to_string()),
    }
    session.redirect(&keys, "/users")
}

#[instrument(skip(state, session))]
pub async fn toggle_status(
    State(state): State<AppState>,
    mut session: Session,
    Path(id): Path<i64>,
) -> Response {
    let keys = SessionKeys::from_ref(&state);
    match service::toggle_user_status(&state.db, id).await {
        Ok(user) => {
            let status = if user.is_active { "ativado" } else { "desativado" };
            session.flash(FlashLevel::Success, format!("Usuário {status} com sucesso!"));
        }
        Err(err) => session.flash(FlashLevel::Danger, err.to_string()),
    }
    session.redirect(&keys, "/users")
}

#[instrument(skip(state))]
pub async fn api_list(State(state): State<AppState>) -> Result<Json<UserListResponse>, ServiceError> {
    let (users, total) = service::get_all_users(&state.db, 1, 100).await?;
    Ok(Json(UserListResponse { users, total }))
}

#[instrument(skip(state))]
pub async fn api_get(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match service::get_user_by_id(&state.db, id).await {
        Ok(Some(user)) => Json(user).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Usuário não encontrado" })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
