use axum::{
    extract::{FromRef, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use crate::{
    session::{Flash, Session, SessionKeys},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/about", get(about))
        .route("/health", get(|| async { "ok" }))
}

#[derive(Debug, Serialize)]
pub struct HomePage {
    pub title: &'static str,
    pub authenticated: bool,
    pub name: Option<String>,
    pub flash: Vec<Flash>,
}

#[instrument(skip(state, session))]
pub async fn index(State(state): State<AppState>, mut session: Session) -> Response {
    let keys = SessionKeys::from_ref(&state);
    let flash = session.take_flash();
    let page = HomePage {
        title: "Home",
        authenticated: session.is_authenticated(),
        name: session.data.name.clone(),
        flash,
    };
    (session.save(&keys), Json(page)).into_response()
}

pub async fn about() -> Json<serde_json::Value> {
    Json(json!({ "title": "Sobre" }))
}
