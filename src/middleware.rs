//! Request gates composed in front of route handlers.

use axum::{
    extract::{FromRef, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::{
    session::{FlashLevel, Session, SessionKeys},
    state::AppState,
};

/// Routes that require an authenticated session. Anonymous requests are sent
/// to the login page; the URL they tried to reach is stored in the session
/// for the post-login redirect.
pub async fn login_required(
    State(state): State<AppState>,
    mut session: Session,
    request: Request,
    next: Next,
) -> Response {
    if session.is_authenticated() {
        return next.run(request).await;
    }
    debug!(uri = %request.uri(), "anonymous request to protected route");
    let keys = SessionKeys::from_ref(&state);
    session.data.next = Some(request.uri().to_string());
    session.flash(
        FlashLevel::Warning,
        "Você precisa estar logado para acessar esta página.",
    );
    session.redirect(&keys, "/auth/login")
}

/// Routes meant only for visitors (login, register). Authenticated users are
/// sent back home.
pub async fn guest_only(
    State(state): State<AppState>,
    mut session: Session,
    request: Request,
    next: Next,
) -> Response {
    if !session.is_authenticated() {
        return next.run(request).await;
    }
    let keys = SessionKeys::from_ref(&state);
    session.flash(FlashLevel::Info, "Você já está logado!");
    session.redirect(&keys, "/")
}
