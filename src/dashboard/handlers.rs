use axum::{
    extract::{FromRef, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::instrument;

use crate::{
    session::{Flash, Session, SessionKeys},
    state::AppState,
    users::dto::{MonthlyRegistration, UserStatistics},
    users::service,
};

/// Statistics views, gated by `login_required` in the app router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/dashboard/api/stats", get(api_stats))
        .route("/dashboard/api/monthly-data", get(api_monthly_data))
}

const MONTHS_BACK: u32 = 6;

#[derive(Debug, Serialize)]
pub struct DashboardPage {
    pub stats: UserStatistics,
    pub monthly_data: Vec<MonthlyRegistration>,
    pub flash: Vec<Flash>,
}

#[instrument(skip(state, session))]
pub async fn dashboard(State(state): State<AppState>, mut session: Session) -> Response {
    let keys = SessionKeys::from_ref(&state);
    let stats = service::get_user_statistics(&state.db).await;
    let monthly_data = service::get_monthly_user_registrations(&state.db, MONTHS_BACK).await;
    let flash = session.take_flash();
    (
        session.save(&keys),
        Json(DashboardPage {
            stats,
            monthly_data,
            flash,
        }),
    )
        .into_response()
}

#[instrument(skip(state))]
pub async fn api_stats(State(state): State<AppState>) -> Json<UserStatistics> {
    Json(service::get_user_statistics(&state.db).await)
}

#[instrument(skip(state))]
pub async fn api_monthly_data(State(state): State<AppState>) -> Json<Vec<MonthlyRegistration>> {
    Json(service::get_monthly_user_registrations(&state.db, MONTHS_BACK).await)
}
