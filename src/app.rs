use std::net::SocketAddr;

use axum::{middleware::from_fn_with_state, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{guest_only, login_required};
use crate::state::AppState;
use crate::{auth, dashboard, home, profile, users};

pub fn build_app(state: AppState) -> Router {
    let guest = auth::guest_routes().layer(from_fn_with_state(state.clone(), guest_only));
    let protected = Router::new()
        .merge(users::routes())
        .merge(dashboard::routes())
        .merge(profile::routes())
        .layer(from_fn_with_state(state.clone(), login_required));

    Router::new()
        .merge(home::routes())
        .merge(auth::routes())
        .merge(guest)
        .merge(protected)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::FromRef,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::session::{Session, SessionKeys};

    fn make_keys(state: &AppState) -> SessionKeys {
        SessionKeys::from_ref(state)
    }

    fn authenticated_cookie(keys: &SessionKeys) -> String {
        let mut session = Session::default();
        session.login(1, "maria123", "Maria Silva");
        let token = keys.sign(&session.data).expect("sign session");
        format!("session={token}")
    }

    #[tokio::test]
    async fn home_is_public() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn anonymous_request_to_protected_route_redirects_to_login() {
        let state = AppState::fake();
        let keys = make_keys(&state);
        let app = build_app(state);

        let res = app
            .oneshot(Request::get("/users").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/auth/login");

        // The attempted URL is stored for the post-login redirect
        let cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .expect("set-cookie header")
            .to_str()
            .unwrap();
        let token = cookie
            .strip_prefix("session=")
            .and_then(|rest| rest.split(';').next())
            .expect("session token");
        let data = keys.verify(token).expect("verify session");
        assert_eq!(data.next.as_deref(), Some("/users"));
        assert!(!data.flash.is_empty());
    }

    #[tokio::test]
    async fn dashboard_requires_login() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::get("/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/auth/login");
    }

    #[tokio::test]
    async fn authenticated_user_is_bounced_from_login_page() {
        let state = AppState::fake();
        let cookie = authenticated_cookie(&make_keys(&state));
        let app = build_app(state);

        let res = app
            .oneshot(
                Request::get("/auth/login")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/");
    }

    #[tokio::test]
    async fn anonymous_user_sees_login_page() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::get("/auth/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_clears_session_and_redirects_home() {
        let state = AppState::fake();
        let keys = make_keys(&state);
        let cookie = authenticated_cookie(&keys);
        let app = build_app(state);

        let res = app
            .oneshot(
                Request::get("/auth/logout")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/");

        let cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .expect("set-cookie header")
            .to_str()
            .unwrap();
        let token = cookie
            .strip_prefix("session=")
            .and_then(|rest| rest.split(';').next())
            .expect("session token");
        let data = keys.verify(token).expect("verify session");
        assert_eq!(data.user_id, None);
    }

    #[tokio::test]
    async fn stats_api_degrades_instead_of_failing_without_database() {
        let state = AppState::fake();
        let cookie = authenticated_cookie(&make_keys(&state));
        let app = build_app(state);

        let res = app
            .oneshot(
                Request::get("/dashboard/api/stats")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tampered_cookie_is_treated_as_anonymous() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(
                Request::get("/profile")
                    .header(header::COOKIE, "session=not.a.token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/auth/login");
    }
}
