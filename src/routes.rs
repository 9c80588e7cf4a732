//! HTTP router: public delivery routes plus token-protected API routes.

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware, state::AppState};

pub fn router(state: AppState) -> Router {
    // Admin and bot routes (API token required)
    let authenticated_routes = Router::new()
        .route("/api/v1/keys", post(handlers::keys::create_key))
        .route("/api/v1/keys/batch", post(handlers::keys::create_keys_batch))
        .route("/api/v1/keys/prune", post(handlers::keys::prune_keys))
        .route("/api/v1/keys/{code}", get(handlers::keys::get_key))
        .route("/api/v1/keys/{code}", delete(handlers::keys::revoke_key))
        .route("/api/v1/keys/{code}/reset", post(handlers::keys::reset_key))
        .route("/api/v1/stats", get(handlers::keys::stats))
        .route("/api/v1/redeem", post(handlers::holders::redeem_key))
        .route("/api/v1/reset", post(handlers::holders::reset_own_key))
        .route(
            "/api/v1/holders/{holder}/key",
            get(handlers::holders::holder_key),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public routes (no authentication required)
        .route("/", get(handlers::loader::index))
        .route("/health", get(handlers::health::health_check))
        .route("/script.lua", get(handlers::loader::serve_script))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{services::key_service::PrunePolicy, store::KeyStore};
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    const TOKEN: &str = "test-token";

    async fn test_app() -> (TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path().join("keys.json")).await.unwrap();
        let state = AppState::new(Arc::new(store), TOKEN, PrunePolicy::All)
            .with_script("print(\"payload\")\n");
        (dir, router(state))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));

        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn json_body(body: &str) -> Value {
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn public_routes_need_no_token() {
        let (_dir, app) = test_app().await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_rejects_missing_or_wrong_token() {
        let (_dir, app) = test_app().await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/stats")
                    .header(header::AUTHORIZATION, "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn issue_redeem_and_deliver() {
        let (_dir, app) = test_app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/keys",
            Some(json!({ "duration": "2h" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let code = json_body(&body)["code"].as_str().unwrap().to_string();

        // Not redeemed yet
        let (status, body) = send(&app, Method::GET, &format!("/script.lua?key={code}"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "-- Key not redeemed");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/redeem",
            Some(json!({ "code": code.to_lowercase(), "holder": "U1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["redeemed_by"], "U1");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/redeem",
            Some(json!({ "code": code, "holder": "U2" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json_body(&body)["error"]["code"], "key_already_redeemed");

        let (status, body) = send(&app, Method::GET, &format!("/script.lua?key={code}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("local HOLDER_ID = \"U1\""));
        assert!(body.ends_with("print(\"payload\")\n"));
    }

    #[tokio::test]
    async fn delivery_rejections() {
        let (_dir, app) = test_app().await;

        let (status, body) = send(&app, Method::GET, "/script.lua", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing key");

        let (status, body) = send(&app, Method::GET, "/script.lua?key=NOPE0000", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "-- Invalid key");
    }

    #[tokio::test]
    async fn info_revoke_and_stats() {
        let (_dir, app) = test_app().await;

        let (_, body) = send(
            &app,
            Method::POST,
            "/api/v1/keys/batch",
            Some(json!({ "duration": "1d", "count": 3 })),
        )
        .await;
        let keys = json_body(&body);
        let code = keys[0]["code"].as_str().unwrap().to_string();

        let (status, body) = send(&app, Method::GET, &format!("/api/v1/keys/{code}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["code"], code.as_str());

        let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/keys/{code}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, Method::GET, &format!("/api/v1/keys/{code}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_body(&body)["error"]["code"], "key_not_found");

        let (status, body) = send(&app, Method::GET, "/api/v1/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({ "total": 2, "redeemed": 0, "active": 2 }));

        let (status, body) = send(&app, Method::POST, "/api/v1/keys/prune", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({ "removed": 0 }));
    }

    #[tokio::test]
    async fn malformed_bodies_get_json_errors() {
        let (_dir, app) = test_app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/redeem",
            Some(json!({ "code": "AB12CD34" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"]["code"], "invalid_request");

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/keys")
                    .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{ not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn bad_duration_is_400() {
        let (_dir, app) = test_app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/keys",
            Some(json!({ "duration": "5w" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"]["code"], "invalid_duration");
    }

    #[tokio::test]
    async fn self_service_reset_checks_holder() {
        let (_dir, app) = test_app().await;

        let (_, body) = send(
            &app,
            Method::POST,
            "/api/v1/keys",
            Some(json!({ "duration": "1h" })),
        )
        .await;
        let code = json_body(&body)["code"].as_str().unwrap().to_string();
        send(
            &app,
            Method::POST,
            "/api/v1/redeem",
            Some(json!({ "code": code, "holder": "U1" })),
        )
        .await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/reset",
            Some(json!({ "holder": "U2", "code": code })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json_body(&body)["error"]["code"], "not_key_holder");

        let (status, body) = send(&app, Method::GET, "/api/v1/holders/U1/key", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["code"], code.as_str());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/reset",
            Some(json!({ "holder": "U1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["redeemed_by"], Value::Null);

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/v1/keys/{code}/reset"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["code"], code.as_str());
    }
}
