use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use journal_companion::{auth::auth_middleware, Config};
use std::sync::Arc;
use tower::ServiceExt;

const KEY: &str = "test_key_that_is_at_least_32_characters_long";

fn protected_app(api_key: Option<&str>) -> Router {
    let config = Arc::new(Config {
        api_key: api_key.map(str::to_string),
        ..Config::default()
    });

    Router::new()
        .route("/protected", get(|| async { "secret" }))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
}

async fn status_for(app: Router, auth: Option<&str>) -> StatusCode {
    let mut request = Request::builder().uri("/protected");
    if let Some(value) = auth {
        request = request.header("Authorization", value);
    }
    app.oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_open_when_no_key_configured() {
    assert_eq!(status_for(protected_app(None), None).await, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_header_is_unauthorized() {
    assert_eq!(
        status_for(protected_app(Some(KEY)), None).await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_non_bearer_scheme_is_unauthorized() {
    let header = format!("Basic {}", KEY);
    assert_eq!(
        status_for(protected_app(Some(KEY)), Some(&header)).await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_wrong_key_is_unauthorized() {
    assert_eq!(
        status_for(
            protected_app(Some(KEY)),
            Some("Bearer some_other_key_that_is_also_long_enough")
        )
        .await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_valid_key_passes() {
    let header = format!("Bearer {}", KEY);
    assert_eq!(
        status_for(protected_app(Some(KEY)), Some(&header)).await,
        StatusCode::OK
    );
}
