use pretty_assertions::assert_eq;
use reqwest::{Method, StatusCode};
use serde_json::json;
use stub_server::{ErrorResponse, FixtureKey, StubResponse};

use super::{customers_env, github_user};

#[tokio::test]
async fn fixture_registered_at_build_is_served_to_the_service() {
    //* Given
    let env = customers_env("fixture_registered_at_build_is_served_to_the_service")
        .with_fixture(FixtureKey::get("/users/ivan"), github_user("ivan", 10))
        .build()
        .await
        .expect("environment should start");

    //* When
    let resp = env
        .client()
        .post_json("/customers", &json!({"login": "ivan"}))
        .await
        .expect("create request should succeed");

    //* Then
    assert_eq!(resp.status(), StatusCode::CREATED);
    let calls = env.stub().received_requests();
    assert_eq!(calls.len(), 1, "the service should call GitHub once");
    assert_eq!(calls[0].method, Method::GET);
    assert_eq!(calls[0].path, "/users/ivan");
    assert_eq!(calls[0].matched, Some(FixtureKey::get("/users/ivan")));

    env.close().await.expect("close should succeed");
}

#[tokio::test]
async fn overwritten_fixture_changes_service_behavior() {
    //* Given
    let env = customers_env("overwritten_fixture_changes_service_behavior")
        .with_fixture(
            FixtureKey::get("/users/judy"),
            StubResponse::json(StatusCode::SERVICE_UNAVAILABLE, json!({"message": "down"})),
        )
        .build()
        .await
        .expect("environment should start");
    let during_outage = env
        .client()
        .post_json("/customers", &json!({"login": "judy"}))
        .await
        .expect("request should succeed");

    //* When
    env.register_fixture(FixtureKey::get("/users/judy"), github_user("judy", 11));
    let after_recovery = env
        .client()
        .post_json("/customers", &json!({"login": "judy"}))
        .await
        .expect("request should succeed");

    //* Then
    assert_eq!(during_outage.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        after_recovery.status(),
        StatusCode::CREATED,
        "the later registration should win"
    );

    env.close().await.expect("close should succeed");
}

#[tokio::test]
async fn fixtures_survive_reset() {
    //* Given
    let env = customers_env("fixtures_survive_reset")
        .build()
        .await
        .expect("environment should start");
    env.register_fixture(FixtureKey::get("/users/mallory"), github_user("mallory", 12));

    //* When
    env.reset().await.expect("reset should succeed");
    let resp = env
        .client()
        .post_json("/customers", &json!({"login": "mallory"}))
        .await
        .expect("request should succeed");

    //* Then
    assert_eq!(resp.status(), StatusCode::CREATED, "reset must not clear fixtures");

    env.close().await.expect("close should succeed");
}

#[tokio::test]
async fn stub_is_reachable_from_the_test() {
    //* Given
    let env = customers_env("stub_is_reachable_from_the_test")
        .build()
        .await
        .expect("environment should start");
    env.register_fixture(FixtureKey::get("/users/oscar"), github_user("oscar", 13));

    //* When
    let hit = reqwest::get(env.stub_url().join("users/oscar").expect("valid path"))
        .await
        .expect("stub request should succeed");
    let miss = reqwest::get(env.stub_url().join("users/peggy").expect("valid path"))
        .await
        .expect("stub request should succeed");

    //* Then
    assert_eq!(hit.status(), StatusCode::OK);
    assert_eq!(miss.status(), StatusCode::NOT_FOUND);
    let err: ErrorResponse = miss.json().await.expect("body should be an error");
    assert_eq!(err.error_code, "FIXTURE_NOT_FOUND");
    assert_eq!(err.error_message, "no fixture registered for GET /users/peggy");

    env.close().await.expect("close should succeed");
}
