use std::net::{Ipv4Addr, SocketAddr, TcpListener};

use customers_api::{db::Customer, handlers::error::ErrorResponse};
use hermetic_config::EnvironmentConfig;
use pretty_assertions::assert_eq;
use reqwest::{StatusCode, header::LOCATION};
use serde_json::json;
use stub_server::{FixtureKey, StubResponse};

use super::{customers_env, github_user};
use crate::testlib::{
    env::{EnvState, EnvironmentBuilder, Error},
    fixtures,
    service::{BootError, InProcessService},
};

#[tokio::test]
async fn created_customer_is_gone_after_reset() {
    //* Given
    let env = customers_env("created_customer_is_gone_after_reset")
        .build()
        .await
        .expect("environment should start");
    env.register_fixture(FixtureKey::get("/users/alice"), github_user("alice", 583231));

    //* When
    let resp = env
        .client()
        .post_json("/customers", &json!({"login": "alice"}))
        .await
        .expect("create request should succeed");

    //* Then
    assert_eq!(resp.status(), StatusCode::CREATED, "alice exists upstream");
    let location = resp
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
        .expect("201 should carry a Location header");
    let customer: Customer = resp.json().await.expect("body should be a customer");
    assert_eq!(location, format!("/customers/{}", customer.id));
    assert_eq!(customer.github_id, Some(583231), "GitHub id should be stored");

    let found = env.client().get(&location).await.expect("get should succeed");
    assert_eq!(found.status(), StatusCode::OK, "customer should be readable before reset");

    env.reset().await.expect("reset should succeed");

    let gone = env.client().get(&location).await.expect("get should succeed");
    assert_eq!(gone.status(), StatusCode::NOT_FOUND, "reset should remove the customer");
    let err: ErrorResponse = gone.json().await.expect("body should be an error");
    assert_eq!(err.error_code, "CUSTOMER_NOT_FOUND");

    env.close().await.expect("close should succeed");
}

#[tokio::test]
async fn ids_restart_after_reset() {
    //* Given
    let env = customers_env("ids_restart_after_reset")
        .with_fixture(FixtureKey::get("/users/{login}"), github_user("someone", 7))
        .build()
        .await
        .expect("environment should start");
    let first: Customer = env
        .client()
        .post_json("/customers", &json!({"login": "someone"}))
        .await
        .expect("create request should succeed")
        .json()
        .await
        .expect("body should be a customer");

    //* When
    env.reset().await.expect("reset should succeed");
    let second: Customer = env
        .client()
        .post_json("/customers", &json!({"login": "someone"}))
        .await
        .expect("create request should succeed")
        .json()
        .await
        .expect("body should be a customer");

    //* Then
    assert_eq!(
        first.id, second.id,
        "the same login should be accepted again under the same id"
    );

    env.close().await.expect("close should succeed");
}

#[tokio::test]
async fn upstream_answers_map_to_service_errors() {
    //* Given
    let env = customers_env("upstream_answers_map_to_service_errors")
        .build()
        .await
        .expect("environment should start");
    env.register_fixture(
        FixtureKey::get("/users/outage"),
        StubResponse::json(StatusCode::SERVICE_UNAVAILABLE, json!({"message": "down"})),
    );
    env.register_fixture(FixtureKey::get("/users/carol"), github_user("carol", 3));

    //* When
    let unknown = env
        .client()
        .post_json("/customers", &json!({"login": "nobody"}))
        .await
        .expect("request should succeed");
    let outage = env
        .client()
        .post_json("/customers", &json!({"login": "outage"}))
        .await
        .expect("request should succeed");
    let first = env
        .client()
        .post_json("/customers", &json!({"login": "carol"}))
        .await
        .expect("request should succeed");
    let duplicate = env
        .client()
        .post_json("/customers", &json!({"login": "carol"}))
        .await
        .expect("request should succeed");

    //* Then
    assert_eq!(unknown.status(), StatusCode::UNPROCESSABLE_ENTITY, "stub 404 means no such user");
    assert_eq!(outage.status(), StatusCode::BAD_GATEWAY, "upstream 503 is a gateway error");
    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(duplicate.status(), StatusCode::CONFLICT, "logins are unique");

    let err: ErrorResponse = duplicate.json().await.expect("body should be an error");
    assert_eq!(err.error_code, "CUSTOMER_ALREADY_EXISTS");

    env.close().await.expect("close should succeed");
}

#[tokio::test]
async fn state_follows_the_lifecycle() {
    //* Given
    let builder = customers_env("state_follows_the_lifecycle");
    let state = builder.subscribe();
    assert_eq!(*state.borrow(), EnvState::Uninitialized);

    //* When
    let env = builder.build().await.expect("environment should start");
    let ready = env.state();
    env.close().await.expect("close should succeed");

    //* Then
    assert_eq!(ready, EnvState::Ready, "build should return a ready environment");
    assert_eq!(*state.borrow(), EnvState::Closed, "close should end in Closed");
}

#[tokio::test]
async fn failed_database_start_releases_the_stub_port() {
    //* Given
    let stub_addr = free_addr();
    let mut config = EnvironmentConfig::default();
    config.database.docker_bin = Some("/nonexistent/docker".to_string());
    let builder = customers_env("failed_database_start_releases_the_stub_port")
        .with_config(config)
        .with_stub_addr(stub_addr);
    let state = builder.subscribe();

    //* When
    let result = builder.build().await;

    //* Then
    assert!(
        matches!(result, Err(Error::Provision(ephemeral_db::Error::DockerNotFound { .. }))),
        "missing docker binary should surface as a provisioning error"
    );
    assert_eq!(*state.borrow(), EnvState::Closed, "failed build should end in Closed");
    assert!(
        TcpListener::bind(stub_addr).is_ok(),
        "stub port {stub_addr} should be free again"
    );
}

#[tokio::test]
async fn config_file_settings_reach_the_database_controller() {
    //* Given
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("hermetic.toml");
    std::fs::write(
        &path,
        indoc::indoc! {r#"
            [database]
            docker_bin = "/nonexistent/docker-from-file"
            readiness_timeout_secs = 5
        "#},
    )
    .expect("should write config file");
    let config = EnvironmentConfig::load(Some(&path)).expect("config file should load");

    //* When
    let result = customers_env("config_file_settings_reach_the_database_controller")
        .with_config(config)
        .build()
        .await;

    //* Then
    assert!(
        matches!(result, Err(Error::Provision(ephemeral_db::Error::DockerNotFound { .. }))),
        "docker binary from the config file should be used"
    );
}

#[tokio::test]
async fn failed_service_boot_tears_everything_down() {
    //* Given
    let stub_addr = free_addr();
    let service = InProcessService::new("broken", |_wiring, _shutdown| async move {
        Err::<(SocketAddr, std::future::Ready<Result<(), std::io::Error>>), _>(BootError::Start(
            "refusing to start".into(),
        ))
    });
    let builder = EnvironmentBuilder::new("failed_service_boot_tears_everything_down")
        .with_service(service)
        .with_stub_addr(stub_addr);
    let state = builder.subscribe();

    //* When
    let result = builder.build().await;

    //* Then
    assert!(
        matches!(result, Err(Error::ServiceBoot { ref service, .. }) if service == "broken"),
        "boot failure should name the service"
    );
    assert_eq!(*state.borrow(), EnvState::Closed);
    assert!(
        TcpListener::bind(stub_addr).is_ok(),
        "stub port {stub_addr} should be free again"
    );
}

#[tokio::test]
async fn service_exiting_during_boot_is_reported() {
    //* Given
    let service = InProcessService::new("quitter", |wiring, _shutdown| async move {
        let addr = wiring.listen_addr;
        Ok::<_, BootError>((addr, std::future::ready(Ok::<(), std::io::Error>(()))))
    });

    //* When
    let result = EnvironmentBuilder::new("service_exiting_during_boot_is_reported")
        .with_service(service)
        .build()
        .await;

    //* Then
    assert!(
        matches!(
            result,
            Err(Error::ServiceBoot {
                source: BootError::ExitedEarly { .. },
                ..
            })
        ),
        "a server future that returns immediately should fail the boot"
    );
}

#[tokio::test]
async fn unwired_dependency_is_a_configuration_error() {
    //* Given
    let builder = EnvironmentBuilder::new("unwired_dependency_is_a_configuration_error")
        .with_service(fixtures::customers_api())
        .with_migrations_dir(customers_api::MIGRATIONS_DIR);

    //* When
    let result = builder.build().await;

    //* Then
    assert!(
        matches!(
            result,
            Err(Error::Configuration { ref service, ref reason })
                if service == "customers-api" && reason.contains(fixtures::GITHUB_DEPENDENCY)
        ),
        "the stub is wired as 'upstream', the service asks for 'github'"
    );
}

#[tokio::test]
async fn builder_without_service_is_rejected() {
    //* When
    let result = EnvironmentBuilder::new("builder_without_service_is_rejected")
        .with_config(EnvironmentConfig::default())
        .build()
        .await;

    //* Then
    assert!(
        matches!(result, Err(Error::Configuration { .. })),
        "an environment needs a service"
    );
}

#[tokio::test]
#[ignore = "needs a built customers-api binary in CUSTOMERS_API_BIN"]
async fn customers_api_runs_as_child_process() {
    //* Given
    let program = std::env::var("CUSTOMERS_API_BIN").expect("CUSTOMERS_API_BIN should be set");
    let env = EnvironmentBuilder::new("customers_api_runs_as_child_process")
        .with_service(fixtures::customers_api_process(program))
        .with_dependency_name(fixtures::GITHUB_DEPENDENCY)
        .with_migrations_dir(customers_api::MIGRATIONS_DIR)
        .with_fixture(FixtureKey::get("/users/dave"), github_user("dave", 4))
        .build()
        .await
        .expect("environment should start");

    //* When
    let resp = env
        .client()
        .post_json("/customers", &json!({"login": "dave"}))
        .await
        .expect("create request should succeed");

    //* Then
    assert_eq!(resp.status(), StatusCode::CREATED);
    env.close().await.expect("close should stop the process");
}

fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("should bind port 0");
    listener.local_addr().expect("listener has an address")
}
