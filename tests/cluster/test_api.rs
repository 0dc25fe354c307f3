use actix_web::http::StatusCode;
use actix_web::test;
use actix_web::web::Data;
use raft_userstore::bootstrap;
use raft_userstore::network::api;
use raft_userstore::network::api::ErrorBody;
use raft_userstore::network::api::HealthStatus;
use raft_userstore::network::api::MessageBody;
use raft_userstore::network::api::UserBody;
use raft_userstore::store::StoreInfo;

use crate::fixtures::node_config;
use crate::fixtures::wait_for_leader;

#[actix_web::test]
async fn test_user_routes() -> anyhow::Result<()> {
    let td = tempfile::TempDir::new()?;
    let config = node_config(td.path(), "127.0.0.1:39301")?;

    let app = bootstrap::start(&config).await?;
    wait_for_leader(&app).await?;
    let data = Data::new(app);

    let svc = test::init_service(actix_web::App::new().app_data(data.clone()).configure(api::configure)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: HealthStatus = test::call_and_read_body_json(&svc, req).await;
    assert_eq!("ok", body.status);

    let req = test::TestRequest::get().uri("/api/v1/users/store").to_request();
    let body: StoreInfo = test::call_and_read_body_json(&svc, req).await;
    assert!(body.leader);

    let req = test::TestRequest::post().uri("/api/v1/users/?username=bob&password=pw1").to_request();
    let resp = test::call_service(&svc, req).await;
    assert_eq!(StatusCode::CREATED, resp.status());
    let body: MessageBody = test::read_body_json(resp).await;
    assert_eq!("user created successfully", body.message);

    let req = test::TestRequest::get().uri("/api/v1/users/?username=bob").to_request();
    let resp = test::call_service(&svc, req).await;
    assert_eq!(StatusCode::OK, resp.status());
    let body: UserBody = test::read_body_json(resp).await;
    assert_eq!("bob", body.username);

    let req = test::TestRequest::get().uri("/api/v1/users/?username=alice").to_request();
    let resp = test::call_service(&svc, req).await;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, resp.status());
    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!("user not found", body.error);

    data.shutdown().await?;
    Ok(())
}

#[actix_web::test]
async fn test_missing_parameters() -> anyhow::Result<()> {
    let td = tempfile::TempDir::new()?;
    let config = node_config(td.path(), "127.0.0.1:39302")?;

    let app = bootstrap::start(&config).await?;
    wait_for_leader(&app).await?;
    let data = Data::new(app);

    let svc = test::init_service(actix_web::App::new().app_data(data.clone()).configure(api::configure)).await;

    let req = test::TestRequest::post().uri("/api/v1/users/?username=alice").to_request();
    let resp = test::call_service(&svc, req).await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!("password is required", body.error);

    let req = test::TestRequest::post().uri("/api/v1/users/?password=pw").to_request();
    let resp = test::call_service(&svc, req).await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!("username is required", body.error);

    let req = test::TestRequest::get().uri("/api/v1/users/").to_request();
    let resp = test::call_service(&svc, req).await;
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());

    assert!(data.store.get("alice").await.is_err());

    data.shutdown().await?;
    Ok(())
}
