//! Boundary operations and status classification.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{cyclic_hierarchy, hierarchy, memory_db, InstrumentedReadModel};
use configstore_secrets::readdb::{MemoryReadDb, Node, ProjectionEvent, ReadModel, SecretData};
use configstore_secrets::{
    MemoryCommandHandler, NewSecret, QueryOptions, QueryStage, SecretQueryService, SecretsApi,
};
use http::StatusCode;
use rstest::rstest;

/// Reads from `model`; writes go to an unrelated empty handler.
fn api_over(model: Arc<dyn ReadModel>, options: QueryOptions) -> SecretsApi {
    let handler = MemoryCommandHandler::new(Arc::new(MemoryReadDb::new()));
    SecretsApi::new(SecretQueryService::with_options(model, options), Arc::new(handler))
}

async fn writable_api() -> (SecretsApi, Arc<MemoryCommandHandler>) {
    let read_model = Arc::new(MemoryReadDb::new());
    let handler = Arc::new(MemoryCommandHandler::new(read_model.clone()));
    handler
        .create_node(Node::organization("o1", "acme"))
        .await
        .unwrap();
    handler
        .create_node(Node::project("p1", "api", "o1"))
        .await
        .unwrap();
    handler.sync().await.unwrap();

    let api = SecretsApi::new(SecretQueryService::new(read_model), handler.clone());
    (api, handler)
}

fn password() -> NewSecret {
    NewSecret::new("db-password", SecretData::internal([("password", "hunter2")]))
}

#[rstest]
#[case::unknown_node("project", "nope", StatusCode::NOT_FOUND, "not_found")]
#[case::unknown_type("tenant", "p1", StatusCode::BAD_REQUEST, "invalid_reference")]
#[case::malformed_ref("project", "acme//api", StatusCode::BAD_REQUEST, "invalid_reference")]
#[case::empty_ref("project", "", StatusCode::BAD_REQUEST, "invalid_reference")]
#[tokio::test]
async fn list_errors_are_classified(
    hierarchy: Vec<ProjectionEvent>,
    #[case] owner_type: &str,
    #[case] owner_ref: &str,
    #[case] status: StatusCode,
    #[case] error_type: &str,
) {
    let api = api_over(memory_db(&hierarchy).await, QueryOptions::default());

    let err = api
        .list_secrets(owner_type, owner_ref, true)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), status);
    assert_eq!(err.error_type(), error_type);
}

#[rstest]
#[tokio::test]
async fn unknown_type_is_rejected_before_any_query(hierarchy: Vec<ProjectionEvent>) {
    let model = InstrumentedReadModel::new(memory_db(&hierarchy).await);
    let counters = model.counters();
    let api = api_over(Arc::new(model), QueryOptions::default());

    let err = api.list_secrets("tenant", "p1", false).await.unwrap_err();
    assert_eq!(err.stage(), None);
    assert_eq!(counters.begun(), 0);
}

#[rstest]
#[tokio::test]
async fn point_lookup_absence_is_not_an_error(hierarchy: Vec<ProjectionEvent>) {
    let api = api_over(memory_db(&hierarchy).await, QueryOptions::default());

    assert!(api.get_secret("s-missing").await.unwrap().is_none());
    assert!(api.get_secret("s-p2-key").await.unwrap().is_some());

    let err = api.get_secret("").await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn snapshot_timeout_is_service_unavailable(hierarchy: Vec<ProjectionEvent>) {
    let model = InstrumentedReadModel::new(memory_db(&hierarchy).await)
        .with_begin_delay(Duration::from_millis(500));
    let options = QueryOptions {
        snapshot_timeout: Duration::from_millis(10),
        ..QueryOptions::default()
    };
    let api = api_over(Arc::new(model), options);

    let err = api.get_secret("s-p1-key").await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(err.stage(), Some(QueryStage::Snapshot));
}

#[rstest]
#[tokio::test]
async fn corrupted_hierarchy_is_an_internal_error(cyclic_hierarchy: Vec<ProjectionEvent>) {
    let api = api_over(memory_db(&cyclic_hierarchy).await, QueryOptions::default());

    let err = api.list_secrets("project", "p1", true).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.error_type(), "invariant_violation");
    assert_eq!(err.public_message(), "internal error");

    // point lookups fail too: the owner path cannot be built
    let err = api.get_secret("s-p1").await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[rstest]
#[tokio::test]
async fn fetch_failure_is_an_internal_error(hierarchy: Vec<ProjectionEvent>) {
    let model = InstrumentedReadModel::new(memory_db(&hierarchy).await).failing_fetch_for("p1");
    let api = api_over(Arc::new(model), QueryOptions::default());

    let err = api.list_secrets("project", "p1", false).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.error_type(), "read_model_error");
    assert_eq!(err.stage(), Some(QueryStage::Fetch));
}

#[tokio::test]
async fn create_list_delete_round() {
    let (api, handler) = writable_api().await;

    let created = api
        .create_secret("project", "acme/api", password())
        .await
        .unwrap();
    assert_eq!(created.parent.id.as_str(), "p1");
    assert!(created.owner_path().is_none());

    handler.sync().await.unwrap();

    let listed = api.list_secrets("project", "p1", false).await.unwrap();
    let json = serde_json::to_value(&listed).unwrap();
    assert_eq!(
        json,
        serde_json::json!([{
            "id": created.id.as_str(),
            "name": "db-password",
            "parent": { "type": "project", "id": "p1", "path": "org/acme/api" },
            "type": "internal",
            "data": { "password": "hunter2" },
        }])
    );

    let fetched = api.get_secret(created.id.as_str()).await.unwrap().unwrap();
    assert_eq!(fetched.owner_path().unwrap().ids(), vec!["o1", "p1"]);

    api.delete_secret("project", "p1", "db-password")
        .await
        .unwrap();
    handler.sync().await.unwrap();
    assert!(api.get_secret(created.id.as_str()).await.unwrap().is_none());
}

#[tokio::test]
async fn command_errors_are_classified() {
    let (api, _handler) = writable_api().await;
    api.create_secret("org", "acme", password()).await.unwrap();

    let err = api
        .create_secret("org", "acme", password())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::CONFLICT);
    assert_eq!(err.error_type(), "already_exists");

    let empty = NewSecret::new("empty", SecretData::internal(Vec::<(String, String)>::new()));
    let err = api.create_secret("org", "acme", empty).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(err.error_type(), "validation_error");

    let err = api
        .create_secret("project", "missing", password())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

    let err = api
        .delete_secret("org", "acme", "never-created")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

    let err = api
        .create_secret("galaxy", "acme", password())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}
