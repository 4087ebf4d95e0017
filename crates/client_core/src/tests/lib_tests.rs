use super::*;
use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response as AxumResponse},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use shared::domain::{AccessOperation, OrganizationId, Permission, UserId};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone)]
struct RecordedRequest {
    route: String,
    authorization: Option<String>,
    body: Option<serde_json::Value>,
    query: HashMap<String, String>,
}

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ServerState {
    async fn record(
        &self,
        route: &str,
        headers: &HeaderMap,
        body: Option<serde_json::Value>,
        query: HashMap<String, String>,
    ) {
        let authorization = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.requests.lock().await.push(RecordedRequest {
            route: route.to_string(),
            authorization,
            body,
            query,
        });
    }
}

fn book_from_payload(id: String, payload: &BookPayload) -> BookRecord {
    let now = Utc::now();
    BookRecord {
        id: BookId(id),
        title: payload.title.clone(),
        author: payload.author.clone(),
        publication_year: payload.publication_year,
        organization_id: payload.organization_id.clone(),
        created_at: now,
        updated_at: now,
        organization: None,
    }
}

async fn handle_create_book(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(payload): Json<BookPayload>,
) -> AxumResponse {
    state
        .record(
            "POST /books",
            &headers,
            serde_json::to_value(&payload).ok(),
            HashMap::new(),
        )
        .await;
    if payload.title == "duplicate" {
        return (
            StatusCode::CONFLICT,
            Json(ApiError::new(ErrorCode::Conflict, "book already exists")),
        )
            .into_response();
    }
    let record = book_from_payload(uuid::Uuid::new_v4().to_string(), &payload);
    (StatusCode::CREATED, Json(record)).into_response()
}

async fn handle_update_book(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<BookPayload>,
) -> AxumResponse {
    state
        .record(
            &format!("PUT /books/{id}"),
            &headers,
            serde_json::to_value(&payload).ok(),
            HashMap::new(),
        )
        .await;
    Json(book_from_payload(id, &payload)).into_response()
}

async fn handle_get_book(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> AxumResponse {
    state
        .record(&format!("GET /books/{id}"), &headers, None, query)
        .await;
    (StatusCode::NOT_FOUND, "no such book").into_response()
}

async fn handle_list_books(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Page<BookRecord>> {
    state.record("GET /books", &headers, None, query).await;
    Json(Page::new(Vec::new()))
}

async fn handle_list_organizations(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Page<OrganizationRecord>> {
    let search = query.get("search").cloned();
    state
        .record("GET /organizations", &headers, None, query)
        .await;
    let all = vec![
        OrganizationRecord {
            id: OrganizationId::new("org-1"),
            name: "Acme Press".into(),
            created_at: None,
            updated_at: None,
        },
        OrganizationRecord {
            id: OrganizationId::new("org-42"),
            name: "Chilton Books".into(),
            created_at: None,
            updated_at: None,
        },
    ];
    let data = all
        .into_iter()
        .filter(|org| match &search {
            Some(term) => org.name.to_lowercase().contains(&term.to_lowercase()),
            None => true,
        })
        .collect();
    Json(Page::new(data))
}

async fn handle_session(State(state): State<ServerState>, headers: HeaderMap) -> AxumResponse {
    state
        .record("GET /session", &headers, None, HashMap::new())
        .await;
    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some("Bearer secret-token");
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(Principal {
        user_id: UserId::new("user-7"),
        display_name: Some("Ada".into()),
        permissions: vec![Permission::project("book", AccessOperation::Create)],
    })
    .into_response()
}

async fn spawn_admin_server() -> Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/books", post(handle_create_book).get(handle_list_books))
        .route(
            "/api/books/:id",
            get(handle_get_book).put(handle_update_book),
        )
        .route("/api/organizations", get(handle_list_organizations))
        .route("/api/session", get(handle_session))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api"), state))
}

fn dune_payload() -> BookPayload {
    BookPayload {
        title: "Dune".into(),
        author: "Herbert".into(),
        publication_year: Some(1965),
        organization_id: Some(OrganizationId::new("org-42")),
    }
}

#[tokio::test]
async fn create_book_posts_payload_with_bearer_token() {
    let (server_url, state) = spawn_admin_server().await.expect("spawn server");
    let client = AdminClient::new(&server_url)
        .expect("client")
        .with_token("secret-token");

    let record = client.create_book(&dune_payload()).await.expect("create");
    assert_eq!(record.title, "Dune");
    assert_eq!(record.publication_year, Some(1965));
    assert_eq!(record.organization_id, Some(OrganizationId::new("org-42")));
    assert!(!record.id.as_str().is_empty());

    let requests = state.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].route, "POST /books");
    assert_eq!(
        requests[0].authorization.as_deref(),
        Some("Bearer secret-token")
    );
    assert_eq!(
        requests[0].body,
        Some(serde_json::json!({
            "title": "Dune",
            "author": "Herbert",
            "publication_year": 1965,
            "organization_id": "org-42",
        }))
    );
}

#[tokio::test]
async fn base_url_with_trailing_slash_resolves_same_endpoint() {
    let (server_url, state) = spawn_admin_server().await.expect("spawn server");
    let client = AdminClient::new(&format!("{server_url}/")).expect("client");

    client.create_book(&dune_payload()).await.expect("create");
    assert_eq!(state.requests.lock().await[0].route, "POST /books");
}

#[tokio::test]
async fn api_error_body_is_decoded() {
    let (server_url, _state) = spawn_admin_server().await.expect("spawn server");
    let client = AdminClient::new(&server_url).expect("client");

    let mut payload = dune_payload();
    payload.title = "duplicate".into();
    let err = client.create_book(&payload).await.expect_err("must fail");

    assert_eq!(err.status(), Some(409));
    let api_error = err.api_error().expect("api error");
    assert_eq!(api_error.code, ErrorCode::Conflict);
    assert_eq!(api_error.message, "book already exists");
}

#[tokio::test]
async fn plain_text_error_falls_back_to_status_code() {
    let (server_url, state) = spawn_admin_server().await.expect("spawn server");
    let client = AdminClient::new(&server_url).expect("client");

    let err = client
        .get_book_by_id(&BookId::new("missing"))
        .await
        .expect_err("must fail");
    let api_error = err.api_error().expect("api error");
    assert_eq!(api_error.code, ErrorCode::NotFound);
    assert_eq!(api_error.message, "no such book");

    let requests = state.requests.lock().await;
    assert_eq!(requests[0].route, "GET /books/missing");
    assert_eq!(
        requests[0].query.get("include").map(String::as_str),
        Some("organization")
    );
}

#[tokio::test]
async fn update_book_targets_record_path() {
    let (server_url, state) = spawn_admin_server().await.expect("spawn server");
    let client = AdminClient::new(&server_url).expect("client");

    let record = client
        .update_book(&BookId::new("book-9"), &dune_payload())
        .await
        .expect("update");
    assert_eq!(record.id, BookId::new("book-9"));
    assert_eq!(state.requests.lock().await[0].route, "PUT /books/book-9");
}

#[tokio::test]
async fn list_queries_serialize_only_present_filters() {
    let (server_url, state) = spawn_admin_server().await.expect("spawn server");
    let client = AdminClient::new(&server_url).expect("client");

    let page = client
        .get_organizations(&OrganizationQuery {
            search: Some("chilton".into()),
            limit: Some(20),
            ..OrganizationQuery::default()
        })
        .await
        .expect("organizations");
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].id, OrganizationId::new("org-42"));

    client
        .get_books(&BookQuery {
            organization_id: Some(OrganizationId::new("org-42")),
            order: Some(shared::protocol::SortOrder::Desc),
            ..BookQuery::default()
        })
        .await
        .expect("books");

    let requests = state.requests.lock().await;
    let org_query = &requests[0].query;
    assert_eq!(org_query.get("search").map(String::as_str), Some("chilton"));
    assert_eq!(org_query.get("limit").map(String::as_str), Some("20"));
    assert!(!org_query.contains_key("offset"));

    let book_query = &requests[1].query;
    assert_eq!(
        book_query.get("organization_id").map(String::as_str),
        Some("org-42")
    );
    assert_eq!(book_query.get("order").map(String::as_str), Some("desc"));
    assert_eq!(book_query.len(), 2);
}

#[tokio::test]
async fn current_principal_requires_token() {
    let (server_url, _state) = spawn_admin_server().await.expect("spawn server");

    let anonymous = AdminClient::new(&server_url).expect("client");
    let err = anonymous
        .current_principal()
        .await
        .expect_err("must be unauthorized");
    assert_eq!(err.status(), Some(401));
    assert_eq!(
        err.api_error().map(|error| error.code),
        Some(ErrorCode::Unauthorized)
    );

    let authed = AdminClient::new(&server_url)
        .expect("client")
        .with_token("secret-token");
    let principal = authed.current_principal().await.expect("principal");
    assert_eq!(principal.user_id, UserId::new("user-7"));
    assert!(principal.can(&Permission::project("book", AccessOperation::Create)));
}

#[test]
fn rejects_non_base_urls() {
    assert!(matches!(
        AdminClient::new("mailto:admin@example.com"),
        Err(ClientError::InvalidUrl { .. })
    ));
    assert!(matches!(
        AdminClient::new("not a url"),
        Err(ClientError::InvalidUrl { .. })
    ));
}
