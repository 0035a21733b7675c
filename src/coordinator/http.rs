//! HTTP surface of a coordinator using axum.
//!
//! Every `/_api` route is served both at the root (system database) and
//! below `/_db/{db}`.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{FromRequestParts, OriginalUri, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::Coordinator;
use crate::auth::{GrantLevel, Identity, SYSTEM_DATABASE};
use crate::cursor::{CreateCursorRequest, CursorId};
use crate::error::{AuthError, CatalogError, CursordError, ErrorResponse};
use crate::graph::{EdgeDefinition, GraphEngine};

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Error rendered as `{error, code, errorNum, errorMessage}`.
#[derive(Debug)]
pub struct ApiError(pub CursordError);

impl<E: Into<CursordError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self.0);
        let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected ({}): {}", body.code, self.0);
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ─── Extractors ─────────────────────────────────────────────────────────────

/// Authenticated caller, from HTTP Basic credentials.
pub struct Caller(pub Identity);

impl FromRequestParts<Coordinator> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Coordinator) -> ApiResult<Self> {
        let (username, password) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_basic)
            .ok_or(AuthError::Unauthenticated)?;
        state
            .cluster()
            .credentials
            .validate(&username, &password)
            .await
            .map(Caller)
            .ok_or_else(|| AuthError::Unauthenticated.into())
    }
}

/// Database addressed by the request path.
pub struct Db(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Db {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let path = match parts.extensions.get::<OriginalUri>() {
            Some(original) => original.0.path().to_string(),
            None => parts.uri.path().to_string(),
        };
        Ok(Db(database_from_path(&path)))
    }
}

fn database_from_path(path: &str) -> String {
    path.strip_prefix("/_db/")
        .and_then(|rest| rest.split('/').next())
        .filter(|db| !db.is_empty())
        .unwrap_or(SYSTEM_DATABASE)
        .to_string()
}

fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, password) = text.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// `Authorization` header value for the given credentials.
pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> ApiResult<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| CursordError::Generic(format!("missing path parameter '{name}'")).into())
}

// ─── Router construction ────────────────────────────────────────────────────

/// Build the router of one coordinator.
pub fn build_router(coordinator: Coordinator) -> Router {
    Router::new()
        .merge(api_routes())
        .nest("/_db/{db}", api_routes())
        .route("/_admin/status", get(status))
        .with_state(coordinator)
}

fn api_routes() -> Router<Coordinator> {
    Router::new()
        // Cursor routes.
        .route("/_api/cursor", post(create_cursor))
        .route(
            "/_api/cursor/{id}",
            put(next_batch).post(next_batch).delete(delete_cursor),
        )
        // Catalog routes.
        .route("/_api/collection", post(create_collection))
        .route("/_api/collection/{name}", delete(drop_collection))
        .route("/_api/document/{collection}", post(insert_document))
        // User routes.
        .route("/_api/user", post(create_user))
        .route("/_api/user/{user}", delete(remove_user))
        .route(
            "/_api/user/{user}/database/{target}",
            put(grant_database).delete(revoke_database),
        )
        .route(
            "/_api/user/{user}/database/{target}/{collection}",
            put(grant_collection).delete(revoke_collection),
        )
        // Graph routes.
        .route("/_api/gharial", get(list_graphs).post(create_graph))
        .route("/_api/gharial/{name}", get(get_graph).delete(drop_graph))
}

// ─── Cursor handlers ────────────────────────────────────────────────────────

async fn create_cursor(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Db(db): Db,
    Json(body): Json<CreateCursorRequest>,
) -> ApiResult<impl IntoResponse> {
    debug!("[{}] create cursor for {} on {}", coord.name(), identity.username, db);
    let resp = coord.cluster().cursors.create(&identity, &db, body).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

async fn next_batch(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Db(db): Db,
    Path(params): Path<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let id = CursorId::from(param(&params, "id")?);
    debug!("[{}] continue cursor {} for {}", coord.name(), id, identity.username);
    let resp = coord.cluster().cursors.next(&identity, &db, &id).await?;
    Ok((StatusCode::OK, Json(resp)))
}

async fn delete_cursor(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Db(db): Db,
    Path(params): Path<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let id = CursorId::from(param(&params, "id")?);
    coord.cluster().cursors.delete(&identity, &db, &id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": id, "error": false, "code": 202 })),
    ))
}

// ─── Catalog handlers ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateCollectionRequest {
    name: String,
}

async fn require_manage(coord: &Coordinator, identity: &Identity, db: &str) -> ApiResult<()> {
    if coord
        .cluster()
        .gate
        .can_manage_database(&identity.username, db)
        .await?
    {
        Ok(())
    } else {
        Err(AuthError::AdminRequired(identity.username.clone()).into())
    }
}

async fn create_collection(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Db(db): Db,
    Json(body): Json<CreateCollectionRequest>,
) -> ApiResult<impl IntoResponse> {
    require_manage(&coord, &identity, &db).await?;
    coord.cluster().catalog.create_collection(&db, &body.name).await?;
    Ok((
        StatusCode::OK,
        Json(json!({ "name": body.name, "error": false, "code": 200 })),
    ))
}

async fn drop_collection(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Db(db): Db,
    Path(params): Path<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let name = param(&params, "name")?;
    require_manage(&coord, &identity, &db).await?;
    if !coord.cluster().catalog.drop_collection(&db, name).await? {
        return Err(CatalogError::CollectionNotFound(name.to_string()).into());
    }
    Ok((
        StatusCode::OK,
        Json(json!({ "name": name, "error": false, "code": 200 })),
    ))
}

async fn insert_document(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Db(db): Db,
    Path(params): Path<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let collection = param(&params, "collection")?;
    let cluster = coord.cluster();
    cluster
        .gate
        .authorize_write(&identity.username, &db, collection)
        .await?;
    let meta = cluster.catalog.insert(&db, collection, body).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "_key": meta.key, "_id": meta.id, "_rev": meta.rev })),
    ))
}

// ─── User handlers ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateUserRequest {
    user: String,
    #[serde(default)]
    passwd: String,
}

#[derive(Deserialize)]
struct GrantRequest {
    grant: GrantLevel,
}

async fn create_user(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Json(body): Json<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let cluster = coord.cluster();
    cluster.gate.require_admin(&identity.username).await?;
    cluster.users.create_user(&body.user, &body.passwd).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": body.user, "active": true, "error": false, "code": 201 })),
    ))
}

async fn remove_user(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Path(params): Path<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let user = param(&params, "user")?;
    let cluster = coord.cluster();
    cluster.gate.require_admin(&identity.username).await?;
    cluster.users.remove_user(user).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "error": false, "code": 202 })),
    ))
}

async fn grant_database(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Path(params): Path<HashMap<String, String>>,
    Json(body): Json<GrantRequest>,
) -> ApiResult<impl IntoResponse> {
    let (user, target) = (param(&params, "user")?, param(&params, "target")?);
    let cluster = coord.cluster();
    cluster.gate.require_admin(&identity.username).await?;
    cluster.users.grant_database(user, target, body.grant).await?;
    Ok((
        StatusCode::OK,
        Json(json!({ "database": target, "grant": body.grant, "error": false, "code": 200 })),
    ))
}

async fn revoke_database(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Path(params): Path<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let (user, target) = (param(&params, "user")?, param(&params, "target")?);
    let cluster = coord.cluster();
    cluster.gate.require_admin(&identity.username).await?;
    cluster.users.revoke_database(user, target).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "error": false, "code": 202 })),
    ))
}

async fn grant_collection(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Path(params): Path<HashMap<String, String>>,
    Json(body): Json<GrantRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = param(&params, "user")?;
    let target = param(&params, "target")?;
    let collection = param(&params, "collection")?;
    let cluster = coord.cluster();
    cluster.gate.require_admin(&identity.username).await?;
    cluster
        .users
        .grant_collection(user, target, collection, body.grant)
        .await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "database": target,
            "collection": collection,
            "grant": body.grant,
            "error": false,
            "code": 200,
        })),
    ))
}

async fn revoke_collection(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Path(params): Path<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let user = param(&params, "user")?;
    let target = param(&params, "target")?;
    let collection = param(&params, "collection")?;
    let cluster = coord.cluster();
    cluster.gate.require_admin(&identity.username).await?;
    cluster
        .users
        .revoke_collection(user, target, collection)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "error": false, "code": 202 })),
    ))
}

// ─── Graph handlers ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGraphRequest {
    name: String,
    #[serde(default)]
    edge_definitions: Vec<EdgeDefinition>,
    #[serde(default)]
    orphan_collections: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DropGraphParams {
    #[serde(default)]
    drop_collections: bool,
}

async fn list_graphs(
    State(coord): State<Coordinator>,
    Caller(_identity): Caller,
    Db(db): Db,
) -> ApiResult<impl IntoResponse> {
    let graphs = &coord.cluster().graphs;
    let mut definitions = Vec::new();
    for name in graphs.list(&db).await? {
        definitions.push(graphs.get(&db, &name).await?);
    }
    Ok(Json(json!({ "graphs": definitions, "error": false, "code": 200 })))
}

async fn create_graph(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Db(db): Db,
    Json(body): Json<CreateGraphRequest>,
) -> ApiResult<impl IntoResponse> {
    require_manage(&coord, &identity, &db).await?;
    let graph = coord
        .cluster()
        .graphs
        .create(&db, &body.name, body.edge_definitions, body.orphan_collections)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "graph": graph, "error": false, "code": 202 })),
    ))
}

async fn get_graph(
    State(coord): State<Coordinator>,
    Caller(_identity): Caller,
    Db(db): Db,
    Path(params): Path<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    let name = param(&params, "name")?;
    let graph = coord.cluster().graphs.get(&db, name).await?;
    Ok(Json(json!({ "graph": graph, "error": false, "code": 200 })))
}

async fn drop_graph(
    State(coord): State<Coordinator>,
    Caller(identity): Caller,
    Db(db): Db,
    Path(params): Path<HashMap<String, String>>,
    Query(options): Query<DropGraphParams>,
) -> ApiResult<impl IntoResponse> {
    let name = param(&params, "name")?;
    require_manage(&coord, &identity, &db).await?;
    coord
        .cluster()
        .graphs
        .drop_graph(&db, name, options.drop_collections)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "removed": true, "error": false, "code": 202 })),
    ))
}

// ─── Status ─────────────────────────────────────────────────────────────────

async fn status(State(coord): State<Coordinator>) -> impl IntoResponse {
    let cursors = coord.cluster().cursors.store().len().await;
    Json(json!({
        "server": "cursord",
        "version": crate::VERSION,
        "coordinator": coord.name(),
        "cursors": cursors,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::ClusterState;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn make_app() -> (Arc<ClusterState>, Router) {
        let state = Arc::new(ClusterState::new(&Config::default()));
        state.users.create_user("root", "").await.unwrap();
        state
            .users
            .grant_database("root", SYSTEM_DATABASE, GrantLevel::ReadWrite)
            .await
            .unwrap();
        let app = build_router(Coordinator::new("coord-test", state.clone()));
        (state, app)
    }

    async fn body_to_json(body: Body) -> Value {
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header(header::AUTHORIZATION, basic_auth("root", ""))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_database_from_path() {
        assert_eq!(database_from_path("/_api/cursor"), "_system");
        assert_eq!(database_from_path("/_db/shop/_api/cursor"), "shop");
        assert_eq!(database_from_path("/_db//_api/cursor"), "_system");
    }

    #[test]
    fn test_parse_basic() {
        let header = basic_auth("alice", "pa:ss");
        assert_eq!(
            parse_basic(&header),
            Some(("alice".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic !!!"), None);
    }

    #[tokio::test]
    async fn test_status() {
        let (_, app) = make_app().await;
        let req = Request::builder()
            .uri("/_admin/status")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_to_json(resp.into_body()).await;
        assert_eq!(json["coordinator"], "coord-test");
        assert_eq!(json["cursors"], 0);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let (_, app) = make_app().await;
        let req = Request::builder()
            .method("POST")
            .uri("/_api/cursor")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query":"FOR d IN x RETURN d"}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let json = body_to_json(resp.into_body()).await;
        assert_eq!(json["error"], true);
        assert_eq!(json["errorNum"], 401);
    }

    #[tokio::test]
    async fn test_collection_document_and_cursor() {
        let (_, app) = make_app().await;

        let resp = app
            .clone()
            .oneshot(request("POST", "/_api/collection", json!({ "name": "animals" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        for key in ["ant", "bee", "cat"] {
            let resp = app
                .clone()
                .oneshot(request(
                    "POST",
                    "/_api/document/animals",
                    json!({ "_key": key }),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/_db/_system/_api/cursor",
                json!({ "query": "FOR a IN animals SORT a._key DESC RETURN a._key", "batchSize": 5 }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_to_json(resp.into_body()).await;
        assert_eq!(json["result"], json!(["cat", "bee", "ant"]));
        assert_eq!(json["hasMore"], false);
        assert!(json.get("id").is_none());
    }

    #[tokio::test]
    async fn test_unknown_cursor_is_404() {
        let (_, app) = make_app().await;
        let resp = app
            .oneshot(request("PUT", "/_api/cursor/12345", Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_to_json(resp.into_body()).await;
        assert_eq!(json["errorNum"], 1600);
    }

    #[tokio::test]
    async fn test_graph_routes() {
        let (state, app) = make_app().await;
        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/_api/gharial",
                json!({
                    "name": "food",
                    "edgeDefinitions": [{ "collection": "eats", "from": ["animals"], "to": ["fruits"] }]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(state.catalog.collection_exists("_system", "eats").await);

        let resp = app
            .clone()
            .oneshot(request("GET", "/_api/gharial/food", Value::Null))
            .await
            .unwrap();
        let json = body_to_json(resp.into_body()).await;
        assert_eq!(json["graph"]["edgeDefinitions"][0]["collection"], "eats");

        let resp = app
            .clone()
            .oneshot(request(
                "DELETE",
                "/_api/gharial/food?dropCollections=true",
                Value::Null,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(!state.catalog.collection_exists("_system", "eats").await);
    }

    #[tokio::test]
    async fn test_user_management_requires_admin() {
        let (state, app) = make_app().await;
        state.users.create_user("carol", "pw").await.unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/_api/user")
            .header("content-type", "application/json")
            .header(header::AUTHORIZATION, basic_auth("carol", "pw"))
            .body(Body::from(r#"{"user":"dave"}"#))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .oneshot(request("POST", "/_api/user", json!({ "user": "dave", "passwd": "x" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert!(state.users.user_exists("dave").await);
    }

    #[tokio::test]
    async fn test_remove_user() {
        let (state, app) = make_app().await;
        state.users.create_user("erin", "pw").await.unwrap();

        let resp = app
            .clone()
            .oneshot(request("DELETE", "/_api/user/erin", Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(!state.users.user_exists("erin").await);

        // removed users can no longer authenticate
        let req = Request::builder()
            .method("POST")
            .uri("/_api/cursor")
            .header("content-type", "application/json")
            .header(header::AUTHORIZATION, basic_auth("erin", "pw"))
            .body(Body::from(r#"{"query":"FOR d IN c RETURN d"}"#))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(request("DELETE", "/_api/user/erin", Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
