#![allow(dead_code)]

use std::collections::HashMap;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use uuid::Uuid;

use sda_portal::config::BackendConfig;

pub const JWT_SECRET: &str = "integration-test-jwt-secret";
pub const ANON_KEY: &str = "anon-test-key";
pub const SERVICE_ROLE_KEY: &str = "service-role-test-key";

pub const ADMIN_ID: Uuid = Uuid::from_u128(0x0a);
pub const INACTIVE_ADMIN_ID: Uuid = Uuid::from_u128(0x0b);
pub const STAFF_ID: Uuid = Uuid::from_u128(0x0c);
pub const PARTICIPANT_ID: Uuid = Uuid::from_u128(0x0d);

pub const VISIBLE_PROPERTY_ID: Uuid = Uuid::from_u128(0x101);
pub const HIDDEN_PROPERTY_ID: Uuid = Uuid::from_u128(0x102);
pub const INVESTOR_A: Uuid = Uuid::from_u128(0x201);
pub const INVESTOR_B: Uuid = Uuid::from_u128(0x202);

pub const PASSWORD: &str = "correct horse battery";

/// Accounts the stub token endpoint accepts with [`PASSWORD`]
const ACCOUNTS: &[(&str, Uuid)] = &[
    ("admin@example.com", ADMIN_ID),
    ("inactive@example.com", INACTIVE_ADMIN_ID),
    ("staff@example.com", STAFF_ID),
    ("participant@example.com", PARTICIPANT_ID),
];

/// One request seen by the stub
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub authorization: Option<String>,
    pub apikey: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct StubState {
    pub requests: Mutex<Vec<Recorded>>,
    pub inserts: Mutex<Vec<(String, Value)>>,
}

impl StubState {
    pub fn inserts_into(&self, table: &str) -> Vec<Value> {
        self.inserts
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    fn record(&self, method: &Method, path: &str, query: &[(String, String)], headers: &HeaderMap) {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        self.requests.lock().unwrap().push(Recorded {
            method: method.to_string(),
            path: path.to_string(),
            query: query.to_vec(),
            authorization: header("authorization"),
            apikey: header("apikey"),
            content_type: header("content-type"),
        });
    }
}

/// Hosted-platform stand-in: table REST, auth, RPC and edge functions
pub struct Stub {
    pub base_url: String,
    pub state: Arc<StubState>,
}

impl Stub {
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            url: self.base_url.clone(),
            anon_key: ANON_KEY.to_string(),
            service_role_key: Some(SERVICE_ROLE_KEY.to_string()),
            jwt_secret: Some(JWT_SECRET.to_string()),
            request_timeout_secs: Some(10),
        }
    }
}

static STUB: OnceLock<Stub> = OnceLock::new();

/// Started once per test binary on its own runtime, so it outlives every
/// `#[tokio::test]` runtime
pub fn stub() -> &'static Stub {
    STUB.get_or_init(|| {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind stub backend");
        listener.set_nonblocking(true).expect("nonblocking stub listener");
        let base_url = format!("http://{}", listener.local_addr().expect("stub address"));

        let state = Arc::new(StubState::default());
        let app = router(state.clone());

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("stub runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("stub listener");
                axum::serve(listener, app).await.expect("stub server");
            });
        });

        Stub { base_url, state }
    })
}

pub fn access_token(user_id: Uuid, email: &str) -> String {
    access_token_expiring(user_id, email, Utc::now().timestamp() + 3600)
}

pub fn access_token_expiring(user_id: Uuid, email: &str, exp: i64) -> String {
    let claims = json!({
        "sub": user_id,
        "exp": exp,
        "email": email,
        "role": "authenticated",
        "aud": "authenticated",
        "user_metadata": {},
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).expect("encode token")
}

fn token_response(user_id: Uuid, email: &str, metadata: Value) -> Value {
    json!({
        "access_token": access_token(user_id, email),
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": Utc::now().timestamp() + 3600,
        "refresh_token": format!("refresh-{}", user_id),
        "user": { "id": user_id, "email": email, "user_metadata": metadata },
    })
}

fn router(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/rest/v1/rpc/:function", post(rpc))
        .route("/rest/v1/:table", get(select).post(insert))
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/user", get(user))
        .route("/auth/v1/logout", post(logout))
        .route("/auth/v1/signup", post(signup))
        .route("/functions/v1/:name", get(function).post(function))
        .with_state(state)
}

fn fixtures(table: &str) -> Option<Vec<Value>> {
    let rows = match table {
        "profiles" => vec![
            json!({"id": ADMIN_ID, "role": "admin", "is_active": true, "email": "admin@example.com"}),
            json!({"id": INACTIVE_ADMIN_ID, "role": "admin", "is_active": false}),
            json!({"id": STAFF_ID, "role": "staff", "is_active": true}),
        ],
        "participants" => vec![json!({"id": Uuid::from_u128(0x301), "user_id": PARTICIPANT_ID, "full_name": "Pat"})],
        "properties" => vec![
            json!({
                "id": VISIBLE_PROPERTY_ID, "name": "Harbour View", "organization_id": "org-1",
                "audience": "participant", "status": "available",
                "visible_to_participants": true, "visible_to_investors": false,
                "images": ["a.jpg"], "created_at": "2024-02-01T00:00:00Z"
            }),
            json!({
                "id": HIDDEN_PROPERTY_ID, "name": "Draft", "organization_id": null,
                "status": "draft", "visible_to_participants": false, "visible_to_investors": true,
                "images": [], "created_at": "2024-01-01T00:00:00Z"
            }),
            json!({
                "id": Uuid::from_u128(0x103), "name": "Garden Flat", "organization_id": "org-2",
                "audience": "both", "status": "leased",
                "visible_to_participants": true, "visible_to_investors": true,
                "images": ["b.jpg", "c.jpg"], "created_at": "2024-03-01T00:00:00Z"
            }),
        ],
        "investors" => vec![
            json!({"id": INVESTOR_A, "full_name": "Avery", "company_name": "A Capital"}),
            json!({"id": INVESTOR_B, "full_name": "Blake"}),
        ],
        "job_investors" => vec![
            json!({"job_id": 1, "investor_id": INVESTOR_A}),
            json!({"job_id": 2, "investor_id": INVESTOR_A}),
            json!({"job_id": 3, "investor_id": INVESTOR_B}),
        ],
        "jobs" => (1..=3).map(|id| json!({"id": id, "title": format!("Job {}", id)})).collect(),
        "organizations" | "property_access_logs" | "security_events_enhanced" => Vec::new(),
        _ => return None,
    };
    Some(rows)
}

fn cell_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn row_matches(row: &Value, column: &str, expr: &str) -> bool {
    let cell = cell_text(row.get(column));
    if let Some(expected) = expr.strip_prefix("eq.") {
        return cell.as_deref() == Some(expected);
    }
    if let Some(list) = expr.strip_prefix("in.(").and_then(|s| s.strip_suffix(')')) {
        let values: Vec<String> = list.split(',').map(|v| v.trim_matches('"').to_string()).collect();
        return cell.map_or(false, |c| values.contains(&c));
    }
    true
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

async fn select(
    State(state): State<Arc<StubState>>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    state.record(&method, &format!("/rest/v1/{}", table), &params, &headers);

    if table == "broken" {
        return error(StatusCode::INTERNAL_SERVER_ERROR, json!({"code": "57014", "message": "statement timeout"}));
    }
    let Some(rows) = fixtures(&table) else {
        return error(
            StatusCode::NOT_FOUND,
            json!({"code": "42P01", "message": format!("relation \"public.{}\" does not exist", table)}),
        );
    };

    let lookup: HashMap<&str, &str> = params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let filtered: Vec<Value> = rows
        .into_iter()
        .filter(|row| {
            params
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "select" | "order" | "offset" | "limit"))
                .all(|(column, expr)| row_matches(row, column, expr))
        })
        .collect();
    let total = filtered.len();

    let offset: usize = lookup.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit: usize = lookup.get("limit").and_then(|v| v.parse().ok()).unwrap_or(usize::MAX);
    let page: Vec<Value> = filtered.into_iter().skip(offset).take(limit).collect();

    let wants_count = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.contains("count=exact"));

    let mut response = Json(Value::Array(page.clone())).into_response();
    if wants_count {
        let range = if page.is_empty() {
            format!("*/{}", total)
        } else {
            format!("{}-{}/{}", offset, offset + page.len() - 1, total)
        };
        response
            .headers_mut()
            .insert("content-range", range.parse().expect("content-range header"));
    }
    response
}

async fn insert(
    State(state): State<Arc<StubState>>,
    Path(table): Path<String>,
    method: Method,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(&method, &format!("/rest/v1/{}", table), &[], &headers);

    let rows = match body {
        Value::Array(rows) => rows,
        row => vec![row],
    };
    let mut inserts = state.inserts.lock().unwrap();
    for row in &rows {
        inserts.push((table.clone(), row.clone()));
    }
    (StatusCode::CREATED, Json(Value::Array(rows))).into_response()
}

async fn rpc(
    State(state): State<Arc<StubState>>,
    Path(function): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    state.record(&method, &format!("/rest/v1/rpc/{}", function), &[], &headers);

    match function.as_str() {
        "property_count" => Json(json!(3)).into_response(),
        _ => error(
            StatusCode::NOT_FOUND,
            json!({"code": "PGRST202", "message": format!("Could not find the function public.{}", function)}),
        ),
    }
}

async fn token(
    State(state): State<Arc<StubState>>,
    Query(params): Query<Vec<(String, String)>>,
    method: Method,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(&method, "/auth/v1/token", &params, &headers);
    let grant = params.iter().find(|(k, _)| k == "grant_type").map(|(_, v)| v.as_str());

    match grant {
        Some("password") => {
            let email = body["email"].as_str().unwrap_or_default();
            let password = body["password"].as_str().unwrap_or_default();
            match ACCOUNTS.iter().find(|(e, _)| *e == email) {
                Some((email, id)) if password == PASSWORD => Json(token_response(*id, email, json!({}))).into_response(),
                _ => error(
                    StatusCode::BAD_REQUEST,
                    json!({"error": "invalid_grant", "error_description": "Invalid login credentials"}),
                ),
            }
        }
        Some("refresh_token") => {
            let refresh = body["refresh_token"].as_str().unwrap_or_default();
            match refresh.strip_prefix("refresh-").and_then(|id| Uuid::parse_str(id).ok()) {
                Some(id) => {
                    let email = ACCOUNTS.iter().find(|(_, a)| *a == id).map_or("unknown@example.com", |(e, _)| *e);
                    Json(token_response(id, email, json!({}))).into_response()
                }
                None => error(StatusCode::BAD_REQUEST, json!({"error": "invalid_grant"})),
            }
        }
        _ => error(StatusCode::BAD_REQUEST, json!({"error": "unsupported_grant_type"})),
    }
}

async fn user(State(state): State<Arc<StubState>>, method: Method, headers: HeaderMap) -> Response {
    state.record(&method, "/auth/v1/user", &[], &headers);

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    match sda_portal::backend::session::verify_access_token(token, JWT_SECRET) {
        Ok(claims) => Json(json!({"id": claims.sub, "email": claims.email, "user_metadata": {}})).into_response(),
        Err(_) => error(StatusCode::UNAUTHORIZED, json!({"message": "invalid JWT"})),
    }
}

async fn logout(State(state): State<Arc<StubState>>, method: Method, headers: HeaderMap) -> StatusCode {
    state.record(&method, "/auth/v1/logout", &[], &headers);
    StatusCode::NO_CONTENT
}

async fn signup(
    State(state): State<Arc<StubState>>,
    method: Method,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record(&method, "/auth/v1/signup", &[], &headers);

    let email = body["email"].as_str().unwrap_or_default().to_string();
    if ACCOUNTS.iter().any(|(e, _)| *e == email) {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({"code": "user_already_exists", "msg": "User already registered"}),
        );
    }

    let id = Uuid::new_v4();
    let metadata = body.get("data").cloned().unwrap_or_else(|| json!({}));
    if email.contains("pending") {
        // Email confirmation required: no session yet
        return Json(json!({"id": id, "email": email, "user_metadata": metadata})).into_response();
    }
    Json(token_response(id, &email, metadata)).into_response()
}

async fn function(
    State(state): State<Arc<StubState>>,
    Path(name): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(&method, &format!("/functions/v1/{}", name), &params, &headers);
    let action = params.iter().find(|(k, _)| k == "action").map(|(_, v)| v.clone());

    match name.as_str() {
        "fails" => error(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "boom"})),
        "missing" => StatusCode::NOT_FOUND.into_response(),
        "garbled" => (StatusCode::OK, "not json").into_response(),
        "echo" => Json(json!({
            "method": method.to_string(),
            "action": action,
            "authorization": headers.get("authorization").and_then(|v| v.to_str().ok()),
            "body": serde_json::from_slice::<Value>(&body).ok(),
        }))
        .into_response(),
        _ => Json(json!({"function": name, "status": "ok", "action": action})).into_response(),
    }
}

/// The back-office server binary, pointed at the stub
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub const SERVER_RATE_LIMIT: usize = 3;

impl TestServer {
    fn spawn() -> Result<Self> {
        let stub = stub();
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let child = Command::new(env!("CARGO_BIN_EXE_sda-portal"))
            .env("APP_ENV", "development")
            .env("SDA_PORT", port.to_string())
            .env("BACKEND_URL", &stub.base_url)
            .env("BACKEND_ANON_KEY", ANON_KEY)
            .env("BACKEND_JWT_SECRET", JWT_SECRET)
            .env("SECURITY_RATE_LIMIT_MAX_ATTEMPTS", SERVER_RATE_LIMIT.to_string())
            .env("SECURITY_RATE_LIMIT_WINDOW_SECS", "600")
            .env("EDGE_HEALTH_FUNCTIONS", "admin-dashboard,property-management")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(format!("{}/", self.base_url)).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Client that leaves redirects for the test to inspect
pub fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("http client")
}
