use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::backend::{
    AuthApi, AuthEvent, AuthEvents, BackendError, Filter, Query, QueryResult, Session, SignUpOutcome, SignUpRequest,
    TableApi, User,
};

/// In-memory stand-in for the hosted platform with per-table failure injection
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    failing_counts: Mutex<HashMap<String, String>>,
    failing_selects: Mutex<HashMap<String, String>>,
    rpc_functions: Mutex<HashSet<String>>,
    failing_rpcs: Mutex<HashMap<String, String>>,
    rpc_calls: Mutex<Vec<(String, Value)>>,
    queries: Mutex<Vec<Query>>,
    session: Mutex<Option<Session>>,
    session_error: Mutex<Option<String>>,
    accounts: Mutex<HashMap<String, (String, User)>>,
    events: AuthEvents,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            failing_counts: Mutex::new(HashMap::new()),
            failing_selects: Mutex::new(HashMap::new()),
            rpc_functions: Mutex::new(HashSet::new()),
            failing_rpcs: Mutex::new(HashMap::new()),
            rpc_calls: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            session: Mutex::new(None),
            session_error: Mutex::new(None),
            accounts: Mutex::new(HashMap::new()),
            events: AuthEvents::new(),
        }
    }

    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.tables.lock().unwrap().insert(table.to_string(), rows);
        self
    }

    pub fn with_session(self, user_id: Uuid) -> Self {
        *self.session.lock().unwrap() = Some(session_for(user_id));
        self
    }

    /// Head-count queries against `table` fail with `message`
    pub fn fail_counts(self, table: &str, message: &str) -> Self {
        self.failing_counts.lock().unwrap().insert(table.to_string(), message.to_string());
        self
    }

    /// Every select against `table` fails with `message`
    pub fn fail_selects(self, table: &str, message: &str) -> Self {
        self.failing_selects.lock().unwrap().insert(table.to_string(), message.to_string());
        self
    }

    /// `get_session` itself fails, as when the auth service is unreachable
    pub fn fail_session(self, message: &str) -> Self {
        *self.session_error.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn with_rpc(self, function: &str) -> Self {
        self.rpc_functions.lock().unwrap().insert(function.to_string());
        self
    }

    /// `function` exists but every call fails with `message`
    pub fn fail_rpc(self, function: &str, message: &str) -> Self {
        self.failing_rpcs.lock().unwrap().insert(function.to_string(), message.to_string());
        self
    }

    pub fn with_account(self, email: &str, password: &str) -> (Self, User) {
        let user = User {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            user_metadata: Value::Null,
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), user.clone()));
        (self, user)
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().unwrap().get(table).cloned().unwrap_or_default()
    }

    pub fn rpc_calls(&self) -> Vec<(String, Value)> {
        self.rpc_calls.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().unwrap().clone()
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.lock().unwrap() = session;
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Session for `user_id` valid for the next hour
pub fn session_for(user_id: Uuid) -> Session {
    Session {
        access_token: format!("token-{}", user_id.simple()),
        refresh_token: Some("refresh".to_string()),
        expires_at: Utc::now() + Duration::hours(1),
        user: User {
            id: user_id,
            email: None,
            user_metadata: Value::Null,
        },
    }
}

fn query_failure(message: &str) -> BackendError {
    BackendError::Status {
        status: 500,
        code: None,
        message: message.to_string(),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Value, filter: &Filter) -> bool {
    let cell = row.get(filter.column()).map(cell_text);
    match filter {
        Filter::Eq { value, .. } => cell.as_deref() == Some(value.as_str()),
        Filter::In { values, .. } => cell.map_or(false, |c| values.contains(&c)),
    }
}

#[async_trait]
impl TableApi for MemoryBackend {
    async fn select(&self, query: &Query) -> Result<QueryResult, BackendError> {
        self.queries.lock().unwrap().push(query.clone());

        if let Some(message) = self.failing_selects.lock().unwrap().get(&query.table) {
            return Err(query_failure(message));
        }
        if query.head {
            if let Some(message) = self.failing_counts.lock().unwrap().get(&query.table) {
                return Err(query_failure(message));
            }
        }

        let tables = self.tables.lock().unwrap();
        let Some(rows) = tables.get(&query.table) else {
            return Err(BackendError::Status {
                status: 404,
                code: Some("42P01".to_string()),
                message: format!("relation \"public.{}\" does not exist", query.table),
            });
        };

        let filtered: Vec<Value> = rows
            .iter()
            .filter(|row| query.filters.iter().all(|f| matches(row, f)))
            .cloned()
            .collect();
        let total = filtered.len() as u64;

        let rows = if query.head {
            Vec::new()
        } else {
            match query.range {
                Some((from, to)) => filtered
                    .into_iter()
                    .skip(from as usize)
                    .take((to - from + 1) as usize)
                    .collect(),
                None => filtered,
            }
        };

        Ok(QueryResult {
            rows,
            count: query.count.then_some(total),
        })
    }

    async fn insert(&self, table: &str, rows: Value) -> Result<QueryResult, BackendError> {
        if let Some(message) = self.failing_selects.lock().unwrap().get(table) {
            return Err(query_failure(message));
        }
        let rows = match rows {
            Value::Array(rows) => rows,
            row => vec![row],
        };
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(QueryResult::new(rows))
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, BackendError> {
        if let Some(message) = self.failing_rpcs.lock().unwrap().get(function) {
            return Err(query_failure(message));
        }
        if !self.rpc_functions.lock().unwrap().contains(function) {
            return Err(BackendError::FunctionNotFound(function.to_string()));
        }
        self.rpc_calls.lock().unwrap().push((function.to_string(), args));
        Ok(json!({ "ok": true }))
    }
}

#[async_trait]
impl AuthApi for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        if let Some(message) = self.session_error.lock().unwrap().as_ref() {
            return Err(query_failure(message));
        }
        Ok(self.session.lock().unwrap().clone().filter(|s| !s.is_expired()))
    }

    async fn get_user(&self) -> Result<Option<User>, BackendError> {
        Ok(self.get_session().await?.map(|s| s.user))
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, BackendError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&request.email) {
            return Err(BackendError::Status {
                status: 422,
                code: Some("user_already_exists".to_string()),
                message: "User already registered".to_string(),
            });
        }

        let user = User {
            id: Uuid::new_v4(),
            email: Some(request.email.clone()),
            user_metadata: request.metadata.clone(),
        };
        accounts.insert(request.email.clone(), (request.password.clone(), user.clone()));
        drop(accounts);

        let mut session = session_for(user.id);
        session.user = user.clone();
        *self.session.lock().unwrap() = Some(session.clone());
        self.events.publish(AuthEvent::signed_in(session.clone()));

        Ok(SignUpOutcome {
            user,
            session: Some(session),
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let user = match self.accounts.lock().unwrap().get(email) {
            Some((expected, user)) if expected == password => user.clone(),
            _ => {
                return Err(BackendError::Status {
                    status: 400,
                    code: Some("invalid_credentials".to_string()),
                    message: "Invalid login credentials".to_string(),
                })
            }
        };

        let mut session = session_for(user.id);
        session.user = user;
        *self.session.lock().unwrap() = Some(session.clone());
        self.events.publish(AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn refresh_session(&self) -> Result<Session, BackendError> {
        let current = self.session.lock().unwrap().clone().ok_or(BackendError::NotAuthenticated)?;
        let mut session = session_for(current.user_id());
        session.user = current.user;
        *self.session.lock().unwrap() = Some(session.clone());
        self.events.publish(AuthEvent::token_refreshed(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        *self.session.lock().unwrap() = None;
        self.events.publish(AuthEvent::signed_out());
        Ok(())
    }

    fn events(&self) -> &AuthEvents {
        &self.events
    }
}
