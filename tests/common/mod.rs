//! Shared helpers: an in-process mock of the workflow service.

#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// One scripted reply: status code and raw body
pub type Reply = (StatusCode, String);

/// Scripted replies per endpoint; the last reply of a queue repeats forever.
#[derive(Clone, Default)]
pub struct MockService {
    replies: Arc<Mutex<HashMap<&'static str, VecDeque<Reply>>>>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

pub const TASKS: &str = "tasks";
pub const GRAPH: &str = "graph";
pub const DEFINITIONS: &str = "definitions";

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, endpoint: &'static str, status: StatusCode, body: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back((status, body.to_string()));
        self
    }

    pub fn ok(self, endpoint: &'static str, body: &str) -> Self {
        self.reply(endpoint, StatusCode::OK, body)
    }

    /// Query strings received so far, in order
    pub fn queries(&self) -> Vec<HashMap<String, String>> {
        self.queries.lock().unwrap().clone()
    }

    fn next(&self, endpoint: &'static str, query: HashMap<String, String>) -> Reply {
        self.queries.lock().unwrap().push(query);
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.entry(endpoint).or_default();
        match queue.len() {
            0 => (StatusCode::NOT_FOUND, "no reply scripted".to_string()),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap(),
        }
    }

    /// Serve on an ephemeral port and return the base URL
    pub async fn serve(self) -> String {
        let router = Router::new()
            .route(
                "/v1/api/apiGetWorkflowTasks",
                get(
                    |State(svc): State<MockService>, Query(q): Query<HashMap<String, String>>| async move {
                        svc.next(TASKS, q)
                    },
                ),
            )
            .route(
                "/v1/api/apiGetTaskFromGraph",
                get(
                    |State(svc): State<MockService>, Query(q): Query<HashMap<String, String>>| async move {
                        svc.next(GRAPH, q)
                    },
                ),
            )
            .route(
                "/v1/api/apiGetTaskDefinitions",
                get(
                    |State(svc): State<MockService>, Query(q): Query<HashMap<String, String>>| async move {
                        svc.next(DEFINITIONS, q)
                    },
                ),
            )
            .with_state(self);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

/// A URL nothing listens on
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub const ONE_TASK: &str = r#"{"response": [{
    "workflow_task_id": 11,
    "task_id": 1,
    "taskStatus_id": "Waiting",
    "priority": 4000,
    "creation_date": "2024-05-01 08:30:00",
    "last_update_date": "2024-05-01 08:31:00"
}]}"#;

pub const NO_TASKS: &str = r#"{"response": []}"#;
