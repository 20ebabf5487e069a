use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Mutex;
use tower::ServiceExt; // for `oneshot`

use crate::{
    config::Config,
    create_app, db, digest,
    mailer::{MailError, Mailer},
    models::{Task, TaskStatus, TaskType},
    repository::{NewTask, TaskRepository, UserRepository},
    state::AppState,
};

async fn setup() -> (Router, AppState) {
    let pool = db::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let state = AppState::new(pool, Config::for_tests());
    (create_app(state.clone()), state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn register_and_login(app: &Router, username: &str) -> (i64, String) {
    let email = format!("{username}@example.com");
    let (status, user) = send(
        app,
        "POST",
        "/users/register",
        None,
        Some(json!({ "username": username, "email": email, "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, token) = send(
        app,
        "POST",
        "/users/login",
        None,
        Some(json!({ "email": email, "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    (
        user["id"].as_i64().unwrap(),
        token["access_token"].as_str().unwrap().to_string(),
    )
}

async fn insert_task(
    state: &AppState,
    owner_id: i64,
    title: &str,
    status: TaskStatus,
    task_type: TaskType,
    deadline: Option<chrono::DateTime<Utc>>,
) -> Task {
    TaskRepository::new(state.pool.clone())
        .create(NewTask {
            owner_id,
            title: title.to_string(),
            description: None,
            status,
            task_type,
            deadline,
        })
        .await
        .unwrap()
}

fn titles(tasks: &Value) -> Vec<&str> {
    tasks
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_register_and_login() {
    let (app, _) = setup().await;
    let (_, token) = register_and_login(&app, "alice").await;

    let (status, me) = send(&app, "GET", "/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");
    assert!(me.get("hashedPassword").is_none());
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let (app, _) = setup().await;
    register_and_login(&app, "alice").await;

    let (status, body) = send(
        &app,
        "POST",
        "/users/register",
        None,
        Some(json!({ "username": "alice", "email": "other@example.com", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationFailed");
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let (app, _) = setup().await;
    register_and_login(&app, "alice").await;

    let (status, body) = send(
        &app,
        "POST",
        "/users/login",
        None,
        Some(json!({ "email": "alice@example.com", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "Unauthorized");
}

#[tokio::test]
async fn test_task_routes_require_identity() {
    let (app, _) = setup().await;

    let (status, body) = send(&app, "GET", "/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "Unauthorized");

    let (status, body) = send(&app, "GET", "/tasks", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "Forbidden");
}

#[tokio::test]
async fn test_create_task_applies_defaults() {
    let (app, _) = setup().await;
    let (user_id, token) = register_and_login(&app, "alice").await;
    let deadline = Utc::now() + Duration::days(2);

    let (status, task) = send(
        &app,
        "POST",
        "/tasks",
        Some(&token),
        Some(json!({
            "title": "  Write report  ",
            "type": "work",
            "deadline": deadline.to_rfc3339()
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["title"], "Write report");
    assert_eq!(task["status"], "pending");
    assert_eq!(task["type"], "work");
    assert_eq!(task["ownerId"], user_id);
}

#[tokio::test]
async fn test_create_task_rejects_invalid_bodies() {
    let (app, _) = setup().await;
    let (_, token) = register_and_login(&app, "alice").await;

    let bodies = [
        json!({ "title": "Late", "type": "work", "deadline": (Utc::now() - Duration::hours(1)).to_rfc3339() }),
        json!({ "title": "Bad date", "type": "work", "deadline": "tomorrow" }),
        json!({ "title": "x", "type": "work" }),
        json!({ "title": "This title is far too long for a task", "type": "work" }),
        json!({ "title": "Valid", "type": "hobby" }),
        json!({ "title": "Valid", "type": "work", "status": "done" }),
    ];

    for body in bodies {
        let (status, error) = send(&app, "POST", "/tasks", Some(&token), Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(error["kind"], "ValidationFailed", "{body}");
    }

    let (_, tasks) = send(&app, "GET", "/tasks?status=pending", Some(&token), None).await;
    assert!(tasks.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_hides_completed_by_default() {
    let (app, state) = setup().await;
    let (user_id, token) = register_and_login(&app, "alice").await;
    insert_task(&state, user_id, "Open", TaskStatus::Pending, TaskType::Work, None).await;
    insert_task(&state, user_id, "Busy", TaskStatus::InProgress, TaskType::Personal, None).await;
    insert_task(&state, user_id, "Done", TaskStatus::Completed, TaskType::Work, None).await;

    let (status, tasks) = send(&app, "GET", "/tasks", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&tasks), vec!["Open", "Busy"]);

    let (_, tasks) = send(&app, "GET", "/tasks?status=completed", Some(&token), None).await;
    assert_eq!(titles(&tasks), vec!["Done"]);

    let (_, tasks) = send(&app, "GET", "/tasks?type=personal", Some(&token), None).await;
    assert_eq!(titles(&tasks), vec!["Busy"]);
}

#[tokio::test]
async fn test_list_sorts_by_deadline() {
    let (app, state) = setup().await;
    let (user_id, token) = register_and_login(&app, "alice").await;
    let now = Utc::now();
    insert_task(&state, user_id, "Later", TaskStatus::Pending, TaskType::Work, Some(now + Duration::days(3))).await;
    insert_task(&state, user_id, "Sooner", TaskStatus::Pending, TaskType::Work, Some(now + Duration::days(1))).await;

    let (_, tasks) = send(&app, "GET", "/tasks?sort=deadline", Some(&token), None).await;
    assert_eq!(titles(&tasks), vec!["Sooner", "Later"]);

    let (_, tasks) = send(&app, "GET", "/tasks?sort=-deadline", Some(&token), None).await;
    assert_eq!(titles(&tasks), vec!["Later", "Sooner"]);

    let (_, tasks) = send(&app, "GET", "/tasks?sort=-createdAt", Some(&token), None).await;
    assert_eq!(titles(&tasks), vec!["Sooner", "Later"]);
}

#[tokio::test]
async fn test_list_rejects_unknown_filters() {
    let (app, _) = setup().await;
    let (_, token) = register_and_login(&app, "alice").await;

    for uri in ["/tasks?type=invalid", "/tasks?status=done", "/tasks?sort=title"] {
        let (status, body) = send(&app, "GET", uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["kind"], "InvalidFilter", "{uri}");
    }
}

#[tokio::test]
async fn test_malformed_path_and_query_return_json_errors() {
    let (app, _) = setup().await;
    let (_, token) = register_and_login(&app, "alice").await;

    for (method, uri) in [("GET", "/tasks/abc"), ("DELETE", "/tasks/abc"), ("GET", "/tasks/dashboard")] {
        let (status, body) = send(&app, method, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
        assert_eq!(body["kind"], "ValidationFailed", "{method} {uri}");
        assert!(body["message"].is_string(), "{method} {uri}");
    }

    for uri in ["/tasks?type=work&type=personal", "/tasks?status=pending&status=completed"] {
        let (status, body) = send(&app, "GET", uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["kind"], "InvalidFilter", "{uri}");
    }

    let (status, body) = send(&app, "DELETE", "/tasks?type=work&type=personal", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidFilter");
}

#[tokio::test]
async fn test_ownership_is_checked_before_deadline() {
    let (app, state) = setup().await;
    let (alice_id, _) = register_and_login(&app, "alice").await;
    let (_, bob) = register_and_login(&app, "bob").await;
    let task = insert_task(&state, alice_id, "Private", TaskStatus::Pending, TaskType::Work, None).await;
    let uri = format!("/tasks/{}", task.id);
    let past = (Utc::now() - Duration::days(1)).to_rfc3339();

    let (status, body) = send(&app, "PATCH", &uri, Some(&bob), Some(json!({ "deadline": past }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "Forbidden");

    let (status, body) = send(
        &app,
        "PUT",
        &uri,
        Some(&bob),
        Some(json!({ "title": "Stolen", "type": "work", "deadline": past })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "Forbidden");

    let (status, body) = send(&app, "PATCH", "/tasks/9999", Some(&bob), Some(json!({ "deadline": past }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}

#[tokio::test]
async fn test_other_users_cannot_touch_task() {
    let (app, state) = setup().await;
    let (alice_id, alice) = register_and_login(&app, "alice").await;
    let (_, bob) = register_and_login(&app, "bob").await;
    let task = insert_task(&state, alice_id, "Private", TaskStatus::Pending, TaskType::Personal, None).await;
    let uri = format!("/tasks/{}", task.id);

    let (status, body) = send(&app, "GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "Forbidden");

    let (status, _) = send(&app, "PATCH", &uri, Some(&bob), Some(json!({ "status": "completed" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "DELETE", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, unchanged) = send(&app, "GET", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unchanged["status"], "pending");

    let (status, body) = send(&app, "GET", "/tasks/9999", Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}

#[tokio::test]
async fn test_put_replaces_and_patch_merges() {
    let (app, state) = setup().await;
    let (user_id, token) = register_and_login(&app, "alice").await;
    let task = insert_task(&state, user_id, "Draft", TaskStatus::Pending, TaskType::Work, None).await;
    let uri = format!("/tasks/{}", task.id);

    let (status, patched) = send(
        &app,
        "PATCH",
        &uri,
        Some(&token),
        Some(json!({ "status": "in-progress", "description": "first pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["title"], "Draft");
    assert_eq!(patched["status"], "in-progress");
    assert_eq!(patched["description"], "first pass");

    let (status, replaced) = send(
        &app,
        "PUT",
        &uri,
        Some(&token),
        Some(json!({ "title": "Final", "type": "personal" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["title"], "Final");
    assert_eq!(replaced["type"], "personal");
    assert_eq!(replaced["status"], "pending");
    assert!(replaced["description"].is_null());

    let (status, body) = send(
        &app,
        "PATCH",
        &uri,
        Some(&token),
        Some(json!({ "deadline": (Utc::now() - Duration::minutes(5)).to_rfc3339() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationFailed");
}

#[tokio::test]
async fn test_delete_single_task() {
    let (app, state) = setup().await;
    let (user_id, token) = register_and_login(&app, "alice").await;
    let task = insert_task(&state, user_id, "Temp", TaskStatus::Pending, TaskType::Work, None).await;
    let uri = format!("/tasks/{}", task.id);

    let (status, deleted) = send(&app, "DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["id"], task.id);

    let (status, _) = send(&app, "GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_delete_is_scoped_to_owner_and_status() {
    let (app, state) = setup().await;
    let (alice_id, alice) = register_and_login(&app, "alice").await;
    let (bob_id, bob) = register_and_login(&app, "bob").await;
    insert_task(&state, alice_id, "A done", TaskStatus::Completed, TaskType::Work, None).await;
    insert_task(&state, alice_id, "A done 2", TaskStatus::Completed, TaskType::Personal, None).await;
    insert_task(&state, alice_id, "A open", TaskStatus::Pending, TaskType::Work, None).await;
    insert_task(&state, bob_id, "B done", TaskStatus::Completed, TaskType::Work, None).await;

    let (status, body) = send(&app, "DELETE", "/tasks?status=completed", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deletedCount"], 2);

    let (_, remaining) = send(&app, "GET", "/tasks?status=pending", Some(&alice), None).await;
    assert_eq!(titles(&remaining), vec!["A open"]);

    let (_, bobs) = send(&app, "GET", "/tasks?status=completed", Some(&bob), None).await;
    assert_eq!(titles(&bobs), vec!["B done"]);

    let (status, body) = send(&app, "DELETE", "/tasks?status=archived", Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidFilter");
}

#[tokio::test]
async fn test_dashboard_summary() {
    let (app, state) = setup().await;
    let (user_id, token) = register_and_login(&app, "alice").await;
    let now = Utc::now();
    insert_task(&state, user_id, "Overdue", TaskStatus::Pending, TaskType::Work, Some(now - Duration::days(2))).await;
    insert_task(&state, user_id, "Due now", TaskStatus::InProgress, TaskType::Work, Some(now)).await;
    insert_task(&state, user_id, "Finished", TaskStatus::Completed, TaskType::Personal, None).await;

    let (status, summary) = send(&app, "GET", "/tasks/dashboard/all", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["activeCount"], 2);
    assert_eq!(summary["completedCount"], 1);
    assert_eq!(summary["overdueCount"], 1);
    assert_eq!(titles(&summary["overdueTasks"]), vec!["Overdue"]);
    assert_eq!(titles(&summary["todayTasks"]), vec!["Due now"]);
    assert_eq!(
        summary["progressChart"],
        json!({ "pending": 0, "in-progress": 1, "completed": 0 })
    );

    let (_, personal) = send(&app, "GET", "/tasks/dashboard/personal", Some(&token), None).await;
    assert_eq!(personal["activeCount"], 0);
    assert_eq!(personal["completedCount"], 1);

    let (status, body) = send(&app, "GET", "/tasks/dashboard/urgent", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidFilter");
}

#[derive(Default)]
struct RecordingMailer {
    fail_for: Option<String>,
    sent: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_digest(&self, email: &str, _username: &str, tasks: &[Task]) -> Result<(), MailError> {
        if self.fail_for.as_deref() == Some(email) {
            return Err(MailError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        let titles = tasks.iter().map(|t| t.title.clone()).collect();
        self.sent.lock().unwrap().push((email.to_string(), titles));
        Ok(())
    }
}

#[tokio::test]
async fn test_digest_groups_by_owner_and_collects_failures() {
    let (_, state) = setup().await;
    let users = UserRepository::new(state.pool.clone());
    let ana = users.create("ana", "ana@example.com", "hash").await.unwrap();
    let ben = users.create("ben", "ben@example.com", "hash").await.unwrap();
    let cid = users.create("cid", "cid@example.com", "hash").await.unwrap();

    let now = Utc.with_ymd_and_hms(2026, 10, 16, 6, 0, 0).unwrap();
    let today = Utc.with_ymd_and_hms(2026, 10, 16, 18, 0, 0).unwrap();
    insert_task(&state, ana.id, "Ana one", TaskStatus::Pending, TaskType::Work, Some(today)).await;
    insert_task(&state, ana.id, "Ana two", TaskStatus::InProgress, TaskType::Personal, Some(today + Duration::hours(1))).await;
    insert_task(&state, ana.id, "Ana done", TaskStatus::Completed, TaskType::Work, Some(today)).await;
    insert_task(&state, ana.id, "Ana later", TaskStatus::Pending, TaskType::Work, Some(today + Duration::days(1))).await;
    insert_task(&state, ben.id, "Ben one", TaskStatus::Pending, TaskType::Work, Some(today)).await;
    insert_task(&state, cid.id, "Cid one", TaskStatus::Pending, TaskType::Work, Some(today)).await;
    let midnight = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
    insert_task(&state, cid.id, "Cid yesterday", TaskStatus::Pending, TaskType::Work, Some(midnight - Duration::seconds(1))).await;
    insert_task(&state, cid.id, "Cid midnight", TaskStatus::Pending, TaskType::Work, Some(midnight + Duration::days(1))).await;
    insert_task(&state, cid.id, "Cid first", TaskStatus::Pending, TaskType::Personal, Some(midnight)).await;

    let mailer = RecordingMailer {
        fail_for: Some("ben@example.com".into()),
        ..RecordingMailer::default()
    };
    let tasks = TaskRepository::new(state.pool.clone());
    let report = digest::run_digest(&tasks, &mailer, &now).await.unwrap();

    assert_eq!(report.recipients, 3);
    assert_eq!(report.sent, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].owner_id, ben.id);

    let sent = mailer.sent.lock().unwrap();
    assert_eq!(
        *sent,
        vec![
            ("ana@example.com".to_string(), vec!["Ana one".to_string(), "Ana two".to_string()]),
            ("cid@example.com".to_string(), vec!["Cid first".to_string(), "Cid one".to_string()]),
        ]
    );
}
