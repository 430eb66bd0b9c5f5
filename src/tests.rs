//! Integration tests for the project tracker backend.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::{Config, WorkloadThresholds};
use crate::db::{init_database, Repository};
use crate::search::SearchIndex;
use crate::{create_router, AppState};

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some("test-api-key".to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let index_path = temp_dir.path().join("index");

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        let search = Arc::new(SearchIndex::open(&index_path).expect("Failed to init search"));

        let config = Config {
            api_psk: psk.clone(),
            db_path,
            index_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            thresholds: WorkloadThresholds::default(),
            page_size: 20,
        };

        let state = AppState {
            repo,
            search,
            config: Arc::new(config),
        };

        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request as `member` and return the status with the parsed envelope.
    async fn call(
        &self,
        method: Method,
        path: &str,
        member: &str,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header("x-member-id", member);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request.send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str, member: &str) -> (u16, Value) {
        self.call(Method::GET, path, member, None).await
    }

    async fn post(&self, path: &str, member: &str, body: Value) -> (u16, Value) {
        self.call(Method::POST, path, member, Some(body)).await
    }

    async fn put(&self, path: &str, member: &str, body: Value) -> (u16, Value) {
        self.call(Method::PUT, path, member, Some(body)).await
    }

    /// POST /api/setup and return the administrator's id.
    async fn setup_admin(&self) -> String {
        let resp = self
            .client
            .post(self.url("/api/setup"))
            .json(&json!({
                "firstName": "Grace",
                "lastName": "Hopper",
                "email": "grace@example.com",
                "hourlyRate": 90.0
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["data"]["role"], "admin");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_member(&self, admin: &str, body: Value) -> String {
        let (status, body) = self.post("/api/members", admin, body).await;
        assert_eq!(status, 200, "member creation failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_project(&self, admin: &str, body: Value) -> String {
        let (status, body) = self.post("/api/projects", admin, body).await;
        assert_eq!(status, 200, "project creation failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_task(&self, admin: &str, body: Value) -> String {
        let (status, body) = self.post("/api/tasks", admin, body).await;
        assert_eq!(status, 200, "task creation failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn days_ago(days: i64) -> String {
    (today() - Duration::days(days)).to_string()
}

fn project_body(name: &str, allocated: f64, members: &[&str]) -> Value {
    json!({
        "name": name,
        "plannedStart": days_ago(30),
        "plannedEnd": (today() + Duration::days(60)).to_string(),
        "allocatedBudget": allocated,
        "memberIds": members,
    })
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_and_invalid_psk() {
    let fixture = TestFixture::new().await;
    let client = Client::new();

    let resp = client
        .get(fixture.url("/api/revision"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = client
        .get(fixture.url("/api/revision"))
        .header("Authorization", "Bearer wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(fixture.url("/api/revision"))
        .header("Authorization", "Bearer test-api-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_principal_header_required() {
    let fixture = TestFixture::new().await;
    fixture.setup_admin().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/projects"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let (status, body) = fixture.get("/api/projects", "no-such-member").await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_setup_only_once() {
    let fixture = TestFixture::with_psk(None).await;
    let admin = fixture.setup_admin().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/setup"))
        .json(&json!({
            "firstName": "Eve",
            "lastName": "Intruder",
            "email": "eve@example.com"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let (status, body) = fixture.get(&format!("/api/members/{}", admin), &admin).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["email"], "grace@example.com");
}

#[tokio::test]
async fn test_member_crud_and_duplicate_email() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;

    let ada = fixture
        .create_member(
            &admin,
            json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "Ada@Example.com",
                "hourlyRate": 50.0
            }),
        )
        .await;

    let (status, body) = fixture
        .post(
            "/api/members",
            &admin,
            json!({ "firstName": "Other", "lastName": "Ada", "email": "ada@example.com" }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, body) = fixture
        .put(
            &format!("/api/members/{}", ada),
            &admin,
            json!({ "skills": ["rust", "sql"] }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["skills"][1], "sql");

    // Members may not raise their own rate.
    let (status, body) = fixture
        .put(
            &format!("/api/members/{}", ada),
            &ada,
            json!({ "hourlyRate": 500.0 }),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = fixture.get("/api/members", &admin).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 2);

    let (status, _) = fixture
        .call(Method::DELETE, &format!("/api/members/{}", ada), &admin, None)
        .await;
    assert_eq!(status, 200);
    let (status, body) = fixture.get(&format!("/api/members/{}", ada), &admin).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_project_creation_requires_permission() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let member = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Alan", "lastName": "Turing", "email": "alan@example.com" }),
        )
        .await;

    let (status, body) = fixture
        .post("/api/projects", &member, project_body("Enigma", 1000.0, &[]))
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    // The denial is on the audit trail.
    let (status, body) = fixture
        .get("/api/admin/audit-logs?action=permission_denied", &admin)
        .await;
    assert_eq!(status, 200);
    let logs = body["data"]["items"].as_array().unwrap();
    assert!(logs
        .iter()
        .any(|l| l["actorId"] == member.as_str() && l["collection"] == "projects"));
}

#[tokio::test]
async fn test_budget_rollup_approve_and_reject() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dev = fixture
        .create_member(
            &admin,
            json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "ada@example.com",
                "hourlyRate": 50.0
            }),
        )
        .await;
    let project = fixture
        .create_project(&admin, project_body("Analytical Engine", 1000.0, &[&dev]))
        .await;

    let mut entries = Vec::new();
    for (hours, date) in [(5.0, days_ago(1)), (3.0, days_ago(2))] {
        let (status, body) = fixture
            .post(
                "/api/timesheets",
                &dev,
                json!({ "projectId": project, "date": date, "hours": hours, "status": "submitted" }),
            )
            .await;
        assert_eq!(status, 200, "entry creation failed: {}", body);
        entries.push(body["data"]["id"].as_str().unwrap().to_string());
    }

    for id in &entries {
        let (status, body) = fixture
            .post(&format!("/api/timesheets/{}/approve", id), &admin, json!({}))
            .await;
        assert_eq!(status, 200, "approval failed: {}", body);
        assert_eq!(body["data"]["status"], "approved");
    }

    let (status, body) = fixture
        .get(&format!("/api/projects/{}/budget", project), &admin)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["consumed"], 400.0);
    assert_eq!(body["data"]["usedPct"], 40.0);
    assert_eq!(body["data"]["isOverrun"], false);

    // Rejecting the approved 5h entry gives 250 back.
    let (status, body) = fixture
        .post(
            &format!("/api/timesheets/{}/reject", entries[0]),
            &admin,
            json!({ "comment": "Wrong project" }),
        )
        .await;
    assert_eq!(status, 200, "rejection failed: {}", body);

    let (_, body) = fixture
        .get(&format!("/api/projects/{}/budget", project), &admin)
        .await;
    assert_eq!(body["data"]["consumed"], 150.0);

    // The member was told about each decision.
    let (status, body) = fixture.get("/api/notifications?kind=approval", &dev).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["unread"], 3);
}

#[tokio::test]
async fn test_reject_after_rate_change_returns_charged_cost() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dev = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com", "hourlyRate": 50.0 }),
        )
        .await;
    let project = fixture
        .create_project(&admin, project_body("Jacquard Loom", 1000.0, &[&dev]))
        .await;

    let mut entries = Vec::new();
    for (hours, date) in [(5.0, days_ago(1)), (3.0, days_ago(2))] {
        let (status, body) = fixture
            .post(
                "/api/timesheets",
                &dev,
                json!({ "projectId": project, "date": date, "hours": hours, "status": "submitted" }),
            )
            .await;
        assert_eq!(status, 200, "entry creation failed: {}", body);
        entries.push(body["data"]["id"].as_str().unwrap().to_string());
    }
    for id in &entries {
        let (status, _) = fixture
            .post(&format!("/api/timesheets/{}/approve", id), &admin, json!({}))
            .await;
        assert_eq!(status, 200);
    }

    let (_, body) = fixture
        .get(&format!("/api/projects/{}/budget", project), &admin)
        .await;
    assert_eq!(body["data"]["consumed"], 400.0);

    let (status, body) = fixture
        .put(&format!("/api/members/{}", dev), &admin, json!({ "hourlyRate": 10.0 }))
        .await;
    assert_eq!(status, 200, "rate change failed: {}", body);

    for id in &entries {
        let (status, body) = fixture
            .post(
                &format!("/api/timesheets/{}/reject", id),
                &admin,
                json!({ "comment": "Billed elsewhere" }),
            )
            .await;
        assert_eq!(status, 200, "rejection failed: {}", body);
    }

    let (_, body) = fixture
        .get(&format!("/api/projects/{}/budget", project), &admin)
        .await;
    assert_eq!(body["data"]["consumed"], 0.0);
}

#[tokio::test]
async fn test_approved_entry_is_immutable() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dev = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com", "hourlyRate": 50.0 }),
        )
        .await;
    let project = fixture
        .create_project(&admin, project_body("Difference Engine", 500.0, &[&dev]))
        .await;

    let (_, body) = fixture
        .post(
            "/api/timesheets",
            &dev,
            json!({ "projectId": project, "date": days_ago(0), "hours": 4.0 }),
        )
        .await;
    let entry = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "draft");

    let (status, _) = fixture
        .post(&format!("/api/timesheets/{}/submit", entry), &dev, json!({}))
        .await;
    assert_eq!(status, 200);
    let (status, _) = fixture
        .post(&format!("/api/timesheets/{}/approve", entry), &admin, json!({ "comment": "ok" }))
        .await;
    assert_eq!(status, 200);

    let (status, body) = fixture
        .put(&format!("/api/timesheets/{}", entry), &dev, json!({ "hours": 6.0 }))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "IMMUTABLE_STATE");

    let (status, body) = fixture
        .call(Method::DELETE, &format!("/api/timesheets/{}", entry), &dev, None)
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "IMMUTABLE_STATE");

    // An administrator may delete it, which reverts the roll-up.
    let (status, _) = fixture
        .call(Method::DELETE, &format!("/api/timesheets/{}", entry), &admin, None)
        .await;
    assert_eq!(status, 200);
    let (_, body) = fixture
        .get(&format!("/api/projects/{}", project), &admin)
        .await;
    assert_eq!(body["data"]["consumedBudget"], 0.0);
}

#[tokio::test]
async fn test_timesheet_task_can_be_cleared() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dev = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com", "hourlyRate": 50.0 }),
        )
        .await;
    let project = fixture
        .create_project(&admin, project_body("Mill", 500.0, &[&dev]))
        .await;
    let task = fixture
        .create_task(
            &admin,
            json!({ "title": "Card reader", "projectId": project, "assigneeIds": [dev] }),
        )
        .await;

    let (status, body) = fixture
        .post(
            "/api/timesheets",
            &dev,
            json!({ "projectId": project, "taskId": task, "date": days_ago(1), "hours": 2.0 }),
        )
        .await;
    assert_eq!(status, 200, "entry creation failed: {}", body);
    assert_eq!(body["data"]["taskId"], task.as_str());
    let entry = body["data"]["id"].as_str().unwrap().to_string();

    // Omitting the field keeps the task.
    let (status, body) = fixture
        .put(&format!("/api/timesheets/{}", entry), &dev, json!({ "hours": 3.0 }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["taskId"], task.as_str());

    let (status, body) = fixture
        .put(&format!("/api/timesheets/{}", entry), &dev, json!({ "taskId": null }))
        .await;
    assert_eq!(status, 200, "clearing the task failed: {}", body);
    assert!(body["data"]["taskId"].is_null());
    assert_eq!(body["data"]["hours"], 3.0);
}

#[tokio::test]
async fn test_timesheet_validation_rules() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dev = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com" }),
        )
        .await;
    let outsider = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Bob", "lastName": "Outside", "email": "bob@example.com" }),
        )
        .await;
    let project = fixture
        .create_project(&admin, project_body("Loom", 500.0, &[&dev]))
        .await;

    let entry = |hours: f64, date: String| json!({ "projectId": project, "date": date, "hours": hours });

    let (status, body) = fixture
        .post("/api/timesheets", &dev, entry(0.1, days_ago(0)))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = fixture
        .post("/api/timesheets", &dev, entry(25.0, days_ago(0)))
        .await;
    assert_eq!(status, 400);

    let tomorrow = (today() + Duration::days(1)).to_string();
    let (status, _) = fixture
        .post("/api/timesheets", &dev, entry(2.0, tomorrow))
        .await;
    assert_eq!(status, 400);

    let (status, _) = fixture
        .post("/api/timesheets", &outsider, entry(2.0, days_ago(0)))
        .await;
    assert_eq!(status, 400);

    let (status, _) = fixture
        .post("/api/timesheets", &dev, entry(2.0, days_ago(0)))
        .await;
    assert_eq!(status, 200);

    // One entry per member, project and day.
    let (status, body) = fixture
        .post("/api/timesheets", &dev, entry(1.0, days_ago(0)))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "CONFLICT");

    // Only administrators book time for someone else.
    let (status, _) = fixture
        .post(
            "/api/timesheets",
            &outsider,
            json!({ "memberId": dev, "projectId": project, "date": days_ago(1), "hours": 1.0 }),
        )
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_project_progress_blends_tasks_and_milestones() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let project = fixture
        .create_project(&admin, project_body("Apollo", 0.0, &[]))
        .await;

    for (i, status) in ["done", "done", "done", "in_progress"].iter().enumerate() {
        fixture
            .create_task(
                &admin,
                json!({ "title": format!("Step {}", i), "projectId": project, "status": status }),
            )
            .await;
    }

    let mut milestone_ids = Vec::new();
    for name in ["Design review", "Launch"] {
        let (status, body) = fixture
            .post(
                &format!("/api/projects/{}/milestones", project),
                &admin,
                json!({ "name": name, "plannedDate": days_ago(-10) }),
            )
            .await;
        assert_eq!(status, 200, "milestone creation failed: {}", body);
        let milestones = body["data"]["milestones"].as_array().unwrap();
        milestone_ids.push(milestones.last().unwrap()["id"].as_str().unwrap().to_string());
    }

    let (status, body) = fixture
        .put(
            &format!("/api/projects/{}/milestones/{}", project, milestone_ids[0]),
            &admin,
            json!({ "reached": true }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["milestones"][0]["actualDate"], today().to_string());

    let (status, body) = fixture
        .get(&format!("/api/projects/{}/progress", project), &admin)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["progress"], 62.5);
    assert_eq!(body["data"]["doneTasks"], 3);
    assert_eq!(body["data"]["reachedMilestones"], 1);
}

#[tokio::test]
async fn test_duplicate_project_starts_fresh() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dev = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com", "hourlyRate": 50.0 }),
        )
        .await;
    let project = fixture
        .create_project(&admin, project_body("Engine", 1000.0, &[&dev]))
        .await;
    let design = fixture
        .create_task(
            &admin,
            json!({ "title": "Design", "projectId": project, "assigneeIds": [dev], "estimatedHours": 8.0 }),
        )
        .await;
    fixture
        .create_task(
            &admin,
            json!({ "title": "Build", "projectId": project, "assigneeIds": [dev], "dependencyIds": [design] }),
        )
        .await;

    let (_, body) = fixture
        .post(
            &format!("/api/projects/{}/milestones", project),
            &admin,
            json!({ "name": "Prototype", "plannedDate": days_ago(5) }),
        )
        .await;
    let milestone = body["data"]["milestones"][0]["id"].as_str().unwrap().to_string();
    let (status, _) = fixture
        .put(
            &format!("/api/projects/{}/milestones/{}", project, milestone),
            &admin,
            json!({ "reached": true }),
        )
        .await;
    assert_eq!(status, 200);
    let (status, _) = fixture
        .put(&format!("/api/tasks/{}", design), &admin, json!({ "status": "done" }))
        .await;
    assert_eq!(status, 200);

    let (_, body) = fixture
        .post(
            "/api/timesheets",
            &dev,
            json!({ "projectId": project, "taskId": design, "date": days_ago(1), "hours": 2.0, "status": "submitted" }),
        )
        .await;
    let entry = body["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = fixture
        .post(&format!("/api/timesheets/{}/approve", entry), &admin, json!({}))
        .await;
    assert_eq!(status, 200);

    let (status, body) = fixture
        .post(
            &format!("/api/projects/{}/duplicate", project),
            &admin,
            json!({ "name": "Engine II" }),
        )
        .await;
    assert_eq!(status, 200, "duplicate failed: {}", body);
    let copy = &body["data"];
    assert_ne!(copy["id"], project.as_str());
    assert_eq!(copy["name"], "Engine II");
    assert_eq!(copy["status"], "planning");
    assert_eq!(copy["isTemplate"], false);
    assert_eq!(copy["allocatedBudget"], 1000.0);
    assert_eq!(copy["consumedBudget"], 0.0);
    assert_eq!(copy["memberIds"][0], dev.as_str());
    assert_eq!(copy["milestones"][0]["name"], "Prototype");
    assert_eq!(copy["milestones"][0]["reached"], false);
    assert!(copy["milestones"][0]["actualDate"].is_null());
    assert_ne!(copy["milestones"][0]["id"], milestone.as_str());
    let copy_id = copy["id"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .get(&format!("/api/tasks?projectId={}", copy_id), &admin)
        .await;
    assert_eq!(status, 200);
    let tasks = body["data"]["items"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    for task in tasks {
        assert_eq!(task["status"], "todo");
        assert_eq!(task["progress"], 0);
        assert_eq!(task["actualHours"], 0.0);
        assert!(task["assigneeIds"].as_array().unwrap().is_empty());
    }
    let copied_design = tasks.iter().find(|t| t["title"] == "Design").unwrap();
    let copied_build = tasks.iter().find(|t| t["title"] == "Build").unwrap();
    assert_ne!(copied_design["id"], design.as_str());
    assert_eq!(copied_design["estimatedHours"], 8.0);
    assert_eq!(copied_build["dependencyIds"][0], copied_design["id"]);

    // The source keeps its spend.
    let (_, body) = fixture
        .get(&format!("/api/projects/{}/budget", project), &admin)
        .await;
    assert_eq!(body["data"]["consumed"], 100.0);
}

#[tokio::test]
async fn test_templates_save_list_and_instantiate() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dev = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com" }),
        )
        .await;
    let project = fixture
        .create_project(&admin, project_body("Onboarding", 300.0, &[&dev]))
        .await;
    fixture
        .create_task(
            &admin,
            json!({ "title": "Laptop setup", "projectId": project, "assigneeIds": [dev] }),
        )
        .await;

    // Plain members cannot create projects, so no templates either.
    let (status, _) = fixture
        .post(&format!("/api/projects/{}/template", project), &dev, json!({}))
        .await;
    assert_eq!(status, 403);

    let (status, body) = fixture
        .post(&format!("/api/projects/{}/template", project), &admin, json!({}))
        .await;
    assert_eq!(status, 200, "template creation failed: {}", body);
    assert_eq!(body["data"]["isTemplate"], true);
    assert_eq!(body["data"]["name"], "Onboarding");
    assert!(body["data"]["memberIds"].as_array().unwrap().is_empty());
    let template = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture.get("/api/templates", &dev).await;
    assert_eq!(status, 200);
    let templates = body["data"].as_array().unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0]["id"], template.as_str());

    // Templates stay out of the project list.
    let (_, body) = fixture.get("/api/projects", &admin).await;
    assert_eq!(body["data"]["total"], 1);

    let start = (today() + Duration::days(7)).to_string();
    let (status, body) = fixture
        .post(
            &format!("/api/templates/{}/instantiate", template),
            &admin,
            json!({ "name": "Onboarding: Bob", "plannedStart": start }),
        )
        .await;
    assert_eq!(status, 200, "instantiation failed: {}", body);
    assert_eq!(body["data"]["isTemplate"], false);
    assert_eq!(body["data"]["name"], "Onboarding: Bob");
    assert_eq!(body["data"]["plannedStart"], start.as_str());
    assert_eq!(body["data"]["consumedBudget"], 0.0);
    let instance = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = fixture
        .get(&format!("/api/tasks?projectId={}", instance), &admin)
        .await;
    let tasks = body["data"]["items"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["title"], "Laptop setup");
    assert_eq!(tasks[0]["status"], "todo");

    let (_, body) = fixture.get("/api/projects", &admin).await;
    assert_eq!(body["data"]["total"], 2);

    // Only templates instantiate, and templates are not duplicated.
    let (status, body) = fixture
        .post(&format!("/api/templates/{}/instantiate", project), &admin, json!({}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let (status, _) = fixture
        .post(&format!("/api/projects/{}/duplicate", template), &admin, json!({}))
        .await;
    assert_eq!(status, 400);

    // Nobody books time on a template.
    let (status, _) = fixture
        .post(
            "/api/timesheets",
            &admin,
            json!({ "projectId": template, "date": days_ago(1), "hours": 1.0 }),
        )
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_closed_project_status_is_frozen() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let archived = fixture
        .create_project(&admin, project_body("Analytical Engine", 0.0, &[]))
        .await;
    let (status, _) = fixture
        .post(&format!("/api/projects/{}/archive", archived), &admin, json!({}))
        .await;
    assert_eq!(status, 200);

    let (status, body) = fixture
        .put(&format!("/api/projects/{}", archived), &admin, json!({ "status": "in_progress" }))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "IMMUTABLE_STATE");

    let cancelled = fixture
        .create_project(&admin, project_body("Difference Engine", 0.0, &[]))
        .await;
    let (status, _) = fixture
        .put(&format!("/api/projects/{}", cancelled), &admin, json!({ "status": "cancelled" }))
        .await;
    assert_eq!(status, 200);
    let (status, body) = fixture
        .put(&format!("/api/projects/{}", cancelled), &admin, json!({ "status": "planning" }))
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "IMMUTABLE_STATE");

    // Other fields, and archiving, remain open.
    let (status, body) = fixture
        .put(
            &format!("/api/projects/{}", cancelled),
            &admin,
            json!({ "status": "cancelled", "description": "Superseded" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["description"], "Superseded");
}

#[tokio::test]
async fn test_task_status_forces_progress() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let project = fixture
        .create_project(&admin, project_body("Gemini", 0.0, &[]))
        .await;
    let task = fixture
        .create_task(
            &admin,
            json!({ "title": "Dock", "projectId": project, "status": "in_progress", "progress": 40 }),
        )
        .await;

    let (status, body) = fixture
        .put(&format!("/api/tasks/{}", task), &admin, json!({ "status": "done" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["progress"], 100);
    assert!(body["data"]["actualEnd"].is_string());

    let (_, body) = fixture
        .put(&format!("/api/tasks/{}", task), &admin, json!({ "status": "todo" }))
        .await;
    assert_eq!(body["data"]["progress"], 0);

    let (status, body) = fixture
        .put(
            &format!("/api/tasks/{}/progress", task),
            &admin,
            json!({ "progress": 120 }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_workload_overload() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dev = fixture
        .create_member(
            &admin,
            json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "ada@example.com",
                "weeklyAvailability": 20.0
            }),
        )
        .await;
    let project = fixture
        .create_project(&admin, project_body("Mercury", 0.0, &[&dev]))
        .await;
    for (title, hours) in [("Capsule", 15.0), ("Heat shield", 10.0)] {
        fixture
            .create_task(
                &admin,
                json!({
                    "title": title,
                    "projectId": project,
                    "assigneeIds": [dev],
                    "estimatedHours": hours
                }),
            )
            .await;
    }

    let (status, body) = fixture
        .get(&format!("/api/members/{}/workload", dev), &dev)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["utilizationPct"], 125.0);
    assert_eq!(body["data"]["overloaded"], true);
    assert_eq!(body["data"]["underloaded"], false);
    assert_eq!(body["data"]["openTasks"], 2);

    let (status, body) = fixture.get("/api/members/overloaded", &admin).await;
    assert_eq!(status, 200);
    let loads = body["data"].as_array().unwrap();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0]["memberId"], dev.as_str());

    // A looser threshold clears the flag.
    let (_, body) = fixture
        .get("/api/members/overloaded?threshold=150", &admin)
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());

    // New assignees were notified.
    let (_, body) = fixture.get("/api/notifications?kind=assignment", &dev).await;
    assert!(body["data"]["total"].as_i64().unwrap() >= 2);
}

#[tokio::test]
async fn test_task_dependency_cycles_rejected() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let project = fixture
        .create_project(&admin, project_body("Voyager", 0.0, &[]))
        .await;

    let a = fixture
        .create_task(&admin, json!({ "title": "A", "projectId": project }))
        .await;
    let b = fixture
        .create_task(
            &admin,
            json!({ "title": "B", "projectId": project, "dependencyIds": [a] }),
        )
        .await;

    let (status, body) = fixture
        .put(&format!("/api/tasks/{}", a), &admin, json!({ "dependencyIds": [b] }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = fixture
        .put(&format!("/api/tasks/{}", a), &admin, json!({ "dependencyIds": [a] }))
        .await;
    assert_eq!(status, 400);

    let (status, body) = fixture
        .get(&format!("/api/tasks/{}/can-start", b), &admin)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["canStart"], false);
    assert_eq!(body["data"]["blocking"][0]["id"], a.as_str());

    // A task others depend on cannot be deleted.
    let (status, _) = fixture
        .call(Method::DELETE, &format!("/api/tasks/{}", a), &admin, None)
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_overlapping_leave_rejected() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dev = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com" }),
        )
        .await;

    let path = format!("/api/members/{}/leaves", dev);
    let (status, body) = fixture
        .post(
            &path,
            &admin,
            json!({ "start": "2030-07-01", "end": "2030-07-14", "kind": "annual" }),
        )
        .await;
    assert_eq!(status, 200, "leave creation failed: {}", body);
    assert_eq!(body["data"]["leaves"].as_array().unwrap().len(), 1);

    let (status, body) = fixture
        .post(
            &path,
            &admin,
            json!({ "start": "2030-07-10", "end": "2030-07-20", "kind": "other" }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = fixture
        .post(
            &path,
            &admin,
            json!({ "start": "2030-07-15", "end": "2030-07-20", "kind": "other" }),
        )
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_comment_mentions_notify_members() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let ada = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com" }),
        )
        .await;
    let project = fixture
        .create_project(&admin, project_body("Babbage", 0.0, &[]))
        .await;

    let (status, body) = fixture
        .post(
            "/api/comments",
            &admin,
            json!({
                "resourceType": "project",
                "resourceId": project,
                "body": "@ada can you review the estimates?"
            }),
        )
        .await;
    assert_eq!(status, 200, "comment failed: {}", body);
    assert_eq!(body["data"]["mentionIds"][0], ada.as_str());
    let comment = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture.get("/api/notifications?kind=mention", &ada).await;
    assert_eq!(status, 200);
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["resourceId"], project.as_str());
    let notification = items[0]["id"].as_str().unwrap().to_string();

    // Ada replies; the reply lands on the same project.
    let (status, body) = fixture
        .post(
            &format!("/api/comments/{}/replies", comment),
            &ada,
            json!({ "body": "On it" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["replyTo"], comment.as_str());

    // Only the author edits.
    let (status, _) = fixture
        .put(&format!("/api/comments/{}", comment), &ada, json!({ "body": "changed" }))
        .await;
    assert_eq!(status, 403);

    let (status, body) = fixture
        .post(&format!("/api/notifications/{}/read", notification), &ada, json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "read");

    // Someone else's notification is off limits.
    let (status, _) = fixture
        .post(&format!("/api/notifications/{}/read", notification), &admin, json!({}))
        .await;
    assert_eq!(status, 403);

    let (_, body) = fixture
        .get(
            &format!("/api/comments?resourceType=project&resourceId={}", project),
            &admin,
        )
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_inbox_open_to_every_role() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dora = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Dora", "lastName": "Director", "email": "dora@example.com", "role": "director" }),
        )
        .await;
    let otto = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Otto", "lastName": "Observer", "email": "otto@example.com", "role": "observer" }),
        )
        .await;
    let project = fixture
        .create_project(&admin, project_body("Colossus", 0.0, &[]))
        .await;

    let (status, body) = fixture
        .post(
            "/api/comments",
            &admin,
            json!({
                "resourceType": "project",
                "resourceId": project,
                "body": "@dora @otto the steering review moved to Friday"
            }),
        )
        .await;
    assert_eq!(status, 200, "comment failed: {}", body);

    let (status, body) = fixture.get("/api/notifications", &dora).await;
    assert_eq!(status, 200, "director inbox failed: {}", body);
    assert_eq!(body["data"]["unread"], 1);
    let notification = body["data"]["items"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .post(&format!("/api/notifications/{}/read", notification), &dora, json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "read");
    let (status, _) = fixture
        .post(&format!("/api/notifications/{}/archive", notification), &dora, json!({}))
        .await;
    assert_eq!(status, 200);

    // Ownership still applies.
    let (status, _) = fixture
        .post(&format!("/api/notifications/{}/read", notification), &otto, json!({}))
        .await;
    assert_eq!(status, 403);

    let (status, _) = fixture
        .call(
            Method::DELETE,
            &format!("/api/notifications/{}", notification),
            &dora,
            None,
        )
        .await;
    assert_eq!(status, 200);

    let (status, body) = fixture.get("/api/notifications", &otto).await;
    assert_eq!(status, 200, "observer inbox failed: {}", body);
    assert_eq!(body["data"]["total"], 1);
    let (status, body) = fixture
        .post("/api/notifications/read-all", &otto, json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["updated"], 1);
}

#[tokio::test]
async fn test_dashboards_follow_roles() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dev = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com" }),
        )
        .await;
    let lead = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Linus", "lastName": "Lead", "email": "linus@example.com", "role": "lead" }),
        )
        .await;
    let project = fixture
        .create_project(
            &admin,
            json!({
                "name": "Late one",
                "plannedStart": days_ago(60),
                "plannedEnd": days_ago(5),
                "priority": "critical",
                "leadId": lead,
                "memberIds": [dev],
            }),
        )
        .await;
    fixture
        .create_task(
            &admin,
            json!({
                "title": "Overdue",
                "projectId": project,
                "assigneeIds": [dev],
                "plannedEnd": days_ago(1)
            }),
        )
        .await;

    let (status, body) = fixture.get("/api/dashboard", &admin).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["kind"], "director");
    assert_eq!(body["data"]["kpis"]["lateProjects"], 1);
    assert_eq!(body["data"]["kpis"]["lateTasks"], 1);
    assert_eq!(body["data"]["lateProjects"][0]["lateDays"], 5);
    assert_eq!(body["data"]["priorityProjects"][0]["priority"], "critical");

    let (status, body) = fixture.get("/api/dashboard", &lead).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["kind"], "lead");
    assert_eq!(body["data"]["projects"][0]["isLate"], true);
    let alerts = body["data"]["alerts"].as_array().unwrap();
    assert!(alerts.iter().any(|a| a["kind"] == "late"));
    assert!(alerts.iter().any(|a| a["kind"] == "task"));

    let (status, body) = fixture.get("/api/dashboard", &dev).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["kind"], "member");
    assert_eq!(body["data"]["openTasks"], 1);
    assert_eq!(body["data"]["tasks"][0]["isLate"], true);
    assert_eq!(body["data"]["tasks"][0]["projectName"], "Late one");

    // Reports need reports:read, which plain members lack.
    let (status, _) = fixture.get("/api/reports/kpis", &dev).await;
    assert_eq!(status, 403);
    let (status, body) = fixture.get("/api/reports/late", &admin).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["lateTasks"], 1);
    assert_eq!(body["data"][0]["latePct"], 100.0);
}

#[tokio::test]
async fn test_time_report_and_stats() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let dev = fixture
        .create_member(
            &admin,
            json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com", "hourlyRate": 40.0 }),
        )
        .await;
    let project = fixture
        .create_project(&admin, project_body("Jacquard", 1000.0, &[&dev]))
        .await;

    let (_, body) = fixture
        .post(
            "/api/timesheets",
            &dev,
            json!({ "projectId": project, "date": days_ago(0), "hours": 2.5 }),
        )
        .await;
    let entry = body["data"]["id"].as_str().unwrap().to_string();
    fixture
        .post(&format!("/api/timesheets/{}/approve", entry), &admin, json!({}))
        .await;

    let day = days_ago(0);
    let (status, body) = fixture
        .get(&format!("/api/reports/time?from={}&to={}", day, day), &admin)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["totalHours"], 2.5);
    assert_eq!(body["data"]["byMember"][0]["label"], "Ada Lovelace");
    assert_eq!(body["data"]["byProject"][0]["cost"], 100.0);

    let (status, body) = fixture
        .get(&format!("/api/projects/{}/time-stats", project), &admin)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["totalCost"], 100.0);
    assert_eq!(body["data"]["entryCount"], 1);

    let (status, body) = fixture.get("/api/reports/budget", &admin).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["consumed"], 100.0);
    assert_eq!(body["data"][0]["usedPct"], 10.0);

    let (status, _) = fixture
        .get(&format!("/api/reports/time?from={}&to={}", day, days_ago(3)), &admin)
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_search_projects_and_tasks() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let project = fixture
        .create_project(&admin, project_body("Password Vault", 0.0, &[]))
        .await;
    fixture
        .create_task(
            &admin,
            json!({ "title": "Employee onboarding checklist", "projectId": project }),
        )
        .await;

    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    let (status, body) = fixture.get("/api/search?q=password&limit=10", &admin).await;
    assert_eq!(status, 200);
    let results = body["data"]["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0]["kind"], "project");
    assert_eq!(results[0]["id"], project.as_str());
    assert!(results[0]["score"].as_f64().unwrap() > 0.0);

    let (_, body) = fixture.get("/api/search?q=onboarding", &admin).await;
    let results = body["data"]["results"].as_array().unwrap();
    assert_eq!(results[0]["kind"], "task");
    assert_eq!(results[0]["projectId"], project.as_str());
}

#[tokio::test]
async fn test_optimistic_concurrency_conflict() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    let project = fixture
        .create_project(&admin, project_body("Hubble", 0.0, &[]))
        .await;

    let (status, body) = fixture
        .put(
            &format!("/api/projects/{}", project),
            &admin,
            json!({ "name": "Hubble II", "expectedVersion": 1 }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["history"][0]["field"], "name");

    let (status, body) = fixture
        .put(
            &format!("/api/projects/{}", project),
            &admin,
            json!({ "name": "Hubble III", "expectedVersion": 1 }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "VERSION_MISMATCH");
    assert_eq!(body["error"]["details"]["currentVersion"], 2);
}

#[tokio::test]
async fn test_revision_increments_on_writes() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;

    let (_, body) = fixture.get("/api/revision", &admin).await;
    let before = body["data"]["revisionId"].as_i64().unwrap();

    let (_, body) = fixture
        .post("/api/projects", &admin, project_body("Skylab", 0.0, &[]))
        .await;
    assert!(body["revisionId"].as_i64().unwrap() > before);

    let (_, body) = fixture.get("/api/revision", &admin).await;
    assert!(body["data"]["revisionId"].as_i64().unwrap() > before);
}

#[tokio::test]
async fn test_admin_stats_and_cleanup() {
    let fixture = TestFixture::new().await;
    let admin = fixture.setup_admin().await;
    fixture
        .create_project(&admin, project_body("Viking", 0.0, &[]))
        .await;

    let (status, body) = fixture.get("/api/admin/stats", &admin).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["projectsTotal"], 1);
    assert_eq!(body["data"]["membersTotal"], 1);
    assert!(body["data"]["databaseSizeMb"].as_f64().unwrap() >= 0.0);

    let (status, body) = fixture
        .post(
            "/api/admin/cleanup",
            &admin,
            json!({ "auditLogsOlderThanDays": 0 }),
        )
        .await;
    assert_eq!(status, 200);
    assert!(body["data"]["auditLogsDeleted"].as_u64().unwrap() >= 1);
    assert_eq!(body["data"]["notificationsDeleted"], 0);
}
