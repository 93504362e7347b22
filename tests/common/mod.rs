#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::NaiveDate;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use logsphere::models::{Role, Team, User};
use logsphere::services::{NewActivity, NewLog, TeamService, UserService};
use logsphere::store::Store;

pub struct TestApp {
    pub router: Router,
    pub store: Store,
    pub db: SqlitePool,
}

/// A fresh in-memory database with migrations applied.
pub async fn test_store() -> Store {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .create_if_missing(true);

    // one connection that never recycles, so the in-memory database lives as
    // long as the pool does
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("Failed to create in-memory SQLite pool");

    logsphere::db::migrate(&pool)
        .await
        .expect("Failed to run migrations");

    Store::new(pool)
}

/// A database file opened the way the server opens it: WAL journal and a
/// pool of several connections. The files go away on drop.
pub struct FileStore {
    pub store: Store,
    path: String,
}

pub async fn file_store(max_attempts: u32) -> FileStore {
    let path = std::env::temp_dir()
        .join(format!("logsphere-{}.db", uuid::Uuid::new_v4()))
        .display()
        .to_string();
    let pool = logsphere::db::init_pool(&format!("sqlite:{path}"))
        .await
        .expect("Failed to open file-backed SQLite pool");

    FileStore {
        store: Store::new(pool).with_max_attempts(max_attempts),
        path,
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path));
        }
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let store = test_store().await;
        let db = store.pool().clone();
        let router = logsphere::build_app(store.clone(), false)
            .await
            .expect("Failed to build app");

        Self { router, store, db }
    }

    /// Send a request through the app and return the response.
    pub async fn request(&self, req: Request<Body>) -> Response {
        tower::ServiceExt::oneshot(self.router.clone(), req)
            .await
            .unwrap()
    }

    pub async fn create_user(&self, name: &str, role: Role) -> User {
        create_user(&self.store, name, role).await
    }

    /// Log in by email and return the session cookie string.
    pub async fn login(&self, email: &str) -> String {
        let resp = self
            .post_json("/login", serde_json::json!({ "email": email }), None)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        session_cookie(&resp)
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder.body(Body::empty()).unwrap();
        self.request(req).await
    }

    pub async fn post_json(&self, uri: &str, body: Value, cookie: Option<&str>) -> Response {
        self.send_json("POST", uri, body, cookie).await
    }

    pub async fn put_json(&self, uri: &str, body: Value, cookie: Option<&str>) -> Response {
        self.send_json("PUT", uri, body, cookie).await
    }

    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri).method("DELETE");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder.body(Body::empty()).unwrap();
        self.request(req).await
    }

    async fn send_json(&self, method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .uri(uri)
            .method(method)
            .header("content-type", "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let req = builder.body(Body::from(body.to_string())).unwrap();
        self.request(req).await
    }
}

pub async fn create_user(store: &Store, name: &str, role: Role) -> User {
    let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
    UserService::register(store, name, &email, role)
        .await
        .expect("Failed to create test user")
}

/// A team led by a new team lead, with one member and one guide already joined.
pub struct Fixture {
    pub team: Team,
    pub lead: User,
    pub student: User,
    pub guide: User,
}

pub async fn team_fixture(store: &Store) -> Fixture {
    let lead = create_user(store, "Lena Lead", Role::TeamLead).await;
    let student = create_user(store, "Sam Student", Role::Student).await;
    let guide = create_user(store, "Gil Guide", Role::Guide).await;

    let team = TeamService::create_team(store, "Robotics", &lead.id)
        .await
        .unwrap();
    TeamService::join_team_by_code(store, &team.referral_code, &student.id)
        .await
        .unwrap();
    TeamService::join_team_by_code(store, &team.guide_code, &guide.id)
        .await
        .unwrap();

    Fixture {
        team: TeamService::get_team(store, &team.id).await.unwrap(),
        lead: UserService::get(store, &lead.id).await.unwrap(),
        student: UserService::get(store, &student.id).await.unwrap(),
        guide: UserService::get(store, &guide.id).await.unwrap(),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Week `week` of 2025, Monday to Sunday, with one activity on the Tuesday.
pub fn weekly_log(team: &Team, author: &User, week: u32) -> NewLog {
    let monday = date(2025, 1, 6) + chrono::Duration::weeks(i64::from(week) - 1);
    NewLog {
        team_id: team.id.clone(),
        week_number: week,
        start_date: monday,
        end_date: monday + chrono::Duration::days(6),
        activities: vec![NewActivity {
            date: monday + chrono::Duration::days(1),
            hours: 3.5,
            description: "sensor calibration".to_string(),
        }],
        created_by: author.id.clone(),
        created_by_name: author.name.clone(),
    }
}

pub fn session_cookie(resp: &Response) -> String {
    resp.headers()
        .get("set-cookie")
        .expect("Response should set a session cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

/// Read the full response body as JSON.
pub async fn body_json(resp: Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}
