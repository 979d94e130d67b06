use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::Engine;
use fg_server::{
    auth::AuthToken,
    cache::new_cache,
    config::ApiConfig,
    database::Database,
    models::{Ingredient, NewUser, Tag, User},
    routes::{app, AppState},
};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    _dir: tempfile::TempDir,
    pub db: Database,
    pub router: Router,
}

pub struct Account {
    pub user: User,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("api.db")).unwrap();
        let router = app(AppState {
            db: db.clone(),
            cache: new_cache(),
            api: Arc::new(ApiConfig::default()),
        });
        Self {
            _dir: dir,
            db,
            router,
        }
    }

    pub fn account(&self, name: &str) -> Account {
        let conn = self.db.pool.get().unwrap();
        let user = User::create(
            &conn,
            &NewUser {
                email: format!("{}@example.com", name),
                username: name.into(),
                first_name: name.into(),
                last_name: "Cook".into(),
            },
        )
        .unwrap();
        let token = AuthToken::issue(&conn, user.id).unwrap();
        Account { user, token }
    }

    pub fn ingredient(&self, name: &str, unit: &str) -> Ingredient {
        let conn = self.db.pool.get().unwrap();
        Ingredient::create(&conn, name, unit).unwrap()
    }

    pub fn tag(&self, name: &str, slug: &str) -> Tag {
        let conn = self.db.pool.get().unwrap();
        Tag::create(&conn, name, None, slug).unwrap()
    }

    /// Send a request and return the status with the body parsed as JSON, or Null if empty.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.call_raw(method, uri, token, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn call_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }
}

pub fn png_data_url() -> String {
    let img = image::RgbImage::from_pixel(3, 2, image::Rgb([90, 160, 30]));
    let mut png = std::io::Cursor::new(Vec::new());
    img.write_to(&mut png, image::ImageFormat::Png).unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png.into_inner())
    )
}
