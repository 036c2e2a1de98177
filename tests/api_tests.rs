use recipe_portal::{
    AppConfig, AppState, Credentials, MemoryReadCache, MemoryRepository, MockAssetStore,
    create_router,
    repository::RepositoryState,
};
use reqwest::{StatusCode, header, multipart};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub assets: MockAssetStore,
    _uploads: tempfile::TempDir,
}

async fn spawn_app(cache_ttl: Duration) -> TestApp {
    let uploads = tempfile::tempdir().expect("Failed to create upload dir");
    let assets = MockAssetStore::new();
    let config = AppConfig {
        password_hash_cost: 4,
        cache_ttl,
        upload_dir: uploads.path().to_path_buf(),
        ..AppConfig::default()
    };

    let state = AppState {
        repo: Arc::new(MemoryRepository::new()) as RepositoryState,
        assets: Arc::new(assets.clone()),
        cache: Arc::new(MemoryReadCache::new()),
        credentials: Credentials::from_config(&config),
        config,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        assets,
        _uploads: uploads,
    }
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Registers and logs in; returns the `Cookie` header value of the new session.
    async fn sign_up(&self, client: &reqwest::Client, email: &str) -> String {
        let response = client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({"username": "Tester", "email": email, "password": "pass-word-1"}))
            .send()
            .await
            .expect("register failed");
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({"email": email, "password": "pass-word-1"}))
            .send()
            .await
            .expect("login failed");
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("missing Set-Cookie")
            .to_string();
        set_cookie
            .split(';')
            .next()
            .expect("empty Set-Cookie")
            .to_string()
    }
}

fn recipe_form(title: &str) -> multipart::Form {
    let image = multipart::Part::bytes(b"fake jpeg".to_vec())
        .file_name("dish.jpg")
        .mime_str("image/jpeg")
        .unwrap();

    multipart::Form::new()
        .text("title", title.to_string())
        .text("description", "Made in an integration test")
        .text("totalTime", "20")
        .text("prepTime", "5")
        .text("cookingTime", "15")
        .text("calories", "300")
        .text("carbs", "30")
        .text("protein", "12")
        .text("fat", "9")
        .text("ingredients", r#"["rice", "beans"]"#)
        .text("instructions", "cook everything")
        .part("image", image)
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app(Duration::from_secs(30)).await;
    let client = reqwest::Client::new();
    let response = client
        .get(app.url("/health"))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_recipe_lifecycle_over_http() {
    let app = spawn_app(Duration::from_secs(30)).await;
    let client = reqwest::Client::new();
    let cookie = app.sign_up(&client, "lifecycle@example.com").await;

    // Create
    let response = client
        .post(app.url("/api/v1/recipes"))
        .header(header::COOKIE, &cookie)
        .multipart(recipe_form("Rice and beans"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    let id = body["data"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"][0]["ingredients"], json!(["rice", "beans"]));
    assert_eq!(app.assets.object_count().await, 1);

    // Update
    let response = client
        .put(app.url(&format!("/api/v1/recipes/{id}")))
        .header(header::COOKIE, &cookie)
        .multipart(multipart::Form::new().text("title", "Beans and rice"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // List reflects the update
    let response = client
        .get(app.url("/api/v1/recipes"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"][0]["title"], "Beans and rice");

    // Delete
    let response = client
        .delete(app.url(&format!("/api/v1/recipes/{id}")))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.assets.object_count().await, 0);
}

#[tokio::test]
async fn test_listing_cache_expires() {
    let app = spawn_app(Duration::from_millis(300)).await;
    let client = reqwest::Client::new();
    let cookie = app.sign_up(&client, "cache@example.com").await;

    let response = client
        .post(app.url("/api/v1/recipes"))
        .header(header::COOKIE, &cookie)
        .multipart(recipe_form("Cached"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let cache_status = |response: &reqwest::Response| {
        response
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    let first = client
        .get(app.url("/api/v1/recipes"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(cache_status(&first), "miss");

    let second = client
        .get(app.url("/api/v1/recipes"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(cache_status(&second), "hit");

    tokio::time::sleep(Duration::from_millis(600)).await;
    let third = client
        .get(app.url("/api/v1/recipes"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(cache_status(&third), "miss");
}

#[tokio::test]
async fn test_logout_then_guarded_route() {
    let app = spawn_app(Duration::from_secs(30)).await;
    let client = reqwest::Client::new();
    let cookie = app.sign_up(&client, "logout@example.com").await;

    let response = client
        .get(app.url("/api/v1/auth/logout"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cleared.starts_with("access_token=;"));

    // A client honoring the cleared cookie no longer sends it.
    let response = client.get(app.url("/api/v1/recipes")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
