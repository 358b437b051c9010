use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use stockroom_auth::{JwtClaims, Role};
use stockroom_core::UserId;
use stockroom_infra::config::AppConfig;

const JWT_SECRET: &str = "test-secret";
const PASSWORD: &str = "hunter2hunter2";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            ..AppConfig::default()
        };
        let app = stockroom_api::app::build_app(config).expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).bearer_auth(token).send().await.unwrap();
        read(res).await
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        read(res).await
    }

    async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        read(res).await
    }

    async fn delete(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let res = self.client.delete(self.url(path)).bearer_auth(token).send().await.unwrap();
        read(res).await
    }

    /// Self-register and return `(token, user)`.
    async fn register(&self, username: &str) -> (String, Value) {
        let res = self
            .client
            .post(self.url("/auth/register"))
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": PASSWORD,
            }))
            .send()
            .await
            .unwrap();
        let (status, body) = read(res).await;
        assert_eq!(status, StatusCode::CREATED, "register {username}: {body}");
        let token = body["data"]["token"].as_str().unwrap().to_string();
        (token, body["data"]["user"].clone())
    }

    /// Admin-created account with `role`, plus a token minted for it.
    async fn user_with_role(&self, admin_token: &str, username: &str, role: &str) -> (String, Value) {
        let (status, body) = self
            .post(
                "/api/user",
                admin_token,
                json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                    "role": role,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create {username}: {body}");
        let user = body["data"]["user"].clone();
        (mint_for(&user, ChronoDuration::minutes(10)), user)
    }

    async fn create_supplier(&self, token: &str, name: &str) -> String {
        let (status, body) = self
            .post(
                "/api/supplier",
                token,
                json!({
                    "name": name,
                    "contact": "Jane Roe",
                    "email": "orders@supplier.test",
                    "phone": "+1 555 0100",
                    "address": "1 Dock Road",
                    "city": "Leeds",
                    "country": "UK",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create supplier: {body}");
        body["data"]["supplier"]["id"].as_str().unwrap().to_string()
    }

    async fn create_product(&self, token: &str, sku: &str, stock: i64, supplier_id: Option<&str>) -> (StatusCode, Value) {
        let mut body = json!({
            "name": "Copy paper",
            "description": "A4, 80gsm",
            "category": "Office",
            "price": 650,
            "cost": 400,
            "sku": sku,
            "stock": stock,
            "minStock": 10,
            "maxStock": 100,
        });
        if let Some(supplier_id) = supplier_id {
            body["supplierId"] = json!(supplier_id);
        }
        self.post("/api/product", token, body).await
    }

    async fn move_stock(&self, token: &str, product_id: &str, movement_type: &str, quantity: i64) -> (StatusCode, Value) {
        self.post(
            "/api/stock-movement",
            token,
            json!({
                "productId": product_id,
                "movementType": movement_type,
                "quantity": quantity,
                "reason": "test",
            }),
        )
        .await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read(res: reqwest::Response) -> (StatusCode, Value) {
    let status = res.status();
    let body = res.json().await.unwrap_or(Value::Null);
    (status, body)
}

fn mint(claims: &JwtClaims, secret: &str) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn mint_for(user: &Value, ttl: ChronoDuration) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: user["id"].as_str().unwrap().parse().unwrap(),
        username: user["username"].as_str().unwrap().to_string(),
        role: user["role"].as_str().unwrap().parse().unwrap(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    mint(&claims, JWT_SECRET)
}

#[tokio::test]
async fn health_and_index_are_public() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["env"], "development");
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);

    let res = srv.client.get(srv.url("/")).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["name"], "stockroom-api");
    assert_eq!(body["health"], "/health");

    let res = srv.client.get(srv.url("/nowhere")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/api/products")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);

    let (status, _) = srv.get("/api/products", "not.a.jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Well-formed and signed, but for a user that does not exist.
    let now = Utc::now();
    let ghost = JwtClaims {
        sub: UserId::new(),
        username: "ghost".to_string(),
        role: Role::Admin,
        iat: now.timestamp(),
        exp: (now + ChronoDuration::minutes(5)).timestamp(),
    };
    let (status, _) = srv.get("/api/products", &mint(&ghost, JWT_SECRET)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, admin) = srv.register("root").await;
    let expired = mint_for(&admin, ChronoDuration::minutes(-5));
    let (status, _) = srv.get("/auth/profile", &expired).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut forged = ghost.clone();
    forged.sub = admin["id"].as_str().unwrap().parse().unwrap();
    let (status, _) = srv.get("/auth/profile", &mint(&forged, "wrong-secret")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_account_is_admin_and_login_round_trips() {
    let srv = TestServer::spawn().await;

    let (admin_token, admin) = srv.register("owner").await;
    assert_eq!(admin["role"], "admin");
    assert!(admin.get("passwordHash").is_none());

    let (_, second) = srv.register("clerk").await;
    assert_eq!(second["role"], "staff");

    // Same email in different case.
    let res = srv
        .client
        .post(srv.url("/auth/register"))
        .json(&json!({"username": "other", "email": "CLERK@example.com", "password": PASSWORD}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = srv
        .client
        .post(srv.url("/auth/register"))
        .json(&json!({"username": "weak", "email": "weak@example.com", "password": "short"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let login = |password: &'static str| {
        srv.client
            .post(srv.url("/auth/login"))
            .json(&json!({"email": "clerk@example.com", "password": password}))
            .send()
    };
    let (status, wrong) = read(login("not-the-password1").await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = read(login(PASSWORD).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["username"], "clerk");

    let res = srv
        .client
        .post(srv.url("/auth/login"))
        .json(&json!({"email": "nobody@example.com", "password": PASSWORD}))
        .send()
        .await
        .unwrap();
    let (status, unknown) = read(res).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown["message"], wrong["message"]);

    let clerk_token = body["data"]["token"].as_str().unwrap();
    let (status, profile) = srv.get("/auth/profile", clerk_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["data"]["user"]["email"], "clerk@example.com");

    let (status, updated) = srv.put("/auth/profile", clerk_token, json!({"username": "clerk2"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["user"]["username"], "clerk2");

    let (status, _) = srv.put("/auth/profile", &admin_token, json!({"username": "clerk2"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn change_password_checks_the_current_one() {
    let srv = TestServer::spawn().await;
    let (token, _) = srv.register("owner").await;

    let (status, _) = srv
        .put(
            "/auth/change-password",
            &token,
            json!({"currentPassword": "wrong-password1", "newPassword": "brandnew123"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv
        .put(
            "/auth/change-password",
            &token,
            json!({"currentPassword": PASSWORD, "newPassword": "brandnew123"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let res = srv
        .client
        .post(srv.url("/auth/login"))
        .json(&json!({"email": "owner@example.com", "password": "brandnew123"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn role_gates_follow_the_fixed_sets() {
    let srv = TestServer::spawn().await;
    let (admin_token, _) = srv.register("owner").await;
    let (staff_token, _) = srv.user_with_role(&admin_token, "picker", "staff").await;
    let (manager_token, _) = srv.user_with_role(&admin_token, "lead", "manager").await;

    // Admin only.
    assert_eq!(srv.get("/api/users", &staff_token).await.0, StatusCode::FORBIDDEN);
    assert_eq!(srv.get("/api/users", &manager_token).await.0, StatusCode::FORBIDDEN);
    assert_eq!(srv.get("/api/users", &admin_token).await.0, StatusCode::OK);
    assert_eq!(
        srv.post("/api/admin/rebuild", &manager_token, json!({})).await.0,
        StatusCode::FORBIDDEN
    );

    // Manager and admin.
    assert_eq!(srv.get("/api/products", &staff_token).await.0, StatusCode::FORBIDDEN);
    assert_eq!(srv.get("/api/products", &manager_token).await.0, StatusCode::OK);
    assert_eq!(srv.get("/api/staff", &staff_token).await.0, StatusCode::FORBIDDEN);

    // Staff and above.
    assert_eq!(srv.get("/api/stock-stats", &staff_token).await.0, StatusCode::OK);
    assert_eq!(srv.get("/api/stock-movements", &staff_token).await.0, StatusCode::OK);
    assert_eq!(srv.get("/api/my-data", &staff_token).await.0, StatusCode::OK);
}

#[tokio::test]
async fn role_changes_cannot_escalate() {
    let srv = TestServer::spawn().await;
    let (admin_token, admin) = srv.register("owner").await;
    let (manager_token, manager) = srv.user_with_role(&admin_token, "lead", "manager").await;
    let (_, staff) = srv.user_with_role(&admin_token, "picker", "staff").await;

    let staff_path = format!("/api/user/{}/role", staff["id"].as_str().unwrap());
    let (status, _) = srv.put(&staff_path, &manager_token, json!({"role": "admin"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.put(&staff_path, &manager_token, json!({"role": "manager"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["role"], "manager");

    let admin_path = format!("/api/user/{}/role", admin["id"].as_str().unwrap());
    let (status, _) = srv.put(&admin_path, &manager_token, json!({"role": "staff"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv.put(&staff_path, &manager_token, json!({"role": "owner"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Staff list no longer includes the promoted user.
    let (_, body) = srv.get("/api/staff", &manager_token).await;
    assert_eq!(body["data"]["staff"].as_array().unwrap().len(), 0);

    // An admin cannot delete themselves; deleting someone else frees their email.
    let own = format!("/api/user/{}", admin["id"].as_str().unwrap());
    assert_eq!(srv.delete(&own, &admin_token).await.0, StatusCode::BAD_REQUEST);

    let managers = format!("/api/user/{}", manager["id"].as_str().unwrap());
    assert_eq!(srv.delete(&managers, &admin_token).await.0, StatusCode::OK);
    assert_eq!(srv.get("/api/my-data", &manager_token).await.0, StatusCode::UNAUTHORIZED);
    srv.user_with_role(&admin_token, "lead", "staff").await;
}

#[tokio::test]
async fn product_and_supplier_crud_with_restrict_delete() {
    let srv = TestServer::spawn().await;
    let (token, _) = srv.register("owner").await;
    let supplier_id = srv.create_supplier(&token, "Paper Co").await;

    let (status, body) = srv.create_product(&token, "PPR-A4", 50, Some(&supplier_id)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let product = &body["data"]["product"];
    assert_eq!(product["stock"], 50);
    assert_eq!(product["status"], "In Stock");
    assert_eq!(product["supplierId"], supplier_id.as_str());
    let product_id = product["id"].as_str().unwrap().to_string();

    let (status, _) = srv.create_product(&token, "ppr-a4", 1, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let ghost_supplier = uuid::Uuid::now_v7().to_string();
    let (status, _) = srv.create_product(&token, "PPR-A3", 1, Some(&ghost_supplier)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let path = format!("/api/product/{product_id}");
    let (status, _) = srv.put(&path, &token, json!({"stock": 999})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = srv.put(&path, &token, json!({"minStock": 60, "sku": "PPR-A4-80"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["product"]["status"], "Low Stock");
    assert_eq!(body["data"]["product"]["stock"], 50);

    // The old SKU is free again.
    let (status, _) = srv.create_product(&token, "PPR-A4", 0, None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = srv.get("/api/products", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 2);

    let supplier_path = format!("/api/supplier/{supplier_id}");
    let (status, body) = srv.delete(&supplier_path, &token).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = srv.put(&supplier_path, &token, json!({"status": "Inactive"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["supplier"]["status"], "inactive");

    assert_eq!(srv.delete(&path, &token).await.0, StatusCode::OK);
    assert_eq!(srv.get(&path, &token).await.0, StatusCode::NOT_FOUND);
    assert_eq!(srv.delete(&path, &token).await.0, StatusCode::NOT_FOUND);

    assert_eq!(srv.delete(&supplier_path, &token).await.0, StatusCode::OK);
    assert_eq!(srv.get(&supplier_path, &token).await.0, StatusCode::NOT_FOUND);
    assert_eq!(srv.get("/api/product/not-an-id", &token).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stock_movements_update_the_ledger() {
    let srv = TestServer::spawn().await;
    let (admin_token, _) = srv.register("owner").await;
    let (staff_token, _) = srv.user_with_role(&admin_token, "picker", "staff").await;

    let (_, body) = srv.create_product(&admin_token, "INK-BLK", 20, None).await;
    let product_id = body["data"]["product"]["id"].as_str().unwrap().to_string();

    let (status, body) = srv.move_stock(&staff_token, &product_id, "stock in", 5).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["movement"]["stockBefore"], 20);
    assert_eq!(body["data"]["movement"]["stockAfter"], 25);
    assert_eq!(body["data"]["movement"]["movementType"], "in");
    assert_eq!(body["data"]["product"]["stock"], 25);

    let (status, body) = srv.move_stock(&staff_token, &product_id, "stock out", 26).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Available: 25"));

    assert_eq!(srv.move_stock(&staff_token, &product_id, "sideways", 1).await.0, StatusCode::BAD_REQUEST);
    assert_eq!(srv.move_stock(&staff_token, &product_id, "out", 0).await.0, StatusCode::BAD_REQUEST);
    assert_eq!(srv.move_stock(&staff_token, &product_id, "out", -3).await.0, StatusCode::BAD_REQUEST);

    let unknown = uuid::Uuid::now_v7().to_string();
    assert_eq!(srv.move_stock(&staff_token, &unknown, "in", 1).await.0, StatusCode::NOT_FOUND);

    let (status, body) = srv.move_stock(&staff_token, &product_id, "OUT", 25).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["product"]["status"], "Low Stock");

    let (_, body) = srv
        .get(&format!("/api/stock-movements?productId={product_id}"), &staff_token)
        .await;
    let movements = body["data"]["movements"].as_array().unwrap();
    // Opening balance + two accepted movements, newest first.
    assert_eq!(movements.len(), 3);
    assert_eq!(movements[0]["stockAfter"], 0);
    assert_eq!(movements[2]["stockAfter"], 20);

    let (_, body) = srv.get(&format!("/api/product/{product_id}/movements?limit=1"), &staff_token).await;
    assert_eq!(body["data"]["count"], 1);

    let (_, body) = srv.get("/api/stock-stats", &staff_token).await;
    assert_eq!(
        body["data"]["stats"],
        json!({"totalItems": 1, "lowStockItems": 1, "outOfStockItems": 1, "overStockItems": 0})
    );

    let (_, body) = srv.get("/api/stats", &admin_token).await;
    assert_eq!(body["data"]["totalProducts"], 1);
    assert_eq!(body["data"]["totalMovements"], 3);
}

#[tokio::test]
async fn concurrent_stock_outs_never_oversell() {
    let srv = std::sync::Arc::new(TestServer::spawn().await);
    let (token, _) = srv.register("owner").await;
    let (_, body) = srv.create_product(&token, "LAST-FIVE", 5, None).await;
    let product_id = body["data"]["product"]["id"].as_str().unwrap().to_string();

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let srv = std::sync::Arc::clone(&srv);
        let token = token.clone();
        let product_id = product_id.clone();
        tasks.push(tokio::spawn(async move {
            srv.move_stock(&token, &product_id, "out", 1).await.0
        }));
    }

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::CREATED => accepted += 1,
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT => {}
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(accepted, 5);

    let (_, body) = srv.get(&format!("/api/product/{product_id}"), &token).await;
    assert_eq!(body["data"]["product"]["stock"], 0);
}

#[tokio::test]
async fn stock_alerts_follow_status_changes() {
    let srv = TestServer::spawn().await;
    let (token, _) = srv.register("owner").await;
    let (_, body) = srv.create_product(&token, "TONER", 15, None).await;
    let product_id = body["data"]["product"]["id"].as_str().unwrap().to_string();

    srv.move_stock(&token, &product_id, "out", 10).await;

    // The alert worker trails the ledger; poll briefly.
    for _ in 0..50 {
        let (_, body) = srv.get("/api/stock-alerts", &token).await;
        if let Some(alert) = body["data"]["alerts"].as_array().and_then(|a| a.first()) {
            assert_eq!(alert["to"], "Low Stock");
            assert_eq!(alert["stock"], 5);
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("stock alert did not appear within timeout");
}

#[tokio::test]
async fn rebuild_replays_the_ledger() {
    let srv = TestServer::spawn().await;
    let (token, _) = srv.register("owner").await;
    let supplier_id = srv.create_supplier(&token, "Ink Ltd").await;
    let (_, body) = srv.create_product(&token, "INK-CYN", 8, Some(&supplier_id)).await;
    let product_id = body["data"]["product"]["id"].as_str().unwrap().to_string();
    srv.move_stock(&token, &product_id, "in", 2).await;

    let (status, body) = srv.post("/api/admin/rebuild", &token, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let report = &body["data"]["report"];
    assert_eq!(report["products"], 1);
    assert_eq!(report["movements"], 2);
    assert_eq!(report["suppliers"], 1);
    assert_eq!(report["users"], 1);

    let (_, body) = srv.get(&format!("/api/product/{product_id}"), &token).await;
    assert_eq!(body["data"]["product"]["stock"], 10);

    // Constraint indexes are rebuilt too.
    assert_eq!(srv.create_product(&token, "ink-cyn", 0, None).await.0, StatusCode::CONFLICT);
    assert_eq!(
        srv.delete(&format!("/api/supplier/{supplier_id}"), &token).await.0,
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn refused_user_update_leaves_the_account_untouched() {
    let srv = TestServer::spawn().await;
    let (admin_token, admin) = srv.register("owner").await;
    let (_, picker) = srv.user_with_role(&admin_token, "picker", "staff").await;
    let picker_path = format!("/api/user/{}", picker["id"].as_str().unwrap());

    let usernames = || async {
        let (_, body) = srv.get("/api/users", &admin_token).await;
        let mut names: Vec<String> = body["data"]["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["username"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        names
    };

    let (status, _) = srv
        .put(&picker_path, &admin_token, json!({"username": "renamed", "password": "short"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(usernames().await, vec!["owner", "picker"]);

    // The username stays free for someone else.
    srv.user_with_role(&admin_token, "renamed", "staff").await;

    let own_path = format!("/api/user/{}", admin["id"].as_str().unwrap());
    let (status, _) = srv
        .put(&own_path, &admin_token, json!({"username": "boss", "role": "staff"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, me) = srv.get("/api/my-data", &admin_token).await;
    assert_eq!(me["data"]["user"]["username"], "owner");
    assert_eq!(me["data"]["user"]["role"], "admin");

    let (status, body) = srv
        .put(&picker_path, &admin_token, json!({"username": "packer", "password": "longenough1", "role": "manager"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["user"]["username"], "packer");
    assert_eq!(body["data"]["user"]["role"], "manager");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_sku_changes_release_every_losing_key() {
    let srv = std::sync::Arc::new(TestServer::spawn().await);
    let (token, _) = srv.register("owner").await;
    let (_, body) = srv.create_product(&token, "BASE", 1, None).await;
    let path = format!("/api/product/{}", body["data"]["product"]["id"].as_str().unwrap());

    let skus: Vec<String> = (0..8).map(|i| format!("SWAP-{i}")).collect();
    let mut tasks = Vec::new();
    for sku in &skus {
        let srv = std::sync::Arc::clone(&srv);
        let token = token.clone();
        let path = path.clone();
        let sku = sku.clone();
        tasks.push(tokio::spawn(async move { srv.put(&path, &token, json!({"sku": sku})).await.0 }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let (_, body) = srv.get(&path, &token).await;
    let held = body["data"]["product"]["sku"].as_str().unwrap().to_string();

    for sku in skus.iter().map(String::as_str).chain(["BASE"]) {
        let (status, _) = srv.create_product(&token, sku, 0, None).await;
        let expected = if sku == held { StatusCode::CONFLICT } else { StatusCode::CREATED };
        assert_eq!(status, expected, "sku {sku}");
    }
}
