use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use garments_api::app::{router_with, services::AppServices};
use garments_auth::{JwtClaims, Role};
use garments_core::{TenantId, UserId};
use garments_infra::{AppConfig, DependencyProbe, DependencyStatus};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const SECRET: &str = "black-box-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(&[]).await
    }

    /// Same router as prod over in-memory stores, bound to an ephemeral port.
    async fn spawn_with(vars: &[(&str, &str)]) -> Self {
        Self::serve(in_memory_services(vars)).await
    }

    async fn serve(services: AppServices) -> Self {
        let app = router_with(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api"),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn in_memory_services(vars: &[(&str, &str)]) -> AppServices {
    let mut vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    vars.entry("JWT_SECRET".into()).or_insert_with(|| SECRET.into());
    let config = AppConfig::from_lookup(|name| vars.get(name).cloned()).expect("valid test config");
    AppServices::in_memory(config)
}

struct UnreachableRedis;

#[async_trait::async_trait]
impl DependencyProbe for UnreachableRedis {
    fn service(&self) -> &'static str {
        "redis"
    }

    async fn check(&self) -> DependencyStatus {
        DependencyStatus {
            service: "redis".into(),
            healthy: false,
            message: "redis is unreachable: connection refused".into(),
            response_time_ms: 0,
            timestamp: Utc::now(),
        }
    }
}

fn mint_jwt(tenant_id: TenantId, roles: &[&str]) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        tenant_id,
        roles: roles.iter().map(|r| Role::new(r.to_string())).collect(),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn post_json(client: &reqwest::Client, url: String, token: &str, body: Value) -> (StatusCode, Value) {
    let res = client.post(url).bearer_auth(token).json(&body).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap_or(Value::Null))
}

async fn patch_json(client: &reqwest::Client, url: String, token: &str, body: Value) -> (StatusCode, Value) {
    let res = client.patch(url).bearer_auth(token).json(&body).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap_or(Value::Null))
}

async fn get_json(client: &reqwest::Client, url: String, token: &str) -> (StatusCode, Value) {
    let res = client.get(url).bearer_auth(token).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap_or(Value::Null))
}

async fn create_account(server: &TestServer, client: &reqwest::Client, token: &str, name: &str, account_type: &str) -> String {
    let (status, body) = post_json(
        client,
        server.url("/chartofaccounts"),
        token,
        json!({ "name": name, "account_type": account_type }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(server.url("/chartofaccounts")).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = reqwest::Client::new()
        .get(server.url("/whoami"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_reports_effective_permissions() {
    let server = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let token = mint_jwt(tenant_id, &["employee"]);

    let (status, body) = get_json(&reqwest::Client::new(), server.url("/whoami"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], json!(tenant_id));
    let permissions: Vec<&str> = body["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(permissions.contains(&"category.view"));
    assert!(!permissions.contains(&"chart_of_accounts.write"));
}

#[tokio::test]
async fn missing_permission_is_forbidden() {
    let server = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["employee"]);

    let (status, body) = post_json(
        &reqwest::Client::new(),
        server.url("/chartofaccounts"),
        &token,
        json!({ "name": "Cash", "account_type": "Asset" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn tenants_cannot_see_each_others_records() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let owner = mint_jwt(TenantId::new(), &["admin"]);
    let other = mint_jwt(TenantId::new(), &["admin"]);

    let id = create_account(&server, &client, &owner, "Cash in Hand", "Asset").await;

    let (status, _) = get_json(&client, server.url(&format!("/chartofaccounts/{id}")), &owner).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get_json(&client, server.url(&format!("/chartofaccounts/{id}")), &other).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unbalanced_journal_is_rejected_and_balanced_one_reaches_the_trial_balance() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["admin"]);

    let cash = create_account(&server, &client, &token, "Cash", "Asset").await;
    let sales = create_account(&server, &client, &token, "Sales", "Revenue").await;
    let today = Utc::now().date_naive();

    let (status, body) = post_json(
        &client,
        server.url("/journalentry/journal-entries"),
        &token,
        json!({
            "transaction_date": today,
            "reference_number": "CS-1",
            "lines": [
                { "account_id": cash, "debit": 10_000 },
                { "account_id": sales, "credit": 9_000 },
            ],
        }),
    )
    .await;
    assert!(status.is_client_error(), "{status}: {body}");

    // Asking to post on create is ignored: new entries start as drafts.
    let (status, entry) = post_json(
        &client,
        server.url("/journalentry/journal-entries"),
        &token,
        json!({
            "transaction_date": today,
            "reference_number": "CS-1",
            "lines": [
                { "account_id": cash, "debit": 10_000 },
                { "account_id": sales, "credit": 10_000 },
            ],
            "post_immediately": true,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{entry}");
    assert_eq!(entry["status"], "Draft");
    let entry_id = entry["id"].as_str().unwrap().to_string();

    let start = today - ChronoDuration::days(1);
    let report_url = server.url(&format!("/trial-balance?start_date={start}&end_date={today}"));
    let (status, report) = get_json(&client, report_url.clone(), &token).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["total_debits"], 0);

    let (status, posted) = patch_json(
        &client,
        server.url(&format!("/journalentry/journal-entries/{entry_id}/post")),
        &token,
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{posted}");
    assert_eq!(posted["status"], "Posted");

    let (status, report) = get_json(&client, report_url.clone(), &token).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["is_balanced"], true);
    assert_eq!(report["total_debits"], 10_000);
    assert_eq!(report["total_credits"], 10_000);
}

#[tokio::test]
async fn journal_changes_refresh_the_cached_trial_balance() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["admin"]);

    let bank = create_account(&server, &client, &token, "Bank", "Asset").await;
    let capital = create_account(&server, &client, &token, "Owner Capital", "Equity").await;
    let today = Utc::now().date_naive();
    let report_url = server.url(&format!("/trial-balance?start_date={today}&end_date={today}"));

    let mut entry_ids = Vec::new();
    for amount in [25_000, 5_000] {
        let (status, entry) = post_json(
            &client,
            server.url("/journalentry/journal-entries"),
            &token,
            json!({
                "transaction_date": today,
                "lines": [
                    { "account_id": bank, "debit": amount },
                    { "account_id": capital, "credit": amount },
                ],
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{entry}");
        let id = entry["id"].as_str().unwrap().to_string();
        let (status, _) = patch_json(
            &client,
            server.url(&format!("/journalentry/journal-entries/{id}/post")),
            &token,
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        entry_ids.push(id);
    }

    let (_, before) = get_json(&client, report_url.clone(), &token).await;
    assert_eq!(before["total_credits"], 30_000);

    let (status, reversed) = patch_json(
        &client,
        server.url(&format!("/journalentry/journal-entries/{}/reverse", entry_ids[1])),
        &token,
        json!({ "reason": "Duplicate capital injection" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{reversed}");

    let (_, after) = get_json(&client, report_url, &token).await;
    assert_eq!(after["total_credits"], 25_000);
    assert_eq!(after["total_debits"], 25_000);
    assert_eq!(after["is_balanced"], true);
}

#[tokio::test]
async fn cash_book_entries_post_against_the_cash_account() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant_id = TenantId::new();
    let token = mint_jwt(tenant_id, &["admin"]);
    let today = Utc::now().date_naive();
    let receipt = json!({
        "date": today,
        "category_name": "Received: Urbo ltd",
        "particulars": "Advance for joggers",
        "amount": 50_000,
        "contact_name": "Urbo ltd",
    });

    let manager = mint_jwt(tenant_id, &["manager"]);
    let (status, _) = post_json(&client, server.url("/cash-book/credit"), &manager, receipt.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = post_json(&client, server.url("/cash-book/credit"), &token, receipt.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"][0].as_str().unwrap().contains("Cash account is not configured"), "{body}");

    let cash = create_account(&server, &client, &token, "Cash on Hand", "Asset").await;
    let res = client
        .put(server.url("/settings/accounting"))
        .bearer_auth(&token)
        .json(&json!({ "cash_account_id": cash }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, saved) = post_json(&client, server.url("/cash-book/credit"), &token, receipt).await;
    assert_eq!(status, StatusCode::CREATED, "{saved}");
    assert_eq!(saved["accounts_created"], 1);
    assert_eq!(saved["contacts_created"], 1);
    let entry = &saved["entry"];
    assert_eq!(entry["status"], "Posted");
    assert_eq!(entry["journal_type"], "CashReceipt");
    assert_eq!(entry["description"], "Credit: Advance for joggers");
    assert_eq!(entry["lines"][0]["account_id"], cash.as_str());
    assert_eq!(entry["lines"][0]["debit"], 50_000);

    let csv = "\
Date,Catagories,Particulars,Amount,Date,Catagories,Supplier,Buyer,Particulars,Amount
01-02-2025,Received: Urbo ltd,Balance,\"1,000\",01-02-25,Subcontract bill,,Brooklyn BD,Joggers,\"2,400\"
02-02-2025,Loan A/C Chairman,,oops,,,,,,
";
    let res = client
        .post(server.url("/cash-book/import-csv"))
        .bearer_auth(&token)
        .header("content-type", "text/csv")
        .body(csv)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let summary: Value = res.json().await.unwrap();
    assert_eq!(summary["transactions_imported"], 2);
    assert_eq!(summary["accounts_created"], 1, "existing category accounts are reused");
    assert_eq!(summary["contacts_created"], 1);
    assert_eq!(summary["total_received"], 100_000);
    assert_eq!(summary["total_paid"], 240_000);
    assert_eq!(summary["skipped"].as_array().unwrap().len(), 1);

    let (status, recent) = get_json(&client, server.url("/cash-book/recent?limit=10"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recent["total_count"], 3);
    assert_eq!(recent["total_credits"], 150_000);
    assert_eq!(recent["total_debits"], 240_000);
    assert_eq!(recent["transactions"][0]["category_name"], "Received: Urbo ltd");
}

#[tokio::test]
async fn trial_balance_requires_a_date_range() {
    let server = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["accountant"]);

    let (status, body) = get_json(&reqwest::Client::new(), server.url("/trial-balance"), &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"], json!(["Start date is required", "End date is required"]));
}

#[tokio::test]
async fn issuing_a_sales_invoice_moves_stock_and_posts_the_receivable() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["admin"]);
    let today = Utc::now().date_naive();

    let receivable = create_account(&server, &client, &token, "Trade Debtors", "Asset").await;
    let revenue = create_account(&server, &client, &token, "Garment Sales", "Revenue").await;
    let cash = create_account(&server, &client, &token, "Cash at Bank", "Asset").await;
    let res = client
        .put(server.url("/settings/accounting"))
        .bearer_auth(&token)
        .json(&json!({
            "receivable_account_id": receivable,
            "revenue_account_id": revenue,
            "cash_account_id": cash,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (_, customer) = post_json(
        &client,
        server.url("/contact"),
        &token,
        json!({ "name": "Lahore Boutique", "contact_type": "Customer" }),
    )
    .await;
    let (_, product) = post_json(
        &client,
        server.url("/products"),
        &token,
        json!({ "sku": "KRT-001", "name": "Cotton Kurta", "unit_price": 250_000 }),
    )
    .await;
    let (_, warehouse) = post_json(&client, server.url("/warehouse"), &token, json!({ "name": "Main Store" })).await;

    let (status, received) = post_json(
        &client,
        server.url("/stock/receive"),
        &token,
        json!({
            "product_id": product["id"],
            "warehouse_id": warehouse["id"],
            "quantity": 10,
            "unit_cost": 150_000,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{received}");

    let (status, invoice) = post_json(
        &client,
        server.url("/sales-invoices"),
        &token,
        json!({
            "contact_id": customer["id"],
            "invoice_date": today,
            "due_date": today + ChronoDuration::days(30),
            "warehouse_id": warehouse["id"],
            "lines": [{
                "product_id": product["id"],
                "description": "Cotton Kurta",
                "quantity": 4,
                "unit_price": 250_000,
            }],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{invoice}");
    assert_eq!(invoice["status"], "Draft");
    assert!(invoice["number"].as_str().unwrap().starts_with("INV-"));
    let id = invoice["id"].as_str().unwrap().to_string();

    let (status, issued) = post_json(&client, server.url(&format!("/sales-invoices/{id}/issue")), &token, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{issued}");
    assert_eq!(issued["status"], "Sent");
    assert_eq!(issued["journal_entry_ids"].as_array().unwrap().len(), 1);

    let (_, stock) = get_json(
        &client,
        server.url(&format!("/stock?product_id={}", product["id"].as_str().unwrap())),
        &token,
    )
    .await;
    assert_eq!(stock[0]["quantity_in_stock"], 6);

    let (status, paid) = post_json(
        &client,
        server.url(&format!("/sales-invoices/{id}/payments")),
        &token,
        json!({ "amount": 1_000_000 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{paid}");
    assert_eq!(paid["status"], "Paid");
    assert_eq!(paid["journal_entry_ids"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn issuing_more_than_is_in_stock_changes_nothing() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["admin"]);
    let today = Utc::now().date_naive();

    let (_, customer) = post_json(
        &client,
        server.url("/contact"),
        &token,
        json!({ "name": "Karachi Traders", "contact_type": "Both" }),
    )
    .await;
    let (_, product) = post_json(&client, server.url("/products"), &token, json!({ "sku": "SHW-9", "name": "Shawl" })).await;
    let (_, warehouse) = post_json(&client, server.url("/warehouse"), &token, json!({ "name": "Annex" })).await;

    let (_, invoice) = post_json(
        &client,
        server.url("/sales-invoices"),
        &token,
        json!({
            "contact_id": customer["id"],
            "invoice_date": today,
            "due_date": today,
            "warehouse_id": warehouse["id"],
            "lines": [{
                "product_id": product["id"],
                "description": "Shawl",
                "quantity": 3,
                "unit_price": 90_000,
            }],
        }),
    )
    .await;
    let id = invoice["id"].as_str().unwrap().to_string();

    let (status, _) = post_json(&client, server.url(&format!("/sales-invoices/{id}/issue")), &token, json!({})).await;
    assert!(status.is_client_error());

    let (_, after) = get_json(&client, server.url(&format!("/sales-invoices/{id}")), &token).await;
    assert_eq!(after["status"], "Draft");
    let (_, stock) = get_json(&client, server.url("/stock"), &token).await;
    assert_eq!(stock, json!([]));
}

#[tokio::test]
async fn trial_balance_export_is_rate_limited() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(TenantId::new(), &["admin"]);

    let mut statuses = Vec::new();
    for _ in 0..6 {
        let res = client
            .post(server.url("/trial-balance/export"))
            .bearer_auth(&token)
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        statuses.push(res.status());
        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            assert!(res.headers().contains_key("retry-after"));
        }
    }
    assert!(statuses[..5].iter().all(|s| *s != StatusCode::TOO_MANY_REQUESTS));
    assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn blocked_addresses_are_refused_before_authentication() {
    let server = TestServer::spawn_with(&[("IP_BLOCKED", "203.0.113.9")]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(server.url("/whoami"))
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "ip_restricted");

    let res = client
        .get(server.url("/whoami"))
        .header("x-forwarded-for", "198.51.100.1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unhealthy_dependencies_refuse_traffic() {
    let mut services = in_memory_services(&[]);
    services.probes.push(Arc::new(UnreachableRedis));
    let server = TestServer::serve(services).await;
    let token = mint_jwt(TenantId::new(), &["admin"]);

    let (status, body) = get_json(&reqwest::Client::new(), server.url("/whoami"), &token).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "service_unavailable");
    assert_eq!(body["dependencies"][0]["service"], "redis");
    assert_eq!(body["dependencies"][0]["healthy"], false);
}
