use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use marquee_api::app::services::AppServices;
use marquee_auth::{JwtClaims, Role, TenantMembership};
use marquee_core::{CampaignId, ContentId, CopyId, MarketingPackId, TenantId, UserId};
use marquee_infra::{CampaignRecord, ContentRecord, InMemoryAuditSink, InMemoryCatalog, MarketingPackRecord};
use marquee_publishing::{CopyFormat, CopyVariant};

const JWT_SECRET: &str = "test-secret";
const MEDIA_URL: &str = "https://cdn.example.com/launch.png";

struct Fixture {
    tenant_id: TenantId,
    campaign_id: CampaignId,
    pack_id: MarketingPackId,
}

fn seed_catalog() -> (Arc<InMemoryCatalog>, Fixture) {
    let tenant_id = TenantId::new();
    let campaign_id = CampaignId::new();
    let pack_id = MarketingPackId::new();
    let content_id = ContentId::new();

    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.put_campaign(CampaignRecord {
        id: campaign_id,
        tenant_id,
        name: "Spring launch".to_string(),
        archived: false,
    });
    catalog.put_pack(MarketingPackRecord {
        id: pack_id,
        tenant_id,
        campaign_id,
        content_id: Some(content_id),
        asset_prompt_id: None,
    });
    catalog.put_content(ContentRecord {
        id: content_id,
        tenant_id,
        media_url: Some(MEDIA_URL.to_string()),
    });
    for (format, text) in [
        (CopyFormat::Long, "A long story about the spring collection."),
        (CopyFormat::Short, "Spring is here."),
    ] {
        catalog.put_copy(
            tenant_id,
            CopyVariant {
                id: CopyId::new(),
                pack_id,
                format,
                text: text.to_string(),
                hashtags: vec!["#spring".to_string()],
            },
        );
    }

    (
        catalog,
        Fixture {
            tenant_id,
            campaign_id,
            pack_id,
        },
    )
}

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    audit: Arc<InMemoryAuditSink>,
    fixture: Fixture,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let (catalog, fixture) = seed_catalog();
        let audit = Arc::new(InMemoryAuditSink::new());
        let services = Arc::new(AppServices::in_memory(catalog, audit.clone()));

        // Same router as prod, bound to an ephemeral port.
        let app = marquee_api::app::build_app(services.clone(), JWT_SECRET);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            audit,
            fixture,
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

fn mint_jwt(tenant_id: TenantId, user_id: UserId, roles: &[&'static str]) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: user_id,
        tenant_id,
        roles: roles.iter().map(|r| Role::new(*r)).collect(),
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn create_job(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    channel: &str,
) -> reqwest::Response {
    client
        .post(srv.url("/publishing/jobs"))
        .bearer_auth(token)
        .json(&json!({
            "campaignId": srv.fixture.campaign_id,
            "marketingPackId": srv.fixture.pack_id,
            "channel": channel,
        }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/publishing/stats"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let user = UserId::new();
    let token = mint_jwt(srv.fixture.tenant_id, user, &["admin"]);

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), srv.fixture.tenant_id.to_string());
    assert_eq!(body["user_id"].as_str().unwrap(), user.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn approval_flow_build_process_download_approve() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = UserId::new();
    let token = mint_jwt(srv.fixture.tenant_id, admin, &["admin"]);

    let res = create_job(&client, &srv, &token, "Instagram").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let job: serde_json::Value = res.json().await.unwrap();
    let job_id = job["id"].as_str().unwrap().to_string();
    assert_eq!(job["status"], "Pending");
    assert_eq!(job["copyText"], "Spring is here.");
    assert_eq!(job["mediaUrl"], MEDIA_URL);

    let res = client
        .get(srv.url("/publishing/jobs/pending"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let pending: serde_json::Value = res.json().await.unwrap();
    assert_eq!(pending["jobIds"], json!([job_id]));

    let res = client
        .post(srv.url(&format!("/publishing/jobs/{job_id}/process")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let processed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(processed["outcome"], "finished");
    assert_eq!(processed["job"]["status"], "RequiresApproval");

    let res = client
        .get(srv.url(&format!("/publishing/jobs/{job_id}/package")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()[reqwest::header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment")
    );
    let package: serde_json::Value = res.json().await.unwrap();
    assert_eq!(package["copy"], "Spring is here.");
    assert_eq!(package["mediaUrls"], json!([MEDIA_URL]));

    let res = client
        .post(srv.url(&format!("/publishing/jobs/{job_id}/approve")))
        .bearer_auth(&token)
        .json(&json!({
            "publishedUrl": "https://instagram.com/p/abc",
            "externalPostId": "abc",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let approved: serde_json::Value = res.json().await.unwrap();
    assert_eq!(approved["approved"], true);

    let res = client
        .get(srv.url(&format!("/publishing/jobs/{job_id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let job: serde_json::Value = res.json().await.unwrap();
    assert_eq!(job["status"], "Success");
    assert_eq!(job["approvedBy"].as_str().unwrap(), admin.to_string());
    assert_eq!(job["publishedUrl"], "https://instagram.com/p/abc");

    let actions = srv.audit.actions_for(&job_id);
    assert_eq!(actions.len(), 3);

    let res = client
        .get(srv.url("/publishing/stats"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let stats: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stats["success"], 1);
    assert_eq!(stats["pending"], 0);
}

#[tokio::test]
async fn approving_a_pending_job_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(srv.fixture.tenant_id, UserId::new(), &["admin"]);

    let job: serde_json::Value = create_job(&client, &srv, &token, "Facebook").await.json().await.unwrap();
    let job_id = job["id"].as_str().unwrap();

    let res = client
        .post(srv.url(&format!("/publishing/jobs/{job_id}/approve")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_state");

    let res = client
        .get(srv.url(&format!("/publishing/jobs/{job_id}/package")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_tenants_cannot_see_or_build_from_foreign_data() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let owner = mint_jwt(srv.fixture.tenant_id, UserId::new(), &["admin"]);
    let outsider = mint_jwt(TenantId::new(), UserId::new(), &["admin"]);

    let job: serde_json::Value = create_job(&client, &srv, &owner, "Instagram").await.json().await.unwrap();
    let job_id = job["id"].as_str().unwrap();

    let res = client
        .get(srv.url(&format!("/publishing/jobs/{job_id}")))
        .bearer_auth(&outsider)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(srv.url(&format!("/publishing/jobs/{job_id}/approve")))
        .bearer_auth(&outsider)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // The campaign belongs to the first tenant, so the lookup fails and nothing is created.
    let res = create_job(&client, &srv, &outsider, "Instagram").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/publishing/jobs/pending"))
        .bearer_auth(&outsider)
        .send()
        .await
        .unwrap();
    let pending: serde_json::Value = res.json().await.unwrap();
    assert_eq!(pending["jobIds"], json!([]));
}

#[tokio::test]
async fn roles_gate_each_operation() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let marketer = mint_jwt(srv.fixture.tenant_id, UserId::new(), &["marketer"]);
    let viewer = mint_jwt(srv.fixture.tenant_id, UserId::new(), &["guest"]);

    let res = create_job(&client, &srv, &viewer, "Instagram").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = create_job(&client, &srv, &marketer, "Instagram").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let job: serde_json::Value = res.json().await.unwrap();
    let job_id = job["id"].as_str().unwrap();

    let res = client
        .post(srv.url(&format!("/publishing/jobs/{job_id}/process")))
        .bearer_auth(&marketer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = client
        .post(srv.url(&format!("/publishing/jobs/{job_id}/approve")))
        .bearer_auth(&marketer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn seeded_membership_overrides_token_roles() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let user = UserId::new();
    srv.services.directory.grant(TenantMembership::with_roles(
        srv.fixture.tenant_id,
        user,
        vec![Role::new("approver")],
    ));
    let token = mint_jwt(srv.fixture.tenant_id, user, &["admin"]);

    let res = create_job(&client, &srv, &token, "Instagram").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(srv.fixture.tenant_id, UserId::new(), &["admin"]);

    let res = create_job(&client, &srv, &token, "   ").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/publishing/jobs/not-a-uuid"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/publishing/jobs?status=Archived"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/publishing/jobs/release-stale"))
        .bearer_auth(&token)
        .json(&json!({ "olderThanSecs": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deactivated_campaign_jobs_leave_the_queue() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(srv.fixture.tenant_id, UserId::new(), &["admin"]);

    for _ in 0..2 {
        let res = create_job(&client, &srv, &token, "Instagram").await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = client
        .post(srv.url(&format!(
            "/publishing/campaigns/{}/deactivate-jobs",
            srv.fixture.campaign_id
        )))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["deactivated"], 2);

    let res = client
        .get(srv.url("/publishing/jobs/pending"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let pending: serde_json::Value = res.json().await.unwrap();
    assert_eq!(pending["jobIds"], json!([]));

    let res = client
        .post(srv.url("/publishing/jobs/process-pending"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["awaitingApproval"], 0);
}
