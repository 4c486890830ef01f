//! End-to-end tests for the access-control pipeline
//!
//! Every request goes through the real router (rate limiter, bearer auth,
//! identity cache, role gate) backed by the in-memory store and cache.

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use socialnet_backend::{
    auth::{models::User, JwtHandler, Password},
    build_router,
    cache::{CacheError, MemoryUserCache, UserCache},
    middleware::RateLimitConfig,
    store::{MemoryStore, NewUser, Storage, StoreResult, UserStore},
    AppState, Config,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const PASSWORD: &str = "correct-horse";

/// Counts primary-key reads so tests can tell cache hits from store reads.
struct CountingUsers {
    inner: Arc<MemoryStore>,
    by_id: AtomicUsize,
}

#[async_trait]
impl UserStore for CountingUsers {
    async fn get_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        self.by_id.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_id(id).await
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.get_by_email(email).await
    }

    async fn create_and_invite(
        &self,
        user: NewUser,
        token_hash: &str,
        invitation_exp: Duration,
    ) -> StoreResult<User> {
        self.inner
            .create_and_invite(user, token_hash, invitation_exp)
            .await
    }

    async fn activate(&self, token_hash: &str) -> StoreResult<()> {
        self.inner.activate(token_hash).await
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.inner.delete(id).await
    }
}

struct CountingCache {
    inner: MemoryUserCache,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

#[async_trait]
impl UserCache for CountingCache {
    async fn get(&self, id: i64) -> Result<Option<User>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }

    async fn set(&self, user: &User) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(user).await
    }
}

struct Harness {
    app: Router,
    memory: Arc<MemoryStore>,
    users: Arc<CountingUsers>,
    cache: Arc<CountingCache>,
    jwt: JwtHandler,
}

impl Harness {
    fn new(config: Config) -> Self {
        let memory = Arc::new(MemoryStore::new());
        let users = Arc::new(CountingUsers {
            inner: memory.clone(),
            by_id: AtomicUsize::new(0),
        });
        let cache = Arc::new(CountingCache {
            inner: MemoryUserCache::new(Duration::from_secs(60)),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
        });
        let storage = Storage {
            users: users.clone(),
            roles: memory.clone(),
            posts: memory.clone(),
        };

        let jwt = JwtHandler::new(&config.auth.token);
        let cache_dyn: Arc<dyn UserCache> = cache.clone();
        let state = AppState::new(config, storage, Some(cache_dyn));

        Self {
            app: build_router(state),
            memory,
            users,
            cache,
            jwt,
        }
    }

    fn user(&self, username: &str, role: &str) -> (User, String) {
        let password = Password::set_with_cost(PASSWORD, 4).unwrap();
        let user = self
            .memory
            .insert_active_user(username, &format!("{username}@example.com"), password, role)
            .unwrap();
        let token = self.jwt.issue_token(user.id, self.jwt.default_ttl()).unwrap();
        (user, token)
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.cache.enabled = true;
    config.auth.bcrypt_cost = 4;
    config.rate_limit = RateLimitConfig {
        enabled: true,
        max_requests: 1_000,
        window: Duration::from_secs(60),
    };
    config
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let peer: SocketAddr = "10.1.2.3:40000".parse().unwrap();
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let mut req = builder.body(body).unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));
    req
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let h = Harness::new(test_config());
    let (alice, _) = h.user("alice", "user");
    let uri = format!("/v1/users/{}", alice.id);

    let response = h.send(request(Method::GET, &uri, None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .send(request(Method::GET, &uri, Some("not.a.jwt"), None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unauthorized");

    // Rejected before identity resolution.
    assert_eq!(h.users.by_id.load(Ordering::SeqCst), 0);
    assert_eq!(h.cache.gets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_token_for_deleted_user_is_unauthorized() {
    let h = Harness::new(test_config());
    let (ghost, token) = h.user("ghost", "user");
    h.memory.delete(ghost.id).await.unwrap();

    let response = h
        .send(request(Method::GET, "/v1/posts/1", Some(&token), None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // A miss is never cached.
    assert_eq!(h.cache.sets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_identity_is_cached_after_first_request() {
    let h = Harness::new(test_config());
    let (alice, token) = h.user("alice", "user");
    let uri = format!("/v1/users/{}", alice.id);

    let response = h.send(request(Method::GET, &uri, Some(&token), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["username"], "alice");
    assert!(body.get("password").is_none());

    // Auth step misses and fills; the handler's own lookup then hits.
    assert_eq!(h.users.by_id.load(Ordering::SeqCst), 1);
    assert_eq!(h.cache.sets.load(Ordering::SeqCst), 1);

    let response = h.send(request(Method::GET, &uri, Some(&token), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.users.by_id.load(Ordering::SeqCst), 1);
    assert_eq!(h.cache.sets.load(Ordering::SeqCst), 1);
    assert_eq!(h.cache.gets.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_disabled_cache_is_never_consulted() {
    let mut config = test_config();
    config.cache.enabled = false;
    let h = Harness::new(config);
    let (alice, token) = h.user("alice", "user");
    let uri = format!("/v1/users/{}", alice.id);

    for _ in 0..2 {
        let response = h.send(request(Method::GET, &uri, Some(&token), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(h.cache.gets.load(Ordering::SeqCst), 0);
    assert_eq!(h.cache.sets.load(Ordering::SeqCst), 0);
    assert_eq!(h.users.by_id.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_unknown_user_lookup_is_not_found_for_authenticated_caller() {
    let h = Harness::new(test_config());
    let (_, token) = h.user("alice", "user");

    let response = h
        .send(request(Method::GET, "/v1/users/9999", Some(&token), None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rate_limit_rejects_with_retry_after() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        enabled: true,
        max_requests: 2,
        window: Duration::from_secs(30),
    };
    let h = Harness::new(config);

    for _ in 0..2 {
        let response = h.send(request(Method::GET, "/v1/health", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = h.send(request(Method::GET, "/v1/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=30).contains(&retry_after));

    // Admission runs before authentication.
    let response = h
        .send(request(Method::GET, "/v1/users/1", None, None))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_disabled_rate_limiter_admits_everything() {
    let mut config = test_config();
    config.rate_limit = RateLimitConfig {
        enabled: false,
        max_requests: 1,
        window: Duration::from_secs(30),
    };
    let h = Harness::new(config);

    for _ in 0..5 {
        let response = h.send(request(Method::GET, "/v1/health", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_post_mutations_respect_ownership_and_roles() {
    let h = Harness::new(test_config());
    let (_, owner_token) = h.user("owner", "user");
    let (_, other_token) = h.user("other", "user");
    let (_, moderator_token) = h.user("mod", "moderator");
    let (_, admin_token) = h.user("root", "admin");

    let response = h
        .send(request(
            Method::POST,
            "/v1/posts",
            Some(&owner_token),
            Some(json!({ "title": "hello", "content": "first post", "tags": ["intro"] })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let post = json_body(response).await;
    let uri = format!("/v1/posts/{}", post["id"]);

    let patch = json!({ "title": "edited" });

    // Plain user, not the owner.
    let response = h
        .send(request(Method::PATCH, &uri, Some(&other_token), Some(patch.clone())))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = h
        .send(request(Method::DELETE, &uri, Some(&other_token), None))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Moderator may edit but not delete.
    let response = h
        .send(request(Method::PATCH, &uri, Some(&moderator_token), Some(patch.clone())))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["title"], "edited");
    let response = h
        .send(request(Method::DELETE, &uri, Some(&moderator_token), None))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Owner passes on ownership alone.
    let response = h
        .send(request(
            Method::PATCH,
            &uri,
            Some(&owner_token),
            Some(json!({ "content": "owner edit" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Admin may delete anyone's post.
    let response = h
        .send(request(Method::DELETE, &uri, Some(&admin_token), None))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = h.send(request(Method::GET, &uri, Some(&owner_token), None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_owner_can_delete_own_post() {
    let h = Harness::new(test_config());
    let (_, token) = h.user("owner", "user");

    let response = h
        .send(request(
            Method::POST,
            "/v1/posts",
            Some(&token),
            Some(json!({ "title": "mine", "content": "body" })),
        ))
        .await;
    let post = json_body(response).await;
    let uri = format!("/v1/posts/{}", post["id"]);

    let response = h.send(request(Method::DELETE, &uri, Some(&token), None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_operator_route_requires_basic_auth() {
    let h = Harness::new(test_config());

    let response = h
        .send(request(Method::GET, "/v1/debug/stats", None, None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

    let mut req = request(Method::GET, "/v1/debug/stats", None, None);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Basic {}", BASE64.encode("admin:wrong")).parse().unwrap(),
    );
    assert_eq!(h.send(req).await.status(), StatusCode::UNAUTHORIZED);

    let mut req = request(Method::GET, "/v1/debug/stats", None, None);
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Basic {}", BASE64.encode("admin:admin")).parse().unwrap(),
    );
    let response = h.send(req).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["cache_enabled"], true);
    assert_eq!(body["rate_limit_enabled"], true);
}

#[tokio::test]
async fn test_register_activate_and_issue_token() {
    let h = Harness::new(test_config());

    let credentials = json!({ "email": "new@example.com", "password": PASSWORD });

    let response = h
        .send(request(
            Method::POST,
            "/v1/authentication/user",
            None,
            Some(json!({
                "username": "newcomer",
                "email": "new@example.com",
                "password": PASSWORD,
            })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let registered = json_body(response).await;
    let activation = registered["token"].as_str().unwrap().to_string();
    assert_eq!(registered["user"]["is_active"], false);

    // Inactive accounts cannot obtain a token.
    let response = h
        .send(request(
            Method::POST,
            "/v1/authentication/token",
            None,
            Some(credentials.clone()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .send(request(
            Method::PUT,
            &format!("/v1/users/activate/{activation}"),
            None,
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Invitations are single-use.
    let response = h
        .send(request(
            Method::PUT,
            &format!("/v1/users/activate/{activation}"),
            None,
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = h
        .send(request(
            Method::POST,
            "/v1/authentication/token",
            None,
            Some(json!({ "email": "new@example.com", "password": "wrong" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .send(request(
            Method::POST,
            "/v1/authentication/token",
            None,
            Some(credentials),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let token = json_body(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let claims = h.jwt.validate_token(&token).unwrap();
    let response = h
        .send(request(
            Method::GET,
            &format!("/v1/users/{}", claims.sub),
            Some(&token),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["username"], "newcomer");
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let h = Harness::new(test_config());
    h.user("taken", "user");

    let response = h
        .send(request(
            Method::POST,
            "/v1/authentication/user",
            None,
            Some(json!({
                "username": "fresh",
                "email": "taken@example.com",
                "password": PASSWORD,
            })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_gate_runs_before_payload_checks() {
    let h = Harness::new(test_config());
    let (_, owner_token) = h.user("owner", "user");
    let (_, other_token) = h.user("other", "user");

    let response = h
        .send(request(
            Method::POST,
            "/v1/posts",
            Some(&owner_token),
            Some(json!({ "title": "hello", "content": "body" })),
        ))
        .await;
    let post = json_body(response).await;
    let uri = format!("/v1/posts/{}", post["id"]);

    let too_long = json!({ "title": "x".repeat(101) });
    let wrong_type = json!({ "title": 5 });

    // A non-owner without the role is refused whatever the body says.
    for body in [too_long.clone(), wrong_type.clone()] {
        let response = h
            .send(request(Method::PATCH, &uri, Some(&other_token), Some(body)))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    // Once authorized, bad bodies are client errors.
    for body in [too_long, wrong_type] {
        let response = h
            .send(request(Method::PATCH, &uri, Some(&owner_token), Some(body)))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // Missing post is reported before anything about the body.
    let response = h
        .send(request(
            Method::PATCH,
            "/v1/posts/9999",
            Some(&other_token),
            Some(json!({ "title": 5 })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_email_and_wrong_password_look_the_same() {
    let h = Harness::new(test_config());
    h.user("alice", "user");

    let unknown = h
        .send(request(
            Method::POST,
            "/v1/authentication/token",
            None,
            Some(json!({ "email": "nobody@example.com", "password": PASSWORD })),
        ))
        .await;
    let wrong = h
        .send(request(
            Method::POST,
            "/v1/authentication/token",
            None,
            Some(json!({ "email": "alice@example.com", "password": "nope" })),
        ))
        .await;

    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(unknown).await, json_body(wrong).await);
}
