use crate::{
    config::Settings,
    server::{ServerState, routes},
};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Request, StatusCode,
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    },
    response::Response,
};
use async_trait::async_trait;
use chirper_common::{
    hashing::{HashCost, Hasher},
    model::{
        Id,
        account::{Account, AccountMarker, Credentials, NewAccount, Username},
        post::{NewPost, Post, PostMarker},
        session::{NewSession, Session, SessionTokenHash},
    },
};
use chirper_db::{MemoryStore, Result, Store};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const CHEAP_COST: HashCost = HashCost {
    memory_kib: 8,
    iterations: 1,
    parallelism: 1,
};

pub const PASSWORD: &str = "testpassword";

/// The full router over an in-memory store.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub hasher: Arc<Hasher>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::build(settings, |store| store)
    }

    /// Serves through `wrap(store)` while still exposing the inner store.
    pub fn with_store(wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn Store>) -> Self {
        Self::build(Settings::default(), wrap)
    }

    fn build(settings: Settings, wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn Store>) -> Self {
        let store = Arc::new(MemoryStore::default());
        let hasher = Arc::new(Hasher::new(CHEAP_COST).unwrap());
        let state = ServerState {
            store: wrap(store.clone()),
            hasher: hasher.clone(),
            settings: Arc::new(settings),
        };

        Self {
            store,
            hasher,
            router: routes().with_state(state),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::get(uri);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::post(uri).header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        self.send(request.body(Body::from(body.to_owned())).unwrap())
            .await
    }

    /// Signs up with [`PASSWORD`] and returns the session cookie pair.
    pub async fn sign_up(&self, username: &str) -> String {
        let body = format!(
            "username={username}&email={username}%40example.com&password1={PASSWORD}&password2={PASSWORD}"
        );
        let response = self.post_form("/accounts/signup/", &body, None).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        session_cookie(&response).unwrap()
    }

    pub async fn create_post(&self, cookie: &str, text: &str) -> Id<PostMarker> {
        let response = self
            .post_form("/tweets/create/", &format!("text={text}"), Some(cookie))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let id = location(&response)
            .trim_start_matches("/tweets/")
            .trim_end_matches('/')
            .parse::<u64>()
            .unwrap();
        Id::from(id)
    }
}

/// A store where every signup loses to a concurrent one for the same
/// username, after the handler's own availability check has passed.
pub struct SignupRaceStore(pub Arc<MemoryStore>);

#[async_trait]
impl Store for SignupRaceStore {
    async fn fetch_account(&self, account_id: Id<AccountMarker>) -> Result<Option<Account>> {
        self.0.fetch_account(account_id).await
    }

    async fn fetch_account_by_username(&self, username: &Username) -> Result<Option<Account>> {
        self.0.fetch_account_by_username(username).await
    }

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<Credentials>> {
        self.0.fetch_credentials(username).await
    }

    async fn create_account(
        &self,
        account: &NewAccount,
        session: &NewSession,
    ) -> Result<Account> {
        let winner = NewSession {
            token_hash: SessionTokenHash(Box::new([0; 32])),
            ..session.clone()
        };
        self.0.create_account(account, &winner).await?;
        self.0.create_account(account, session).await
    }

    async fn delete_account(&self, account_id: Id<AccountMarker>) -> Result<bool> {
        self.0.delete_account(account_id).await
    }

    async fn create_session(
        &self,
        account_id: Id<AccountMarker>,
        session: &NewSession,
    ) -> Result<()> {
        self.0.create_session(account_id, session).await
    }

    async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>> {
        self.0.fetch_session(token_hash).await
    }

    async fn delete_session(&self, token_hash: &SessionTokenHash) -> Result<bool> {
        self.0.delete_session(token_hash).await
    }

    async fn list_posts(&self) -> Result<Vec<Post>> {
        self.0.list_posts().await
    }

    async fn fetch_account_posts(&self, account_id: Id<AccountMarker>) -> Result<Vec<Post>> {
        self.0.fetch_account_posts(account_id).await
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        self.0.fetch_post(post_id).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        self.0.create_post(post).await
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        self.0.delete_post(post_id).await
    }
}

/// `sessionid=<token>` from a `Set-Cookie` header that sets a non-empty session.
pub fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .find(|pair| pair.starts_with("sessionid=") && *pair != "sessionid=")
        .map(str::to_owned)
}

pub fn location(response: &Response) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}

/// The `{"view", "context"}` document of a rendered page.
pub async fn page(response: Response) -> Value {
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
