use crate::store::{DbError, Result, Store};
use async_trait::async_trait;
use chirper_common::{
    model::{
        ChirperSnowflakeGenerator, Id,
        account::{Account, AccountMarker, Credentials, NewAccount, Username},
        post::{Author, NewPost, Post, PostMarker},
        session::{NewSession, Session, SessionTokenHash},
    },
    snowflake::{ProcessId, WorkerId},
};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    sync::{Mutex, PoisonError},
};
use time::UtcDateTime;

struct StoredPost {
    author: Id<AccountMarker>,
    text: String,
    created_at: UtcDateTime,
}

#[derive(Default)]
struct MemoryState {
    accounts: BTreeMap<Id<AccountMarker>, Credentials>,
    sessions: HashMap<SessionTokenHash, Session>,
    posts: BTreeMap<Id<PostMarker>, StoredPost>,
}

impl MemoryState {
    fn account_by_username(&self, username: &Username) -> Option<&Credentials> {
        self.accounts
            .values()
            .find(|credentials| &credentials.account.username == username)
    }

    fn hydrate(&self, id: Id<PostMarker>, post: &StoredPost) -> Option<Post> {
        let author = &self.accounts.get(&post.author)?.account;

        Some(Post {
            id,
            author: Author {
                id: author.id,
                username: author.username.clone(),
            },
            text: post.text.clone(),
            created_at: post.created_at,
        })
    }

    fn posts_newest_first(&self, filter: impl Fn(&StoredPost) -> bool) -> Vec<Post> {
        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|(_, post)| filter(post))
            .filter_map(|(id, post)| self.hydrate(*id, post))
            .collect();
        posts.sort_by_key(|post| Reverse((post.created_at, post.id)));
        posts
    }
}

/// A process-local [`Store`] for development and tests.
///
/// All state lives behind one mutex, which gives the same atomicity the
/// database adapter gets from transactions. Nothing survives a restart.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    snowflake_generator: Mutex<ChirperSnowflakeGenerator>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            snowflake_generator: Mutex::new(ChirperSnowflakeGenerator::new(
                worker_id, process_id,
            )),
        }
    }

    fn next_id<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;

        Ok(Id::new(snowflake))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    #[must_use]
    pub fn account_count(&self) -> usize {
        self.with_state(|state| state.accounts.len())
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.with_state(|state| state.sessions.len())
    }

    #[must_use]
    pub fn post_count(&self) -> usize {
        self.with_state(|state| state.posts.len())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(WorkerId::default(), ProcessId::default())
    }
}

fn new_session(account_id: Id<AccountMarker>, session: &NewSession) -> Session {
    Session {
        account: account_id,
        token_hash: session.token_hash.clone(),
        created_at: session.created_at,
        expires_after: session.expires_after,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_account(&self, account_id: Id<AccountMarker>) -> Result<Option<Account>> {
        Ok(self.with_state(|state| {
            state
                .accounts
                .get(&account_id)
                .map(|credentials| credentials.account.clone())
        }))
    }

    async fn fetch_account_by_username(&self, username: &Username) -> Result<Option<Account>> {
        Ok(self.with_state(|state| {
            state
                .account_by_username(username)
                .map(|credentials| credentials.account.clone())
        }))
    }

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<Credentials>> {
        Ok(self.with_state(|state| state.account_by_username(username).cloned()))
    }

    async fn create_account(
        &self,
        account: &NewAccount,
        session: &NewSession,
    ) -> Result<Account> {
        let account_id = self.next_id()?;

        self.with_state(|state| {
            if state.account_by_username(&account.username).is_some() {
                return Err(DbError::DuplicateUsername);
            }

            let created = Account {
                id: account_id,
                username: account.username.clone(),
                email: account.email.clone(),
                joined_at: account.joined_at,
            };
            state.accounts.insert(
                account_id,
                Credentials {
                    account: created.clone(),
                    password_hash: account.password_hash.clone(),
                },
            );
            state
                .sessions
                .insert(session.token_hash.clone(), new_session(account_id, session));

            Ok(created)
        })
    }

    async fn delete_account(&self, account_id: Id<AccountMarker>) -> Result<bool> {
        Ok(self.with_state(|state| {
            if state.accounts.remove(&account_id).is_none() {
                return false;
            }
            state
                .sessions
                .retain(|_, session| session.account != account_id);
            state.posts.retain(|_, post| post.author != account_id);
            true
        }))
    }

    async fn create_session(
        &self,
        account_id: Id<AccountMarker>,
        session: &NewSession,
    ) -> Result<()> {
        self.with_state(|state| {
            if !state.accounts.contains_key(&account_id) {
                return Err(DbError::MissingAccount(account_id));
            }
            state
                .sessions
                .insert(session.token_hash.clone(), new_session(account_id, session));
            Ok(())
        })
    }

    async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>> {
        Ok(self.with_state(|state| state.sessions.get(token_hash).cloned()))
    }

    async fn delete_session(&self, token_hash: &SessionTokenHash) -> Result<bool> {
        Ok(self.with_state(|state| state.sessions.remove(token_hash).is_some()))
    }

    async fn list_posts(&self) -> Result<Vec<Post>> {
        Ok(self.with_state(|state| state.posts_newest_first(|_| true)))
    }

    async fn fetch_account_posts(&self, account_id: Id<AccountMarker>) -> Result<Vec<Post>> {
        Ok(self.with_state(|state| state.posts_newest_first(|post| post.author == account_id)))
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        Ok(self.with_state(|state| {
            state
                .posts
                .get(&post_id)
                .and_then(|post| state.hydrate(post_id, post))
        }))
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let post_id = self.next_id()?;

        self.with_state(|state| {
            let stored = StoredPost {
                author: post.author,
                text: post.text.clone(),
                created_at: post.created_at,
            };
            let created = state
                .hydrate(post_id, &stored)
                .ok_or(DbError::MissingAccount(post.author))?;
            state.posts.insert(post_id, stored);
            Ok(created)
        })
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        Ok(self.with_state(|state| state.posts.remove(&post_id).is_some()))
    }
}
