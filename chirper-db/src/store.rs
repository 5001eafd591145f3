use async_trait::async_trait;
use chirper_common::{
    model::{
        Id, ModelValidationError,
        account::{Account, AccountMarker, Credentials, NewAccount, Username},
        post::{NewPost, Post, PostMarker},
        session::{NewSession, Session, SessionTokenHash},
    },
    snowflake::SnowflakeTimestampError,
};
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("The username is already taken")]
    DuplicateUsername,
    #[error("Account with id {0} does not exist")]
    MissingAccount(Id<AccountMarker>),
    #[error("Could not generate an id: {0}")]
    Snowflake(#[from] SnowflakeTimestampError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persistence for accounts, sessions and posts.
///
/// Implementations enforce username uniqueness and cascade account deletion
/// to the account's sessions and posts. Ownership of posts is not checked
/// here.
#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_account(&self, account_id: Id<AccountMarker>) -> Result<Option<Account>>;

    async fn fetch_account_by_username(&self, username: &Username) -> Result<Option<Account>>;

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<Credentials>>;

    /// Creates the account and its first session atomically.
    ///
    /// Fails with [`DbError::DuplicateUsername`] if the username is taken,
    /// including when a concurrent signup wins the race.
    async fn create_account(&self, account: &NewAccount, session: &NewSession)
    -> Result<Account>;

    /// Returns whether an account was deleted.
    async fn delete_account(&self, account_id: Id<AccountMarker>) -> Result<bool>;

    /// Fails with [`DbError::MissingAccount`] if the account does not exist.
    async fn create_session(
        &self,
        account_id: Id<AccountMarker>,
        session: &NewSession,
    ) -> Result<()>;

    async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>>;

    /// Returns whether a session was deleted.
    async fn delete_session(&self, token_hash: &SessionTokenHash) -> Result<bool>;

    /// All posts, newest first.
    async fn list_posts(&self) -> Result<Vec<Post>>;

    /// Posts of one account, newest first.
    async fn fetch_account_posts(&self, account_id: Id<AccountMarker>) -> Result<Vec<Post>>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    /// Fails with [`DbError::MissingAccount`] if the author does not exist.
    async fn create_post(&self, post: &NewPost) -> Result<Post>;

    /// Returns whether a post was deleted.
    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool>;
}
