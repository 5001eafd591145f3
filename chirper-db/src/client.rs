use crate::{
    record::{AccountRecord, CredentialsRecord, FullPostRecord, SessionRecord},
    store::{DbError, Result, Store},
};
use async_trait::async_trait;
use chirper_common::{
    model::{
        ChirperSnowflakeGenerator, Id,
        account::{Account, AccountMarker, Credentials, NewAccount, Username},
        post::{Author, NewPost, Post, PostMarker},
        session::{NewSession, Session, SessionTokenHash},
    },
    snowflake::{ProcessId, WorkerId},
    util::utc_to_primitive,
};
use sqlx::{PgConnection, PgPool, postgres::PgPoolOptions, query, query_as};
use std::sync::{Mutex, PoisonError};
use tracing::info;

const USERNAME_UNIQUE_CONSTRAINT: &str = "accounts_username_key";

/// PostgreSQL-backed [`Store`].
pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<ChirperSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator =
            Mutex::new(ChirperSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    pub async fn connect(
        database_url: &str,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new().connect(database_url).await?;
        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    fn next_id<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;

        Ok(Id::new(snowflake))
    }

    async fn insert_session(
        connection: &mut PgConnection,
        account_id: Id<AccountMarker>,
        session: &NewSession,
    ) -> Result<()> {
        query(
            "
            INSERT INTO accounts.sessions
                (token_hash, account_snowflake, created_at, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(session.token_hash.0.as_slice())
        .bind(account_id.as_i64())
        .bind(utc_to_primitive(session.created_at))
        .bind(
            session
                .expires_after
                .map(|expires_after| expires_after.get().whole_seconds()),
        )
        .execute(connection)
        .await
        .map_err(map_missing_account(account_id))?;

        Ok(())
    }
}

fn map_unique_username(err: sqlx::Error) -> DbError {
    match &err {
        sqlx::Error::Database(db_err)
            if db_err.is_unique_violation()
                && db_err.constraint() == Some(USERNAME_UNIQUE_CONSTRAINT) =>
        {
            DbError::DuplicateUsername
        }
        _ => DbError::Sqlx(err),
    }
}

/// Sessions and posts only reference accounts, so any foreign key violation
/// on insert means the account is gone.
fn map_missing_account(account_id: Id<AccountMarker>) -> impl FnOnce(sqlx::Error) -> DbError {
    move |err| match &err {
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            DbError::MissingAccount(account_id)
        }
        _ => DbError::Sqlx(err),
    }
}

#[async_trait]
impl Store for DbClient {
    async fn fetch_account(&self, account_id: Id<AccountMarker>) -> Result<Option<Account>> {
        let record = query_as::<_, AccountRecord>(
            "
            SELECT
                accounts.account_snowflake,
                accounts.username,
                accounts.email,
                accounts.joined_at
            FROM
                accounts.accounts
            WHERE
                accounts.account_snowflake = $1
            ",
        )
        .bind(account_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        let account = record.map(Account::try_from).transpose()?;
        Ok(account)
    }

    async fn fetch_account_by_username(&self, username: &Username) -> Result<Option<Account>> {
        let credentials = self.fetch_credentials(username).await?;
        Ok(credentials.map(|credentials| credentials.account))
    }

    async fn fetch_credentials(&self, username: &Username) -> Result<Option<Credentials>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT
                accounts.account_snowflake,
                accounts.username,
                accounts.email,
                accounts.joined_at,
                accounts.password_hash
            FROM
                accounts.accounts
            WHERE
                accounts.username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(Credentials::try_from).transpose()?;
        Ok(credentials)
    }

    async fn create_account(
        &self,
        account: &NewAccount,
        session: &NewSession,
    ) -> Result<Account> {
        let account_id = self.next_id::<AccountMarker>()?;
        let mut transaction = self.pool.begin().await?;

        query(
            "
            INSERT INTO accounts.accounts
                (account_snowflake, username, email, password_hash, joined_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(account_id.as_i64())
        .bind(account.username.get())
        .bind(account.email.get())
        .bind(account.password_hash.as_str())
        .bind(utc_to_primitive(account.joined_at))
        .execute(&mut *transaction)
        .await
        .map_err(map_unique_username)?;

        Self::insert_session(&mut transaction, account_id, session).await?;
        transaction.commit().await?;

        Ok(Account {
            id: account_id,
            username: account.username.clone(),
            email: account.email.clone(),
            joined_at: account.joined_at,
        })
    }

    async fn delete_account(&self, account_id: Id<AccountMarker>) -> Result<bool> {
        let result = query("DELETE FROM accounts.accounts WHERE account_snowflake = $1")
            .bind(account_id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_session(
        &self,
        account_id: Id<AccountMarker>,
        session: &NewSession,
    ) -> Result<()> {
        let mut connection = self.pool.acquire().await?;
        Self::insert_session(&mut connection, account_id, session).await
    }

    async fn fetch_session(&self, token_hash: &SessionTokenHash) -> Result<Option<Session>> {
        let record = query_as::<_, SessionRecord>(
            "
            SELECT
                sessions.account_snowflake,
                sessions.token_hash,
                sessions.created_at,
                sessions.expires_after_seconds
            FROM
                accounts.sessions
            WHERE
                sessions.token_hash = $1
            ",
        )
        .bind(token_hash.0.as_slice())
        .fetch_optional(&self.pool)
        .await?;

        let session = record.map(Session::try_from).transpose()?;
        Ok(session)
    }

    async fn delete_session(&self, token_hash: &SessionTokenHash) -> Result<bool> {
        let result = query("DELETE FROM accounts.sessions WHERE token_hash = $1")
            .bind(token_hash.0.as_slice())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_posts(&self) -> Result<Vec<Post>> {
        let records = query_as::<_, FullPostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.text,
                posts.created_at,
                accounts.account_snowflake,
                accounts.username
            FROM
                posts.posts NATURAL JOIN accounts.accounts
            ORDER BY
                posts.created_at DESC,
                posts.post_snowflake DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn fetch_account_posts(&self, account_id: Id<AccountMarker>) -> Result<Vec<Post>> {
        let records = query_as::<_, FullPostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.text,
                posts.created_at,
                accounts.account_snowflake,
                accounts.username
            FROM
                posts.posts NATURAL JOIN accounts.accounts
            WHERE
                accounts.account_snowflake = $1
            ORDER BY
                posts.created_at DESC,
                posts.post_snowflake DESC
            ",
        )
        .bind(account_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, FullPostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.text,
                posts.created_at,
                accounts.account_snowflake,
                accounts.username
            FROM
                posts.posts NATURAL JOIN accounts.accounts
            WHERE
                posts.post_snowflake = $1
            ",
        )
        .bind(post_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let post_id = self.next_id::<PostMarker>()?;

        let username: String = sqlx::query_scalar(
            "
            WITH inserted AS (
                INSERT INTO posts.posts (post_snowflake, account_snowflake, text, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING account_snowflake
            )
            SELECT accounts.username
            FROM inserted NATURAL JOIN accounts.accounts
            ",
        )
        .bind(post_id.as_i64())
        .bind(post.author.as_i64())
        .bind(&post.text)
        .bind(utc_to_primitive(post.created_at))
        .fetch_one(&self.pool)
        .await
        .map_err(map_missing_account(post.author))?;

        Ok(Post {
            id: post_id,
            author: Author {
                id: post.author,
                username: Username::new(username).map_err(|err| DbError::Data(err.into()))?,
            },
            text: post.text.clone(),
            created_at: post.created_at,
        })
    }

    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let result = query("DELETE FROM posts.posts WHERE post_snowflake = $1")
            .bind(post_id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
