use crate::server::{ServerError, ServerState, session};
use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{request::Parts, uri::PathAndQuery},
};
use axum_extra::extract::CookieJar;
use chirper_common::model::{Id, account::AccountMarker};
use time::UtcDateTime;
use tracing::debug;

/// The account behind a valid, unexpired session cookie.
///
/// As a plain extractor it redirects anonymous requests to the login page,
/// remembering the requested path and query. Wrapped in `Option` it never
/// rejects on missing credentials.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AuthenticatedUser {
    id: Id<AccountMarker>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn account_id(self) -> Id<AccountMarker> {
        self.id
    }

    async fn from_session(parts: &Parts, state: &ServerState) -> Result<Option<Self>, ServerError> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(token) = session::read_token(&jar) else {
            return Ok(None);
        };

        let token_hash = state.hasher.hash_token(&token)?;
        let Some(session) = state.store.fetch_session(&token_hash).await? else {
            return Ok(None);
        };

        if session.is_expired_at(UtcDateTime::now()) {
            debug!(account = %session.account, "Discarding expired session");
            state.store.delete_session(&token_hash).await?;
            return Ok(None);
        }

        Ok(Some(Self {
            id: session.account,
        }))
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    ServerState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = ServerState::from_ref(state);

        Self::from_session(parts, &state)
            .await?
            .ok_or_else(|| ServerError::LoginRequired {
                next: parts
                    .uri
                    .path_and_query()
                    .map_or_else(|| parts.uri.path(), PathAndQuery::as_str)
                    .to_owned(),
            })
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    ServerState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let state = ServerState::from_ref(state);
        Self::from_session(parts, &state).await
    }
}
