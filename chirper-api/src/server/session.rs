use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chirper_common::{
    hashing::{HashError, Hasher},
    model::session::{NewSession, SessionToken},
    util::PositiveDuration,
};
use time::UtcDateTime;

pub const SESSION_COOKIE: &str = "sessionid";

/// A freshly minted session: the row to store and the cookie carrying its token.
pub struct IssuedSession {
    pub new_session: NewSession,
    pub cookie: Cookie<'static>,
}

pub fn issue(hasher: &Hasher, ttl: Option<PositiveDuration>) -> Result<IssuedSession, HashError> {
    let token = SessionToken::generate_random();
    let new_session = NewSession {
        token_hash: hasher.hash_token(&token)?,
        created_at: UtcDateTime::now(),
        expires_after: ttl,
    };

    Ok(IssuedSession {
        new_session,
        cookie: session_cookie(&token, ttl),
    })
}

fn session_cookie(token: &SessionToken, ttl: Option<PositiveDuration>) -> Cookie<'static> {
    let mut builder = Cookie::build((SESSION_COOKIE, token.as_token_str()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/");

    if let Some(ttl) = ttl {
        builder = builder.max_age(ttl.get());
    }

    builder.build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

/// The token from the session cookie. Malformed cookies count as absent.
pub fn read_token(jar: &CookieJar) -> Option<SessionToken> {
    jar.get(SESSION_COOKIE)?.value().parse().ok()
}
