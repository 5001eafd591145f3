use crate::server::extract::Json;
use axum::{
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use chirper_common::{
    model::{
        Id,
        account::{Account, AccountMarker, Username},
        post::{Post, PostMarker},
    },
    util::utc_to_offset,
    validation::FormErrors,
};
use serde::Serialize;
use time::OffsetDateTime;
use url::form_urlencoded::byte_serialize;

/// A rendered page: the view name and the context it is rendered with.
#[derive(Clone, Debug, Serialize)]
pub struct Page<C> {
    view: &'static str,
    context: C,
}

impl<C: Serialize> Page<C> {
    pub fn new(view: &'static str, context: C) -> Self {
        Self { view, context }
    }
}

impl<C: Serialize> IntoResponse for Page<C> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// `302 Found` to a local path.
#[derive(Clone, Debug)]
pub struct Found(String);

impl Found {
    pub fn to(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn to_login(login_path: &str, next: &str) -> Self {
        let next: String = byte_serialize(next.as_bytes()).collect();
        Self(format!("{login_path}?next={next}"))
    }
}

impl IntoResponse for Found {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, [(LOCATION, self.0)]).into_response()
    }
}

/// Submitted values echoed back next to their errors.
#[derive(Clone, Debug, Serialize)]
pub struct FormView<V> {
    pub values: V,
    pub errors: FormErrors,
}

#[derive(Clone, Debug, Serialize)]
pub struct AccountView<'a> {
    pub id: Id<AccountMarker>,
    pub username: &'a Username,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

impl<'a> From<&'a Account> for AccountView<'a> {
    fn from(account: &'a Account) -> Self {
        Self {
            id: account.id,
            username: &account.username,
            joined_at: utc_to_offset(account.joined_at),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AuthorView<'a> {
    pub id: Id<AccountMarker>,
    pub username: &'a Username,
}

#[derive(Clone, Debug, Serialize)]
pub struct PostView<'a> {
    pub id: Id<PostMarker>,
    pub author: AuthorView<'a>,
    pub text: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl<'a> From<&'a Post> for PostView<'a> {
    fn from(post: &'a Post) -> Self {
        Self {
            id: post.id,
            author: AuthorView {
                id: post.author.id,
                username: &post.author.username,
            },
            text: &post.text,
            created_at: utc_to_offset(post.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::server::page::Found;
    use axum::{
        http::{StatusCode, header::LOCATION},
        response::IntoResponse,
    };
    use rstest::rstest;

    #[test]
    fn found_redirects_to_login_with_next() {
        let response = Found::to_login("/accounts/login/", "/tweets/create/").into_response();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[LOCATION],
            "/accounts/login/?next=%2Ftweets%2Fcreate%2F"
        );
    }

    #[rstest]
    #[case("/tweets/create/?draft=1&x=y", "%2Ftweets%2Fcreate%2F%3Fdraft%3D1%26x%3Dy")]
    #[case("/users/a+b@c/", "%2Fusers%2Fa%2Bb%40c%2F")]
    #[case("/\u{fc}", "%2F%C3%BC")]
    fn next_is_a_single_query_value(#[case] next: &str, #[case] encoded: &str) {
        let response = Found::to_login("/accounts/login/", next).into_response();

        assert_eq!(
            response.headers()[LOCATION],
            format!("/accounts/login/?next={encoded}").as_str()
        );
    }
}
