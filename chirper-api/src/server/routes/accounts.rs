use crate::server::{
    Result, ServerError, ServerRouter, ServerState,
    auth::AuthenticatedUser,
    extract::{Form, Query},
    forms::{
        DUPLICATE_USERNAME_MESSAGE, INVALID_LOGIN_MESSAGE, LoginForm, NextQuery, SignupForm,
        SignupValues, USERNAME, login_validator, signup_validator,
    },
    page::{AccountView, Found, FormView, Page, PostView},
    session,
};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::{
    extract::CookieJar,
    routing::{RouterExt, TypedPath},
};
use chirper_common::{
    model::account::{Account, Email, NewAccount, Username},
    validation::FormErrors,
};
use chirper_db::DbError;
use serde::{Deserialize, Serialize};
use time::UtcDateTime;
use tracing::{debug, info};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(signup_page)
        .typed_post(signup)
        .typed_get(login_page)
        .typed_post(login)
        .typed_post(logout)
        .typed_get(profile)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/accounts/signup/", rejection(ServerError))]
pub struct SignupPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/accounts/login/", rejection(ServerError))]
pub struct LoginPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/accounts/logout/", rejection(ServerError))]
pub struct LogoutPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{username}/", rejection(ServerError))]
pub struct ProfilePath {
    pub username: Username,
}

#[derive(Clone, Debug, Serialize)]
struct SignupContext<'a> {
    form: FormView<SignupValues<'a>>,
}

fn signup_form_page(form: &SignupForm, errors: FormErrors) -> Response {
    Page::new(
        "accounts/signup",
        SignupContext {
            form: FormView {
                values: form.values(),
                errors,
            },
        },
    )
    .into_response()
}

async fn signup_page(SignupPath(): SignupPath) -> Response {
    signup_form_page(&SignupForm::default(), FormErrors::new())
}

/// Creates the account and logs it in with a fresh session in one step.
async fn signup(
    SignupPath(): SignupPath,
    State(state): State<ServerState>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response> {
    let form = form.normalized();
    let mut errors = signup_validator(state.settings.password_policy).validate(&form);

    let username = Username::new(form.username.clone());
    if let Ok(username) = &username
        && state.store.fetch_account_by_username(username).await?.is_some()
    {
        errors.add(USERNAME, DUPLICATE_USERNAME_MESSAGE);
    }

    let email = Email::new(form.email.clone());
    let (Ok(username), Ok(email), true) = (username, email, errors.is_empty()) else {
        return Ok(signup_form_page(&form, errors));
    };

    let new_account = NewAccount {
        username,
        email,
        password_hash: state.hasher.hash_password(&form.password1)?,
        joined_at: UtcDateTime::now(),
    };
    let issued = session::issue(&state.hasher, state.settings.session_ttl)?;

    let account = match state
        .store
        .create_account(&new_account, &issued.new_session)
        .await
    {
        Ok(account) => account,
        Err(DbError::DuplicateUsername) => {
            errors.add(USERNAME, DUPLICATE_USERNAME_MESSAGE);
            return Ok(signup_form_page(&form, errors));
        }
        Err(err) => return Err(err.into()),
    };

    info!(account = %account.id, username = %account.username, "Account created");

    Ok((
        jar.add(issued.cookie),
        Found::to(state.settings.login_redirect_url.as_str()),
    )
        .into_response())
}

#[derive(Clone, Debug, Serialize)]
struct LoginContext<'a> {
    form: FormView<LoginValues<'a>>,
    next: Option<&'a str>,
}

#[derive(Clone, Debug, Serialize)]
struct LoginValues<'a> {
    username: &'a str,
}

fn login_form_page(form: &LoginForm, next: &NextQuery, errors: FormErrors) -> Response {
    Page::new(
        "accounts/login",
        LoginContext {
            form: FormView {
                values: LoginValues {
                    username: &form.username,
                },
                errors,
            },
            next: next.local_path(),
        },
    )
    .into_response()
}

async fn login_page(LoginPath(): LoginPath, Query(next): Query<NextQuery>) -> Response {
    login_form_page(&LoginForm::default(), &next, FormErrors::new())
}

async fn login(
    LoginPath(): LoginPath,
    State(state): State<ServerState>,
    jar: CookieJar,
    Query(next): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let form = form.normalized();
    let mut errors = login_validator().validate(&form);
    if !errors.is_empty() {
        return Ok(login_form_page(&form, &next, errors));
    }

    let Some(account) = check_credentials(&state, &form).await? else {
        debug!(username = %form.username, "Login failed");
        errors.add_non_field(INVALID_LOGIN_MESSAGE);
        return Ok(login_form_page(&form, &next, errors));
    };

    let issued = session::issue(&state.hasher, state.settings.session_ttl)?;
    state
        .store
        .create_session(account.id, &issued.new_session)
        .await?;

    info!(account = %account.id, "Logged in");

    let target = next
        .local_path()
        .unwrap_or(state.settings.login_redirect_url.as_str());
    Ok((jar.add(issued.cookie), Found::to(target)).into_response())
}

/// The account for a username and password, if they match.
///
/// Unknown usernames still pay for one password hash, so both failure modes
/// take about as long.
async fn check_credentials(state: &ServerState, form: &LoginForm) -> Result<Option<Account>> {
    let credentials = match Username::new(form.username.clone()) {
        Ok(username) => state.store.fetch_credentials(&username).await?,
        Err(_) => None,
    };

    let Some(credentials) = credentials else {
        state.hasher.hash_password(&form.password)?;
        return Ok(None);
    };

    if state
        .hasher
        .verify_password(&form.password, &credentials.password_hash)
    {
        Ok(Some(credentials.account))
    } else {
        Ok(None)
    }
}

/// Ends the current session, if any. Always succeeds.
async fn logout(
    LogoutPath(): LogoutPath,
    State(state): State<ServerState>,
    jar: CookieJar,
) -> Result<Response> {
    if let Some(token) = session::read_token(&jar) {
        let token_hash = state.hasher.hash_token(&token)?;
        if state.store.delete_session(&token_hash).await? {
            info!("Logged out");
        }
    }

    Ok((
        jar.remove(session::removal_cookie()),
        Found::to(state.settings.logout_redirect_url.as_str()),
    )
        .into_response())
}

#[derive(Clone, Debug, Serialize)]
struct ProfileContext<'a> {
    account: AccountView<'a>,
    posts: Vec<PostView<'a>>,
    is_own_profile: bool,
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    State(state): State<ServerState>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let account = state
        .store
        .fetch_account_by_username(&username)
        .await?
        .ok_or(ServerError::AccountByUsernameNotFound(username))?;
    let posts = state.store.fetch_account_posts(account.id).await?;

    Ok(Page::new(
        "accounts/profile",
        ProfileContext {
            account: AccountView::from(&account),
            posts: posts.iter().map(PostView::from).collect(),
            is_own_profile: account.id == user.account_id(),
        },
    )
    .into_response())
}

#[cfg(test)]
mod tests {
    use crate::{
        config::Settings,
        server::test_support::{
            PASSWORD, SignupRaceStore, TestApp, location, page, session_cookie,
        },
    };
    use axum::http::{StatusCode, header::SET_COOKIE};
    use chirper_common::{
        model::{account::Username, session::{NewSession, SessionToken}},
        util::PositiveDuration,
    };
    use chirper_db::Store;
    use std::sync::Arc;
    use time::{Duration, UtcDateTime};

    const REQUIRED: &str = "This field is required.";

    #[tokio::test]
    async fn signup_creates_account_and_session() {
        let app = TestApp::new();
        let response = app
            .post_form(
                "/accounts/signup/",
                "username=testuser&email=test%40test.com&password1=testpassword&password2=testpassword",
                None,
            )
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/tweets/home/");

        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        assert!(set_cookie.contains("Path=/"));

        let cookie = session_cookie(&response).unwrap();
        assert_eq!(app.store.account_count(), 1);
        assert_eq!(app.store.session_count(), 1);

        let home = app.get("/tweets/home/", Some(&cookie)).await;
        assert_eq!(page(home).await["context"]["user"]["username"], "testuser");
    }

    #[tokio::test]
    async fn signup_accepts_password_aliases() {
        let app = TestApp::new();
        let response = app
            .post_form(
                "/accounts/signup/",
                "username=testuser&email=test%40test.com&password=testpassword&password_confirmation=testpassword",
                None,
            )
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(app.store.account_count(), 1);
    }

    #[tokio::test]
    async fn empty_signup_reports_required_fields() {
        let app = TestApp::new();
        let response = app
            .post_form("/accounts/signup/", "username=&email=&password1=&password2=", None)
            .await;

        let document = page(response).await;
        assert_eq!(document["view"], "accounts/signup");
        let errors = &document["context"]["form"]["errors"];
        for field in ["username", "email", "password1", "password2"] {
            assert_eq!(errors[field][0], REQUIRED, "{field}");
        }
        assert_eq!(app.store.account_count(), 0);
        assert_eq!(app.store.session_count(), 0);
    }

    #[tokio::test]
    async fn failed_signup_echoes_values_but_not_passwords() {
        let app = TestApp::new();
        let response = app
            .post_form(
                "/accounts/signup/",
                "username=+testuser+&email=invalid-email&password1=testpassword&password2=testpassword",
                None,
            )
            .await;

        let document = page(response).await;
        let form = &document["context"]["form"];
        assert_eq!(form["values"]["username"], "testuser");
        assert_eq!(form["values"]["email"], "invalid-email");
        assert!(form["values"].get("password1").is_none());
        assert_eq!(form["errors"]["email"][0], "Enter a valid email address.");
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let app = TestApp::new();
        app.sign_up("testuser").await;

        let response = app
            .post_form(
                "/accounts/signup/",
                "username=testuser&email=other%40test.com&password1=testpassword&password2=testpassword",
                None,
            )
            .await;

        let document = page(response).await;
        assert_eq!(
            document["context"]["form"]["errors"]["username"][0],
            "A user with that username already exists."
        );
        assert_eq!(app.store.account_count(), 1);
    }

    #[tokio::test]
    async fn signup_losing_a_race_reports_duplicate_username() {
        let app = TestApp::with_store(|store| Arc::new(SignupRaceStore(store)));

        let response = app
            .post_form(
                "/accounts/signup/",
                "username=testuser&email=test%40test.com&password1=testpassword&password2=testpassword",
                None,
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(session_cookie(&response).is_none());

        let document = page(response).await;
        assert_eq!(
            document["context"]["form"]["errors"]["username"][0],
            "A user with that username already exists."
        );
        assert_eq!(document["context"]["form"]["values"]["username"], "testuser");
        assert_eq!(app.store.account_count(), 1);
        assert_eq!(app.store.session_count(), 1);
    }

    #[tokio::test]
    async fn weak_passwords_are_rejected() {
        let app = TestApp::new();
        let cases = [
            ("short", "short", "This password is too short. It must contain at least 8 characters."),
            ("8675309123", "8675309123", "This password is entirely numeric."),
            ("testpassword", "otherpassword", "The two password fields didn't match."),
        ];

        for (password1, password2, message) in cases {
            let body = format!(
                "username=testuser&email=test%40test.com&password1={password1}&password2={password2}"
            );
            let document = page(app.post_form("/accounts/signup/", &body, None).await).await;
            let errors = document["context"]["form"]["errors"]["password2"].as_array().unwrap();
            assert!(errors.iter().any(|error| error == message), "{errors:?}");
        }

        let document = page(
            app.post_form(
                "/accounts/signup/",
                "username=user1&email=test%40test.com&password1=user1pass&password2=user1pass",
                None,
            )
            .await,
        )
        .await;
        assert_eq!(
            document["context"]["form"]["errors"]["password2"][0],
            "The password is too similar to the username."
        );

        assert_eq!(app.store.account_count(), 0);
    }

    #[tokio::test]
    async fn login_starts_a_session() {
        let app = TestApp::new();
        app.sign_up("testuser").await;

        let response = app
            .post_form(
                "/accounts/login/",
                &format!("username=testuser&password={PASSWORD}"),
                None,
            )
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/tweets/home/");
        assert!(session_cookie(&response).is_some());
        assert_eq!(app.store.session_count(), 2);
    }

    #[tokio::test]
    async fn login_follows_local_next_only() {
        let app = TestApp::new();
        app.sign_up("testuser").await;
        let body = format!("username=testuser&password={PASSWORD}");

        let response = app
            .post_form("/accounts/login/?next=/tweets/create/", &body, None)
            .await;
        assert_eq!(location(&response), "/tweets/create/");

        let response = app
            .post_form("/accounts/login/?next=%2Ftweets%2Fcreate%2F%3Fdraft%3D1", &body, None)
            .await;
        assert_eq!(location(&response), "/tweets/create/?draft=1");

        for next in ["//evil.example/", "/x%0Ay", "/x%0D%0ASet-Cookie:a=b"] {
            let response = app
                .post_form(&format!("/accounts/login/?next={next}"), &body, None)
                .await;
            assert_eq!(response.status(), StatusCode::FOUND, "{next}");
            assert_eq!(location(&response), "/tweets/home/", "{next}");
            assert!(session_cookie(&response).is_some(), "{next}");
        }
    }

    #[tokio::test]
    async fn bad_credentials_get_a_generic_error() {
        let app = TestApp::new();
        app.sign_up("testuser").await;

        for body in [
            "username=nobody&password=testpassword",
            "username=testuser&password=wrongpassword",
            "username=TestUser&password=testpassword",
        ] {
            let response = app.post_form("/accounts/login/", body, None).await;
            assert!(session_cookie(&response).is_none());

            let document = page(response).await;
            assert_eq!(
                document["context"]["form"]["errors"]["__all__"][0],
                "Please enter a correct username and password. Note that both fields may be \
                 case-sensitive."
            );
        }
        assert_eq!(app.store.session_count(), 1);
    }

    #[tokio::test]
    async fn empty_login_reports_required_fields() {
        let app = TestApp::new();
        let document = page(app.post_form("/accounts/login/", "", None).await).await;

        let errors = &document["context"]["form"]["errors"];
        assert_eq!(errors["username"][0], REQUIRED);
        assert_eq!(errors["password"][0], REQUIRED);
        assert!(errors.get("__all__").is_none());
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let app = TestApp::new();
        let cookie = app.sign_up("testuser").await;

        let response = app.post_form("/accounts/logout/", "", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/accounts/login/");
        assert!(session_cookie(&response).is_none());
        assert_eq!(app.store.session_count(), 0);

        let response = app.get("/tweets/home/", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/accounts/login/?next=%2Ftweets%2Fhome%2F");
    }

    #[tokio::test]
    async fn logout_without_session_is_harmless() {
        let app = TestApp::new();

        let response = app.post_form("/accounts/logout/", "", None).await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let response = app
            .post_form("/accounts/logout/", "", Some("sessionid=garbage"))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn expired_sessions_are_discarded() {
        let app = TestApp::new();
        app.sign_up("testuser").await;
        let account = app
            .store
            .fetch_account_by_username(&Username::new("testuser".to_owned()).unwrap())
            .await
            .unwrap()
            .unwrap();

        let token = SessionToken::generate_random();
        let session = NewSession {
            token_hash: app.hasher.hash_token(&token).unwrap(),
            created_at: UtcDateTime::now() - Duration::days(2),
            expires_after: PositiveDuration::from_seconds(60),
        };
        app.store.create_session(account.id, &session).await.unwrap();
        assert_eq!(app.store.session_count(), 2);

        let cookie = format!("sessionid={}", token.as_token_str());
        let response = app.get("/tweets/home/", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(app.store.session_count(), 1);
    }

    #[tokio::test]
    async fn sessions_without_lifetime_set_no_max_age() {
        let app = TestApp::with_settings(Settings {
            session_ttl: None,
            ..Settings::default()
        });

        let response = app
            .post_form(
                "/accounts/signup/",
                "username=testuser&email=test%40test.com&password1=testpassword&password2=testpassword",
                None,
            )
            .await;
        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(!set_cookie.contains("Max-Age"));
    }

    #[tokio::test]
    async fn profile_shows_account_and_posts() {
        let app = TestApp::new();
        let alice = app.sign_up("alice").await;
        let bob = app.sign_up("bob").await;
        app.create_post(&alice, "first").await;
        app.create_post(&bob, "unrelated").await;
        app.create_post(&alice, "second").await;

        let document = page(app.get("/users/alice/", Some(&bob)).await).await;
        let context = &document["context"];
        assert_eq!(document["view"], "accounts/profile");
        assert_eq!(context["account"]["username"], "alice");
        assert!(context["account"].get("email").is_none());
        assert_eq!(context["is_own_profile"], false);

        let texts: Vec<_> = context["posts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|post| post["text"].as_str().unwrap())
            .collect();
        assert_eq!(texts, ["second", "first"]);
    }

    #[tokio::test]
    async fn profile_requires_login_and_existing_account() {
        let app = TestApp::new();
        let cookie = app.sign_up("alice").await;

        let response = app.get("/users/alice/", None).await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let response = app.get("/users/nobody/", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
