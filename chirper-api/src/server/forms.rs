use chirper_common::{
    model::account::{Email, Username},
    password::{PasswordPolicy, is_entirely_numeric},
    validation::{FormErrors, Validator},
};
use serde::{Deserialize, Serialize};

pub const USERNAME: &str = "username";
pub const EMAIL: &str = "email";
pub const PASSWORD: &str = "password";
pub const PASSWORD1: &str = "password1";
pub const PASSWORD2: &str = "password2";
pub const TEXT: &str = "text";

pub const INVALID_USERNAME_MESSAGE: &str = "Enter a valid username. This value may contain only \
    letters, numbers, and @/./+/-/_ characters.";
pub const INVALID_EMAIL_MESSAGE: &str = "Enter a valid email address.";
pub const DUPLICATE_USERNAME_MESSAGE: &str = "A user with that username already exists.";
pub const PASSWORD_MISMATCH_MESSAGE: &str = "The two password fields didn't match.";
pub const NUMERIC_PASSWORD_MESSAGE: &str = "This password is entirely numeric.";
pub const INVALID_LOGIN_MESSAGE: &str = "Please enter a correct username and password. Note \
    that both fields may be case-sensitive.";

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    #[serde(alias = "password")]
    pub password1: String,
    #[serde(alias = "password_confirmation")]
    pub password2: String,
}

impl SignupForm {
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.username = self.username.trim().to_owned();
        self.email = self.email.trim().to_owned();
        self
    }

    pub fn values(&self) -> SignupValues<'_> {
        SignupValues {
            username: &self.username,
            email: &self.email,
        }
    }
}

/// The signup fields that are echoed back. Passwords never are.
#[derive(Clone, Debug, Serialize)]
pub struct SignupValues<'a> {
    pub username: &'a str,
    pub email: &'a str,
}

pub fn signup_validator(policy: PasswordPolicy) -> Validator<SignupForm> {
    Validator::new()
        .required(USERNAME, |form: &SignupForm| form.username.as_str())
        .rule(
            USERNAME,
            |form| form.username.is_empty() || Username::is_valid(&form.username),
            INVALID_USERNAME_MESSAGE,
        )
        .required(EMAIL, |form: &SignupForm| form.email.as_str())
        .rule(
            EMAIL,
            |form| form.email.is_empty() || Email::is_valid(&form.email),
            INVALID_EMAIL_MESSAGE,
        )
        .required(PASSWORD1, |form: &SignupForm| form.password1.as_str())
        .required(PASSWORD2, |form: &SignupForm| form.password2.as_str())
        .rule(
            PASSWORD2,
            |form| {
                form.password1.is_empty()
                    || form.password2.is_empty()
                    || form.password1 == form.password2
            },
            PASSWORD_MISMATCH_MESSAGE,
        )
        .rule(
            PASSWORD2,
            move |form| !checks_password(form) || !policy.is_too_short(&form.password2),
            format!(
                "This password is too short. It must contain at least {} characters.",
                policy.min_length
            ),
        )
        .rule(
            PASSWORD2,
            move |form| {
                !checks_password(form) || !policy.is_too_similar(&form.password2, &form.username)
            },
            "The password is too similar to the username.",
        )
        .rule(
            PASSWORD2,
            move |form| {
                !checks_password(form) || !policy.is_too_similar(&form.password2, &form.email)
            },
            "The password is too similar to the email address.",
        )
        .rule(
            PASSWORD2,
            |form| !checks_password(form) || !is_entirely_numeric(&form.password2),
            NUMERIC_PASSWORD_MESSAGE,
        )
}

/// Strength checks only run once both entries are present and agree.
fn checks_password(form: &SignupForm) -> bool {
    !form.password2.is_empty() && form.password1 == form.password2
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.username = self.username.trim().to_owned();
        self
    }
}

pub fn login_validator() -> Validator<LoginForm> {
    Validator::new()
        .required(USERNAME, |form: &LoginForm| form.username.as_str())
        .required(PASSWORD, |form: &LoginForm| form.password.as_str())
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

impl NextQuery {
    /// The requested redirect, if it stays on this site and fits in a `Location` header.
    pub fn local_path(&self) -> Option<&str> {
        self.next.as_deref().filter(|next| {
            next.starts_with('/')
                && !next.starts_with("//")
                && !next.contains('\\')
                && next.chars().all(|c| c.is_ascii_graphic())
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PostForm {
    pub text: String,
}

impl PostForm {
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.text = self.text.trim().to_owned();
        self
    }
}

pub fn validate_post(form: &PostForm, max_length: usize) -> FormErrors {
    let mut errors = Validator::new()
        .required(TEXT, |form: &PostForm| form.text.as_str())
        .validate(form);

    let length = form.text.chars().count();
    if length > max_length {
        errors.add(
            TEXT,
            format!("Ensure this value has at most {max_length} characters (it has {length})."),
        );
    }
    errors
}
