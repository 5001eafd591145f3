use crate::server::{
    Result, ServerError, ServerRouter, ServerState,
    auth::AuthenticatedUser,
    extract::Form,
    forms::{PostForm, validate_post},
    page::{AccountView, Found, FormView, Page, PostView},
};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use chirper_common::{
    model::{
        Id,
        post::{NewPost, Post, PostMarker},
    },
    validation::FormErrors,
};
use serde::{Deserialize, Serialize};
use time::UtcDateTime;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(home)
        .typed_get(create_post_page)
        .typed_post(create_post)
        .typed_get(post_detail)
        .typed_get(delete_post_page)
        .typed_post(delete_post)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/tweets/home/", rejection(ServerError))]
pub struct HomePath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/tweets/create/", rejection(ServerError))]
pub struct CreatePostPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/tweets/{id}/", rejection(ServerError))]
pub struct PostPath {
    pub id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/tweets/{id}/delete/", rejection(ServerError))]
pub struct DeletePostPath {
    pub id: Id<PostMarker>,
}

#[derive(Clone, Debug, Serialize)]
struct HomeContext<'a> {
    user: AccountView<'a>,
    posts: Vec<PostView<'a>>,
}

/// Every post, newest first.
async fn home(
    HomePath(): HomePath,
    State(state): State<ServerState>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let account = state
        .store
        .fetch_account(user.account_id())
        .await?
        .ok_or_else(|| ServerError::LoginRequired {
            next: HomePath().to_string(),
        })?;
    let posts = state.store.list_posts().await?;

    Ok(Page::new(
        "tweets/home",
        HomeContext {
            user: AccountView::from(&account),
            posts: posts.iter().map(PostView::from).collect(),
        },
    )
    .into_response())
}

#[derive(Clone, Debug, Serialize)]
struct CreatePostContext<'a> {
    form: FormView<&'a PostForm>,
    max_length: usize,
}

fn create_post_form_page(form: &PostForm, errors: FormErrors, max_length: usize) -> Response {
    Page::new(
        "tweets/create",
        CreatePostContext {
            form: FormView {
                values: form,
                errors,
            },
            max_length,
        },
    )
    .into_response()
}

async fn create_post_page(
    CreatePostPath(): CreatePostPath,
    State(state): State<ServerState>,
    _user: AuthenticatedUser,
) -> Response {
    create_post_form_page(
        &PostForm::default(),
        FormErrors::new(),
        state.settings.post_max_length,
    )
}

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(state): State<ServerState>,
    user: AuthenticatedUser,
    Form(form): Form<PostForm>,
) -> Result<Response> {
    let form = form.normalized();
    let max_length = state.settings.post_max_length;
    let errors = validate_post(&form, max_length);
    if !errors.is_empty() {
        return Ok(create_post_form_page(&form, errors, max_length));
    }

    let post = state
        .store
        .create_post(&NewPost {
            author: user.account_id(),
            text: form.text,
            created_at: UtcDateTime::now(),
        })
        .await?;

    info!(post = %post.id, author = %post.author.id, "Post created");

    Ok(Found::to(PostPath { id: post.id }.to_string()).into_response())
}

async fn fetch_post(state: &ServerState, id: Id<PostMarker>) -> Result<Post> {
    state
        .store
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))
}

#[derive(Clone, Debug, Serialize)]
struct PostContext<'a> {
    post: PostView<'a>,
    is_owner: bool,
}

/// Public: anyone may read a single post by id.
async fn post_detail(
    PostPath { id }: PostPath,
    State(state): State<ServerState>,
    user: Option<AuthenticatedUser>,
) -> Result<Response> {
    let post = fetch_post(&state, id).await?;
    let is_owner = user.is_some_and(|user| post.is_authored_by(user.account_id()));

    Ok(Page::new(
        "tweets/detail",
        PostContext {
            post: PostView::from(&post),
            is_owner,
        },
    )
    .into_response())
}

async fn delete_post_page(
    DeletePostPath { id }: DeletePostPath,
    State(state): State<ServerState>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let post = fetch_post(&state, id).await?;
    if !post.is_authored_by(user.account_id()) {
        return Ok(Found::to(HomePath().to_string()).into_response());
    }

    Ok(Page::new(
        "tweets/delete",
        PostContext {
            post: PostView::from(&post),
            is_owner: true,
        },
    )
    .into_response())
}

/// Only the author may delete. Anyone else is sent home with the post intact.
async fn delete_post(
    DeletePostPath { id }: DeletePostPath,
    State(state): State<ServerState>,
    user: AuthenticatedUser,
) -> Result<Found> {
    let post = fetch_post(&state, id).await?;
    if !post.is_authored_by(user.account_id()) {
        info!(post = %id, account = %user.account_id(), "Refusing to delete a foreign post");
        return Ok(Found::to(HomePath().to_string()));
    }

    if !state.store.delete_post(id).await? {
        return Err(ServerError::PostByIdNotFound(id));
    }

    info!(post = %id, "Post deleted");
    Ok(Found::to(HomePath().to_string()))
}
