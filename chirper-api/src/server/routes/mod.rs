use crate::server::{ServerError, ServerRouter, page::Found};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use tweets::HomePath;

pub mod accounts;
pub mod tweets;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(index)
        .merge(accounts::routes())
        .merge(tweets::routes())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/", rejection(ServerError))]
struct IndexPath();

async fn index(IndexPath(): IndexPath) -> Found {
    Found::to(HomePath().to_string())
}
