use crate::model::{
    Id,
    account::{AccountMarker, Username},
};
use time::UtcDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author: Author,
    pub text: String,
    pub created_at: UtcDateTime,
}

/// The public part of the account that wrote a post.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Author {
    pub id: Id<AccountMarker>,
    pub username: Username,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewPost {
    pub author: Id<AccountMarker>,
    pub text: String,
    pub created_at: UtcDateTime,
}

impl Post {
    #[must_use]
    pub fn is_authored_by(&self, account: Id<AccountMarker>) -> bool {
        self.author.id == account
    }
}
