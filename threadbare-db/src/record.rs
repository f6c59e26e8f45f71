//! Row shapes as they come back from Postgres, plus the conversions into the
//! domain model. Snowflakes are stored as signed BIGINT and cast at this
//! boundary; timestamps are stored without a zone and interpreted as UTC.

use threadbare_common::model::{
    ModelValidationError,
    session::Session,
    thread::{Thread, ThreadText},
    user::{AuthId, AuthorProfile, User, Username},
};
use time::{PrimitiveDateTime, UtcDateTime};

pub(crate) fn to_primitive(time: UtcDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(time.date(), time.time())
}

#[derive(Clone, Eq, PartialEq, Debug, sqlx::FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub auth_id: String,
    pub username: String,
    pub name: String,
    pub bio: String,
    pub image: String,
    pub onboarded: bool,
    pub created_at: PrimitiveDateTime,
}

/// A thread row joined with its author's profile columns.
#[derive(Clone, Eq, PartialEq, Debug, sqlx::FromRow)]
pub(crate) struct ThreadRecord {
    pub thread_snowflake: i64,
    pub text: String,
    pub parent_snowflake: Option<i64>,
    pub community_snowflake: Option<i64>,
    pub created_at: PrimitiveDateTime,
    pub author_snowflake: i64,
    pub author_auth_id: String,
    pub author_name: String,
    pub author_image: String,
}

#[derive(Clone, Eq, PartialEq, Debug, sqlx::FromRow)]
pub(crate) struct SessionRecord {
    pub auth_id: String,
    pub token_hash: Vec<u8>,
    pub created_at: PrimitiveDateTime,
    pub expires_at: Option<PrimitiveDateTime>,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_snowflake.cast_unsigned().into(),
            auth_id: AuthId::new(value.auth_id)?,
            username: Username::new(value.username)?,
            name: value.name,
            bio: value.bio,
            image: value.image,
            onboarded: value.onboarded,
            created_at: value.created_at.as_utc(),
        })
    }
}

impl TryFrom<ThreadRecord> for Thread {
    type Error = ModelValidationError;

    /// Produces an unpopulated node; the tree builder attaches children.
    fn try_from(value: ThreadRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.thread_snowflake.cast_unsigned().into(),
            text: ThreadText::new(value.text)?,
            author: AuthorProfile {
                id: value.author_snowflake.cast_unsigned().into(),
                auth_id: AuthId::new(value.author_auth_id)?,
                name: value.author_name,
                image: value.author_image,
            },
            parent: value
                .parent_snowflake
                .map(|parent| parent.cast_unsigned().into()),
            community: value
                .community_snowflake
                .map(|community| community.cast_unsigned().into()),
            created_at: value.created_at.as_utc(),
            children: Vec::new(),
        })
    }
}

impl TryFrom<SessionRecord> for Session {
    type Error = ModelValidationError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            auth_id: AuthId::new(value.auth_id)?,
            token_hash: Box::<[u8]>::from(value.token_hash).try_into()?,
            created_at: value.created_at.as_utc(),
            expires_at: value.expires_at.map(PrimitiveDateTime::as_utc),
        })
    }
}
