pub mod session;
pub mod thread;
pub mod user;

use crate::{
    model::{
        session::InvalidSessionHashError,
        thread::InvalidThreadTextError,
        user::{InvalidAuthIdError, InvalidUsernameError},
    },
    snowflake::Snowflake,
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;

/// Raised when data crossing the store boundary fails schema validation,
/// whether it arrived from a request or from a persisted row.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    AuthId(#[from] InvalidAuthIdError),
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
    #[error(transparent)]
    ThreadText(#[from] InvalidThreadTextError),
    #[error(transparent)]
    SessionHash(#[from] InvalidSessionHashError),
}

/// A snowflake tagged with the entity kind it identifies, so a thread id
/// cannot be passed where a user id is expected.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(Snowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: Snowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> Snowflake {
        self.0
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<Snowflake> for Id<Marker> {
    fn from(value: Snowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for Snowflake {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(Snowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}
