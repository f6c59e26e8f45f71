use crate::model::Id;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::UtcDateTime;

pub const AUTH_ID_MAX_LEN: usize = 64;
pub const USERNAME_MAX_LEN: usize = 50;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

/// A profile as stored. `id` is the storage identifier; `auth_id` is the
/// identity the external auth provider issued, and is what request paths key
/// lookups by.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub auth_id: AuthId,
    pub username: Username,
    pub name: String,
    pub bio: String,
    pub image: String,
    pub onboarded: bool,
    pub created_at: UtcDateTime,
}

/// The author fields embedded in populated threads: a reduced view of
/// [`User`], without bio/onboarding state.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct AuthorProfile {
    pub id: Id<UserMarker>,
    pub auth_id: AuthId,
    pub name: String,
    pub image: String,
}

impl From<&User> for AuthorProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            auth_id: user.auth_id.clone(),
            name: user.name.clone(),
            image: user.image.clone(),
        }
    }
}

/// Profile fields a user submits during onboarding or a later edit. Applying
/// this always sets the profile to onboarded.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct ProfileUpdate {
    pub username: Username,
    pub name: String,
    pub bio: String,
    pub image: String,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct AuthId(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The auth id is invalid: {0:?}")]
pub struct InvalidAuthIdError(String);

impl AuthId {
    /// Auth ids travel inside session tokens and URL paths, so '.' and
    /// whitespace are rejected along with empty and oversized values.
    pub fn new(id: String) -> Result<Self, InvalidAuthIdError> {
        let well_formed = !id.is_empty()
            && id.chars().count() <= AUTH_ID_MAX_LEN
            && id.chars().all(|c| !c.is_whitespace() && !c.is_control() && c != '.');

        if well_formed {
            Ok(AuthId(id))
        } else {
            Err(InvalidAuthIdError(id))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for AuthId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AuthId {
    type Err = InvalidAuthIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_owned())
    }
}

impl<'de> Deserialize<'de> for AuthId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        AuthId::new(inner).map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"AuthId"))
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The username is invalid: {0:?}")]
pub struct InvalidUsernameError(String);

impl Username {
    /// Usernames are stored lowercase; mixed-case input is folded rather than
    /// rejected.
    pub fn new(username: String) -> Result<Self, InvalidUsernameError> {
        if username.is_empty() || username.chars().count() > USERNAME_MAX_LEN {
            return Err(InvalidUsernameError(username));
        }
        Ok(Username(username.to_lowercase()))
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Username::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Username"))
    }
}

/// A user plus their authored threads, children populated one level deep.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct UserThreads {
    pub user: User,
    pub threads: Vec<crate::model::thread::Thread>,
}

/// One page of a user search.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct UserSearch {
    pub users: Vec<User>,
    pub has_next: bool,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[cfg(test)]
mod tests {
    use super::{AUTH_ID_MAX_LEN, AuthId, USERNAME_MAX_LEN, Username};

    #[test]
    fn auth_id_rejects_delimiters_and_whitespace() {
        assert!(AuthId::new("user_2NNEqL2sr".to_owned()).is_ok());
        assert!(AuthId::new(String::new()).is_err());
        assert!(AuthId::new("a.b".to_owned()).is_err());
        assert!(AuthId::new("a b".to_owned()).is_err());
        assert!(AuthId::new("a\nb".to_owned()).is_err());
        assert!(AuthId::new("x".repeat(AUTH_ID_MAX_LEN)).is_ok());
        assert!(AuthId::new("x".repeat(AUTH_ID_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn username_is_folded_to_lowercase() {
        let username = Username::new("CoolUser42".to_owned()).unwrap();
        assert_eq!(username.get(), "cooluser42");
    }

    #[test]
    fn username_length_limits() {
        assert!(Username::new(String::new()).is_err());
        assert!(Username::new("x".repeat(USERNAME_MAX_LEN)).is_ok());
        assert!(Username::new("x".repeat(USERNAME_MAX_LEN + 1)).is_err());
    }
}
