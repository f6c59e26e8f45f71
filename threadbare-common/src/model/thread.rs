use crate::model::{Id, user::AuthorProfile};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::UtcDateTime;

pub const THREAD_TEXT_MAX_LEN: usize = 4000;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct ThreadMarker;

/// Marker for the reserved community reference. No community entity exists
/// yet; threads always persist without one.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommunityMarker;

/// A post or reply, populated to whatever depth the query asked for.
/// `children` holds replies in insertion order; levels below the populated
/// depth are simply absent and must be fetched through the child's own id.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Thread {
    pub id: Id<ThreadMarker>,
    pub text: ThreadText,
    pub author: AuthorProfile,
    pub parent: Option<Id<ThreadMarker>>,
    pub community: Option<Id<CommunityMarker>>,
    pub created_at: UtcDateTime,
    pub children: Vec<Thread>,
}

/// One page of the top-level feed. `has_next` compares the total count
/// against the skip offset alone, not offset plus returned rows; the user
/// search uses the stricter formula. The two are intentionally different.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Feed {
    pub posts: Vec<Thread>,
    pub has_next: bool,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct ThreadText(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The thread text is empty or exceeds {THREAD_TEXT_MAX_LEN} characters")]
pub struct InvalidThreadTextError(String);

impl ThreadText {
    pub fn new(text: String) -> Result<Self, InvalidThreadTextError> {
        if text.trim().is_empty() || text.chars().count() > THREAD_TEXT_MAX_LEN {
            Err(InvalidThreadTextError(text))
        } else {
            Ok(ThreadText(text))
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

impl<'de> Deserialize<'de> for ThreadText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        ThreadText::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"non-empty thread text"))
    }
}

#[cfg(test)]
mod tests {
    use super::{THREAD_TEXT_MAX_LEN, ThreadText};

    #[test]
    fn text_must_not_be_blank() {
        assert!(ThreadText::new(String::new()).is_err());
        assert!(ThreadText::new("   \n\t".to_owned()).is_err());
        assert!(ThreadText::new("hello".to_owned()).is_ok());
    }

    #[test]
    fn text_length_limit() {
        assert!(ThreadText::new("x".repeat(THREAD_TEXT_MAX_LEN)).is_ok());
        assert!(ThreadText::new("x".repeat(THREAD_TEXT_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn surrounding_whitespace_is_kept_once_validated() {
        let text = ThreadText::new(" hi ".to_owned()).unwrap();
        assert_eq!(text.get(), " hi ");
    }
}
