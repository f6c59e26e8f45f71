//! Pagination arithmetic shared by the feed and the user search.
//!
//! Both paginate with `offset = (page - 1) * size`, but they decide "is there
//! another page" differently: the feed compares the total count against the
//! offset alone, the search against offset plus the rows actually returned.
//! Callers rely on these exact comparisons, so they stay separate.

use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct PageNumber(u32);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct PageSize(u32);

/// A validated pagination request: page number and size are both at least 1.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct Page {
    #[serde(default)]
    pub number: PageNumber,
    #[serde(default)]
    pub size: PageSize,
}

impl PageNumber {
    #[must_use]
    pub fn new(number: u32) -> Option<Self> {
        (number >= 1).then_some(Self(number))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self(1)
    }
}

impl PageSize {
    #[must_use]
    pub fn new(size: u32) -> Option<Self> {
        (size >= 1).then_some(Self(size))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self(DEFAULT_PAGE_SIZE)
    }
}

impl<'de> Deserialize<'de> for PageNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = u32::deserialize(deserializer)?;
        Self::new(inner)
            .ok_or_else(|| Error::invalid_value(Unexpected::Unsigned(inner.into()), &"PageNumber"))
    }
}

impl<'de> Deserialize<'de> for PageSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = u32::deserialize(deserializer)?;
        Self::new(inner)
            .ok_or_else(|| Error::invalid_value(Unexpected::Unsigned(inner.into()), &"PageSize"))
    }
}

impl Page {
    #[must_use]
    pub fn new(number: PageNumber, size: PageSize) -> Self {
        Self { number, size }
    }

    /// Rows to skip before this page starts.
    #[must_use]
    pub fn offset(self) -> u64 {
        u64::from(self.number.0 - 1) * u64::from(self.size.0)
    }

    #[must_use]
    pub fn limit(self) -> u64 {
        u64::from(self.size.0)
    }
}

/// The feed's next-page check: true whenever anything lies beyond the skip
/// offset, regardless of how many rows this page produced.
#[must_use]
pub fn feed_has_next(total: u64, offset: u64) -> bool {
    total > offset
}

/// The user search's next-page check: counts the rows of the current page.
#[must_use]
pub fn search_has_next(total: u64, offset: u64, returned: usize) -> bool {
    total > offset + returned as u64
}

#[cfg(test)]
mod tests {
    use super::{Page, PageNumber, PageSize, feed_has_next, search_has_next};

    fn page(number: u32, size: u32) -> Page {
        Page::new(PageNumber::new(number).unwrap(), PageSize::new(size).unwrap())
    }

    #[test]
    fn zero_is_not_a_page() {
        assert!(PageNumber::new(0).is_none());
        assert!(PageSize::new(0).is_none());
        assert!(PageNumber::new(1).is_some());
        assert!(PageSize::new(1).is_some());
    }

    #[test]
    fn defaults() {
        assert_eq!(Page::default(), page(1, 20));
    }

    #[test]
    fn offsets() {
        assert_eq!(page(1, 20).offset(), 0);
        assert_eq!(page(2, 20).offset(), 20);
        assert_eq!(page(3, 7).offset(), 14);
        // No overflow near the u32 extremes.
        assert_eq!(page(u32::MAX, u32::MAX).offset(), u64::from(u32::MAX - 1) * u64::from(u32::MAX));
    }

    // 25 items, pages of 20: page 3 is past the end, yet the feed formula
    // only compares against the offset, so page 2 claims a next page and
    // page 3 does not, even though page 2 already returned the tail.
    #[test]
    fn feed_boundary_with_25_items() {
        let total = 25;
        assert!(feed_has_next(total, page(1, 20).offset()));
        assert!(feed_has_next(total, page(2, 20).offset()));
        assert!(!feed_has_next(total, page(3, 20).offset()));
    }

    #[test]
    fn search_boundary_with_25_items() {
        let total = 25;
        assert!(search_has_next(total, page(1, 20).offset(), 20));
        assert!(!search_has_next(total, page(2, 20).offset(), 5));
        assert!(!search_has_next(total, page(3, 20).offset(), 0));
    }

    #[test]
    fn formulas_disagree_on_the_last_full_page() {
        // Exactly 40 items, page 2 of 20 returns the final 20 rows.
        let total = 40;
        let offset = page(2, 20).offset();
        assert!(feed_has_next(total, offset));
        assert!(!search_has_next(total, offset, 20));
    }
}
