//! History store for pages, origins, visits and bookmarks
//!
//! Pages ("places") are grouped by origin. Every row carries a cached
//! `frecency` and a `recalc_frecency` dirty flag; the store raises the flag
//! whenever a page's inputs change and the recalculator clears it.

mod origin;
mod schema;
mod store;

pub use origin::OriginKey;
pub use store::{ChunkOutcome, DirtyListener, PlacesStore};

/// Frecency value of a row that has never been calculated
pub const INVALID_FRECENCY: i64 = -1;

/// How the user reached a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitTransition {
    /// Followed a link
    Link = 1,
    /// Typed in the address bar
    Typed = 2,
    /// Opened from a bookmark
    Bookmark = 3,
    /// Embedded subresource
    Embed = 4,
    /// Permanent redirect target
    RedirectPermanent = 5,
    /// Temporary redirect target
    RedirectTemporary = 6,
    /// Download
    Download = 7,
    /// Link followed inside a frame
    FramedLink = 8,
    /// Page reload
    Reload = 9,
}

impl VisitTransition {
    /// Decode a stored `visit_type`
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Link),
            2 => Some(Self::Typed),
            3 => Some(Self::Bookmark),
            4 => Some(Self::Embed),
            5 => Some(Self::RedirectPermanent),
            6 => Some(Self::RedirectTemporary),
            7 => Some(Self::Download),
            8 => Some(Self::FramedLink),
            9 => Some(Self::Reload),
            _ => None,
        }
    }

    /// Whether a visit of this kind bumps the page's `visit_count`
    pub fn counts_as_visit(&self) -> bool {
        !matches!(
            self,
            Self::Embed | Self::FramedLink | Self::Download | Self::Reload
        )
    }
}

/// A page row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub origin_id: i64,
    pub visit_count: i64,
    pub typed: bool,
    pub last_visit_date: Option<i64>,
    pub frecency: i64,
    pub recalc_frecency: bool,
}

impl Place {
    /// Whether the cached frecency must be recomputed
    pub fn is_outdated(&self) -> bool {
        self.recalc_frecency || self.frecency < 0
    }
}

/// An origin row aggregating pages by scheme prefix and host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub id: i64,
    pub prefix: String,
    pub host: String,
    pub frecency: i64,
    pub recalc_frecency: bool,
}
