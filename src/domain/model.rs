use crate::utils::error::{Result, SlotError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of featured listings per kind.
pub const MAX_FEATURED: usize = 3;

pub type ListingId = i64;

/// The kinds of listing that own an independent pool of featured slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Project,
    Property,
}

impl ListingKind {
    pub const ALL: [ListingKind; 2] = [ListingKind::Project, ListingKind::Property];

    /// Path segment used by the admin API (`/api/admin/{segment}`).
    pub fn path_segment(&self) -> &'static str {
        match self {
            ListingKind::Project => "projects",
            ListingKind::Property => "properties",
        }
    }

    /// Resolve a kind from its admin API path segment.
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.path_segment() == segment)
    }

    /// Value stored in the `kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Project => "project",
            ListingKind::Property => "property",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// JSON key of the single updated listing in responses.
    pub fn entity_name(&self) -> &'static str {
        self.as_str()
    }

    /// JSON key of the full collection in responses.
    pub fn collection_name(&self) -> &'static str {
        match self {
            ListingKind::Project => "allProjects",
            ListingKind::Property => "allProperties",
        }
    }

    /// Ordering applied after the featured block when listing a collection.
    pub fn default_order_sql(&self) -> &'static str {
        match self {
            ListingKind::Project => "created_at DESC, id DESC",
            ListingKind::Property => "created_at DESC, id DESC",
        }
    }

    /// Label used in admin-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            ListingKind::Project => "proje",
            ListingKind::Property => "emlak",
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display position among the featured listings of one kind, always in `1..=MAX_FEATURED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rank(u8);

impl Rank {
    pub const FIRST: Rank = Rank(1);
    pub const LAST: Rank = Rank(MAX_FEATURED as u8);

    pub fn new(value: i64) -> Result<Self> {
        if (1..=MAX_FEATURED as i64).contains(&value) {
            Ok(Rank(value as u8))
        } else {
            Err(SlotError::InvalidRank { value })
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// All ranks in ascending order.
    pub fn all() -> impl DoubleEndedIterator<Item = Rank> {
        (1..=MAX_FEATURED as u8).map(Rank)
    }

    /// The next rank down the list, or `None` when shifting past the last slot.
    pub fn next(&self) -> Option<Rank> {
        if self.0 < MAX_FEATURED as u8 {
            Some(Rank(self.0 + 1))
        } else {
            None
        }
    }
}

impl TryFrom<i64> for Rank {
    type Error = SlotError;

    fn try_from(value: i64) -> Result<Self> {
        Rank::new(value)
    }
}

impl From<Rank> for u8 {
    fn from(rank: Rank) -> u8 {
        rank.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read/write access to the featured state of a listing.
///
/// The allocator only ever sees listings through this trait, so any listing
/// kind can take part in slot allocation.
pub trait Featurable {
    fn listing_id(&self) -> ListingId;
    fn is_featured(&self) -> bool;
    fn is_published(&self) -> bool;
    fn rank(&self) -> Option<Rank>;
    fn set_slot(&mut self, state: SlotState);

    fn slot_state(&self) -> SlotState {
        SlotState {
            featured: self.is_featured(),
            rank: self.rank(),
        }
    }
}

/// Featured flag and rank of one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotState {
    pub featured: bool,
    pub rank: Option<Rank>,
}

impl SlotState {
    pub fn featured_at(rank: Rank) -> Self {
        Self {
            featured: true,
            rank: Some(rank),
        }
    }

    pub fn released() -> Self {
        Self::default()
    }
}

/// A pending write of featured state for one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub id: ListingId,
    pub featured: bool,
    pub rank: Option<Rank>,
}

impl SlotUpdate {
    pub fn new(id: ListingId, state: SlotState) -> Self {
        Self {
            id,
            featured: state.featured,
            rank: state.rank,
        }
    }

    pub fn is_eviction(&self) -> bool {
        !self.featured
    }

    pub fn state(&self) -> SlotState {
        SlotState {
            featured: self.featured,
            rank: self.rank,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: ListingId,
    pub kind: ListingKind,
    pub title: String,
    pub published: bool,
    pub featured: bool,
    pub featured_order: Option<Rank>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn new(id: ListingId, kind: ListingKind, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            title: title.into(),
            published: true,
            featured: false,
            featured_order: None,
            attributes: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Featurable for Listing {
    fn listing_id(&self) -> ListingId {
        self.id
    }

    fn is_featured(&self) -> bool {
        self.featured
    }

    fn is_published(&self) -> bool {
        self.published
    }

    fn rank(&self) -> Option<Rank> {
        self.featured_order
    }

    fn set_slot(&mut self, state: SlotState) {
        self.featured = state.featured;
        self.featured_order = state.rank;
    }
}

/// Partial update sent by the admin UI.
///
/// Fields this crate does not interpret are collected into `attributes` and
/// merged into the stored listing unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_order: Option<i64>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ListingPatch {
    pub fn featured(featured: bool) -> Self {
        Self {
            featured: Some(featured),
            ..Self::default()
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.featured_order = Some(order);
        self
    }

    pub fn requested_rank(&self) -> Result<Option<Rank>> {
        self.featured_order.map(Rank::new).transpose()
    }

    /// Copy the non-slot fields of this patch onto `listing`.
    pub fn apply_fields(&self, listing: &mut Listing) {
        if let Some(title) = &self.title {
            listing.title = title.clone();
        }
        if let Some(published) = self.published {
            listing.published = published;
        }
        for (key, value) in &self.attributes {
            listing.attributes.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_bounds() {
        assert!(Rank::new(0).is_err());
        assert_eq!(Rank::new(1).unwrap(), Rank::FIRST);
        assert_eq!(Rank::new(3).unwrap(), Rank::LAST);
        assert!(matches!(
            Rank::new(4),
            Err(SlotError::InvalidRank { value: 4 })
        ));
        assert_eq!(Rank::LAST.next(), None);
        assert_eq!(Rank::FIRST.next().map(|r| r.get()), Some(2));
    }

    #[test]
    fn test_kind_path_segments() {
        assert_eq!(
            ListingKind::from_path_segment("projects"),
            Some(ListingKind::Project)
        );
        assert_eq!(
            ListingKind::from_path_segment("properties"),
            Some(ListingKind::Property)
        );
        assert_eq!(ListingKind::from_path_segment("pages"), None);
        assert_eq!(ListingKind::Property.collection_name(), "allProperties");
    }

    #[test]
    fn test_patch_collects_unknown_fields() {
        let patch: ListingPatch = serde_json::from_value(serde_json::json!({
            "featured": true,
            "featuredOrder": 2,
            "location": "Kadıköy",
            "price": 1250000
        }))
        .unwrap();

        assert_eq!(patch.featured, Some(true));
        assert_eq!(patch.requested_rank().unwrap(), Some(Rank::new(2).unwrap()));
        assert_eq!(patch.attributes.len(), 2);

        let mut listing = Listing::new(1, ListingKind::Property, "Daire");
        patch.apply_fields(&mut listing);
        assert_eq!(listing.attributes["location"], "Kadıköy");
        assert!(!listing.featured);
    }

    #[test]
    fn test_null_featured_order_is_omitted() {
        let patch: ListingPatch =
            serde_json::from_str(r#"{"featured": true, "featuredOrder": null}"#).unwrap();
        assert_eq!(patch.requested_rank().unwrap(), None);
    }

    #[test]
    fn test_listing_serializes_camel_case() {
        let mut listing = Listing::new(7, ListingKind::Project, "Kule");
        listing.set_slot(SlotState::featured_at(Rank::FIRST));
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["featuredOrder"], 1);
        assert_eq!(json["featured"], true);
        assert_eq!(json["kind"], "project");
        assert!(json.get("createdAt").is_some());
    }
}
