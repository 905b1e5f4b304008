//! The featured set of one listing kind, as seen by the allocator.

use crate::domain::model::{ListingId, Rank, MAX_FEATURED};
use std::collections::BTreeMap;

/// A featured row as read from storage, before its rank has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeaturedRow {
    pub id: ListingId,
    pub order: Option<i64>,
}

impl FeaturedRow {
    pub fn new(id: ListingId, order: Option<i64>) -> Self {
        Self { id, order }
    }
}

/// One ranked occupant of the featured set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEntry {
    pub id: ListingId,
    pub rank: Rank,
}

/// Read-only view of the listings that currently occupy featured slots.
///
/// Built fresh from storage for every operation, with the listing under
/// mutation already excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSet {
    by_rank: BTreeMap<Rank, ListingId>,
    /// Featured listings whose stored rank was missing, out of range or
    /// duplicated. They still count toward capacity.
    unranked: Vec<ListingId>,
}

impl SlotSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from featured rows, reporting rows that break the slot
    /// invariants instead of failing.
    pub fn from_rows(rows: impl IntoIterator<Item = FeaturedRow>) -> Self {
        let mut set = Self::new();
        for row in rows {
            let rank = match row.order.map(Rank::new) {
                Some(Ok(rank)) => rank,
                Some(Err(_)) | None => {
                    tracing::warn!(
                        listing_id = row.id,
                        order = ?row.order,
                        "Invariant violation: featured listing without a valid rank"
                    );
                    set.unranked.push(row.id);
                    continue;
                }
            };
            if let Some(holder) = set.by_rank.get(&rank) {
                tracing::warn!(
                    listing_id = row.id,
                    holder = *holder,
                    rank = %rank,
                    "Invariant violation: duplicate featured rank"
                );
                set.unranked.push(row.id);
                continue;
            }
            set.by_rank.insert(rank, row.id);
        }
        set
    }

    /// Build a set from already validated entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (ListingId, Rank)>) -> Self {
        Self::from_rows(
            entries
                .into_iter()
                .map(|(id, rank)| FeaturedRow::new(id, Some(i64::from(rank.get())))),
        )
    }

    /// Ranked occupants in ascending rank order.
    pub fn entries(&self) -> impl Iterator<Item = SlotEntry> + '_ {
        self.by_rank
            .iter()
            .map(|(rank, id)| SlotEntry { id: *id, rank: *rank })
    }

    pub fn used_ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        self.by_rank.keys().copied()
    }

    pub fn free_ranks(&self) -> Vec<Rank> {
        Rank::all()
            .filter(|rank| !self.by_rank.contains_key(rank))
            .collect()
    }

    pub fn lowest_free_rank(&self) -> Option<Rank> {
        Rank::all().find(|rank| !self.by_rank.contains_key(rank))
    }

    pub fn occupant_of(&self, rank: Rank) -> Option<ListingId> {
        self.by_rank.get(&rank).copied()
    }

    pub fn rank_of(&self, id: ListingId) -> Option<Rank> {
        self.entries()
            .find(|entry| entry.id == id)
            .map(|entry| entry.rank)
    }

    /// Whether `id` occupies a slot, with or without a valid rank.
    pub fn contains(&self, id: ListingId) -> bool {
        self.rank_of(id).is_some() || self.unranked.contains(&id)
    }

    pub fn unranked(&self) -> &[ListingId] {
        &self.unranked
    }

    pub fn has_violations(&self) -> bool {
        !self.unranked.is_empty()
    }

    /// Number of featured occupants, ranked or not.
    pub fn len(&self) -> usize {
        self.by_rank.len() + self.unranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= MAX_FEATURED
    }

    /// Ranked occupants at or below `from`, highest rank first.
    pub(crate) fn occupants_from_descending(&self, from: Rank) -> Vec<SlotEntry> {
        self.by_rank
            .range(from..)
            .rev()
            .map(|(rank, id)| SlotEntry { id: *id, rank: *rank })
            .collect()
    }
}
