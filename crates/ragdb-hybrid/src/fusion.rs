//! Reciprocal Rank Fusion: score = Σ 1/(k + rank_i)
//!
//! Combines ranked lists from different channels without normalizing their
//! native scores. Pure and deterministic: the same rankings passed in the same
//! order always produce the same output.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use ragdb_core::types::{DocumentId, RankedHit};

pub const DEFAULT_RRF_K: u32 = 60;

/// Identity used to deduplicate an entity across rankings.
///
/// Chunk id when known, otherwise the `(document, chunk index)` position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FusionKey {
    Chunk(String),
    Position(DocumentId, usize),
}

pub trait Fusable {
    /// `None` when the item carries neither a chunk id nor a position.
    fn fusion_key(&self) -> Option<FusionKey>;
}

impl Fusable for RankedHit {
    fn fusion_key(&self) -> Option<FusionKey> {
        match (&self.entity_id, self.chunk_index) {
            (Some(id), _) if !id.is_empty() => Some(FusionKey::Chunk(id.clone())),
            (_, Some(idx)) => Some(FusionKey::Position(self.document_id.clone(), idx)),
            _ => None,
        }
    }
}

/// Where an entity appeared: input ranking index and its 1-based rank there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRank {
    pub ranking: usize,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusedEntry<T> {
    pub key: FusionKey,
    pub score: f64,
    /// Lowest rank across all rankings the entity appeared in.
    pub best_rank: usize,
    /// Metadata of the first occurrence, scanning rankings in input order.
    pub item: T,
    pub sources: Vec<SourceRank>,
}

impl<T> FusedEntry<T> {
    pub fn rank_in(&self, ranking: usize) -> Option<usize> {
        self.sources.iter().find(|s| s.ranking == ranking).map(|s| s.rank)
    }
}

/// Fuse `rankings` (each best-first) with smoothing constant `k`.
///
/// Output is ordered by fused score descending, then best rank ascending,
/// then [`FusionKey`]. An entity repeated inside one ranking counts once, at
/// its first position. Items without a key are skipped.
pub fn fuse<T, R>(rankings: &[R], k: u32) -> Vec<FusedEntry<T>>
where
    T: Fusable + Clone,
    R: AsRef<[T]>,
{
    let k = f64::from(k);
    let mut slots: HashMap<FusionKey, usize> = HashMap::new();
    let mut entries: Vec<FusedEntry<T>> = Vec::new();

    for (ranking_idx, ranking) in rankings.iter().enumerate() {
        for (pos, item) in ranking.as_ref().iter().enumerate() {
            let Some(key) = item.fusion_key() else {
                tracing::debug!(ranking = ranking_idx, pos, "skipping unkeyed hit during fusion");
                continue;
            };
            let rank = pos + 1;
            let contribution = 1.0 / (k + rank as f64);
            match slots.entry(key) {
                Entry::Occupied(slot) => {
                    let entry = &mut entries[*slot.get()];
                    if entry.sources.iter().any(|s| s.ranking == ranking_idx) {
                        continue;
                    }
                    entry.score += contribution;
                    entry.best_rank = entry.best_rank.min(rank);
                    entry.sources.push(SourceRank { ranking: ranking_idx, rank });
                }
                Entry::Vacant(slot) => {
                    entries.push(FusedEntry {
                        key: slot.key().clone(),
                        score: contribution,
                        best_rank: rank,
                        item: item.clone(),
                        sources: vec![SourceRank { ranking: ranking_idx, rank }],
                    });
                    slot.insert(entries.len() - 1);
                }
            }
        }
    }

    entries.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.best_rank.cmp(&b.best_rank))
            .then_with(|| a.key.cmp(&b.key))
    });
    entries
}
