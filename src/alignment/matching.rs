//! Brute-force descriptor matching.
//!
//! Query descriptors are matched in parallel; results are collected in query
//! order so every run produces the same correspondence list.

use rayon::prelude::*;

/// A query descriptor paired with its chosen template descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub fn hamming(a: &[u64], b: &[u64]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Two-nearest-neighbour matching with ambiguity rejection.
///
/// A query descriptor is matched to its nearest template descriptor only if
/// that distance is below `ratio` times the distance to the second nearest.
/// Needs at least two template descriptors.
pub fn ratio_test_matches<D>(query: &[D], train: &[D], ratio: f32) -> Vec<Match>
where
    D: AsRef<[f32]> + Sync,
{
    if train.len() < 2 {
        return Vec::new();
    }

    query
        .par_iter()
        .enumerate()
        .filter_map(|(query_idx, q)| {
            let q = q.as_ref();
            let mut best_idx = 0usize;
            let mut best = f32::INFINITY;
            let mut second = f32::INFINITY;

            for (train_idx, t) in train.iter().enumerate() {
                let d = squared_euclidean(q, t.as_ref());
                if d < best {
                    second = best;
                    best = d;
                    best_idx = train_idx;
                } else if d < second {
                    second = d;
                }
            }

            let best = best.sqrt();
            let second = second.sqrt();
            (best < ratio * second).then_some(Match {
                query_idx,
                train_idx: best_idx,
                distance: best,
            })
        })
        .collect()
}

/// Nearest template descriptor under Hamming distance, one match per query
/// descriptor. Ties go to the lowest template index.
pub fn nearest_hamming_matches<D>(query: &[D], train: &[D]) -> Vec<Match>
where
    D: AsRef<[u64]> + Sync,
{
    if train.is_empty() {
        return Vec::new();
    }

    query
        .par_iter()
        .enumerate()
        .map(|(query_idx, q)| {
            let q = q.as_ref();
            let mut best_idx = 0usize;
            let mut best = u32::MAX;
            for (train_idx, t) in train.iter().enumerate() {
                let d = hamming(q, t.as_ref());
                if d < best {
                    best = d;
                    best_idx = train_idx;
                }
            }
            Match {
                query_idx,
                train_idx: best_idx,
                distance: best as f32,
            }
        })
        .collect()
}

/// Sort ascending by distance and keep the closest `fraction` of matches.
pub fn keep_best_fraction(mut matches: Vec<Match>, fraction: f32) -> Vec<Match> {
    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    let keep = (matches.len() as f32 * fraction) as usize;
    matches.truncate(keep);
    matches
}
