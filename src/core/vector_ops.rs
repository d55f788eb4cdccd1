// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::types::{ChunkId, DistanceMetric};

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity; 0.0 when either side has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mag_a = magnitude(a);
    let mag_b = magnitude(b);

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    (dot_product(a, b) / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Exact linear scan over `candidates`, returning `(position, distance)` for
/// the `k` nearest entries. Ties are broken by ascending chunk id and `k` is
/// clamped to the number of candidates.
pub fn nearest<'a, I>(query: &[f32], candidates: I, metric: DistanceMetric, k: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = (ChunkId, &'a [f32])>,
{
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(usize, ChunkId, f32)> = candidates
        .into_iter()
        .enumerate()
        .map(|(pos, (id, vector))| (pos, id, metric.distance(query, vector)))
        .collect();

    scored.sort_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.1.cmp(&b.1)));
    scored.truncate(k);

    scored.into_iter().map(|(pos, _, dist)| (pos, dist)).collect()
}
