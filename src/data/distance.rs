//! Packed storage of pairwise values within a cluster.
//!
//! For a cluster of `k` members only the strict upper triangle of the
//! symmetric `k x k` matrix is stored, in row order:
//!
//! ```text
//! (0,1) (0,2) ... (0,k-1) (1,2) ... (1,k-1) ... (k-2,k-1)
//! ```
//!
//! Global observation indices are first mapped to their position in the
//! cluster; [`packed_offset`] then maps a pair of positions to the flat slot.

use std::collections::HashMap;
use thiserror::Error;

/// Errors raised when addressing a [`DistanceRecorder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistanceError {
    #[error("observation {0} does not belong to this cluster")]
    UnknownIndex(usize),

    #[error("no value is stored for the diagonal pair ({0}, {0})")]
    Diagonal(usize),

    #[error("observation {0} appears twice in the cluster")]
    DuplicateMember(usize),
}

/// Flat offset of the pair of positions `(p, q)` in a cluster of size `k`.
///
/// The pair is unordered; `p` and `q` must differ and both be below `k`.
pub fn packed_offset(p: usize, q: usize, k: usize) -> usize {
    debug_assert!(p != q && p < k && q < k);
    let (a, b) = if p < q { (p, q) } else { (q, p) };
    a * (2 * k - a - 1) / 2 + (b - a - 1)
}

/// Number of stored values for a cluster of size `k`.
pub fn packed_len(k: usize) -> usize {
    k * k.saturating_sub(1) / 2
}

/// Symmetric pairwise values (typically distances) among the members of one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceRecorder {
    members: Vec<usize>,
    positions: HashMap<usize, usize>,
    values: Vec<f64>,
}

impl DistanceRecorder {
    /// Allocate storage for the ordered member indices of a cluster.
    pub fn new(members: Vec<usize>) -> Result<Self, DistanceError> {
        let mut positions = HashMap::with_capacity(members.len());
        for (position, &index) in members.iter().enumerate() {
            if positions.insert(index, position).is_some() {
                return Err(DistanceError::DuplicateMember(index));
            }
        }
        let values = vec![0.0; packed_len(members.len())];
        Ok(Self {
            members,
            positions,
            values,
        })
    }

    /// Number of stored values, k·(k-1)/2.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of members in the cluster.
    pub fn cluster_size(&self) -> usize {
        self.members.len()
    }

    /// Member indices in cluster order.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    fn offset(&self, i: usize, j: usize) -> Result<usize, DistanceError> {
        if i == j {
            return Err(DistanceError::Diagonal(i));
        }
        let p = *self.positions.get(&i).ok_or(DistanceError::UnknownIndex(i))?;
        let q = *self.positions.get(&j).ok_or(DistanceError::UnknownIndex(j))?;
        Ok(packed_offset(p, q, self.members.len()))
    }

    /// Store the value for the unordered pair of observations `(i, j)`.
    pub fn set_value_at(&mut self, i: usize, j: usize, value: f64) -> Result<(), DistanceError> {
        let offset = self.offset(i, j)?;
        self.values[offset] = value;
        Ok(())
    }

    /// Value for the unordered pair of observations `(i, j)`.
    pub fn get_value_at(&self, i: usize, j: usize) -> Result<f64, DistanceError> {
        Ok(self.values[self.offset(i, j)?])
    }

    /// Fill every pair with `f(i, j)` where `i` precedes `j` in cluster order.
    pub fn fill_with(&mut self, mut f: impl FnMut(usize, usize) -> f64) {
        let k = self.members.len();
        for p in 0..k {
            for q in (p + 1)..k {
                self.values[packed_offset(p, q, k)] = f(self.members[p], self.members[q]);
            }
        }
    }

    /// All pairs `(i, j, value)` in packed order, as global indices.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let k = self.members.len();
        (0..k).flat_map(move |p| {
            ((p + 1)..k).map(move |q| {
                (
                    self.members[p],
                    self.members[q],
                    self.values[packed_offset(p, q, k)],
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_offset_is_bijective() {
        for k in 0..8 {
            let mut seen = vec![false; packed_len(k)];
            for p in 0..k {
                for q in (p + 1)..k {
                    let offset = packed_offset(p, q, k);
                    assert_eq!(offset, packed_offset(q, p, k));
                    assert!(!seen[offset]);
                    seen[offset] = true;
                }
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn test_sequential_fill_matches_packed_order() {
        let mut recorder = DistanceRecorder::new(vec![8, 9, 10, 11, 12, 13]).unwrap();
        assert_eq!(recorder.len(), 15);

        let mut value = 0.0;
        for i in 8..14 {
            for j in (i + 1)..14 {
                value += 1.0;
                recorder.set_value_at(i, j, value).unwrap();
            }
        }

        assert_eq!(recorder.get_value_at(11, 13).unwrap(), 14.0);
        assert_eq!(recorder.get_value_at(13, 11).unwrap(), 14.0);
        assert_eq!(recorder.get_value_at(8, 9).unwrap(), 1.0);
        assert_eq!(recorder.get_value_at(12, 13).unwrap(), 15.0);
    }

    #[test]
    fn test_symmetry() {
        let mut recorder = DistanceRecorder::new(vec![4, 2, 7]).unwrap();
        recorder.set_value_at(7, 4, 3.5).unwrap();
        assert_eq!(recorder.get_value_at(4, 7).unwrap(), 3.5);
        assert_eq!(recorder.get_value_at(2, 7).unwrap(), 0.0);
    }

    #[test]
    fn test_errors() {
        let mut recorder = DistanceRecorder::new(vec![1, 2, 3]).unwrap();
        assert_eq!(recorder.get_value_at(1, 1), Err(DistanceError::Diagonal(1)));
        assert_eq!(recorder.set_value_at(1, 5, 0.0), Err(DistanceError::UnknownIndex(5)));
        assert_eq!(
            DistanceRecorder::new(vec![1, 1]).unwrap_err(),
            DistanceError::DuplicateMember(1)
        );
    }

    #[test]
    fn test_fill_and_pairs() {
        let mut recorder = DistanceRecorder::new(vec![0, 1, 2, 3]).unwrap();
        recorder.fill_with(|i, j| (10 * i + j) as f64);
        let pairs: Vec<_> = recorder.pairs().collect();
        assert_eq!(pairs.len(), 6);
        assert_eq!(pairs[0], (0, 1, 1.0));
        assert_eq!(pairs[5], (2, 3, 23.0));
        assert_eq!(recorder.get_value_at(3, 1).unwrap(), 13.0);
    }

    #[test]
    fn test_singleton_cluster() {
        let recorder = DistanceRecorder::new(vec![5]).unwrap();
        assert!(recorder.is_empty());
        assert_eq!(recorder.pairs().count(), 0);
    }
}
