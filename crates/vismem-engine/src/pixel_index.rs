// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Dense index over mapped output pixels
//!
//! The output pixel space ("sparse") includes channels that are not wired to any
//! physical LED. Learning only ever touches mapped pixels, so cells are addressed
//! by a compact "dense" index and translated back when publishing recall.

/// Order-preserving map from dense slot to sparse pixel index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenseIndex {
    dense_to_sparse: Vec<u32>,
    sparse_len: usize,
}

impl DenseIndex {
    /// Build from one "is mapped" flag per output pixel, in output order
    pub fn from_mapped_flags<I>(mapped: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let mut dense_to_sparse = Vec::new();
        let mut sparse_len = 0usize;
        for (sparse, is_mapped) in mapped.into_iter().enumerate() {
            if is_mapped {
                dense_to_sparse.push(sparse as u32);
            }
            sparse_len = sparse + 1;
        }
        Self {
            dense_to_sparse,
            sparse_len,
        }
    }

    /// Number of mapped pixels
    pub fn dense_len(&self) -> usize {
        self.dense_to_sparse.len()
    }

    /// Size of the full addressable pixel space
    pub fn sparse_len(&self) -> usize {
        self.sparse_len
    }

    pub fn is_empty(&self) -> bool {
        self.dense_to_sparse.is_empty()
    }

    /// Sparse pixel index of dense slot `dense`
    ///
    /// # Panics
    /// Panics if `dense >= dense_len()`.
    #[inline]
    pub fn sparse(&self, dense: usize) -> usize {
        self.dense_to_sparse[dense] as usize
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.dense_to_sparse
    }
}
