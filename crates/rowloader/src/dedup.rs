// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;

use crate::Key;

/// Distinct keys of a multi-key lookup, in order of first occurrence, plus the
/// mapping needed to expand per-key results back to the requested order.
#[derive(Debug)]
pub(crate) struct Deduplicated {
    pub keys: Vec<Key>,
    pub positions: Positions,
}

/// For each requested key, the index of its distinct key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Positions(Vec<usize>);

impl Deduplicated {
    pub(crate) fn new(requested: impl IntoIterator<Item = Key>) -> Self {
        let mut seen: HashMap<Key, usize> = HashMap::new();
        let mut keys = Vec::new();
        let positions = requested
            .into_iter()
            .map(|key| {
                *seen.entry(key).or_insert_with_key(|key| {
                    keys.push(key.clone());
                    keys.len() - 1
                })
            })
            .collect();
        Self {
            keys,
            positions: Positions(positions),
        }
    }
}

impl Positions {
    /// Repeats `distinct` results so that the output lines up with the requested keys.
    pub(crate) fn expand<T: Clone>(&self, distinct: &[T]) -> Vec<T> {
        self.0.iter().map(|&index| distinct[index].clone()).collect()
    }
}
