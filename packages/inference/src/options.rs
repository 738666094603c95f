use crate::cache::DEFAULT_CAPACITY;

/// Configuration options for type inference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceOptions {
    /// Capacity of the string-hash recency cache used by the structural hasher
    pub hash_cache_capacity: usize,

    /// Longest access chain (`a.b[c].d()`, one hop per accessor) that is
    /// resolved; longer chains resolve to nothing and are logged
    pub max_chain_length: usize,

    /// Re-binding a name merges the old and new entity into a union instead
    /// of replacing it
    pub merge_reassignments: bool,

    /// Bind `__<name>_idx` as a number for every `for <name> in ...` loop
    pub implicit_loop_index: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            hash_cache_capacity: DEFAULT_CAPACITY,
            max_chain_length: 64,
            merge_reassignments: true,
            implicit_loop_index: true,
        }
    }
}

impl InferenceOptions {
    /// Last assignment wins
    pub fn strict() -> Self {
        Self {
            merge_reassignments: false,
            ..Default::default()
        }
    }

    /// Only what the source spells out: no merging, no synthesized bindings
    pub fn minimal() -> Self {
        Self {
            merge_reassignments: false,
            implicit_loop_index: false,
            ..Default::default()
        }
    }

    pub fn with_max_chain_length(mut self, max_chain_length: usize) -> Self {
        self.max_chain_length = max_chain_length;
        self
    }

    pub fn with_hash_cache_capacity(mut self, capacity: usize) -> Self {
        self.hash_cache_capacity = capacity;
        self
    }
}
