// src/zkp/group.rs
//! Membership groups: insertion-ordered commitment sets with a Poseidon
//! Merkle root.
//!
//! Groups are append-only (no removal) and deduplicated: re-adding a known
//! commitment is a no-op that leaves both the member count and the root
//! unchanged. One group exists per circuit id, created lazily and cached for
//! the process lifetime; mutations on a group are serialized by its lock so
//! the root always matches the member set.

use crate::error::{BlockchainError, Result};
use crate::zkp::poseidon::{field_to_decimal, hash_two};
use ark_bn254::Fr;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Default tree depth; capacity 2^20 (~1,048,576 members).
pub const DEFAULT_GROUP_DEPTH: usize = 20;

/// Merkle inclusion proof for one commitment.
#[derive(Debug, Clone)]
pub struct MerkleProof {
    pub leaf: Fr,
    pub leaf_index: usize,
    /// Sibling node per level, leaf level first.
    pub siblings: Vec<Fr>,
    /// 0 when the running node is the left child at that level, 1 otherwise.
    pub path_indices: Vec<u8>,
    pub root: Fr,
}

impl MerkleProof {
    /// Folds the path back to a root; used to sanity-check proofs.
    pub fn compute_root(&self) -> Fr {
        let mut current = self.leaf;
        for (sibling, index) in self.siblings.iter().zip(self.path_indices.iter()) {
            current = if *index == 0 {
                hash_two(current, *sibling)
            } else {
                hash_two(*sibling, current)
            };
        }
        current
    }
}

/// A fixed-depth incremental Merkle tree over identity commitments.
pub struct Group {
    id: String,
    depth: usize,
    /// Commitments in insertion order; the tree's filled leaf prefix.
    members: Vec<Fr>,
    /// Commitment (decimal) to leaf index, for dedup and proof lookups.
    index: HashMap<String, usize>,
    /// Hash of an all-empty subtree per level.
    zeros: Vec<Fr>,
    /// Computed nodes per level; `layers[0]` mirrors `members`.
    layers: Vec<Vec<Fr>>,
}

impl Group {
    pub fn new(id: impl Into<String>, depth: usize) -> Self {
        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(Fr::from(0u64));
        for level in 0..depth {
            let zero = zeros[level];
            zeros.push(hash_two(zero, zero));
        }
        Self {
            id: id.into(),
            depth,
            members: Vec::new(),
            index: HashMap::new(),
            zeros,
            layers: vec![Vec::new(); depth + 1],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, commitment: Fr) -> bool {
        self.index.contains_key(&field_to_decimal(commitment))
    }

    /// Current Merkle root.
    pub fn root(&self) -> Fr {
        self.layers[self.depth]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.depth])
    }

    /// Appends a commitment, recomputing the path to the root.
    ///
    /// Returns `false` (leaving count and root untouched) when the
    /// commitment is already a member.
    ///
    /// # Errors
    /// Fails when the tree is full.
    pub fn add_member(&mut self, commitment: Fr) -> Result<bool> {
        let key = field_to_decimal(commitment);
        if self.index.contains_key(&key) {
            return Ok(false);
        }
        if self.members.len() as u64 >= self.capacity() {
            return Err(BlockchainError::ProofSystem {
                reason: format!("group {} is at capacity {}", self.id, self.capacity()),
            });
        }

        let leaf_index = self.members.len();
        self.members.push(commitment);
        self.index.insert(key, leaf_index);

        // Write the leaf, then refresh one node per level up to the root.
        let mut node = commitment;
        let mut position = leaf_index;
        for level in 0..=self.depth {
            let layer = &mut self.layers[level];
            if position < layer.len() {
                layer[position] = node;
            } else {
                layer.push(node);
            }
            if level == self.depth {
                break;
            }
            let sibling = self.node_at(level, position ^ 1);
            node = if position % 2 == 0 {
                hash_two(node, sibling)
            } else {
                hash_two(sibling, node)
            };
            position /= 2;
        }

        debug!(
            "group {}: member {} added, count {}",
            self.id,
            leaf_index,
            self.members.len()
        );
        Ok(true)
    }

    /// Inclusion proof for a member commitment.
    ///
    /// # Errors
    /// Fails when the commitment is not in the group.
    pub fn merkle_proof(&self, commitment: Fr) -> Result<MerkleProof> {
        let key = field_to_decimal(commitment);
        let leaf_index = *self.index.get(&key).ok_or_else(|| {
            BlockchainError::ProofSystem {
                reason: format!("identity is not a member of group {}", self.id),
            }
        })?;

        let mut siblings = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut position = leaf_index;
        for level in 0..self.depth {
            siblings.push(self.node_at(level, position ^ 1));
            path_indices.push((position % 2) as u8);
            position /= 2;
        }

        Ok(MerkleProof {
            leaf: commitment,
            leaf_index,
            siblings,
            path_indices,
            root: self.root(),
        })
    }

    fn node_at(&self, level: usize, position: usize) -> Fr {
        self.layers[level]
            .get(position)
            .copied()
            .unwrap_or(self.zeros[level])
    }
}

/// Snapshot of a group's shape, for callers and telemetry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub circuit_id: String,
    pub member_count: usize,
    pub depth: usize,
    pub capacity: u64,
    pub root: String,
}

/// Process-wide group cache, one group per circuit id.
///
/// Injectable state with an explicit lifecycle: built with its owning
/// service and cleared only via [`GroupRegistry::clear`].
pub struct GroupRegistry {
    depth: usize,
    groups: Mutex<HashMap<String, Arc<Mutex<Group>>>>,
}

impl GroupRegistry {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// The group for a circuit, created lazily on first access.
    pub fn get_or_create(&self, circuit_id: &str) -> Arc<Mutex<Group>> {
        self.groups
            .lock()
            .unwrap()
            .entry(circuit_id.to_string())
            .or_insert_with(|| {
                debug!("creating group for circuit {circuit_id} (depth {})", self.depth);
                Arc::new(Mutex::new(Group::new(circuit_id, self.depth)))
            })
            .clone()
    }

    /// The group for a circuit, or `None` when it was never created.
    pub fn get(&self, circuit_id: &str) -> Option<Arc<Mutex<Group>>> {
        self.groups.lock().unwrap().get(circuit_id).cloned()
    }

    pub fn stats(&self, circuit_id: &str) -> Option<GroupStats> {
        let group = self.get(circuit_id)?;
        let group = group.lock().unwrap();
        Some(GroupStats {
            circuit_id: group.id().to_string(),
            member_count: group.member_count(),
            depth: group.depth(),
            capacity: group.capacity(),
            root: field_to_decimal(group.root()),
        })
    }

    /// Drops every cached group. Never called implicitly.
    pub fn clear(&self) {
        self.groups.lock().unwrap().clear();
    }
}
