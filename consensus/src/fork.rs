// Copyright (C) 2021-2024 The Ember Developers.
// This file is part of the ember library.

// The ember library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The ember library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the ember library. If not, see <https://www.gnu.org/licenses/>.

use crate::error::ConsensusError;

use ember_objects::{BlockId, SignedBlock};

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::trace;

/// Number of recent blocks the in-memory fork forest retains. Anything older
/// must come from the persistent block log.
pub const DEFAULT_FORK_WINDOW: u32 = 1024;

/// A block held in the fork forest. Items are owned by the database; callers
/// receive shared handles that must not outlive it.
#[derive(Debug)]
pub struct ForkItem {
    pub id: BlockId,
    pub num: u32,
    pub previous: BlockId,
    pub block: SignedBlock,
}

/// An in-memory forest of recent blocks keyed by id, tracking the tip of the
/// longest known chain. Ties keep the current head.
#[derive(Debug, Default)]
pub struct ForkDatabase {
    index: HashMap<BlockId, Arc<ForkItem>>,
    by_num: BTreeMap<u32, Vec<BlockId>>,
    head: Option<Arc<ForkItem>>,
    window: u32,
}

impl ForkDatabase {
    pub fn new() -> Self {
        Self { window: DEFAULT_FORK_WINDOW, ..Default::default() }
    }

    pub fn with_window(window: u32) -> Self {
        Self { window: window.max(1), ..Default::default() }
    }

    pub fn head(&self) -> Option<&Arc<ForkItem>> {
        self.head.as_ref()
    }

    pub fn is_known_block(&self, id: &BlockId) -> bool {
        self.index.contains_key(id)
    }

    pub fn fetch_block(&self, id: &BlockId) -> Option<Arc<ForkItem>> {
        self.index.get(id).cloned()
    }

    /// All known blocks at the given height, across branches.
    pub fn fetch_block_by_number(&self, num: u32) -> Vec<Arc<ForkItem>> {
        self.by_num
            .get(&num)
            .map(|ids| ids.iter().filter_map(|id| self.index.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Inserts the block and returns the tip of the longest known chain.
    ///
    /// A block whose parent is unknown is rejected once the window is primed;
    /// the first block establishes the window.
    pub fn push_block(&mut self, block: SignedBlock) -> Result<Arc<ForkItem>, ConsensusError> {
        let id = block.id()?;
        if let Some(existing) = self.index.get(&id).cloned() {
            trace!("fork db already contains block {id}");
            match &self.head {
                Some(head) if head.num >= existing.num => (),
                _ => self.head = Some(existing),
            }
            return self.head.clone().ok_or(ConsensusError::UnlinkableBlock(id));
        }

        // A first block (zero previous) is always linkable; anything else
        // must attach to a block inside the window.
        let previous = block.header.previous;
        if self.head.is_some() && !previous.is_zero() && !self.index.contains_key(&previous) {
            return Err(ConsensusError::UnlinkableBlock(id));
        }

        let item = Arc::new(ForkItem { id, num: block.block_num(), previous, block });
        self.index.insert(id, item.clone());
        self.by_num.entry(item.num).or_default().push(id);

        match &self.head {
            Some(head) if head.num >= item.num => (),
            _ => self.head = Some(item),
        }
        self.prune();

        self.head.clone().ok_or(ConsensusError::UnlinkableBlock(id))
    }

    /// Moves the head back to its parent. Popping the first block empties the
    /// head; popping deeper than the window is an error.
    pub fn pop_block(&mut self) -> Result<(), ConsensusError> {
        let head = self.head.take().ok_or(ConsensusError::PopEmptyChain)?;
        if head.num <= 1 {
            return Ok(());
        }
        match self.index.get(&head.previous) {
            Some(previous) => {
                self.head = Some(previous.clone());
                Ok(())
            }
            None => {
                self.head = Some(head.clone());
                Err(ConsensusError::UnlinkableBlock(head.previous))
            }
        }
    }

    /// Removes a block (and only that block) from the forest; used by
    /// fork-switch error recovery to drop known-invalid blocks.
    pub fn remove(&mut self, id: &BlockId) {
        if let Some(item) = self.index.remove(id) {
            if let Some(ids) = self.by_num.get_mut(&item.num) {
                ids.retain(|known| known != id);
                if ids.is_empty() {
                    self.by_num.remove(&item.num);
                }
            }
            if self.head.as_ref().map(|head| head.id) == Some(*id) {
                self.head = None;
            }
        }
    }

    pub fn set_head(&mut self, item: Arc<ForkItem>) {
        self.head = Some(item);
    }

    /// Walks back from both tips to their common ancestor. Both returned
    /// branches are ordered tip-first and end at items sharing the same
    /// `previous` id; either branch is empty when its tip is the ancestor.
    pub fn fetch_branch_from(
        &self,
        first: BlockId,
        second: BlockId,
    ) -> Result<(Vec<Arc<ForkItem>>, Vec<Arc<ForkItem>>), ConsensusError> {
        let mut first_branch = Vec::new();
        let mut second_branch = Vec::new();
        if first == second {
            return Ok((first_branch, second_branch));
        }

        let mut first_item =
            self.fetch_block(&first).ok_or(ConsensusError::UnlinkableBlock(first))?;
        let mut second_item =
            self.fetch_block(&second).ok_or(ConsensusError::UnlinkableBlock(second))?;

        let descend = |item: &Arc<ForkItem>| -> Result<Arc<ForkItem>, ConsensusError> {
            self.fetch_block(&item.previous).ok_or(ConsensusError::NoCommonAncestor)
        };

        while first_item.num > second_item.num {
            first_branch.push(first_item.clone());
            first_item = descend(&first_item)?;
        }
        while second_item.num > first_item.num {
            second_branch.push(second_item.clone());
            second_item = descend(&second_item)?;
        }
        while first_item.id != second_item.id {
            first_branch.push(first_item.clone());
            second_branch.push(second_item.clone());
            if first_item.num <= 1 || second_item.num <= 1 {
                // Distinct roots share no ancestor inside the window.
                if first_item.previous != second_item.previous {
                    return Err(ConsensusError::NoCommonAncestor);
                }
                break;
            }
            first_item = descend(&first_item)?;
            second_item = descend(&second_item)?;
        }
        Ok((first_branch, second_branch))
    }

    /// Drops blocks that fell out of the window behind the head.
    fn prune(&mut self) {
        let head_num = match &self.head {
            Some(head) => head.num,
            None => return,
        };
        let cutoff = head_num.saturating_sub(self.window);
        if cutoff == 0 {
            return;
        }
        let stale: Vec<u32> = self.by_num.range(..=cutoff).map(|(num, _)| *num).collect();
        for num in stale {
            if let Some(ids) = self.by_num.remove(&num) {
                for id in ids {
                    self.index.remove(&id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_objects::{BlockHeader, TimePointSec, WitnessId};

    fn block_on(previous: BlockId, timestamp: u32) -> SignedBlock {
        SignedBlock {
            header: BlockHeader {
                previous,
                timestamp: TimePointSec::new(timestamp),
                witness: WitnessId(1),
                transaction_merkle_root: Default::default(),
                extensions: Vec::new(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn longest_chain_wins_ties_keep_head() {
        let mut db = ForkDatabase::new();
        let b1 = block_on(BlockId::default(), 10);
        let b1_id = b1.id().unwrap();
        db.push_block(b1).unwrap();

        let a2 = block_on(b1_id, 20);
        let a2_id = a2.id().unwrap();
        assert_eq!(db.push_block(a2).unwrap().id, a2_id);

        // A same-height sibling does not displace the head.
        let b2 = block_on(b1_id, 25);
        assert_eq!(db.push_block(b2).unwrap().id, a2_id);

        // But its child does.
        let b3 = block_on(block_on(b1_id, 25).id().unwrap(), 30);
        let b3_id = b3.id().unwrap();
        assert_eq!(db.push_block(b3).unwrap().id, b3_id);
    }

    #[test]
    fn unknown_parent_is_rejected_once_primed() {
        let mut db = ForkDatabase::new();
        db.push_block(block_on(BlockId::default(), 10)).unwrap();

        let orphan_parent = block_on(BlockId(ember_objects::hash_bytes(b"gone")), 50);
        assert!(matches!(
            db.push_block(block_on(orphan_parent.id().unwrap(), 60)),
            Err(ConsensusError::UnlinkableBlock(_))
        ));
    }

    #[test]
    fn branches_meet_at_the_common_ancestor() {
        let mut db = ForkDatabase::new();
        let b1 = block_on(BlockId::default(), 10);
        let b1_id = b1.id().unwrap();
        db.push_block(b1).unwrap();

        let a2 = block_on(b1_id, 20);
        let a2_id = a2.id().unwrap();
        db.push_block(a2).unwrap();
        let a3 = block_on(a2_id, 30);
        let a3_id = a3.id().unwrap();
        db.push_block(a3).unwrap();

        let c2 = block_on(b1_id, 25);
        let c2_id = c2.id().unwrap();
        db.push_block(c2).unwrap();

        let (to_a3, to_c2) = db.fetch_branch_from(a3_id, c2_id).unwrap();
        assert_eq!(to_a3.iter().map(|i| i.id).collect::<Vec<_>>(), vec![a3_id, a2_id]);
        assert_eq!(to_c2.iter().map(|i| i.id).collect::<Vec<_>>(), vec![c2_id]);
        assert_eq!(to_a3.last().unwrap().previous, to_c2.last().unwrap().previous);
    }

    #[test]
    fn pop_below_first_block_empties_the_head() {
        let mut db = ForkDatabase::new();
        let b1 = block_on(BlockId::default(), 10);
        let b1_id = b1.id().unwrap();
        db.push_block(b1).unwrap();
        db.push_block(block_on(b1_id, 20)).unwrap();

        db.pop_block().unwrap();
        assert_eq!(db.head().unwrap().id, b1_id);
        db.pop_block().unwrap();
        assert!(db.head().is_none());
    }
}
