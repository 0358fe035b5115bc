//! Engine state: the block tree plus the canonical tip view.
//!
//! `State` is a single-owner object; callers that need shared access wrap
//! it in the [`crate::ConsensusEngine`] facade, which serializes everything
//! behind one lock.

use crate::block::validate_header;
use crate::constants::TARGET_WINDOW;
use crate::contracts::OpenContract;
use crate::error::{ConsensusError, Result};
use crate::reorganization::{fork_blockchain, heavier_fork};
use crate::tree::{BlockNode, BlockTree};
use crate::types::{
    Block, BlockId, ContractId, Depth, Height, Output, OutputId, Target, Timestamp,
};
use std::collections::HashMap;
use tracing::debug;

/// The canonical ledger view at the current tip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipState {
    /// Id of the block currently at the tip of the heaviest chain.
    pub current_tip: BlockId,
    /// Height → block id along the selected chain, genesis included.
    pub current_path: HashMap<Height, BlockId>,
    /// All unspent outputs.
    pub unspent_outputs: HashMap<OutputId, Output>,
    /// All open file contracts.
    pub open_contracts: HashMap<ContractId, OpenContract>,
}

impl TipState {
    fn new(root_id: BlockId) -> TipState {
        let mut current_path = HashMap::new();
        current_path.insert(0, root_id);
        TipState {
            current_tip: root_id,
            current_path,
            unspent_outputs: HashMap::new(),
            open_contracts: HashMap::new(),
        }
    }
}

/// The consensus state machine: block tree, bad blocks, and tip view
#[derive(Debug)]
pub struct State {
    pub(crate) tree: BlockTree,
    pub(crate) tip: TipState,
}

impl State {
    /// Create a state rooted at the given genesis block. The genesis block
    /// is the tip; no outputs exist until a block is integrated.
    pub fn new(genesis: Block) -> State {
        let tree = BlockTree::new(genesis);
        let tip = TipState::new(tree.root_id());
        State { tree, tip }
    }

    /// AcceptBlock: ℬ → {ok, err}
    ///
    /// 1. Deduplicate: known-bad, already-known and orphan blocks are each
    ///    rejected with their own error
    /// 2. Validate the header against the parent node
    /// 3. Attach the block to the tree (retarget + depth)
    /// 4. If the new node outweighs the tip by the surpass threshold,
    ///    switch forks, rolling back on failure
    ///
    /// `now` is the caller's wall clock, used only for the future-timestamp
    /// check.
    pub fn accept_block(&mut self, block: Block, now: Timestamp) -> Result<()> {
        let id = block.id();
        let parent = self.check_maps(&id, &block.parent_id)?;

        if let Err(err) = validate_header(now, parent, &block) {
            if err.marks_block_bad() {
                self.tree.mark_bad(id);
            }
            debug!(block = %id, %err, "rejected block header");
            return Err(err);
        }

        let parent_id = block.parent_id;
        let adjustment_timestamp = self.adjustment_timestamp(&parent_id);
        let new_id = self.tree.attach(&parent_id, block, adjustment_timestamp);

        if heavier_fork(self, &new_id) {
            fork_blockchain(self, &new_id)?;
        }
        Ok(())
    }

    /// Check the dedup maps: the block must be new and its parent known.
    fn check_maps(&self, id: &BlockId, parent_id: &BlockId) -> Result<&BlockNode> {
        if self.tree.is_bad(id) {
            return Err(ConsensusError::KnownInvalid);
        }
        if self.tree.contains(id) {
            return Err(ConsensusError::AlreadyKnown);
        }
        self.tree.lookup(parent_id).ok_or(ConsensusError::Orphan)
    }

    /// Timestamp of the retarget anchor for a child of `parent_id`: the
    /// block at `child_height - TARGET_WINDOW` along the *current* path, or
    /// the genesis root below that height.
    ///
    /// Anchoring on the current path instead of the candidate's own
    /// ancestry is historical behavior; it is sound only while no reorg
    /// exceeds TARGET_WINDOW blocks.
    fn adjustment_timestamp(&self, parent_id: &BlockId) -> Timestamp {
        let root_timestamp = self.root_node().block.timestamp;
        let parent = match self.tree.lookup(parent_id) {
            Some(node) => node,
            None => return root_timestamp,
        };
        let child_height = parent.height + 1;
        if child_height < TARGET_WINDOW {
            return root_timestamp;
        }
        self.block_at_height(child_height - TARGET_WINDOW)
            .map(|block| block.timestamp)
            .unwrap_or(root_timestamp)
    }

    fn root_node(&self) -> &BlockNode {
        self.tree
            .lookup(&self.tree.root_id())
            .expect("the genesis root is never removed")
    }

    fn tip_node(&self) -> &BlockNode {
        self.tree
            .lookup(&self.tip.current_tip)
            .expect("the current tip is always in the tree")
    }

    /// Id of the current tip block.
    pub fn current_tip(&self) -> BlockId {
        self.tip.current_tip
    }

    /// Height of the current tip.
    pub fn height(&self) -> Height {
        self.tip_node().height
    }

    /// The block at `height` on the current path.
    pub fn block_at_height(&self, height: Height) -> Option<&Block> {
        let id = self.tip.current_path.get(&height)?;
        self.tree.lookup(id).map(|node| &node.block)
    }

    /// Proof-of-work target of a known block; a miner building on `id`
    /// must meet this target.
    pub fn target_of(&self, id: &BlockId) -> Option<Target> {
        self.tree.lookup(id).map(|node| node.target)
    }

    /// Cumulative depth of a known block. Compare depths only through
    /// [`Depth::heavier_than`].
    pub fn depth_of(&self, id: &BlockId) -> Option<Depth> {
        self.tree.lookup(id).map(|node| node.depth)
    }

    /// The canonical tip view.
    pub fn tip(&self) -> &TipState {
        &self.tip
    }

    /// An unspent output by id.
    pub fn output(&self, id: &OutputId) -> Option<&Output> {
        self.tip.unspent_outputs.get(id)
    }

    /// An open contract by id.
    pub fn open_contract(&self, id: &ContractId) -> Option<&OpenContract> {
        self.tip.open_contracts.get(id)
    }

    /// All unspent outputs.
    pub fn unspent_outputs(&self) -> &HashMap<OutputId, Output> {
        &self.tip.unspent_outputs
    }

    /// All open contracts.
    pub fn open_contracts(&self) -> &HashMap<ContractId, OpenContract> {
        &self.tip.open_contracts
    }

    /// Whether a block id has been marked permanently invalid.
    pub fn is_bad(&self, id: &BlockId) -> bool {
        self.tree.is_bad(id)
    }

    /// Whether a block id is present in the tree.
    pub fn is_known(&self, id: &BlockId) -> bool {
        self.tree.contains(id)
    }
}
