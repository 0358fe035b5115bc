//! Append-only forest of block nodes.
//!
//! Nodes live in an arena keyed by block id; parent/child links are plain
//! ids, which keeps ownership acyclic and makes subtree invalidation a
//! simple walk. Each node carries the undo log produced when it was
//! integrated as the tip, so rewinding a block never consults ambient
//! state.

use crate::constants::*;
use crate::contracts::OpenContract;
use crate::pow::{child_depth, child_target};
use crate::transaction::TransactionUndo;
use crate::types::{Block, BlockId, ContractId, Depth, Height, OutputId, Target, Timestamp};
use std::collections::{HashMap, HashSet};

/// Record of a missed-proof output created during contract maintenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissedStorageProof {
    pub output_id: OutputId,
    pub contract_id: ContractId,
}

/// Everything needed to reverse one block's integration exactly.
///
/// Populated exactly once, when the owning node is applied as tip, and
/// consumed exactly once, when it is rewound.
#[derive(Debug, Default)]
pub struct UndoLog {
    /// Per-transaction undo records, in application order.
    pub transaction_undos: Vec<TransactionUndo>,
    /// Missed-proof outputs created by contract maintenance.
    pub missed_storage_proofs: Vec<MissedStorageProof>,
    /// Contracts whose satisfied challenge window was reset at a rollover.
    pub window_resets: Vec<ContractId>,
    /// Contracts that terminated, snapshotted after maintenance ran.
    pub contract_terminations: Vec<OpenContract>,
}

/// A block in the tree, annotated with everything validation and fork
/// selection need
#[derive(Debug)]
pub struct BlockNode {
    pub block: Block,
    pub height: Height,
    pub target: Target,
    pub depth: Depth,
    /// Ring of the most recent timestamps on the path to this node; slot
    /// `RECENT_TIMESTAMP_COUNT - 1` is this node's own timestamp.
    pub recent_timestamps: [Timestamp; RECENT_TIMESTAMP_COUNT],
    pub children: Vec<BlockId>,
    pub undo: UndoLog,
}

impl BlockNode {
    /// Median of the timestamp ring: the sorted element at the median index.
    pub fn median_timestamp(&self) -> Timestamp {
        let mut sorted = self.recent_timestamps;
        sorted.sort_unstable();
        sorted[MEDIAN_TIMESTAMP_INDEX]
    }
}

/// The forest of all known blocks plus the set of known-bad ids
#[derive(Debug)]
pub struct BlockTree {
    nodes: HashMap<BlockId, BlockNode>,
    bad_blocks: HashSet<BlockId>,
    root_id: BlockId,
}

impl BlockTree {
    /// Root a new tree at the genesis block, which receives the root target
    /// and depth and a timestamp ring filled with its own timestamp.
    pub fn new(genesis: Block) -> BlockTree {
        let root_id = genesis.id();
        let root = BlockNode {
            height: 0,
            target: Target(ROOT_TARGET),
            depth: Depth(ROOT_DEPTH),
            recent_timestamps: [genesis.timestamp; RECENT_TIMESTAMP_COUNT],
            children: Vec::new(),
            undo: UndoLog::default(),
            block: genesis,
        };
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        BlockTree {
            nodes,
            bad_blocks: HashSet::new(),
            root_id,
        }
    }

    pub fn root_id(&self) -> BlockId {
        self.root_id
    }

    pub fn lookup(&self, id: &BlockId) -> Option<&BlockNode> {
        self.nodes.get(id)
    }

    pub fn lookup_mut(&mut self, id: &BlockId) -> Option<&mut BlockNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn is_bad(&self, id: &BlockId) -> bool {
        self.bad_blocks.contains(id)
    }

    /// Remember a block id as permanently invalid without touching the tree.
    pub fn mark_bad(&mut self, id: BlockId) {
        self.bad_blocks.insert(id);
    }

    /// Attach a validated block under its parent, shifting the parent's
    /// timestamp ring by one slot and computing the child's target and
    /// depth. Total once header validation has succeeded.
    ///
    /// `adjustment_timestamp` is the timestamp of the retarget anchor: the
    /// block at `height - TARGET_WINDOW` on the current path, or the
    /// genesis root below that height.
    pub fn attach(
        &mut self,
        parent_id: &BlockId,
        block: Block,
        adjustment_timestamp: Timestamp,
    ) -> BlockId {
        let parent = self
            .nodes
            .get(parent_id)
            .expect("attach requires a parent that passed header validation");

        let height = parent.height + 1;

        let mut recent_timestamps = [0; RECENT_TIMESTAMP_COUNT];
        recent_timestamps[..RECENT_TIMESTAMP_COUNT - 1]
            .copy_from_slice(&parent.recent_timestamps[1..]);
        recent_timestamps[RECENT_TIMESTAMP_COUNT - 1] = block.timestamp;

        let window = height.min(TARGET_WINDOW);
        let time_passed = block.timestamp - adjustment_timestamp;
        let expected = BLOCK_FREQUENCY * window as Timestamp;
        let target = child_target(&parent.target, time_passed, expected);
        let depth = child_depth(&parent.depth, &parent.target);

        let id = block.id();
        let node = BlockNode {
            block,
            height,
            target,
            depth,
            recent_timestamps,
            children: Vec::new(),
            undo: UndoLog::default(),
        };
        self.nodes.insert(id, node);
        self.nodes
            .get_mut(parent_id)
            .expect("parent existed above")
            .children
            .push(id);
        id
    }

    /// Move a node and its entire subtree into the bad-block set, deleting
    /// them from the node map. Never touches the tip view; the caller must
    /// ensure the subtree is not on the current path.
    pub fn invalidate(&mut self, id: &BlockId) {
        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
            self.bad_blocks.insert(current);
        }
    }
}
