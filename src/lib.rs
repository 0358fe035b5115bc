//! # Strata Consensus
//!
//! Core consensus engine of the Strata proof-of-work storage network.
//!
//! The engine ingests candidate blocks, validates them, maintains a tree
//! of all known blocks, selects the heaviest chain under a 5% surpass
//! rule, and keeps a canonical tip view — unspent outputs plus open file
//! contracts — that can be rewound and re-applied across fork switches.
//!
//! ## Architecture
//!
//! - `types` / `constants` / `encoding` — consensus objects, chain
//!   parameters, and the deterministic codec they hash under
//! - `pow` — retarget and cumulative-weight arithmetic
//! - `tree` — the append-only block forest with per-node undo logs
//! - `transaction` / `contracts` / `block` — the apply/reverse pipeline
//! - `reorganization` — fork choice and the rewind/re-integrate switch
//! - `state` — the single-owner state machine behind the public facade
//! - `network` — broadcast framing, host announcements, negotiation
//!   responses
//!
//! ## Usage
//!
//! ```rust
//! use strata_consensus::{Address, Block, ConsensusEngine, Target, ROOT_TARGET};
//!
//! let genesis = Block::genesis(1_700_000_000, Address([0; 32]));
//! let engine = ConsensusEngine::new(genesis.clone());
//!
//! // Mine a child of the genesis root against the root target.
//! let mut block = Block {
//!     parent_id: genesis.id(),
//!     timestamp: genesis.timestamp + 600,
//!     nonce: 0,
//!     miner_address: Address([1; 32]),
//!     merkle_root: strata_consensus::transaction_merkle_root(&[]),
//!     transactions: vec![],
//! };
//! while !Target(ROOT_TARGET).met_by(&block.id()) {
//!     block.nonce += 1;
//! }
//!
//! engine.accept_block(block.clone()).unwrap();
//! assert_eq!(engine.height(), 1);
//! assert_eq!(engine.current_tip(), block.id());
//! ```

pub mod block;
pub mod constants;
pub mod contracts;
pub mod encoding;
pub mod error;
pub mod network;
pub mod pow;
pub mod reorganization;
pub mod state;
pub mod transaction;
pub mod tree;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use contracts::OpenContract;
pub use encoding::{encode, hash_bytes, hash_object, transaction_merkle_root};
pub use error::{AnnouncementError, ConsensusError, NegotiationError, Result, TransactionError};
pub use network::Broadcast;
pub use state::{State, TipState};
pub use types::*;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as Timestamp)
        .unwrap_or(0)
}

/// Thread-safe facade over the consensus [`State`].
///
/// One exclusive lock guards the whole `(tree, tip view, bad blocks)`
/// triple; `accept_block` performs all work synchronously under it,
/// including the hand-off to the broadcast collaborator, which is
/// non-blocking best-effort.
pub struct ConsensusEngine {
    state: Mutex<State>,
    broadcast: Option<Arc<dyn Broadcast>>,
}

impl ConsensusEngine {
    /// Create an engine rooted at the given genesis block, with no
    /// broadcast collaborator.
    pub fn new(genesis: Block) -> ConsensusEngine {
        ConsensusEngine {
            state: Mutex::new(State::new(genesis)),
            broadcast: None,
        }
    }

    /// Create an engine that relays every accepted block to `broadcast`.
    pub fn with_broadcast(genesis: Block, broadcast: Arc<dyn Broadcast>) -> ConsensusEngine {
        ConsensusEngine {
            state: Mutex::new(State::new(genesis)),
            broadcast: Some(broadcast),
        }
    }

    /// Canonical ingress for new blocks. On success the block has been
    /// attached to the tree, the tip is the heaviest known chain under the
    /// surpass rule, and the block has been handed to the broadcaster.
    ///
    /// A failed reorg returns its error, but the rewind-and-restore policy
    /// guarantees the tip view is still consistent.
    pub fn accept_block(&self, block: Block) -> Result<()> {
        let mut state = self.state.lock();
        state.accept_block(block.clone(), unix_now())?;
        if let Some(broadcast) = &self.broadcast {
            broadcast.broadcast(&network::block_message(&block));
        }
        Ok(())
    }

    /// Id of the current tip block.
    pub fn current_tip(&self) -> BlockId {
        self.state.lock().current_tip()
    }

    /// Height of the current tip.
    pub fn height(&self) -> Height {
        self.state.lock().height()
    }

    /// The block at `height` on the current path.
    pub fn block_at_height(&self, height: Height) -> Option<Block> {
        self.state.lock().block_at_height(height).cloned()
    }

    /// Proof-of-work target a miner must meet to build on block `id`.
    pub fn target_of(&self, id: &BlockId) -> Option<Target> {
        self.state.lock().target_of(id)
    }

    /// An unspent output by id.
    pub fn output(&self, id: &OutputId) -> Option<Output> {
        self.state.lock().output(id).cloned()
    }

    /// An open contract by id.
    pub fn open_contract(&self, id: &ContractId) -> Option<OpenContract> {
        self.state.lock().open_contract(id).cloned()
    }

    /// Snapshot of all unspent outputs.
    pub fn unspent_outputs(&self) -> HashMap<OutputId, Output> {
        self.state.lock().unspent_outputs().clone()
    }

    /// Snapshot of all open contracts.
    pub fn open_contracts(&self) -> HashMap<ContractId, OpenContract> {
        self.state.lock().open_contracts().clone()
    }
}
