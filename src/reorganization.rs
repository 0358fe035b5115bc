//! Fork choice and chain reorganization.
//!
//! A newly attached node only displaces the tip when it outweighs it by
//! the surpass threshold; the switch itself is a single logical
//! transaction — either the new fork is fully installed or the original
//! tip is fully restored.

use crate::block::{integrate_block, rewind_block};
use crate::error::{ConsensusError, Result};
use crate::pow::exceeds_surpass_threshold;
use crate::state::State;
use crate::types::BlockId;
use tracing::{error, warn};

/// Returns true if the attached node carries enough cumulative weight to
/// displace the current tip: its depth must beat the tip's depth by more
/// than SURPASS_THRESHOLD of one tip-target block weight. The hysteresis
/// keeps the engine from thrashing between near-equal forks.
pub fn heavier_fork(state: &State, new_id: &BlockId) -> bool {
    let new_node = state
        .tree
        .lookup(new_id)
        .expect("fork choice runs on freshly attached nodes");
    let tip_node = state
        .tree
        .lookup(&state.tip.current_tip)
        .expect("the current tip is always in the tree");
    exceeds_surpass_threshold(&new_node.depth, &tip_node.depth, &tip_node.target)
}

/// ForkBlockchain: 𝒩 → {ok, err}
///
/// Moves the tip to the fork ending in `new_id`:
/// 1. Walk up from the new node collecting ids until reaching a node whose
///    entry in the current path is its own id — the common ancestor
/// 2. Rewind the current tip back to that ancestor, remembering the
///    rewound ids in order
/// 3. Integrate the collected history outward. On a failure at step k:
///    invalidate the failing node's entire subtree, rewind the k-1 blocks
///    already applied, then re-apply the rewound ids in reverse. A failure
///    while restoring once-valid blocks is a consensus-logic bug and
///    aborts the process.
///
/// The first integration error is returned, wrapped as `ReorgIntegration`
/// when blocks were actually rewound; a plain tip extension surfaces the
/// inner error directly.
pub fn fork_blockchain(state: &mut State, new_id: &BlockId) -> Result<()> {
    // 1. Find the common ancestor.
    let mut parent_history: Vec<BlockId> = Vec::new();
    let mut current = *new_id;
    loop {
        let node = state
            .tree
            .lookup(&current)
            .expect("every collected id was attached to the tree");
        if state.tip.current_path.get(&node.height) == Some(&current) {
            break;
        }
        parent_history.push(current);
        current = node.block.parent_id;
    }

    // 2. Rewind to the ancestor.
    let mut rewound: Vec<BlockId> = Vec::new();
    while state.tip.current_tip != current {
        rewound.push(state.tip.current_tip);
        rewind_block(state);
    }
    if !rewound.is_empty() {
        warn!(
            rewound = rewound.len(),
            incoming = parent_history.len(),
            fork = %new_id,
            "switching to a heavier fork"
        );
    }

    // 3. Integrate the new fork, ancestor outward.
    let mut validated = 0usize;
    for index in (0..parent_history.len()).rev() {
        if let Err(err) = integrate_block(state, &parent_history[index]) {
            state.tree.invalidate(&parent_history[index]);

            for _ in 0..validated {
                rewind_block(state);
            }
            for rewound_id in rewound.iter().rev() {
                if let Err(restore_err) = integrate_block(state, rewound_id) {
                    error!(block = %rewound_id, %restore_err, "tip restoration failed");
                    panic!(
                        "once-valid block {rewound_id} failed to re-validate during reorg \
                         restoration: {restore_err}; the consensus logic is inconsistent"
                    );
                }
            }

            return Err(if rewound.is_empty() {
                err
            } else {
                ConsensusError::ReorgIntegration(Box::new(err))
            });
        }
        validated += 1;
    }

    Ok(())
}
