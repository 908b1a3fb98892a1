// Mining jobs: one-shot and continuous block production on a node

use crate::consensus::{Miner, ValidationError};
use crate::core::Block;
use crate::network::{Message, Node, NodeError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Allows at most one mining activity per node and lets it be stopped.
///
/// Every job gets its own cancel flag, so stopping one job never leaks
/// into the next. After `shutdown` no job can start.
#[derive(Debug, Default)]
pub struct MiningControl {
    state: Mutex<ControlState>,
}

#[derive(Debug, Default)]
struct ControlState {
    /// Cancel flag of the running job
    running: Option<Arc<AtomicBool>>,
    shut_down: bool,
}

impl MiningControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the node's single mining slot
    pub fn begin(self: &Arc<Self>) -> Result<MiningJob, NodeError> {
        let mut state = self.state();
        if state.shut_down {
            return Err(NodeError::ShutDown);
        }
        if state.running.is_some() {
            return Err(NodeError::MiningInProgress);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        state.running = Some(Arc::clone(&cancel));
        Ok(MiningJob {
            control: Arc::clone(self),
            cancel,
        })
    }

    /// Ask the running job, if any, to stop
    pub fn stop(&self) {
        if let Some(cancel) = &self.state().running {
            cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Stop the running job and refuse every later one
    pub fn shutdown(&self) {
        let mut state = self.state();
        state.shut_down = true;
        if let Some(cancel) = &state.running {
            cancel.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_active(&self) -> bool {
        self.state().running.is_some()
    }
}

/// The running mining activity; the slot is released when this is dropped
#[derive(Debug)]
pub struct MiningJob {
    control: Arc<MiningControl>,
    cancel: Arc<AtomicBool>,
}

impl MiningJob {
    /// A miner whose search stops when the job is stopped
    pub fn miner(&self) -> Miner {
        Miner::with_cancel_flag(Arc::clone(&self.cancel))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

impl Drop for MiningJob {
    fn drop(&mut self) {
        self.control.state().running = None;
    }
}

impl Node {
    /// Mine one block paying `miner_address`, append it and announce it
    pub async fn mine_one_block(&self, miner_address: &str) -> Result<Block, NodeError> {
        let job = self.mining.begin()?;
        self.mine_with(&job, miner_address).await
    }

    /// Mine continuously in the background until `stop_mining`
    pub fn start_mining(&self, miner_address: &str) -> Result<(), NodeError> {
        let job = self.mining.begin()?;
        let node = self.clone();
        let miner_address = miner_address.to_string();

        log::info!("Continuous mining started for {}", miner_address);
        tokio::spawn(async move {
            loop {
                match node.mine_with(&job, &miner_address).await {
                    Ok(_) => {}
                    // Tip moved while searching: start over on the new tip
                    Err(NodeError::Validation(ValidationError::StaleBlock { .. })) => {}
                    Err(NodeError::MiningCancelled) => break,
                    Err(e) => {
                        log::error!("Continuous mining stopped: {}", e);
                        break;
                    }
                }
            }
            log::info!("Continuous mining stopped");
        });
        Ok(())
    }

    /// Stop the running mining activity, if any
    pub fn stop_mining(&self) {
        self.mining.stop();
    }

    pub fn is_mining(&self) -> bool {
        self.mining.is_active()
    }

    /// Search on a blocking thread, then accept and broadcast under the ledger lock
    async fn mine_with(&self, job: &MiningJob, miner_address: &str) -> Result<Block, NodeError> {
        if job.is_cancelled() {
            return Err(NodeError::MiningCancelled);
        }

        let template = self.ledger.read().await.block_template(miner_address);
        log::debug!(
            "Mining block {} at difficulty {} with {} transactions",
            template.previous.index + 1,
            template.difficulty,
            template.transactions.len()
        );

        let miner = job.miner();
        let result = tokio::task::spawn_blocking(move || {
            miner.mine_block(&template.previous, template.transactions, template.difficulty)
        })
        .await
        .map_err(|e| {
            log::error!("Mining task failed: {}", e);
            NodeError::MiningCancelled
        })?;

        let hash_rate = result.hash_rate();
        let Some(block) = result.block else {
            return Err(NodeError::MiningCancelled);
        };
        log::info!(
            "Mined block {} (nonce {}, {} attempts, {:.0} H/s)",
            block.index,
            block.nonce,
            result.attempts,
            hash_rate
        );

        let mut ledger = self.ledger.write().await;
        if let Err(e) = ledger.accept_mined_block(block.clone()) {
            log::warn!("Discarding mined block {}: {}", block.index, e);
            return Err(e.into());
        }
        self.peers.write().await.broadcast(&Message::NewBlock(block.clone()), None);
        Ok(block)
    }
}
