//! Hand-off of compiled chains between the main thread and the audio thread.
//!
//! The main thread compiles a new [`Chain`] and sends it through a bounded
//! channel. The audio thread picks it up between two ticks, never during one,
//! and sends the chain it replaced back so that it is released (and its
//! processors dropped) on the main thread.
//!
//! ```text
//! main thread                         audio thread
//! -----------                         ------------
//! ChainSwap::install(chain)  ──────▶  AudioRunner::process_block()
//! ChainSwap::collect_retired() ◀────  (old chain)
//! ```

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

use crate::chain::{Chain, ChainError};

/// Creates a connected pair of swap endpoints.
///
/// `capacity` bounds the number of chains in flight in each direction.
pub fn chain_swap(capacity: usize) -> (ChainSwap, AudioRunner) {
    let capacity = capacity.max(1);
    let (install_tx, install_rx) = bounded(capacity);
    let (retire_tx, retire_rx) = bounded(capacity);
    (
        ChainSwap {
            install_tx,
            queued_rx: install_rx.clone(),
            retire_rx,
            installed: 0,
        },
        AudioRunner {
            install_rx,
            retire_tx,
            current: None,
            ticks: 0,
            generation: 0,
        },
    )
}

/// Main-thread endpoint: installs new chains and collects retired ones.
pub struct ChainSwap {
    install_tx: Sender<Chain>,
    queued_rx: Receiver<Chain>,
    retire_rx: Receiver<Chain>,
    installed: u64,
}

impl ChainSwap {
    /// Queues a compiled chain for installation by the audio thread.
    ///
    /// Retired chains are collected first so the return channel never fills up.
    /// If the runner is behind and the queue is full, the chains still queued
    /// are released and replaced by this one; the main thread never blocks.
    pub fn install(&mut self, chain: Chain) -> Result<(), ChainError> {
        if !chain.is_compiled() {
            return Err(ChainError::InvalidState("only compiled chains can be installed"));
        }
        self.collect_retired();
        if !self.runner_alive() {
            return Err(ChainError::InvalidState("audio runner disconnected"));
        }
        match self.install_tx.try_send(chain) {
            Ok(()) => {}
            Err(TrySendError::Full(chain)) => {
                self.discard_queued();
                if self.install_tx.try_send(chain).is_err() {
                    return Err(ChainError::InvalidState("install queue full"));
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(ChainError::InvalidState("audio runner disconnected"));
            }
        }
        self.installed += 1;
        #[cfg(feature = "tracing")]
        tracing::debug!(generation = self.installed, "chain queued for install");
        Ok(())
    }

    /// Releases the chains queued but not yet picked up by the runner.
    fn discard_queued(&mut self) {
        for mut chain in self.queued_rx.try_iter() {
            chain.release();
            #[cfg(feature = "tracing")]
            tracing::debug!("queued chain superseded before install");
        }
    }

    /// Returns false once the runner has been dropped.
    fn runner_alive(&mut self) -> bool {
        match self.retire_rx.try_recv() {
            Ok(mut chain) => {
                chain.release();
                true
            }
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Disconnected) => false,
        }
    }

    /// Releases and drops every chain the audio thread has retired.
    ///
    /// Returns the number of chains collected.
    pub fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        for mut chain in self.retire_rx.try_iter() {
            chain.release();
            count += 1;
        }
        count
    }

    /// Returns the number of chains installed so far.
    pub fn installed(&self) -> u64 {
        self.installed
    }
}

/// Audio-thread endpoint: owns the running chain and ticks it.
pub struct AudioRunner {
    install_rx: Receiver<Chain>,
    retire_tx: Sender<Chain>,
    current: Option<Chain>,
    ticks: u64,
    generation: u64,
}

impl AudioRunner {
    /// Installs any pending chain, then runs one block.
    ///
    /// With no chain installed this only counts the tick.
    pub fn process_block(&mut self) {
        while let Ok(next) = self.install_rx.try_recv() {
            self.generation += 1;
            if let Some(old) = self.current.replace(next) {
                // Return channel full or closed: drop here, never block.
                if let Err(TrySendError::Full(old) | TrySendError::Disconnected(old)) =
                    self.retire_tx.try_send(old)
                {
                    drop(old);
                }
            }
        }
        if let Some(chain) = self.current.as_mut() {
            chain.tick();
        }
        self.ticks += 1;
    }

    /// Returns the running chain.
    pub fn current(&self) -> Option<&Chain> {
        self.current.as_ref()
    }

    /// Returns the number of blocks processed.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns the number of chains installed by this runner.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
