//! Per-node execution: one Tokio task draining one mailbox.
//!
//! A [`SolverRunner`] owns a node and its [`Execution`] policy. Incoming
//! messages are handled one at a time on a dedicated task; driver calls
//! (`init`, `tick`) take the same lock, so a node's handler and its tick
//! never overlap.
//!
//! # Lifecycle
//!
//! ```text
//! new ──▶ init ──▶ tick* ──▶ reset ──▶ init ──▶ … ──▶ shutdown
//! ```
//!
//! `reset` closes intake, cancels and joins the task (bounded by
//! [`RunnerConfig::shutdown_timeout`]), drops whatever is still queued,
//! restores the node and solvers, and starts a fresh task. A handler error
//! ends the task; it is logged immediately and returned by the next
//! `reset` or `shutdown`.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::address::Address;
use crate::agent::{Node, VariableOwner};
use crate::config::RunnerConfig;
use crate::domain::Value;
use crate::error::DcopError;
use crate::messaging::{channel, Inbox, Mailbox, Message};
use crate::solver::Execution;

struct Core<N: Node> {
    node: N,
    execution: Execution<N>,
    initialized: bool,
}

type Worker = JoinHandle<Result<(), DcopError>>;

/// Hosts one node and its solver(s) on a Tokio task.
pub struct SolverRunner<N: Node> {
    address: Address,
    core: Arc<Mutex<Core<N>>>,
    inbox: Inbox,
    mailbox: Arc<AsyncMutex<Mailbox>>,
    cancel: watch::Sender<bool>,
    task: Option<Worker>,
    runtime: Handle,
    config: RunnerConfig,
}

impl<N: Node> SolverRunner<N> {
    /// Wrap `node` with the default [`RunnerConfig`].
    pub fn new(node: N, execution: Execution<N>) -> Result<Self, DcopError> {
        Self::with_config(node, execution, RunnerConfig::default())
    }

    /// Wrap `node`, bind its address in the node's registry and start the task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_config(node: N, execution: Execution<N>, config: RunnerConfig) -> Result<Self, DcopError> {
        let runtime = Handle::try_current().map_err(|_| DcopError::NoRuntime)?;
        let address = node.address().clone();
        let (inbox, mailbox) = channel(&address);
        node.registry().register(address.clone(), inbox.clone())?;
        let (cancel, _) = watch::channel(false);

        let mut runner = Self {
            address,
            core: Arc::new(Mutex::new(Core {
                node,
                execution,
                initialized: false,
            })),
            inbox,
            mailbox: Arc::new(AsyncMutex::new(mailbox)),
            cancel,
            task: None,
            runtime,
            config,
        };
        runner.start();
        Ok(runner)
    }

    /// Address of the hosted node.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Run the policy's `init`. Only the first call after construction or
    /// reset has an effect.
    pub fn init(&self) -> Result<(), DcopError> {
        let mut core = self.core.lock();
        if core.initialized {
            log::debug!("[SolverRunner] {} already initialized", self.address);
            return Ok(());
        }
        core.initialized = true;
        let Core { node, execution, .. } = &mut *core;
        execution.init(node)
    }

    /// Run one policy tick.
    pub fn tick(&self) -> Result<(), DcopError> {
        let mut core = self.core.lock();
        let Core { node, execution, .. } = &mut *core;
        execution.tick(node)
    }

    /// Enqueue a message for the node without going through the registry.
    pub fn push(&self, message: Message) -> bool {
        self.inbox.push(message)
    }

    /// Messages queued or being handled.
    pub fn pending(&self) -> usize {
        self.inbox.pending()
    }

    /// The node is settled and has nothing left to process.
    pub fn is_finished(&self) -> bool {
        self.core.lock().node.is_settled() && self.inbox.pending() == 0
    }

    /// Whether the execution policy reports done.
    pub fn is_done(&self) -> bool {
        let core = self.core.lock();
        core.execution.is_done(&core.node)
    }

    /// Read access to the node.
    pub fn with_node<R>(&self, f: impl FnOnce(&N) -> R) -> R {
        f(&self.core.lock().node)
    }

    /// Return to the freshly constructed state.
    pub async fn reset(&mut self) -> Result<(), DcopError> {
        let outcome = self.stop().await;
        {
            let mut core = self.core.lock();
            core.node.reset();
            core.execution.reset();
            core.initialized = false;
        }
        self.cancel.send_replace(false);
        self.inbox.open();
        self.start();
        log::debug!("[SolverRunner] {} reset", self.address);
        outcome
    }

    /// Stop the task for good.
    pub async fn shutdown(mut self) -> Result<(), DcopError> {
        let outcome = self.stop().await;
        {
            let mut core = self.core.lock();
            core.node.reset();
            core.execution.reset();
        }
        outcome
    }

    fn start(&mut self) {
        let name = self.core.lock().execution.name();
        let span = tracing::debug_span!("solver", address = %self.address, protocol = %name);
        let worker = run(self.core.clone(), self.mailbox.clone(), self.cancel.subscribe());
        self.task = Some(self.runtime.spawn(worker.instrument(span)));
    }

    async fn stop(&mut self) -> Result<(), DcopError> {
        self.inbox.close();
        self.cancel.send_replace(true);

        let mut outcome = Ok(());
        if let Some(mut task) = self.task.take() {
            let waited = tokio::time::timeout(self.config.shutdown_timeout(), &mut task).await;
            let joined = match waited {
                Ok(joined) => joined,
                Err(_) => {
                    log::warn!(
                        "[SolverRunner] {} did not stop within {:?}; aborting",
                        self.address,
                        self.config.shutdown_timeout()
                    );
                    task.abort();
                    task.await
                }
            };
            match joined {
                Ok(result) => outcome = result,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                // Cancellation is the expected outcome of an abort.
                Err(_) => {}
            }
        }

        let dropped = self.mailbox.lock().await.drain();
        if dropped > 0 {
            log::debug!("[SolverRunner] {} dropped {} queued messages", self.address, dropped);
        }
        outcome
    }
}

impl<N: VariableOwner> SolverRunner<N> {
    /// Current value of the hosted variable.
    pub fn value(&self) -> Option<Value> {
        self.with_node(|node| node.variable().value().cloned())
    }
}

impl<N: Node> Drop for SolverRunner<N> {
    fn drop(&mut self) {
        self.inbox.close();
        self.cancel.send_replace(true);
    }
}

impl<N: Node> std::fmt::Debug for SolverRunner<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverRunner")
            .field("address", &self.address)
            .field("pending", &self.inbox.pending())
            .field("running", &self.task.is_some())
            .finish()
    }
}

/// Task body: handle messages until cancelled or a handler fails.
async fn run<N: Node>(
    core: Arc<Mutex<Core<N>>>,
    mailbox: Arc<AsyncMutex<Mailbox>>,
    mut cancel: watch::Receiver<bool>,
) -> Result<(), DcopError> {
    let mut mailbox = mailbox.lock().await;
    loop {
        let delivery = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            next = mailbox.recv() => match next {
                Some(delivery) => delivery,
                None => break,
            },
        };
        let handled = {
            let mut core = core.lock();
            let Core { node, execution, .. } = &mut *core;
            execution.handle(node, &delivery)
        };
        if let Err(err) = handled {
            log::error!(
                "[SolverRunner] {} failed handling '{}': {}",
                mailbox.address(),
                delivery.kind(),
                err
            );
            return Err(err);
        }
        drop(delivery);
    }
    Ok(())
}

/// Resolves once cancellation is requested or the runner is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}
