//! Single-node engine
//!
//! Sequences transactions into blocks for one application and serves the
//! administrative RPC surface. There is no agreement, gossip or WAL; peers
//! from the configuration are only reported.

use crate::config::{parse_laddr, NodeConfig};
use crate::engine::{ConsensusEngine, NodeInfo};
use crate::genesis::GenesisDoc;
use crate::identity::{NodeKey, PrivValidatorKey};
use crate::metrics::{self, EngineMetrics};
use crate::rpc;
use crate::{NodeError, NodeResult};
use bft_app::{Application, InfoResponse, QueryResponse, RequestQuery, TxResponse};
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pending transactions the producer has not picked up yet
pub const MEMPOOL_CAPACITY: usize = 5000;

/// Transaction waiting for inclusion
#[derive(Debug)]
pub(crate) struct MempoolTx {
    pub tx: Bytes,
    pub reply: oneshot::Sender<DeliverOutcome>,
}

/// Result of including a transaction in a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverOutcome {
    pub response: TxResponse,
    pub height: u64,
}

/// State shared by the block producer and the RPC handlers.
///
/// Every application call goes through `app`; the lock is never held across
/// an await point.
pub struct EngineState<A> {
    app: Mutex<A>,
    height: AtomicU64,
    pub(crate) metrics: Arc<EngineMetrics>,
    pub(crate) node_info: NodeInfo,
    pub(crate) mempool: mpsc::Sender<MempoolTx>,
}

impl<A: Application> EngineState<A> {
    pub(crate) fn new(
        app: A,
        node_info: NodeInfo,
        metrics: Arc<EngineMetrics>,
    ) -> (Self, mpsc::Receiver<MempoolTx>) {
        let (mempool, receiver) = mpsc::channel(MEMPOOL_CAPACITY);
        let state = Self {
            app: Mutex::new(app),
            height: AtomicU64::new(0),
            metrics,
            node_info,
            mempool,
        };
        (state, receiver)
    }

    /// Height of the last committed block
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    pub fn check_tx(&self, tx: &[u8]) -> TxResponse {
        let response = self.app.lock().check_tx(tx);
        if !response.is_ok() {
            self.metrics.txs_rejected.inc();
        }
        response
    }

    pub fn query(&self, request: RequestQuery) -> QueryResponse {
        self.app.lock().query(request)
    }

    pub fn info(&self) -> InfoResponse {
        self.app.lock().info()
    }

    /// Deliver every transaction in order, commit, and advance the height
    pub fn execute_block(&self, txs: &[Bytes]) -> (Vec<TxResponse>, u64) {
        let responses: Vec<TxResponse> = {
            let mut app = self.app.lock();
            let responses = txs.iter().map(|tx| app.deliver_tx(tx)).collect();
            app.commit();
            responses
        };

        let height = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        for response in &responses {
            if response.is_ok() {
                self.metrics.txs_delivered.inc();
            } else {
                self.metrics.txs_rejected.inc();
            }
        }
        self.metrics.block_height.set(height as i64);
        debug!(height, txs = txs.len(), "Block committed");

        (responses, height)
    }
}

/// Collect transactions for up to `timeout` after the first one arrives,
/// then execute them as one block.
pub(crate) async fn produce_blocks<A: Application>(
    state: Arc<EngineState<A>>,
    mut mempool: mpsc::Receiver<MempoolTx>,
    timeout: Duration,
    max_block_txs: usize,
    shutdown: CancellationToken,
) {
    loop {
        let first = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = mempool.recv() => match next {
                Some(tx) => tx,
                None => break,
            },
        };

        let mut block = vec![first];
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        while block.len() < max_block_txs {
            tokio::select! {
                _ = &mut deadline => break,
                next = mempool.recv() => match next {
                    Some(tx) => block.push(tx),
                    None => break,
                },
            }
        }

        let txs: Vec<Bytes> = block.iter().map(|entry| entry.tx.clone()).collect();
        let (responses, height) = state.execute_block(&txs);

        for (entry, response) in block.into_iter().zip(responses) {
            // The submitter may have given up waiting.
            let _ = entry.reply.send(DeliverOutcome { response, height });
        }
    }

    debug!("Block producer stopped");
}

pub struct LocalEngine<A: Application> {
    config: NodeConfig,
    state: Arc<EngineState<A>>,
    mempool: Option<mpsc::Receiver<MempoolTx>>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    rpc_addr: Option<SocketAddr>,
    metrics_addr: Option<SocketAddr>,
}

impl<A: Application> LocalEngine<A> {
    /// Bind `app` to a node described by its configuration, genesis and keys
    pub fn new(
        config: NodeConfig,
        genesis: &GenesisDoc,
        node_key: &NodeKey,
        validator: &PrivValidatorKey,
        app: A,
    ) -> NodeResult<Self> {
        config.validate()?;

        let validator_address = validator.address_hex();
        if genesis.validator_by_address(&validator_address).is_none() {
            warn!(address = %validator_address, "Validator key is not part of genesis");
        }

        let node_info = NodeInfo {
            node_id: node_key.node_id(),
            moniker: config.moniker.clone(),
            chain_id: genesis.chain_id.clone(),
            validator_address,
            p2p_laddr: config.p2p.laddr.clone(),
            rpc_laddr: config.rpc.laddr.clone(),
            persistent_peers: config
                .persistent_peers()
                .into_iter()
                .map(str::to_string)
                .collect(),
        };

        let metrics = Arc::new(EngineMetrics::new()?);
        let (state, mempool) = EngineState::new(app, node_info, metrics);

        Ok(Self {
            config,
            state: Arc::new(state),
            mempool: Some(mempool),
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
            rpc_addr: None,
            metrics_addr: None,
        })
    }

    /// Bound RPC address, once started
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc_addr
    }

    /// Bound metrics address, once started with metrics enabled
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    pub fn state(&self) -> Arc<EngineState<A>> {
        Arc::clone(&self.state)
    }

    async fn bind(laddr: &str, what: &str) -> NodeResult<TcpListener> {
        let addr = parse_laddr(laddr)?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| NodeError::Engine(format!("Failed to bind {} on {}: {}", what, addr, e)))
    }

    fn spawn_server(&mut self, listener: TcpListener, router: axum::Router, what: &'static str) {
        let shutdown = self.shutdown.clone();
        self.tasks.push(tokio::spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = server.await {
                error!(server = what, error = %e, "Server exited with error");
            }
        }));
    }
}

impl<A: Application> ConsensusEngine for LocalEngine<A> {
    async fn start(&mut self) -> NodeResult<()> {
        if self.mempool.is_none() {
            return Err(NodeError::Engine("Engine already started".to_string()));
        }

        // Every listener is bound before anything is spawned, so a failed
        // start leaves no task behind.
        let rpc_listener = Self::bind(&self.config.rpc.laddr, "RPC").await?;
        let metrics_listener = if self.config.instrumentation.prometheus {
            Some(Self::bind(&self.config.instrumentation.prometheus_listen_addr, "metrics").await?)
        } else {
            None
        };
        let rpc_addr = rpc_listener.local_addr()?;
        let metrics_addr = metrics_listener
            .as_ref()
            .map(TcpListener::local_addr)
            .transpose()?;

        let mempool = self
            .mempool
            .take()
            .ok_or_else(|| NodeError::Engine("Engine already started".to_string()))?;

        self.rpc_addr = Some(rpc_addr);
        self.spawn_server(rpc_listener, rpc::router(self.state()), "rpc");

        if let Some(listener) = metrics_listener {
            self.metrics_addr = metrics_addr;
            self.spawn_server(
                listener,
                metrics::router(Arc::clone(&self.state.metrics)),
                "metrics",
            );
        }

        self.tasks.push(tokio::spawn(produce_blocks(
            self.state(),
            mempool,
            self.config.timeout_commit(),
            self.config.consensus.max_block_txs,
            self.shutdown.clone(),
        )));

        for peer in &self.state.node_info.persistent_peers {
            debug!(peer = %peer, "Persistent peer");
        }
        info!(
            node_id = %self.state.node_info.node_id,
            moniker = %self.config.moniker,
            rpc = ?self.rpc_addr,
            metrics = ?self.metrics_addr,
            peers = self.state.node_info.persistent_peers.len(),
            "Local engine started"
        );
        Ok(())
    }

    fn stop(&mut self) {
        info!("Stopping local engine");
        self.shutdown.cancel();
    }

    async fn wait(&mut self) -> NodeResult<()> {
        for task in self.tasks.drain(..) {
            task.await
                .map_err(|e| NodeError::Engine(format!("Engine task failed: {}", e)))?;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.mempool.is_none() && !self.shutdown.is_cancelled()
    }
}
