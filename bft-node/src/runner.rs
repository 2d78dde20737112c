//! Node process lifecycle

use crate::cluster::node_dir;
use crate::config::NodeConfig;
use crate::engine::ConsensusEngine;
use crate::genesis::GenesisDoc;
use crate::identity::{NodeKey, PrivValidatorKey, PrivValidatorState};
use crate::local::LocalEngine;
use crate::ports::NodePorts;
use crate::{NodeError, NodeResult};
use bft_app::Application;
use std::future::Future;
use std::path::Path;
use tokio::signal;
use tracing::{error, info, warn};

/// Run node `index` of the cluster under `base` until SIGINT or SIGTERM.
pub async fn run<A: Application, P: AsRef<Path>>(app: A, base: P, index: usize) -> NodeResult<()> {
    let engine = build_engine(app, base, index)?;
    run_engine(engine, shutdown_signal()).await
}

/// Load everything node `index` needs and bind `app` to a new engine
pub fn build_engine<A: Application, P: AsRef<Path>>(
    app: A,
    base: P,
    index: usize,
) -> NodeResult<LocalEngine<A>> {
    let dir = node_dir(base, index);
    let config = NodeConfig::load_from_dir(&dir)?;
    config.validate()?;

    // Listeners always follow the node index, whatever the file says.
    let config = config.with_ports_of(NodePorts::for_index(index)?);

    let genesis = GenesisDoc::load_from_file(config.genesis_path())?;
    let validator = PrivValidatorKey::load_from_file(config.priv_validator_key_path())?;
    let signing_state = PrivValidatorState::load_from_file(config.priv_validator_state_path())?;
    let node_key = NodeKey::load_from_file(config.node_key_path())?;

    info!(
        index,
        node_id = %node_key.node_id(),
        chain_id = %genesis.chain_id,
        last_signed_height = signing_state.height,
        "Node configuration loaded"
    );

    LocalEngine::new(config, &genesis, &node_key, &validator, app)
        .map_err(|e| NodeError::Engine(format!("Failed to create node {}: {}", index, e)))
}

/// Start `engine`, wait for `shutdown`, then stop it and wait for its tasks.
pub async fn run_engine<E, F>(mut engine: E, shutdown: F) -> NodeResult<()>
where
    E: ConsensusEngine,
    F: Future<Output = ()>,
{
    if let Err(e) = engine.start().await {
        error!(error = %e, "Engine failed to start");
        engine.stop();
        if let Err(wait_err) = engine.wait().await {
            warn!(error = %wait_err, "Engine did not shut down cleanly");
        }
        return Err(match e {
            NodeError::Engine(_) => e,
            other => NodeError::Engine(other.to_string()),
        });
    }

    shutdown.await;

    engine.stop();
    engine.wait().await?;
    info!("Node stopped");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::init_cluster;
    use bft_app::BftApplication;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingEngine {
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_start: bool,
    }

    impl ConsensusEngine for RecordingEngine {
        async fn start(&mut self) -> NodeResult<()> {
            self.calls.lock().unwrap().push("start");
            if self.fail_start {
                return Err(NodeError::Config("bad listener".to_string()));
            }
            Ok(())
        }

        fn stop(&mut self) {
            self.calls.lock().unwrap().push("stop");
        }

        async fn wait(&mut self) -> NodeResult<()> {
            self.calls.lock().unwrap().push("wait");
            Ok(())
        }

        fn is_running(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_run_engine_lifecycle() {
        let engine = RecordingEngine::default();
        let calls = Arc::clone(&engine.calls);

        run_engine(engine, async {}).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["start", "stop", "wait"]);
    }

    #[tokio::test]
    async fn test_start_failure_is_engine_error() {
        let engine = RecordingEngine {
            fail_start: true,
            ..Default::default()
        };
        let calls = Arc::clone(&engine.calls);

        let result = run_engine(engine, async {}).await;
        assert!(matches!(result, Err(NodeError::Engine(_))));
        assert_eq!(*calls.lock().unwrap(), vec!["start", "stop", "wait"]);
    }

    #[test]
    fn test_build_engine_from_cluster() {
        let dir = tempdir().unwrap();
        init_cluster(dir.path(), 2).unwrap();

        let engine = build_engine(BftApplication::new(), dir.path(), 1).unwrap();
        assert!(!engine.is_running());
        assert!(engine.rpc_addr().is_none());
    }

    #[test]
    fn test_build_engine_missing_node() {
        let dir = tempdir().unwrap();
        init_cluster(dir.path(), 1).unwrap();

        assert!(matches!(
            build_engine(BftApplication::new(), dir.path(), 3),
            Err(NodeError::Config(_))
        ));
    }
}
