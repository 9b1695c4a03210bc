fn main() {
    println!("Run `cargo test -p orbit-pipeline` to execute the end-to-end pipeline tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, Once};

    use orbit_deploy::{
        DeployMode, DeploySettings, DeploymentOutcome, JsonRecordStore, Orchestrator, RecordStore,
    };
    use orbit_monitor::{MonitorConfig, NetworkMonitor};
    use orbit_protocol::{
        AccountState, Artifact, ContractId, Credential, LedgerClient, LedgerError, LedgerFuture,
        Network, NetworkConfig, NetworkInfo, ReadOnlyQuery, TxId, TxState, TxStatus,
    };
    use orbit_resolver::{ClarinetManifestReader, ManifestReader, ResolveOptions, resolve};
    use orbit_scanner::{FileClass, ScanOptions, scan};
    use orbit_verify::{VerificationStatus, Verifier, VerifyConfig};
    use tempfile::TempDir;

    const DEPLOYER: &str = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM";

    static TRACING: Once = Once::new();

    fn init_tracing() {
        TRACING.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn copy_dir(from: &Path, to: &Path) {
        fs::create_dir_all(to).unwrap();
        for entry in fs::read_dir(from).unwrap() {
            let entry = entry.unwrap();
            let target = to.join(entry.file_name());
            if entry.file_type().unwrap().is_dir() {
                copy_dir(&entry.path(), &target);
            } else {
                fs::copy(entry.path(), &target).unwrap();
            }
        }
    }

    /// Copies the demo project into a scratch directory.
    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        copy_dir(&fixtures_dir().join("project"), dir.path());
        dir
    }

    /// Fires a callback once the ledger has accepted `after` submissions.
    #[derive(Default)]
    struct CancelHook {
        after: usize,
        callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl CancelHook {
        fn fire_if_due(&self, submitted: usize) {
            if submitted >= self.after
                && let Some(callback) = self.callback.lock().unwrap().take()
            {
                callback();
            }
        }
    }

    /// In-memory ledger: submissions deploy instantly and confirm on the
    /// first poll.
    #[derive(Default)]
    struct FakeChain {
        contracts: Mutex<BTreeMap<String, String>>,
        transactions: Mutex<BTreeMap<TxId, String>>,
        submissions: AtomicUsize,
        hook: CancelHook,
    }

    impl LedgerClient for FakeChain {
        fn network(&self) -> Network {
            Network::Devnet
        }

        fn submit<'a>(
            &'a self,
            artifact: &'a Artifact,
            source: &'a str,
            credential: &'a Credential,
        ) -> LedgerFuture<'a, TxId> {
            Box::pin(async move {
                assert_eq!(credential.expose(), "devnet-key");
                let mut contracts = self.contracts.lock().unwrap();
                if contracts.contains_key(&artifact.id) {
                    return Err(LedgerError::Rejected {
                        reason: "ContractAlreadyExists".into(),
                    });
                }
                contracts.insert(artifact.id.clone(), source.to_string());
                drop(contracts);

                let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
                let tx_id = format!("0x{n:064x}");
                self.transactions
                    .lock()
                    .unwrap()
                    .insert(tx_id.clone(), artifact.id.clone());
                self.hook.fire_if_due(n);
                Ok(tx_id)
            })
        }

        fn get_account<'a>(&'a self, address: &'a str) -> LedgerFuture<'a, AccountState> {
            let nonce = self.submissions.load(Ordering::SeqCst) as u64;
            Box::pin(async move {
                Ok(AccountState {
                    address: address.to_string(),
                    balance: 50_000_000,
                    locked: 0,
                    nonce,
                })
            })
        }

        fn get_transaction<'a>(&'a self, tx_id: &'a str) -> LedgerFuture<'a, TxStatus> {
            let known = self.transactions.lock().unwrap().contains_key(tx_id);
            Box::pin(async move {
                if !known {
                    return Err(LedgerError::NotFound(tx_id.to_string()));
                }
                Ok(TxStatus {
                    tx_id: tx_id.to_string(),
                    state: TxState::Success,
                    block_height: Some(42),
                    result: Some("(ok true)".into()),
                })
            })
        }

        fn call_read_only<'a>(
            &'a self,
            query: &'a ReadOnlyQuery,
        ) -> LedgerFuture<'a, serde_json::Value> {
            let source = if query.contract.deployer == DEPLOYER {
                self.contracts.lock().unwrap().get(&query.contract.name).cloned()
            } else {
                None
            };
            Box::pin(async move {
                let source =
                    source.ok_or_else(|| LedgerError::NotFound(query.contract.to_string()))?;
                let functions: Vec<serde_json::Value> = source
                    .matches("(define-public")
                    .chain(source.matches("(define-read-only"))
                    .map(|kind| serde_json::json!({ "kind": kind }))
                    .collect();
                Ok(serde_json::json!({ "functions": functions }))
            })
        }

        fn get_deployed_contracts<'a>(
            &'a self,
            address: &'a str,
        ) -> LedgerFuture<'a, Vec<ContractId>> {
            let names: Vec<String> = self.contracts.lock().unwrap().keys().cloned().collect();
            Box::pin(async move {
                Ok(names
                    .into_iter()
                    .map(|name| ContractId::new(address, name))
                    .collect())
            })
        }

        fn get_network_info(&self) -> LedgerFuture<'_, NetworkInfo> {
            Box::pin(async {
                Ok(NetworkInfo {
                    network_id: 2147483648,
                    block_height: 42,
                    server_version: Some("fake-chain".into()),
                })
            })
        }
    }

    fn network_config() -> NetworkConfig {
        NetworkConfig::new(Network::Devnet, DEPLOYER, Credential::new("devnet-key"))
    }

    struct Stack {
        chain: Arc<FakeChain>,
        monitor: Arc<NetworkMonitor>,
        store: Arc<JsonRecordStore>,
    }

    fn stack(root: &Path, chain: Arc<FakeChain>) -> Stack {
        let monitor = Arc::new(NetworkMonitor::new(chain.clone(), MonitorConfig::default()));
        Stack {
            chain,
            monitor,
            store: Arc::new(JsonRecordStore::for_project(root)),
        }
    }

    fn orchestrator(root: &Path, stack: &Stack) -> Orchestrator {
        Orchestrator::new(
            stack.chain.clone(),
            stack.monitor.clone(),
            stack.store.clone(),
            network_config(),
            DeploySettings {
                project_root: root.to_path_buf(),
                min_fee: 10_000,
                ..DeploySettings::default()
            },
        )
    }

    fn resolved(root: &Path) -> (orbit_resolver::Manifest, orbit_resolver::DeploymentPlan) {
        let index = scan(root, &ScanOptions::default()).unwrap();
        let manifest = ClarinetManifestReader.read(root).unwrap();
        let plan = resolve(
            &manifest,
            &index,
            &ResolveOptions {
                infer_dependencies: true,
                ..ResolveOptions::default()
            },
        )
        .unwrap();
        (manifest, plan)
    }

    #[test]
    fn scan_and_resolve_demo_project() {
        init_tracing();
        let dir = project();
        let index = scan(dir.path(), &ScanOptions::default()).unwrap();

        assert_eq!(index.stats().pruned, vec!["node_modules"]);
        assert_eq!(index.artifact_sources().len(), 5);
        assert_eq!(index.manifest_files().len(), 1);
        assert_eq!(index.history_files().len(), 1);
        assert!(
            index
                .files_of(FileClass::ArtifactSource)
                .iter()
                .all(|r| !r.path.starts_with("node_modules"))
        );

        let (_, plan) = resolved(dir.path());
        assert!(plan.warnings().is_empty());
        // oracle-feed declares nothing; its call into .token is inferred.
        assert_eq!(plan.dependencies_of("oracle-feed"), vec!["token"]);
        assert_eq!(
            plan.batches(),
            &[
                vec!["sip-010-trait".to_string()],
                vec!["token".to_string()],
                vec!["oracle-feed".to_string()],
                vec!["dex-pool".to_string()],
                vec!["dao-governance".to_string()],
            ]
        );
        assert_eq!(resolved(dir.path()).1, plan);
    }

    #[tokio::test]
    async fn deploy_then_redeploy_then_verify() {
        init_tracing();
        let dir = project();
        let (manifest, plan) = resolved(dir.path());
        let stack = stack(dir.path(), Arc::new(FakeChain::default()));

        let mut first = orchestrator(dir.path(), &stack);
        let mut events = first.take_events().unwrap();
        let result = first
            .deploy(&plan, DeployMode::Parallel { max_concurrency: 3 }, false)
            .await
            .unwrap();
        assert_eq!(result.outcome(), DeploymentOutcome::Success, "{result:?}");
        assert_eq!(result.successful.len(), 5);
        assert_eq!(stack.chain.submissions.load(Ordering::SeqCst), 5);
        assert!(
            dir.path()
                .join(".stacksorbit/deployments/devnet.json")
                .is_file()
        );

        let mut seen = 0;
        while let Ok(event) = events.try_recv() {
            serde_json::to_value(&event).unwrap();
            seen += 1;
        }
        assert!(seen > 20);

        let again = orchestrator(dir.path(), &stack)
            .deploy(&plan, DeployMode::Sequential, false)
            .await
            .unwrap();
        assert_eq!(stack.chain.submissions.load(Ordering::SeqCst), 5);
        assert_eq!(again.already_deployed.len(), 5);
        assert!(again.successful.is_empty());

        let record = stack.store.load(Network::Devnet).unwrap().unwrap();
        let verifier = Verifier::new(
            stack.chain.clone(),
            stack.monitor.clone(),
            network_config(),
            VerifyConfig::default(),
        );
        let report = verifier
            .verify(&record, &manifest.names(), true)
            .await
            .unwrap();
        assert!(report.passed, "{report:?}");
        assert_eq!(report.artifacts.len(), 5);
        assert!(report.recommendations.is_empty());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["artifacts"][0]["id"], "dao-governance");
    }

    #[tokio::test]
    async fn interrupted_run_resumes_from_record() {
        init_tracing();
        let dir = project();
        let (manifest, plan) = resolved(dir.path());

        let chain = Arc::new(FakeChain {
            hook: CancelHook {
                after: 2,
                ..CancelHook::default()
            },
            ..FakeChain::default()
        });
        let stack = stack(dir.path(), chain);
        let first = orchestrator(dir.path(), &stack);
        let token = first.cancel_token();
        *stack.chain.hook.callback.lock().unwrap() = Some(Box::new(move || token.cancel()));

        let partial = first
            .deploy(&plan, DeployMode::Sequential, false)
            .await
            .unwrap();
        assert_eq!(partial.outcome(), DeploymentOutcome::Interrupted);
        assert_eq!(partial.successful, vec!["sip-010-trait", "token"]);
        assert_eq!(
            partial.interrupted,
            vec!["dao-governance", "dex-pool", "oracle-feed"]
        );

        let record = stack.store.load(Network::Devnet).unwrap().unwrap();
        let verifier = Verifier::new(
            stack.chain.clone(),
            stack.monitor.clone(),
            network_config(),
            VerifyConfig::default(),
        );
        let report = verifier
            .verify(&record, &manifest.names(), false)
            .await
            .unwrap();
        assert!(!report.passed);
        assert_eq!(
            report.with_status(VerificationStatus::Missing),
            vec!["dao-governance", "dex-pool", "oracle-feed"]
        );

        let resumed = orchestrator(dir.path(), &stack)
            .deploy(&plan, DeployMode::Sequential, false)
            .await
            .unwrap();
        assert_eq!(resumed.outcome(), DeploymentOutcome::Success);
        assert_eq!(resumed.already_deployed, vec!["sip-010-trait", "token"]);
        assert_eq!(resumed.successful.len(), 3);
        assert_eq!(stack.chain.submissions.load(Ordering::SeqCst), 5);

        let submitted: HashSet<String> =
            stack.chain.contracts.lock().unwrap().keys().cloned().collect();
        assert_eq!(submitted.len(), 5);
    }

    #[tokio::test]
    async fn dry_run_leaves_no_trace() {
        init_tracing();
        let dir = project();
        let (_, plan) = resolved(dir.path());
        let stack = stack(dir.path(), Arc::new(FakeChain::default()));

        let result = orchestrator(dir.path(), &stack)
            .deploy(&plan, DeployMode::Sequential, true)
            .await
            .unwrap();

        assert_eq!(result.outcome(), DeploymentOutcome::DryRun);
        assert_eq!(result.would_submit.len(), 5);
        assert_eq!(stack.chain.submissions.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join(".stacksorbit").exists());
    }
}
