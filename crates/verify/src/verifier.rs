//! Checks a deployment record against the manifest and the chain.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use orbit_deploy::DeploymentRecord;
use orbit_monitor::NetworkMonitor;
use orbit_protocol::{
    ArtifactId, ArtifactStatus, ConfigError, ContractId, LedgerClient, LedgerError,
    NetworkConfig, ReadOnlyQuery,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::VerifyError;
use crate::report::{
    ArtifactVerification, CheckKind, CheckResult, VerificationReport, VerificationStatus,
    VerifyConfig,
};

/// Verifies deployments for one network and deployer.
pub struct Verifier {
    ledger: Arc<dyn LedgerClient>,
    monitor: Arc<NetworkMonitor>,
    network: NetworkConfig,
    config: VerifyConfig,
}

impl Verifier {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        monitor: Arc<NetworkMonitor>,
        network: NetworkConfig,
        config: VerifyConfig,
    ) -> Self {
        Self {
            ledger,
            monitor,
            network,
            config,
        }
    }

    fn validate(&self, record: &DeploymentRecord) -> Result<(), ConfigError> {
        if self.network.deployer_address.trim().is_empty() {
            return Err(ConfigError::MissingDeployer);
        }
        if self.config.concurrency == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if record.network != self.network.network {
            return Err(ConfigError::InvalidSetting {
                name: "network",
                reason: format!(
                    "record is for {}, configuration targets {}",
                    record.network, self.network.network
                ),
            });
        }
        Ok(())
    }

    /// Verifies `record` against the `expected` artifact ids.
    ///
    /// Every confirmed artifact gets an interface check. With
    /// `comprehensive`, the deployer balance, recorded addresses and node
    /// health are checked as well.
    pub async fn verify(
        &self,
        record: &DeploymentRecord,
        expected: &[ArtifactId],
        comprehensive: bool,
    ) -> Result<VerificationReport, VerifyError> {
        self.validate(record)?;
        let deployer = self.network.deployer_address.clone();
        let expected: BTreeSet<ArtifactId> = expected.iter().cloned().collect();
        info!(
            network = %self.network.network,
            expected = expected.len(),
            comprehensive,
            "verification started"
        );

        let mut results: BTreeMap<ArtifactId, ArtifactVerification> = BTreeMap::new();
        let mut to_check: Vec<(ArtifactId, ContractId)> = Vec::new();

        for id in &expected {
            match record.entry(id) {
                Some(entry) if entry.status == ArtifactStatus::Confirmed => {
                    let address = entry
                        .address
                        .clone()
                        .unwrap_or_else(|| ContractId::new(deployer.clone(), id.clone()));
                    to_check.push((id.clone(), address));
                }
                Some(entry) => {
                    results.insert(
                        id.clone(),
                        ArtifactVerification {
                            id: id.clone(),
                            status: VerificationStatus::Missing,
                            address: entry.address.clone(),
                            detail: Some(format!("recorded as {}", entry.status)),
                        },
                    );
                }
                None => {
                    results.insert(
                        id.clone(),
                        ArtifactVerification {
                            id: id.clone(),
                            status: VerificationStatus::Missing,
                            address: None,
                            detail: Some("not in deployment record".into()),
                        },
                    );
                }
            }
        }
        for id in record.confirmed() {
            if !expected.contains(&id) {
                let address = record.entry(&id).and_then(|e| e.address.clone());
                results.insert(
                    id.clone(),
                    ArtifactVerification {
                        id,
                        status: VerificationStatus::Unexpected,
                        address,
                        detail: Some("confirmed but not in manifest".into()),
                    },
                );
            }
        }

        let checked = to_check.len();
        for verification in self.check_interfaces(to_check).await? {
            results.insert(verification.id.clone(), verification);
        }

        let verified = results
            .values()
            .filter(|r| r.status == VerificationStatus::Verified)
            .count();
        let interfaces_ok = results
            .values()
            .all(|r| !matches!(r.status, VerificationStatus::Missing | VerificationStatus::InterfaceFailed));
        let mut checks = vec![CheckResult {
            kind: CheckKind::ArtifactInterfaces,
            passed: interfaces_ok,
            detail: format!(
                "{verified}/{} expected artifacts verified, {checked} interfaces checked",
                expected.len()
            ),
        }];

        if comprehensive {
            checks.push(self.check_balance(&deployer).await);
            checks.push(self.check_addresses(&deployer, &mut results).await);
            checks.push(self.check_network_health().await);
        }

        let artifacts: Vec<ArtifactVerification> = results.into_values().collect();
        let passed = checks.iter().all(|c| c.passed)
            && artifacts.iter().all(|a| !a.status.is_failure());
        let recommendations = recommendations(&artifacts, &checks, &deployer);

        info!(passed, verified, artifacts = artifacts.len(), "verification finished");
        Ok(VerificationReport {
            network: self.network.network,
            deployer,
            timestamp: Utc::now(),
            artifacts,
            checks,
            passed,
            recommendations,
        })
    }

    /// Reads each contract's interface on a bounded pool.
    async fn check_interfaces(
        &self,
        contracts: Vec<(ArtifactId, ContractId)>,
    ) -> Result<Vec<ArtifactVerification>, VerifyError> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();

        for (id, address) in contracts {
            let ledger = Arc::clone(&self.ledger);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| VerifyError::Task(e.to_string()))?;
                let query = ReadOnlyQuery::interface(address.clone());
                let (status, detail) = match ledger.call_read_only(&query).await {
                    Ok(interface) => {
                        let functions = interface
                            .get("functions")
                            .and_then(|f| f.as_array())
                            .map(Vec::len)
                            .unwrap_or(0);
                        debug!(artifact = %id, functions, "interface verified");
                        (
                            VerificationStatus::Verified,
                            Some(format!("{functions} functions")),
                        )
                    }
                    Err(LedgerError::NotFound(_)) => {
                        warn!(artifact = %id, %address, "contract not found on chain");
                        (
                            VerificationStatus::InterfaceFailed,
                            Some("contract not found on chain".into()),
                        )
                    }
                    Err(e) => {
                        warn!(artifact = %id, error = %e, "interface check failed");
                        (VerificationStatus::InterfaceFailed, Some(e.to_string()))
                    }
                };
                Ok::<_, VerifyError>(ArtifactVerification {
                    id,
                    status,
                    address: Some(address),
                    detail,
                })
            });
        }

        let mut verifications = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let verification = joined.map_err(|e| VerifyError::Task(e.to_string()))??;
            verifications.push(verification);
        }
        Ok(verifications)
    }

    async fn check_balance(&self, deployer: &str) -> CheckResult {
        let min = self.config.min_balance;
        match self.monitor.query_account(deployer, true).await {
            Ok(account) => CheckResult {
                kind: CheckKind::AccountBalance,
                passed: account.balance >= min,
                detail: format!(
                    "balance {} micro-units, minimum {min}, nonce {}",
                    account.balance, account.nonce
                ),
            },
            Err(e) => CheckResult {
                kind: CheckKind::AccountBalance,
                passed: false,
                detail: format!("could not read account: {e}"),
            },
        }
    }

    /// Recorded addresses must be `<deployer>.<name>` and listed on chain.
    /// Mismatching artifacts are downgraded in `results`.
    async fn check_addresses(
        &self,
        deployer: &str,
        results: &mut BTreeMap<ArtifactId, ArtifactVerification>,
    ) -> CheckResult {
        let on_chain: BTreeSet<ContractId> =
            match self.monitor.query_deployed_contracts(deployer, true).await {
                Ok(contracts) => contracts.into_iter().collect(),
                Err(e) => {
                    return CheckResult {
                        kind: CheckKind::AddressConsistency,
                        passed: false,
                        detail: format!("could not list deployed contracts: {e}"),
                    };
                }
            };

        let mut mismatched = 0;
        let mut checked = 0;
        for verification in results.values_mut() {
            if verification.status != VerificationStatus::Verified {
                continue;
            }
            checked += 1;
            let wanted = ContractId::new(deployer, verification.id.clone());
            let problem = match &verification.address {
                Some(address) if *address != wanted => {
                    Some(format!("recorded address {address}, expected {wanted}"))
                }
                _ if !on_chain.contains(&wanted) => {
                    Some(format!("{wanted} not listed for deployer"))
                }
                _ => None,
            };
            if let Some(problem) = problem {
                warn!(artifact = %verification.id, %problem, "address mismatch");
                mismatched += 1;
                verification.status = VerificationStatus::AddressMismatch;
                verification.detail = Some(problem);
            }
        }

        CheckResult {
            kind: CheckKind::AddressConsistency,
            passed: mismatched == 0,
            detail: format!("{mismatched} of {checked} addresses inconsistent"),
        }
    }

    async fn check_network_health(&self) -> CheckResult {
        match self.monitor.network_info(true).await {
            Ok(info) => CheckResult {
                kind: CheckKind::NetworkHealth,
                passed: info.block_height > 0,
                detail: format!("block height {}", info.block_height),
            },
            Err(e) => CheckResult {
                kind: CheckKind::NetworkHealth,
                passed: false,
                detail: format!("node unreachable: {e}"),
            },
        }
    }
}

fn recommendations(
    artifacts: &[ArtifactVerification],
    checks: &[CheckResult],
    deployer: &str,
) -> Vec<String> {
    let ids = |status: VerificationStatus| -> Vec<&str> {
        artifacts
            .iter()
            .filter(|a| a.status == status)
            .map(|a| a.id.as_str())
            .collect()
    };
    let failed = |kind: CheckKind| checks.iter().any(|c| c.kind == kind && !c.passed);

    let mut out = Vec::new();
    if failed(CheckKind::NetworkHealth) {
        out.push("Wait for network stability before continuing".to_string());
    }
    if failed(CheckKind::AccountBalance) {
        out.push(format!("Fund deployer account {deployer}"));
    }
    let missing = ids(VerificationStatus::Missing);
    if !missing.is_empty() {
        out.push(format!("Deploy missing artifacts: {}", missing.join(", ")));
    }
    let broken = ids(VerificationStatus::InterfaceFailed);
    if !broken.is_empty() {
        out.push(format!("Investigate failing interfaces: {}", broken.join(", ")));
    }
    let mismatched = ids(VerificationStatus::AddressMismatch);
    if !mismatched.is_empty() {
        out.push(format!(
            "Reconcile recorded addresses with the chain: {}",
            mismatched.join(", ")
        ));
    }
    let unexpected = ids(VerificationStatus::Unexpected);
    if !unexpected.is_empty() {
        out.push(format!(
            "Review record entries missing from the manifest: {}",
            unexpected.join(", ")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_deploy::RecordEntry;
    use orbit_monitor::MonitorConfig;
    use orbit_protocol::{
        AccountState, Artifact, Credential, LedgerFuture, Network, NetworkInfo, TxId, TxStatus,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DEPLOYER: &str = "ST1DEPLOYER";

    struct ChainStub {
        /// Interface latency per contract name.
        delays: Mutex<HashMap<String, Duration>>,
        /// Contracts whose interface fetch returns not found.
        absent: Mutex<BTreeSet<String>>,
        deployed: Mutex<Vec<ContractId>>,
        balance: u64,
        account_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ChainStub {
        fn new(balance: u64) -> Self {
            Self {
                delays: Mutex::new(HashMap::new()),
                absent: Mutex::new(BTreeSet::new()),
                deployed: Mutex::new(Vec::new()),
                balance,
                account_calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn deploy(&self, names: &[&str]) {
            let mut deployed = self.deployed.lock().unwrap();
            deployed.extend(names.iter().map(|n| ContractId::new(DEPLOYER, *n)));
        }
    }

    impl LedgerClient for ChainStub {
        fn network(&self) -> Network {
            Network::Devnet
        }

        fn submit<'a>(
            &'a self,
            _artifact: &'a Artifact,
            _source: &'a str,
            _credential: &'a Credential,
        ) -> LedgerFuture<'a, TxId> {
            Box::pin(async { Err(LedgerError::Rejected { reason: "read only".into() }) })
        }

        fn get_account<'a>(&'a self, address: &'a str) -> LedgerFuture<'a, AccountState> {
            self.account_calls.fetch_add(1, Ordering::SeqCst);
            let balance = self.balance;
            Box::pin(async move {
                Ok(AccountState {
                    address: address.to_string(),
                    balance,
                    locked: 0,
                    nonce: 4,
                })
            })
        }

        fn get_transaction<'a>(&'a self, tx_id: &'a str) -> LedgerFuture<'a, TxStatus> {
            Box::pin(async move { Err(LedgerError::NotFound(tx_id.to_string())) })
        }

        fn call_read_only<'a>(
            &'a self,
            query: &'a ReadOnlyQuery,
        ) -> LedgerFuture<'a, serde_json::Value> {
            Box::pin(async move {
                let name = query.contract.name.clone();
                let delay = self.delays.lock().unwrap().get(&name).copied();
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                if self.absent.lock().unwrap().contains(&name) {
                    return Err(LedgerError::NotFound(query.contract.to_string()));
                }
                Ok(serde_json::json!({
                    "functions": [{"name": "get-owner"}, {"name": "transfer"}],
                    "variables": [],
                }))
            })
        }

        fn get_deployed_contracts<'a>(
            &'a self,
            _address: &'a str,
        ) -> LedgerFuture<'a, Vec<ContractId>> {
            let deployed = self.deployed.lock().unwrap().clone();
            Box::pin(async move { Ok(deployed) })
        }

        fn get_network_info(&self) -> LedgerFuture<'_, NetworkInfo> {
            Box::pin(async {
                Ok(NetworkInfo {
                    network_id: 2147483648,
                    block_height: 120,
                    server_version: None,
                })
            })
        }
    }

    fn verifier(chain: &Arc<ChainStub>, config: VerifyConfig) -> Verifier {
        let monitor = Arc::new(NetworkMonitor::new(chain.clone(), MonitorConfig::default()));
        Verifier::new(
            chain.clone(),
            monitor,
            NetworkConfig::new(Network::Devnet, DEPLOYER, Credential::default()),
            config,
        )
    }

    fn record(entries: &[(&str, ArtifactStatus)]) -> DeploymentRecord {
        let mut record = DeploymentRecord::new(Network::Devnet, DEPLOYER);
        for (id, status) in entries {
            let mut entry = RecordEntry::pending();
            entry.status = *status;
            if *status == ArtifactStatus::Confirmed {
                entry.address = Some(ContractId::new(DEPLOYER, *id));
            }
            record.artifacts.insert(id.to_string(), entry);
        }
        record
    }

    fn ids(report: &VerificationReport) -> Vec<String> {
        report.artifacts.iter().map(|a| a.id.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn results_are_sorted_regardless_of_completion_order() {
        let chain = Arc::new(ChainStub::new(u64::MAX));
        let names: Vec<String> = (0..12).map(|i| format!("contract-{i:02}")).collect();
        {
            let mut delays = chain.delays.lock().unwrap();
            for (i, name) in names.iter().enumerate() {
                // scrambled latencies, later names often finish first
                let ms = ((i * 37 + 11) % 13) as u64 * 15;
                delays.insert(name.clone(), Duration::from_millis(ms));
            }
        }
        let entries: Vec<(&str, ArtifactStatus)> = names
            .iter()
            .map(|n| (n.as_str(), ArtifactStatus::Confirmed))
            .collect();
        let record = record(&entries);
        let verifier = verifier(
            &chain,
            VerifyConfig {
                concurrency: 3,
                ..VerifyConfig::default()
            },
        );

        let first = verifier.verify(&record, &names, false).await.unwrap();
        let second = verifier.verify(&record, &names, false).await.unwrap();

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(ids(&first), sorted);
        assert_eq!(ids(&first), ids(&second));
        assert!(first.passed);
        assert_eq!(first.with_status(VerificationStatus::Verified).len(), 12);
        assert!(chain.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(first.artifact("contract-03").unwrap().detail.as_deref(), Some("2 functions"));
    }

    #[tokio::test]
    async fn missing_and_unexpected_are_reported() {
        let chain = Arc::new(ChainStub::new(u64::MAX));
        let record = record(&[
            ("alpha", ArtifactStatus::Confirmed),
            ("beta", ArtifactStatus::Failed),
            ("legacy", ArtifactStatus::Confirmed),
        ]);
        let expected = vec!["alpha".to_string(), "beta".into(), "gamma".into()];

        let report = verifier(&chain, VerifyConfig::default())
            .verify(&record, &expected, false)
            .await
            .unwrap();

        assert_eq!(ids(&report), vec!["alpha", "beta", "gamma", "legacy"]);
        assert_eq!(report.artifact("alpha").unwrap().status, VerificationStatus::Verified);
        assert_eq!(report.with_status(VerificationStatus::Missing), vec!["beta", "gamma"]);
        assert_eq!(
            report.artifact("beta").unwrap().detail.as_deref(),
            Some("recorded as failed")
        );
        assert_eq!(report.with_status(VerificationStatus::Unexpected), vec!["legacy"]);
        assert!(!report.passed);
        assert_eq!(report.checks.len(), 1);
        assert!(
            report
                .recommendations
                .contains(&"Deploy missing artifacts: beta, gamma".to_string())
        );
        assert_eq!(chain.account_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreadable_interface_fails_verification() {
        let chain = Arc::new(ChainStub::new(u64::MAX));
        chain.absent.lock().unwrap().insert("alpha".into());
        let record = record(&[
            ("alpha", ArtifactStatus::Confirmed),
            ("beta", ArtifactStatus::Confirmed),
        ]);
        let expected = vec!["alpha".to_string(), "beta".into()];

        let report = verifier(&chain, VerifyConfig::default())
            .verify(&record, &expected, false)
            .await
            .unwrap();

        let alpha = report.artifact("alpha").unwrap();
        assert_eq!(alpha.status, VerificationStatus::InterfaceFailed);
        assert_eq!(alpha.detail.as_deref(), Some("contract not found on chain"));
        assert!(!report.check(CheckKind::ArtifactInterfaces).unwrap().passed);
        assert!(!report.passed);
        assert_eq!(
            report.recommendations,
            vec!["Investigate failing interfaces: alpha".to_string()]
        );
    }

    #[tokio::test]
    async fn comprehensive_checks_pass_for_healthy_deployment() {
        let chain = Arc::new(ChainStub::new(5_000_000));
        chain.deploy(&["alpha", "beta"]);
        let record = record(&[
            ("alpha", ArtifactStatus::Confirmed),
            ("beta", ArtifactStatus::Confirmed),
        ]);
        let expected = vec!["alpha".to_string(), "beta".into()];

        let report = verifier(&chain, VerifyConfig::default())
            .verify(&record, &expected, true)
            .await
            .unwrap();

        assert!(report.passed, "{report:?}");
        assert_eq!(report.checks.len(), 4);
        assert!(report.recommendations.is_empty());
        assert_eq!(chain.account_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn comprehensive_checks_flag_balance_and_addresses() {
        let chain = Arc::new(ChainStub::new(999_999));
        chain.deploy(&["alpha", "gamma"]);
        let mut record = record(&[
            ("alpha", ArtifactStatus::Confirmed),
            ("beta", ArtifactStatus::Confirmed),
            ("gamma", ArtifactStatus::Confirmed),
        ]);
        record.artifacts.get_mut("alpha").unwrap().address =
            Some(ContractId::new("ST2SOMEONE", "alpha"));
        let expected = vec!["alpha".to_string(), "beta".into(), "gamma".into()];

        let report = verifier(&chain, VerifyConfig::default())
            .verify(&record, &expected, true)
            .await
            .unwrap();

        assert!(!report.passed);
        assert!(!report.check(CheckKind::AccountBalance).unwrap().passed);
        let addresses = report.check(CheckKind::AddressConsistency).unwrap();
        assert!(!addresses.passed);
        assert_eq!(addresses.detail, "2 of 3 addresses inconsistent");
        assert_eq!(
            report.with_status(VerificationStatus::AddressMismatch),
            vec!["alpha", "beta"]
        );
        assert_eq!(report.artifact("gamma").unwrap().status, VerificationStatus::Verified);
        assert_eq!(
            report.recommendations,
            vec![
                format!("Fund deployer account {DEPLOYER}"),
                "Reconcile recorded addresses with the chain: alpha, beta".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_configuration_is_rejected() {
        let chain = Arc::new(ChainStub::new(0));
        let expected = vec!["alpha".to_string()];

        let zero = verifier(
            &chain,
            VerifyConfig {
                concurrency: 0,
                ..VerifyConfig::default()
            },
        );
        let err = zero
            .verify(&record(&[]), &expected, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Config(ConfigError::InvalidSetting { name: "concurrency", .. })
        ));

        let other_network = DeploymentRecord::new(Network::Mainnet, DEPLOYER);
        let err = verifier(&chain, VerifyConfig::default())
            .verify(&other_network, &expected, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Config(ConfigError::InvalidSetting { name: "network", .. })
        ));
    }
}
