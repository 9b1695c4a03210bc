//! Verification configuration and report types.

use std::fmt;

use chrono::{DateTime, Utc};
use orbit_protocol::constants::MICRO_PER_STX;
use orbit_protocol::{ArtifactId, ContractId, Network};
use serde::{Deserialize, Serialize};

/// Verifier settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Interface checks in flight at once.
    pub concurrency: usize,
    /// Minimum deployer balance, in micro-units, for the balance check.
    pub min_balance: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            min_balance: MICRO_PER_STX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Confirmed in the record and its interface answers.
    Verified,
    /// Expected but not confirmed in the record.
    Missing,
    /// Confirmed in the record but not expected.
    Unexpected,
    /// Confirmed in the record but its interface could not be read.
    InterfaceFailed,
    /// Recorded address disagrees with the deployer or the chain.
    AddressMismatch,
}

impl VerificationStatus {
    /// Whether this status fails the report. `Unexpected` only warns.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Missing
                | VerificationStatus::InterfaceFailed
                | VerificationStatus::AddressMismatch
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactVerification {
    pub id: ArtifactId,
    pub status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<ContractId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    ArtifactInterfaces,
    AccountBalance,
    AddressConsistency,
    NetworkHealth,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckKind::ArtifactInterfaces => "artifact interfaces",
            CheckKind::AccountBalance => "account balance",
            CheckKind::AddressConsistency => "address consistency",
            CheckKind::NetworkHealth => "network health",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub passed: bool,
    pub detail: String,
}

/// Outcome of [`Verifier::verify`](crate::Verifier::verify).
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub network: Network,
    pub deployer: String,
    pub timestamp: DateTime<Utc>,
    /// Sorted by artifact id.
    pub artifacts: Vec<ArtifactVerification>,
    pub checks: Vec<CheckResult>,
    pub passed: bool,
    pub recommendations: Vec<String>,
}

impl VerificationReport {
    pub fn artifact(&self, id: &str) -> Option<&ArtifactVerification> {
        self.artifacts.iter().find(|a| a.id == id)
    }

    pub fn check(&self, kind: CheckKind) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.kind == kind)
    }

    /// Ids with the given status, in report order.
    pub fn with_status(&self, status: VerificationStatus) -> Vec<ArtifactId> {
        self.artifacts
            .iter()
            .filter(|a| a.status == status)
            .map(|a| a.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_snake_case() {
        let report = VerificationReport {
            network: Network::Testnet,
            deployer: "ST1".into(),
            timestamp: Utc::now(),
            artifacts: vec![ArtifactVerification {
                id: "token".into(),
                status: VerificationStatus::InterfaceFailed,
                address: Some(ContractId::new("ST1", "token")),
                detail: None,
            }],
            checks: vec![CheckResult {
                kind: CheckKind::ArtifactInterfaces,
                passed: false,
                detail: "0/1 verified".into(),
            }],
            passed: false,
            recommendations: Vec::new(),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["artifacts"][0]["status"], "interface_failed");
        assert_eq!(json["artifacts"][0]["address"], "ST1.token");
        assert_eq!(json["checks"][0]["kind"], "artifact_interfaces");
        assert!(json["artifacts"][0].get("detail").is_none());
    }

    #[test]
    fn unexpected_only_warns() {
        assert!(!VerificationStatus::Unexpected.is_failure());
        assert!(!VerificationStatus::Verified.is_failure());
        assert!(VerificationStatus::Missing.is_failure());
    }

    #[test]
    fn config_defaults_to_one_stx() {
        let config: VerifyConfig = serde_json::from_str(r#"{"concurrency": 2}"#).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.min_balance, 1_000_000);
    }
}
