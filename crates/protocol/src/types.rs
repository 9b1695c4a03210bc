use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{DEVNET_API_URL, MAINNET_API_URL, TESTNET_API_URL};

/// Unique artifact (contract) name within a manifest.
pub type ArtifactId = String;

/// Transaction identifier returned by the ledger on submission.
pub type TxId = String;

/// Target ledger network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl Network {
    /// Returns the lowercase network identifier used in records and file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
        }
    }

    /// Returns the default API endpoint for this network.
    pub fn default_api_url(&self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_API_URL,
            Network::Testnet => TESTNET_API_URL,
            Network::Devnet => DEVNET_API_URL,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown network name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown network: {0}")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "devnet" | "local" => Ok(Network::Devnet),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

/// Fully qualified contract identifier (`<deployer>.<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractId {
    pub deployer: String,
    pub name: String,
}

impl ContractId {
    pub fn new(deployer: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            deployer: deployer.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.deployer, self.name)
    }
}

/// Error returned when a contract identifier is not `<deployer>.<name>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid contract id: {0}")]
pub struct InvalidContractId(pub String);

impl FromStr for ContractId {
    type Err = InvalidContractId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((deployer, name)) if !deployer.is_empty() && !name.is_empty() => {
                Ok(ContractId::new(deployer, name))
            }
            _ => Err(InvalidContractId(s.to_string())),
        }
    }
}

impl TryFrom<String> for ContractId {
    type Error = InvalidContractId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContractId> for String {
    fn from(id: ContractId) -> Self {
        id.to_string()
    }
}

/// Closed set of artifact categories, declared in deployment priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Traits,
    Utilities,
    Tokens,
    Defi,
    Oracle,
    Dao,
    Security,
    Testing,
    General,
}

impl Category {
    /// All categories in priority order.
    pub const ALL: [Category; 9] = [
        Category::Traits,
        Category::Utilities,
        Category::Tokens,
        Category::Defi,
        Category::Oracle,
        Category::Dao,
        Category::Security,
        Category::Testing,
        Category::General,
    ];

    /// Tie-break priority; lower deploys first.
    pub fn priority(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Traits => "traits",
            Category::Utilities => "utilities",
            Category::Tokens => "tokens",
            Category::Defi => "defi",
            Category::Oracle => "oracle",
            Category::Dao => "dao",
            Category::Security => "security",
            Category::Testing => "testing",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// Lifecycle status of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pending,
    Queued,
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    Failed,
    Skipped,
}

impl ArtifactStatus {
    /// Returns true for states that are never left within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ArtifactStatus::Confirmed | ArtifactStatus::Failed | ArtifactStatus::Skipped
        )
    }

    /// Returns whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: ArtifactStatus) -> bool {
        use ArtifactStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Skipped)
                | (Queued, Submitting)
                | (Queued, Skipped)
                | (Queued, Failed)
                | (Submitting, AwaitingConfirmation)
                | (Submitting, Failed)
                | (AwaitingConfirmation, Confirmed)
                | (AwaitingConfirmation, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStatus::Pending => "pending",
            ArtifactStatus::Queued => "queued",
            ArtifactStatus::Submitting => "submitting",
            ArtifactStatus::AwaitingConfirmation => "awaiting_confirmation",
            ArtifactStatus::Confirmed => "confirmed",
            ArtifactStatus::Failed => "failed",
            ArtifactStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployable unit as declared by the manifest.
///
/// Lifecycle state (status, address, last transaction) lives in the
/// deployment record entry for the artifact, which only the orchestrator
/// writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    /// Source path relative to the project root, `/`-separated.
    pub source_path: String,
    pub category: Category,
    #[serde(default)]
    pub dependencies: BTreeSet<ArtifactId>,
}

impl Artifact {
    /// Creates an artifact with no dependencies.
    pub fn new(id: impl Into<ArtifactId>, source_path: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            source_path: source_path.into(),
            category,
            dependencies: BTreeSet::new(),
        }
    }

    /// Adds dependencies, builder style.
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ArtifactId>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }
}

/// On-chain account snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub address: String,
    /// Spendable balance in micro-units.
    pub balance: u64,
    #[serde(default)]
    pub locked: u64,
    pub nonce: u64,
}

/// Confirmation state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Pending,
    Success,
    AbortByResponse,
    AbortByPostCondition,
    Dropped,
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxState::Pending)
    }

    /// Maps a raw API status string (`tx_status`) to a state.
    ///
    /// All `dropped_*` variants collapse into [`TxState::Dropped`]; unknown
    /// values are treated as pending.
    pub fn from_api(raw: &str) -> Self {
        match raw {
            "success" => TxState::Success,
            "abort_by_response" => TxState::AbortByResponse,
            "abort_by_post_condition" => TxState::AbortByPostCondition,
            s if s.starts_with("dropped") => TxState::Dropped,
            _ => TxState::Pending,
        }
    }
}

/// Status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    pub tx_id: TxId,
    pub state: TxState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl TxStatus {
    pub fn pending(tx_id: impl Into<TxId>) -> Self {
        Self {
            tx_id: tx_id.into(),
            state: TxState::Pending,
            block_height: None,
            result: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == TxState::Success
    }
}
