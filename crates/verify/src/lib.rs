//! Post-deployment verification for Orbit.
//!
//! Compares a deployment record with the manifest's expected artifacts,
//! reads every confirmed contract's interface, and optionally checks the
//! deployer account, recorded addresses and node health.

pub mod error;
pub mod report;
pub mod verifier;

pub use error::VerifyError;
pub use report::{
    ArtifactVerification, CheckKind, CheckResult, VerificationReport, VerificationStatus,
    VerifyConfig,
};
pub use verifier::Verifier;
