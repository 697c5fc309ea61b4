//! Credential lifecycle: material discovery, external collaborator seams,
//! and the validation/recovery state machine.

pub mod material;
pub mod probe;
pub mod recovery;

pub use material::{discover, CredentialKind, CredentialMaterial};
pub use probe::{AnalyticsProbe, CredentialHealth, GaMetadataProbe, ProbeError, TokenManager};
pub use recovery::{
    categorize_error, quota_reset_horizon_ms, CredentialDiagnostics, CredentialRecoveryManager,
    ErrorKind, QuotaStatus, RecoveryOutcome, ValidationOutcome,
};
