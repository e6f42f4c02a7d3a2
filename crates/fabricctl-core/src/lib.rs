// fabricctl-core: Change-orchestration pipeline between fabricctl-api and the CLI.

mod cancel;
pub mod config;
pub mod deployer;
pub mod diff;
pub mod error;
pub mod inventory;
pub mod matcher;
pub mod model;
pub mod orchestrator;
pub mod policy_store;
pub mod predicates;
pub mod progress;
pub mod pusher;
pub mod status;
pub mod verify;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ControllerConfig, TlsVerification};
pub use deployer::{DeployJob, DeployReport, DeployState, DeployTarget, Deployer};
pub use diff::compute_change_set;
pub use error::CoreError;
pub use inventory::Inventory;
pub use matcher::{ConfigExtract, Extractor, Matcher, PolicyFilter, SharedMatcher, UnitFilter};
pub use orchestrator::{DeployMode, Orchestrator, RunOptions, RunReport};
pub use policy_store::PolicyStore;
pub use predicates::{
    ChangePredicate, PredicateConfig, PredicateContext, PredicateRegistry, Scope, UplinkTable,
};
pub use progress::ProgressSink;
pub use pusher::Pusher;
pub use status::{HttpStatusSource, StatusPoller, StatusSource, WaitOutcome};
pub use verify::{FieldMismatch, VerifyReport};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ChangeSet, ConfigUnit, OutcomeSet, PolicyRecord, Snapshot, SwitchRecord, SwitchRole, UnitKey,
    VpcPeer,
};
