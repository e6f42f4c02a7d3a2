// ── Domain model ──
//
// Records owned by inventory and the policy store, plus the change-set,
// snapshot, and outcome types that flow between pipeline stages.

pub mod change;
pub mod interface;
pub mod outcome;
pub mod policy;
pub mod switch;
pub mod unit;

pub use change::{ChangeSet, Snapshot};
pub use outcome::OutcomeSet;
pub use policy::PolicyRecord;
pub use switch::{SwitchRecord, SwitchRole, VpcPeer};
pub use unit::{ConfigUnit, UnitKey};
