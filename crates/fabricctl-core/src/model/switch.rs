// ── Switch domain types ──

use serde::{Deserialize, Serialize};

/// Fabric role, collapsed to the only distinction the pipeline uses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SwitchRole {
    Leaf,
    Other,
}

impl SwitchRole {
    /// Normalize a controller role string (`"leaf"`, `"spine"`, `"border gateway"` ...).
    pub fn from_controller(role: &str) -> Self {
        if role.trim().eq_ignore_ascii_case("leaf") {
            Self::Leaf
        } else {
            Self::Other
        }
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, Self::Leaf)
    }
}

/// VPC pairing as known to inventory.
///
/// `Unchecked` means the controller has not been asked yet; `Unpaired`
/// means it was asked and the switch has no peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "serial", rename_all = "snake_case")]
pub enum VpcPeer {
    #[default]
    Unchecked,
    Unpaired,
    Paired(String),
}

impl VpcPeer {
    pub fn serial(&self) -> Option<&str> {
        match self {
            Self::Paired(serial) => Some(serial),
            Self::Unchecked | Self::Unpaired => None,
        }
    }

    pub fn is_checked(&self) -> bool {
        !matches!(self, Self::Unchecked)
    }
}

/// One switch as discovered from the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchRecord {
    pub serial_number: String,
    pub role: SwitchRole,
    pub fabric_name: String,
    /// Hardware model (e.g. `N9K-C93180YC-EX`), when known.
    pub model: Option<String>,
    /// Logical host name, when known.
    pub name: Option<String>,
    pub peer: VpcPeer,
}

impl SwitchRecord {
    pub fn new(
        serial_number: impl Into<String>,
        role: SwitchRole,
        fabric_name: impl Into<String>,
    ) -> Self {
        Self {
            serial_number: serial_number.into(),
            role,
            fabric_name: fabric_name.into(),
            model: None,
            name: None,
            peer: VpcPeer::Unchecked,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.role.is_leaf()
    }
}
