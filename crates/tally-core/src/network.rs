//! Network type bitmask used by the flush policy.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// A network type, or a mask of network types when used as a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkType(u32);

impl NetworkType {
    pub const NONE: Self = Self(0);
    pub const TYPE_2G: Self = Self(1);
    pub const TYPE_3G: Self = Self(1 << 1);
    pub const TYPE_4G: Self = Self(1 << 2);
    pub const WIFI: Self = Self(1 << 3);
    pub const TYPE_5G: Self = Self(1 << 4);
    pub const ALL: Self = Self(0xFF);

    /// Default delivery policy: any cellular generation from 3G, or wifi.
    pub const DEFAULT_POLICY: Self = Self(Self::TYPE_3G.0 | Self::TYPE_4G.0 | Self::WIFI.0 | Self::TYPE_5G.0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether a policy mask admits the given current network.
    /// No connectivity is never admitted.
    pub fn allows(self, current: NetworkType) -> bool {
        current.0 != 0 && self.0 & current.0 != 0
    }

    /// Label reported as the `$network_type` property.
    pub fn label(self) -> &'static str {
        match self {
            Self::NONE => "NULL",
            Self::TYPE_2G => "2G",
            Self::TYPE_3G => "3G",
            Self::TYPE_4G => "4G",
            Self::WIFI => "WIFI",
            Self::TYPE_5G => "5G",
            _ => "UNKNOWN",
        }
    }
}

impl BitOr for NetworkType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for NetworkType {
    fn default() -> Self {
        Self::DEFAULT_POLICY
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_mask_checks_current_network() {
        let policy = NetworkType::WIFI | NetworkType::TYPE_4G;
        assert!(policy.allows(NetworkType::WIFI));
        assert!(policy.allows(NetworkType::TYPE_4G));
        assert!(!policy.allows(NetworkType::TYPE_2G));
        assert!(!NetworkType::ALL.allows(NetworkType::NONE));
    }
}
