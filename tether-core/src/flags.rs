//! Packed permission and state flag sets.
//!
//! Every small bitmask in the model is a named flag type so the resolver never
//! compares raw integers. All of them serialize as their raw bits.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// Manual serde implementation (bitflags 2.x + serde), bits on the wire.
macro_rules! impl_bits_serde {
    ($name:ident, $bits:ty) => {
        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.bits().serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let bits = <$bits>::deserialize(deserializer)?;
                Self::from_bits(bits).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        concat!("invalid ", stringify!($name), " bits: {:#x}"),
                        bits
                    ))
                })
            }
        }
    };
}

bitflags! {
    /// Puppeteer request kinds a partner may trigger.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PuppetPerms: u8 {
        /// Sit / ground-sit requests
        const SIT = 0b0000_0001;
        /// Emote requests
        const EMOTES = 0b0000_0010;
        /// Alias (macro) requests
        const ALIAS = 0b0000_0100;
        /// Any command text
        const ALL = 0b0000_1000;
    }
}

impl PuppetPerms {
    /// `ALL` covers every narrower request kind.
    pub fn permits(&self, needed: PuppetPerms) -> bool {
        self.contains(PuppetPerms::ALL) || self.contains(needed)
    }
}

bitflags! {
    /// Mood-effect application rights.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MoodlePerms: u8 {
        const POSITIVE = 0b0000_0001;
        const NEGATIVE = 0b0000_0010;
        const SPECIAL = 0b0000_0100;
        /// Partner may apply effects from their own library
        const APPLY_OWN = 0b0000_1000;
        /// Partner may apply effects from the wearer's library
        const APPLY_THEIRS = 0b0001_0000;
        /// Effects without expiry
        const PERMANENT = 0b0010_0000;
        const REMOVE = 0b0100_0000;
    }
}

bitflags! {
    /// Chat channels the garbler applies to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GarbleChannels: u32 {
        const SAY = 1 << 0;
        const YELL = 1 << 1;
        const SHOUT = 1 << 2;
        const TELL = 1 << 3;
        const PARTY = 1 << 4;
        const ALLIANCE = 1 << 5;
        const FREE_COMPANY = 1 << 6;
        const NOVICE_NETWORK = 1 << 7;
        const LINKSHELL = 1 << 8;
        const CROSSWORLD_LINKSHELL = 1 << 9;
        const PVP_TEAM = 1 << 10;
        const EMOTE = 1 << 11;
    }
}

bitflags! {
    /// Active sub-layers of a restraint set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RestraintLayers: u8 {
        const LAYER_1 = 0b0000_0001;
        const LAYER_2 = 0b0000_0010;
        const LAYER_3 = 0b0000_0100;
        const LAYER_4 = 0b0000_1000;
        const LAYER_5 = 0b0001_0000;
    }
}

bitflags! {
    /// Collar fields an editor may change.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CollarAccess: u8 {
        const VISUALS = 0b0000_0001;
        const DYES = 0b0000_0010;
        const MOODLE = 0b0000_0100;
        const WRITING = 0b0000_1000;
        const PADLOCK = 0b0001_0000;
        /// Manage the owner list
        const OWNERS = 0b0010_0000;
    }
}

impl_bits_serde!(PuppetPerms, u8);
impl_bits_serde!(MoodlePerms, u8);
impl_bits_serde!(GarbleChannels, u32);
impl_bits_serde!(RestraintLayers, u8);
impl_bits_serde!(CollarAccess, u8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_puppet_all_permits_everything() {
        let granted = PuppetPerms::ALL;
        assert!(granted.permits(PuppetPerms::SIT));
        assert!(granted.permits(PuppetPerms::ALIAS | PuppetPerms::EMOTES));

        let sit_only = PuppetPerms::SIT;
        assert!(sit_only.permits(PuppetPerms::SIT));
        assert!(!sit_only.permits(PuppetPerms::EMOTES));
    }

    #[test]
    fn test_flags_serialize_as_bits() {
        let access = CollarAccess::VISUALS | CollarAccess::WRITING;
        assert_eq!(serde_json::to_string(&access).unwrap(), "9");

        let parsed: CollarAccess = serde_json::from_str("9").unwrap();
        assert_eq!(parsed, access);
    }

    #[test]
    fn test_flags_reject_unknown_bits() {
        assert!(serde_json::from_str::<RestraintLayers>("255").is_err());
        assert!(serde_json::from_str::<PuppetPerms>("16").is_err());
    }
}
