//! Partition type names and their on-disk representations.
//!
//! GPT identifies partition roles by type GUID, MBR by a one-byte type code.
//! The GUIDs below are the ones defined by the UEFI specification and the
//! Discoverable Partitions Specification, so bootloaders recognize them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Symbolic partition roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum PartitionType {
    Linux,
    Bios,
    Esp,
    Xbootldr,
    LinuxRoot,
    LinuxSwap,
    LinuxHome,
    LinuxSrv,
    LinuxVar,
    LinuxTmp,
    LinuxLvm,
    LinuxRaid,
    LinuxLuks,
    LinuxDmCrypt,
}

impl PartitionType {
    pub const ALL: [PartitionType; 14] = [
        PartitionType::Linux,
        PartitionType::Bios,
        PartitionType::Esp,
        PartitionType::Xbootldr,
        PartitionType::LinuxRoot,
        PartitionType::LinuxSwap,
        PartitionType::LinuxHome,
        PartitionType::LinuxSrv,
        PartitionType::LinuxVar,
        PartitionType::LinuxTmp,
        PartitionType::LinuxLvm,
        PartitionType::LinuxRaid,
        PartitionType::LinuxLuks,
        PartitionType::LinuxDmCrypt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PartitionType::Linux => "linux",
            PartitionType::Bios => "bios",
            PartitionType::Esp => "esp",
            PartitionType::Xbootldr => "xbootldr",
            PartitionType::LinuxRoot => "linux-root",
            PartitionType::LinuxSwap => "linux-swap",
            PartitionType::LinuxHome => "linux-home",
            PartitionType::LinuxSrv => "linux-srv",
            PartitionType::LinuxVar => "linux-var",
            PartitionType::LinuxTmp => "linux-tmp",
            PartitionType::LinuxLvm => "linux-lvm",
            PartitionType::LinuxRaid => "linux-raid",
            PartitionType::LinuxLuks => "linux-luks",
            PartitionType::LinuxDmCrypt => "linux-dm-crypt",
        }
    }

    /// GPT type GUID for this role. Root is the x86-64 root GUID.
    pub fn guid(self) -> Uuid {
        match self {
            PartitionType::Linux => Uuid::from_u128(0x0fc63daf_8483_4772_8e79_3d69d8477de4),
            PartitionType::Bios => Uuid::from_u128(0x21686148_6449_6e6f_744e_656564454649),
            PartitionType::Esp => Uuid::from_u128(0xc12a7328_f81f_11d2_ba4b_00a0c93ec93b),
            PartitionType::Xbootldr => Uuid::from_u128(0xbc13c2ff_59e6_4262_a352_b275fd6f7172),
            PartitionType::LinuxRoot => Uuid::from_u128(0x4f68bce3_e8cd_4db1_96e7_fbcaf984b709),
            PartitionType::LinuxSwap => Uuid::from_u128(0x0657fd6d_a4ab_43c4_84e5_0933c84b4f4f),
            PartitionType::LinuxHome => Uuid::from_u128(0x933ac7e1_2eb4_4f13_b844_0e14e2aef915),
            PartitionType::LinuxSrv => Uuid::from_u128(0x3b8f8425_20e0_4f3b_907f_1a25a76f98e8),
            PartitionType::LinuxVar => Uuid::from_u128(0x4d21b016_b534_45c2_a9fb_5c16e091fd2d),
            PartitionType::LinuxTmp => Uuid::from_u128(0x7ec6f557_3bc5_4aca_b293_16ef5df639d1),
            PartitionType::LinuxLvm => Uuid::from_u128(0xe6d6d379_f507_44c2_a23c_238f2a3df928),
            PartitionType::LinuxRaid => Uuid::from_u128(0xa19d880f_05fc_4d3b_a006_743f0f84911e),
            PartitionType::LinuxLuks => Uuid::from_u128(0xca7d7ccb_63ed_4c53_861c_1742536059cc),
            PartitionType::LinuxDmCrypt => Uuid::from_u128(0x7ffec5c9_2d00_49b7_8941_3ea10a5586b7),
        }
    }

    pub fn from_guid(guid: &Uuid) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.guid() == *guid)
    }
}

impl FromStr for PartitionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Older templates spell the root role with its architecture.
        if s == "linux-root-amd64" {
            return Ok(PartitionType::LinuxRoot);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| ValidationError::UnknownTypeName(s.to_string()))
    }
}

impl TryFrom<String> for PartitionType {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PartitionType> for String {
    fn from(t: PartitionType) -> String {
        t.name().to_string()
    }
}

impl fmt::Display for PartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Symbolic name to GPT type GUID.
pub fn type_name_to_guid(name: &str) -> Result<Uuid, ValidationError> {
    Ok(name.parse::<PartitionType>()?.guid())
}

/// GPT type GUID (any case) to symbolic name.
pub fn guid_to_type_name(guid: &str) -> Result<&'static str, ValidationError> {
    Uuid::parse_str(guid)
        .ok()
        .and_then(|g| PartitionType::from_guid(&g))
        .map(PartitionType::name)
        .ok_or_else(|| ValidationError::UnknownTypeGuid(guid.to_string()))
}

/// MBR type codes written by this engine.
pub mod mbr {
    pub const EXTENDED: u8 = 0x05;
    pub const LINUX_SWAP: u8 = 0x82;
    pub const LINUX: u8 = 0x83;
}

/// The type a planned partition carries on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    /// GPT type GUID. `None` leaves the tool default (generic Linux data).
    Gpt(Option<Uuid>),
    Mbr(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esp_guid() {
        assert_eq!(
            type_name_to_guid("esp").unwrap().to_string(),
            "c12a7328-f81f-11d2-ba4b-00a0c93ec93b"
        );
    }

    #[test]
    fn test_every_type_round_trips() {
        for t in PartitionType::ALL {
            let guid = t.guid().to_string();
            assert_eq!(guid_to_type_name(&guid).unwrap(), t.name());
            assert_eq!(t.name().parse::<PartitionType>().unwrap(), t);
        }
    }

    #[test]
    fn test_guids_are_unique() {
        let mut guids: Vec<_> = PartitionType::ALL.iter().map(|t| t.guid()).collect();
        guids.sort();
        guids.dedup();
        assert_eq!(guids.len(), PartitionType::ALL.len());
    }

    #[test]
    fn test_guid_lookup_is_case_insensitive() {
        assert_eq!(
            guid_to_type_name("C12A7328-F81F-11D2-BA4B-00A0C93EC93B").unwrap(),
            "esp"
        );
    }

    #[test]
    fn test_unknown_name_and_guid() {
        assert_eq!(
            type_name_to_guid("windows-basic"),
            Err(ValidationError::UnknownTypeName("windows-basic".into()))
        );
        assert!(matches!(
            guid_to_type_name("ebd0a0a2-b9e5-4433-87c0-68b6b72699c7"),
            Err(ValidationError::UnknownTypeGuid(_))
        ));
        assert!(guid_to_type_name("not-a-guid").is_err());
    }

    #[test]
    fn test_root_alias() {
        assert_eq!(
            "linux-root-amd64".parse::<PartitionType>().unwrap(),
            PartitionType::LinuxRoot
        );
    }
}
