use serde::Deserialize;
use serde::Serialize;
use std::str::FromStr;

use crate::Error;

/// Hardware variant of an RSP, as reported by device enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HwVersion {
    Rsp1,
    #[default]
    Rsp1a,
    Rsp1b,
    Rsp2,
    RspDuo,
    RspDx,
    RspDxR2,
    Unknown(u8),
}

impl HwVersion {
    /// Numeric hardware id used by the control library.
    pub fn id(&self) -> u8 {
        match *self {
            HwVersion::Rsp1 => 1,
            HwVersion::Rsp2 => 2,
            HwVersion::RspDuo => 3,
            HwVersion::RspDx => 4,
            HwVersion::Rsp1b => 6,
            HwVersion::RspDxR2 => 7,
            HwVersion::Rsp1a => 255,
            HwVersion::Unknown(id) => id,
        }
    }

    /// Highest LNA state index of the variant.
    pub fn max_lna_state(&self) -> u8 {
        match *self {
            HwVersion::Rsp1 => 3,
            HwVersion::Rsp2 => 8,
            HwVersion::RspDuo => 9,
            HwVersion::RspDx | HwVersion::RspDxR2 => 27,
            HwVersion::Rsp1a | HwVersion::Rsp1b | HwVersion::Unknown(_) => 9,
        }
    }
}

impl From<u8> for HwVersion {
    fn from(id: u8) -> Self {
        match id {
            1 => HwVersion::Rsp1,
            2 => HwVersion::Rsp2,
            3 => HwVersion::RspDuo,
            4 => HwVersion::RspDx,
            6 => HwVersion::Rsp1b,
            7 => HwVersion::RspDxR2,
            255 => HwVersion::Rsp1a,
            id => HwVersion::Unknown(id),
        }
    }
}

impl FromStr for HwVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rsp1" => Ok(HwVersion::Rsp1),
            "rsp1a" => Ok(HwVersion::Rsp1a),
            "rsp1b" => Ok(HwVersion::Rsp1b),
            "rsp2" => Ok(HwVersion::Rsp2),
            "rspduo" => Ok(HwVersion::RspDuo),
            "rspdx" => Ok(HwVersion::RspDx),
            "rspdxr2" => Ok(HwVersion::RspDxR2),
            other => other
                .parse::<u8>()
                .map(HwVersion::from)
                .or(Err(Error::ValueError)),
        }
    }
}

impl std::fmt::Display for HwVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Tuner selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TunerSelect {
    Neither,
    #[default]
    A,
    B,
    Both,
}

impl TunerSelect {
    pub fn bits(&self) -> u8 {
        match *self {
            TunerSelect::Neither => 0,
            TunerSelect::A => 1,
            TunerSelect::B => 2,
            TunerSelect::Both => 3,
        }
    }
}

impl std::fmt::Display for TunerSelect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x}", self.bits())
    }
}

/// RSPduo operating modes, a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RspDuoMode(pub u8);

impl RspDuoMode {
    pub const UNKNOWN: RspDuoMode = RspDuoMode(0);
    pub const SINGLE_TUNER: RspDuoMode = RspDuoMode(1);
    pub const DUAL_TUNER: RspDuoMode = RspDuoMode(2);
    pub const MASTER: RspDuoMode = RspDuoMode(4);
    pub const SLAVE: RspDuoMode = RspDuoMode(8);

    pub fn contains(&self, other: RspDuoMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RspDuoMode {
    type Output = RspDuoMode;

    fn bitor(self, rhs: Self) -> Self::Output {
        RspDuoMode(self.0 | rhs.0)
    }
}

impl std::fmt::Display for RspDuoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// A device as seen by enumeration and selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial: String,
    pub hw_ver: HwVersion,
    pub tuner: TunerSelect,
    /// Available modes after enumeration, the requested mode once selected.
    pub rsp_duo_mode: RspDuoMode,
    pub rsp_duo_sample_freq: f64,
    pub valid: bool,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SerNo={} hwVer={} tuner={}",
            self.serial, self.hw_ver, self.tuner
        )
    }
}
