use nom::character::complete::char;
use nom::character::complete::i32 as int;
use nom::combinator::all_consuming;
use nom::sequence::tuple;
use serde::Deserialize;
use serde::Serialize;
use std::str::FromStr;

use crate::Error;

/// IF stage configuration, in kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IfType {
    #[default]
    Zero,
    Khz450,
    Khz1620,
    Khz2048,
}

impl IfType {
    pub fn khz(&self) -> u32 {
        match *self {
            IfType::Zero => 0,
            IfType::Khz450 => 450,
            IfType::Khz1620 => 1620,
            IfType::Khz2048 => 2048,
        }
    }
}

impl TryFrom<u32> for IfType {
    type Error = Error;

    fn try_from(khz: u32) -> Result<Self, Self::Error> {
        match khz {
            0 => Ok(IfType::Zero),
            450 => Ok(IfType::Khz450),
            1620 => Ok(IfType::Khz1620),
            2048 => Ok(IfType::Khz2048),
            _ => Err(Error::InvalidConfiguration(format!(
                "unsupported IF frequency {khz} kHz"
            ))),
        }
    }
}

/// IF bandwidth, in kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Bandwidth {
    #[default]
    Khz200,
    Khz300,
    Khz600,
    Khz1536,
    Khz5000,
    Khz6000,
    Khz7000,
    Khz8000,
}

impl Bandwidth {
    pub fn khz(&self) -> u32 {
        match *self {
            Bandwidth::Khz200 => 200,
            Bandwidth::Khz300 => 300,
            Bandwidth::Khz600 => 600,
            Bandwidth::Khz1536 => 1536,
            Bandwidth::Khz5000 => 5000,
            Bandwidth::Khz6000 => 6000,
            Bandwidth::Khz7000 => 7000,
            Bandwidth::Khz8000 => 8000,
        }
    }
}

impl TryFrom<u32> for Bandwidth {
    type Error = Error;

    fn try_from(khz: u32) -> Result<Self, Self::Error> {
        match khz {
            200 => Ok(Bandwidth::Khz200),
            300 => Ok(Bandwidth::Khz300),
            600 => Ok(Bandwidth::Khz600),
            1536 => Ok(Bandwidth::Khz1536),
            5000 => Ok(Bandwidth::Khz5000),
            6000 => Ok(Bandwidth::Khz6000),
            7000 => Ok(Bandwidth::Khz7000),
            8000 => Ok(Bandwidth::Khz8000),
            _ => Err(Error::InvalidConfiguration(format!(
                "unsupported IF bandwidth {khz} kHz"
            ))),
        }
    }
}

macro_rules! khz_from_str {
    ($t:ty) => {
        impl FromStr for $t {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let khz: u32 = s.trim().parse().or(Err(Error::ValueError))?;
                <$t>::try_from(khz)
            }
        }

        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.khz())
            }
        }
    };
}

khz_from_str!(IfType);
khz_from_str!(Bandwidth);

/// Automatic gain control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AgcControl {
    #[default]
    Disable,
    Hz100,
    Hz50,
    Hz5,
}

impl AgcControl {
    pub fn is_enabled(&self) -> bool {
        *self != AgcControl::Disable
    }
    fn code(&self) -> u8 {
        match *self {
            AgcControl::Disable => 0,
            AgcControl::Hz100 => 1,
            AgcControl::Hz50 => 2,
            AgcControl::Hz5 => 3,
        }
    }
}

impl std::fmt::Display for AgcControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Tuner DC offset compensation, written as `dcCal,speedUp,trackTime,refreshRateTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcOffsetTuner {
    pub dc_cal: i32,
    pub speed_up: i32,
    pub track_time: i32,
    pub refresh_rate_time: i32,
}

impl Default for DcOffsetTuner {
    fn default() -> Self {
        Self {
            dc_cal: 3,
            speed_up: 0,
            track_time: 1,
            refresh_rate_time: 2048,
        }
    }
}

impl FromStr for DcOffsetTuner {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, (dc_cal, _, speed_up, _, track_time, _, refresh_rate_time)) =
            all_consuming(tuple((
                int,
                char(','),
                int,
                char(','),
                int,
                char(','),
                int,
            )))(s.trim())
            .map_err(|_: nom::Err<nom::error::Error<&str>>| Error::ValueError)?;
        Ok(Self {
            dc_cal,
            speed_up,
            track_time,
            refresh_rate_time,
        })
    }
}

impl std::fmt::Display for DcOffsetTuner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.dc_cal, self.speed_up, self.track_time, self.refresh_rate_time
        )
    }
}

/// Receiver parameters of a single tuner, the subset the exercisers configure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceParams {
    /// ADC sample rate in Hz.
    pub sample_rate: f64,
    pub decimation_enable: bool,
    pub decimation_factor: u8,
    pub if_type: IfType,
    pub bandwidth: Bandwidth,
    pub agc: AgcControl,
    /// Gain reduction in dB, only meaningful with AGC disabled.
    pub gain_reduction: i32,
    pub lna_state: u8,
    pub dc_enable: bool,
    pub iq_enable: bool,
    pub dc_offset_tuner: DcOffsetTuner,
    /// RF center frequency in Hz.
    pub rf_frequency: f64,
}

impl Default for DeviceParams {
    fn default() -> Self {
        Self {
            sample_rate: 2e6,
            decimation_enable: false,
            decimation_factor: 1,
            if_type: IfType::Zero,
            bandwidth: Bandwidth::Khz200,
            agc: AgcControl::Disable,
            gain_reduction: 40,
            lna_state: 0,
            dc_enable: true,
            iq_enable: true,
            dc_offset_tuner: DcOffsetTuner::default(),
            rf_frequency: 100e6,
        }
    }
}

/// A setting the device did not keep as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

impl Mismatch {
    pub fn new(
        field: &'static str,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unexpected change - {}: {} -> {}",
            self.field, self.expected, self.actual
        )
    }
}

struct Hz(f64);

impl std::fmt::Display for Hz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}", self.0)
    }
}

impl DeviceParams {
    /// Compare the written parameters against what the device reports back.
    ///
    /// The gain reduction is owned by the AGC loop while it is enabled and is not compared.
    pub fn verify(&self, actual: &DeviceParams) -> Vec<Mismatch> {
        let mut m = Vec::new();
        if self.sample_rate != actual.sample_rate {
            m.push(Mismatch::new(
                "fsHz",
                Hz(self.sample_rate),
                Hz(actual.sample_rate),
            ));
        }
        if self.decimation_enable != actual.decimation_enable {
            m.push(Mismatch::new(
                "decimation.enable",
                u8::from(self.decimation_enable),
                u8::from(actual.decimation_enable),
            ));
        }
        if self.decimation_factor != actual.decimation_factor {
            m.push(Mismatch::new(
                "decimation.decimationFactor",
                self.decimation_factor,
                actual.decimation_factor,
            ));
        }
        if self.if_type != actual.if_type {
            m.push(Mismatch::new("ifType", self.if_type, actual.if_type));
        }
        if self.bandwidth != actual.bandwidth {
            m.push(Mismatch::new("bwType", self.bandwidth, actual.bandwidth));
        }
        if self.agc != actual.agc {
            m.push(Mismatch::new("agc.enable", self.agc, actual.agc));
        }
        if !self.agc.is_enabled() && self.gain_reduction != actual.gain_reduction {
            m.push(Mismatch::new(
                "gain.gRdB",
                self.gain_reduction,
                actual.gain_reduction,
            ));
        }
        if self.lna_state != actual.lna_state {
            m.push(Mismatch::new(
                "gain.LNAstate",
                self.lna_state,
                actual.lna_state,
            ));
        }
        if self.dc_enable != actual.dc_enable {
            m.push(Mismatch::new(
                "dcOffset.DCenable",
                u8::from(self.dc_enable),
                u8::from(actual.dc_enable),
            ));
        }
        if self.iq_enable != actual.iq_enable {
            m.push(Mismatch::new(
                "dcOffset.IQenable",
                u8::from(self.iq_enable),
                u8::from(actual.iq_enable),
            ));
        }
        let (want, got) = (&self.dc_offset_tuner, &actual.dc_offset_tuner);
        for (field, w, g) in [
            ("dcOffsetTuner.dcCal", want.dc_cal, got.dc_cal),
            ("dcOffsetTuner.speedUp", want.speed_up, got.speed_up),
            ("dcOffsetTuner.trackTime", want.track_time, got.track_time),
            (
                "dcOffsetTuner.refreshRateTime",
                want.refresh_rate_time,
                got.refresh_rate_time,
            ),
        ] {
            if w != g {
                m.push(Mismatch::new(field, w, g));
            }
        }
        if self.rf_frequency != actual.rf_frequency {
            m.push(Mismatch::new(
                "rfHz",
                Hz(self.rf_frequency),
                Hz(actual.rf_frequency),
            ));
        }
        m
    }

    /// Second settings line, `SR=... LO=... BW=...`.
    pub fn summary(&self) -> String {
        format!(
            "SR={:.0} LO={:.0} BW={} If={} Dec={} IFagc={} IFgain={} LNAstate={}",
            self.sample_rate,
            self.rf_frequency,
            self.bandwidth,
            self.if_type,
            self.decimation_factor,
            self.agc,
            self.gain_reduction,
            self.lna_state
        )
    }

    /// Third settings line, the DC/IQ correction parameters.
    pub fn correction_summary(&self) -> String {
        format!(
            "DCenable={} IQenable={} dcCal={} speedUp={} trackTime={} refreshRateTime={}",
            u8::from(self.dc_enable),
            u8::from(self.iq_enable),
            self.dc_offset_tuner.dc_cal,
            self.dc_offset_tuner.speed_up,
            self.dc_offset_tuner.track_time,
            self.dc_offset_tuner.refresh_rate_time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_params_verify() {
        let p = DeviceParams::default();
        assert!(p.verify(&p.clone()).is_empty());
    }
    #[test]
    fn clamped_frequency_is_reported() {
        let want = DeviceParams {
            rf_frequency: 3e9,
            ..Default::default()
        };
        let got = DeviceParams {
            rf_frequency: 2e9,
            ..Default::default()
        };
        let m = want.verify(&got);
        assert_eq!(m.len(), 1);
        assert_eq!(
            m[0].to_string(),
            "unexpected change - rfHz: 3000000000 -> 2000000000"
        );
    }
    #[test]
    fn gain_ignored_under_agc() {
        let want = DeviceParams {
            agc: AgcControl::Hz50,
            gain_reduction: 40,
            ..Default::default()
        };
        let got = DeviceParams {
            gain_reduction: 31,
            ..want.clone()
        };
        assert!(want.verify(&got).is_empty());

        let manual = DeviceParams::default();
        let m = manual.verify(&DeviceParams {
            gain_reduction: 31,
            lna_state: 2,
            ..Default::default()
        });
        let fields: Vec<_> = m.iter().map(|m| m.field).collect();
        assert_eq!(fields, vec!["gain.gRdB", "gain.LNAstate"]);
    }
    #[test]
    fn dc_offset_tuner_from_str() {
        let d: DcOffsetTuner = "3,0,1,2048".parse().unwrap();
        assert_eq!(d, DcOffsetTuner::default());
        let d: DcOffsetTuner = "1,1,-2,512".parse().unwrap();
        assert_eq!(d.track_time, -2);
        assert_eq!(d.to_string(), "1,1,-2,512");
        assert!("3,0,1".parse::<DcOffsetTuner>().is_err());
        assert!("3,0,1,2048,5".parse::<DcOffsetTuner>().is_err());
    }
    #[test]
    fn if_and_bandwidth_codes() {
        assert_eq!("1620".parse::<IfType>().unwrap(), IfType::Khz1620);
        assert!("1000".parse::<IfType>().is_err());
        assert_eq!("1536".parse::<Bandwidth>().unwrap(), Bandwidth::Khz1536);
        assert!(matches!(
            Bandwidth::try_from(250),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
