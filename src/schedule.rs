use crate::Error;

/// Gain reduction in dB and LNA state for one gain change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainSetting {
    pub gain_reduction: i32,
    pub lna_state: u8,
}

/// Gain reductions and LNA states to cycle through.
///
/// The two lists are indexed independently, modulo their own length, so they don't need to
/// be the same size.
#[derive(Debug, Clone)]
pub struct GainSchedule {
    gain_reductions: Vec<i32>,
    lna_states: Vec<u8>,
}

impl GainSchedule {
    pub fn new(gain_reductions: Vec<i32>, lna_states: Vec<u8>) -> Result<Self, Error> {
        if gain_reductions.is_empty() {
            return Err(Error::InvalidConfiguration(
                "no gain reduction given".to_string(),
            ));
        }
        if lna_states.is_empty() {
            return Err(Error::InvalidConfiguration("no LNA state given".to_string()));
        }
        Ok(Self {
            gain_reductions,
            lna_states,
        })
    }

    /// Setting for change `n`. Index 0 is the initial configuration.
    pub fn at(&self, n: u32) -> GainSetting {
        let n = n as usize;
        GainSetting {
            gain_reduction: self.gain_reductions[n % self.gain_reductions.len()],
            lna_state: self.lna_states[n % self.lna_states.len()],
        }
    }

    pub fn initial(&self) -> GainSetting {
        self.at(0)
    }
}
