use serde::{Deserialize, Serialize};

use crate::models::config::AudioSettings;
use crate::processing::pcm::peak_level;

/// Low-signal safety net for quiet microphones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainPolicy {
    /// Peak amplitude below which gain is applied, and the level it lifts to.
    pub floor: f32,
    /// Upper bound on the linear multiplier.
    pub max_gain: f32,
}

impl GainPolicy {
    pub fn from_settings(settings: &AudioSettings) -> Self {
        Self {
            floor: settings.gain_floor,
            max_gain: settings.max_gain,
        }
    }
}

impl Default for GainPolicy {
    fn default() -> Self {
        Self {
            floor: 0.1,
            max_gain: 1000.0,
        }
    }
}

/// What the gain pass did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainReport {
    pub peak_before: f32,
    pub gain: f32,
    pub peak_after: f32,
}

/// Lift quiet audio so its peak reaches `policy.floor`, then hard-clip to `[-1, 1]`.
///
/// Signals already at or above the floor pass through untouched (apart from
/// clipping). A silent buffer gets the maximum gain, which leaves it silent.
pub fn apply_gain_correction(samples: &mut [f32], policy: &GainPolicy) -> GainReport {
    let peak_before = peak_level(samples);

    let gain = if peak_before >= policy.floor {
        1.0
    } else if peak_before <= 0.0 {
        policy.max_gain as f64
    } else {
        (policy.floor as f64 / peak_before as f64).min(policy.max_gain as f64)
    };

    for sample in samples.iter_mut() {
        let scaled = (*sample as f64 * gain) as f32;
        *sample = scaled.clamp(-1.0, 1.0);
    }

    if gain != 1.0 {
        log::info!("Applied gain x{:.2} (peak {:.5})", gain, peak_before);
    }

    GainReport {
        peak_before,
        gain: gain as f32,
        peak_after: peak_level(samples),
    }
}
