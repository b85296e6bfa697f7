//! Synthetic vital signs

use crate::config::VitalsRanges;
use crate::random::RandomSource;

/// One vitals sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VitalSigns {
    pub heart_rate: f64,
    pub spo2: f64,
}

/// Draws heart rate and SpO2 uniformly from the configured ranges
#[derive(Debug, Clone, Default)]
pub struct VitalsGenerator {
    ranges: VitalsRanges,
}

impl VitalsGenerator {
    pub fn new(ranges: VitalsRanges) -> Self {
        Self { ranges }
    }

    /// Heart rate is drawn before SpO2
    pub fn sample(&self, rng: &mut dyn RandomSource) -> VitalSigns {
        let (hr_min, hr_max) = self.ranges.heart_rate;
        let (spo2_min, spo2_max) = self.ranges.spo2;

        VitalSigns {
            heart_rate: rng.uniform(hr_min, hr_max),
            spo2: rng.uniform(spo2_min, spo2_max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededSource;

    #[test]
    fn test_samples_stay_in_range() {
        let generator = VitalsGenerator::default();
        let mut rng = SeededSource::from_seed(1);

        for _ in 0..10_000 {
            let v = generator.sample(&mut rng);
            assert!((55.0..85.0).contains(&v.heart_rate), "heart rate {}", v.heart_rate);
            assert!((95.0..99.5).contains(&v.spo2), "spo2 {}", v.spo2);
        }
    }

    #[test]
    fn test_custom_ranges() {
        let generator = VitalsGenerator::new(VitalsRanges {
            heart_rate: (100.0, 101.0),
            spo2: (80.0, 81.0),
        });
        let mut rng = SeededSource::from_seed(2);
        let v = generator.sample(&mut rng);
        assert!((100.0..101.0).contains(&v.heart_rate));
        assert!((80.0..81.0).contains(&v.spo2));
    }
}
