//! Master volume and replay gain folded into one output attenuation.
//!
//! The output controls can only attenuate, so a positive replay-gain
//! correction is clipped at unity. That is a known approximation: true
//! replay gain would need a DSP stage the platform does not expose.

/// Quietest attenuation the output controls accept (silence).
pub const MIN_DB: f32 = -100.0;
/// Loudest attenuation: unity, no amplification.
pub const MAX_DB: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeSetting {
    master: f32,
    gain_db: f32,
}

impl Default for VolumeSetting {
    fn default() -> Self {
        Self {
            master: 1.0,
            gain_db: 0.0,
        }
    }
}

impl VolumeSetting {
    pub fn new(master: f32, gain_db: f32) -> Self {
        let mut v = Self::default();
        v.set_master(master);
        v.set_gain_db(gain_db);
        v
    }

    /// Linear master volume in `0.0..=1.0`.
    pub fn master(&self) -> f32 {
        self.master
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn set_master(&mut self, volume: f32) {
        self.master = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
    }

    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain_db = if gain_db.is_finite() { gain_db } else { 0.0 };
    }

    pub fn master_db(&self) -> f32 {
        if self.master <= 0.0 {
            MIN_DB
        } else {
            (20.0 * self.master.log10()).max(MIN_DB)
        }
    }

    /// `master_db + gain_db`, clamped to `[MIN_DB, MAX_DB]`.
    pub fn applied_db(&self) -> f32 {
        (self.master_db() + self.gain_db).clamp(MIN_DB, MAX_DB)
    }

    /// Applied attenuation in hundredths of a decibel, `-10000..=0`.
    pub fn centibels(&self) -> i32 {
        (self.applied_db() * 100.0).round() as i32
    }

    /// Applied attenuation as a linear level in `0.0..=1.0`.
    pub fn linear(&self) -> f32 {
        let db = self.applied_db();
        if db <= MIN_DB {
            0.0
        } else {
            10f32.powf(db / 20.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with(master: f32, gain: f32) -> VolumeSetting {
        let mut v = VolumeSetting::default();
        v.set_gain_db(gain);
        v.set_master(master);
        v
    }

    #[test]
    fn master_is_clamped_to_unit_range() {
        assert_eq!(with(-1.0, 0.0), with(0.0, 0.0));
        assert_eq!(with(2.0, 0.0), with(1.0, 0.0));
        assert_eq!(with(f32::NAN, 0.0).master(), 0.0);
    }

    #[test]
    fn unity_without_gain_is_zero_db() {
        let v = with(1.0, 0.0);
        assert_eq!(v.applied_db(), 0.0);
        assert_eq!(v.centibels(), 0);
        assert!((v.linear() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn positive_gain_never_amplifies() {
        let clipped = with(1.0, 20.0);
        assert_eq!(clipped.applied_db(), with(1.0, 0.0).applied_db());
        assert_eq!(clipped.centibels(), 0);
        assert!(clipped.linear() <= 1.0);
    }

    #[test]
    fn gain_composes_with_master() {
        let v = with(0.5, -3.0);
        let expected = 20.0 * 0.5f32.log10() - 3.0;
        assert!((v.applied_db() - expected).abs() < 1e-4);
        assert_eq!(v.centibels(), (expected * 100.0).round() as i32);

        // positive gain can recover master attenuation, up to unity
        let v = with(0.5, 6.0);
        assert!(v.applied_db() < 0.0 && v.applied_db() > -0.1);
        let v = with(0.5, 12.0);
        assert_eq!(v.applied_db(), 0.0);
    }

    #[test]
    fn floor_is_silence() {
        let v = with(0.0, 0.0);
        assert_eq!(v.applied_db(), MIN_DB);
        assert_eq!(v.centibels(), -10_000);
        assert_eq!(v.linear(), 0.0);

        let v = with(1.0, -500.0);
        assert_eq!(v.centibels(), -10_000);
    }

    #[test]
    fn non_finite_gain_is_ignored() {
        assert_eq!(with(1.0, f32::INFINITY).gain_db(), 0.0);
        assert_eq!(with(1.0, f32::NAN).gain_db(), 0.0);
    }
}
