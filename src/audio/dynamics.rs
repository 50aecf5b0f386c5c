// Dynamique - Compresseur du bus de sortie et saturation finale
//
// Every tone and file of a session goes through one compressor, so chords
// and overlapping notes do not clip.

/// Compressor settings (decibels and seconds)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
}

impl Default for CompressorParams {
    /// Threshold at -50 dB; everything else at the usual browser defaults
    fn default() -> Self {
        Self {
            threshold_db: -50.0,
            knee_db: 30.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
        }
    }
}

/// Flush denormals to zero
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// Soft clipping with tanh, keeps the output in [-1, 1]
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

#[inline]
fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

#[inline]
fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(1e-6).log10()
}

/// Feed-forward compressor with soft knee and automatic makeup gain
pub struct DynamicsCompressor {
    params: CompressorParams,
    attack_coeff: f32,
    release_coeff: f32,
    makeup_db: f32,
    // Smoothed gain reduction, <= 0 dB
    reduction_db: f32,
}

impl DynamicsCompressor {
    pub fn new(params: CompressorParams, sample_rate: f32) -> Self {
        let coeff = |time: f32| (-1.0 / (time.max(1e-4) * sample_rate)).exp();
        let mut compressor = Self {
            params,
            attack_coeff: coeff(params.attack),
            release_coeff: coeff(params.release),
            makeup_db: 0.0,
            reduction_db: 0.0,
        };
        // Makeup follows the full-scale gain: (1 / gain(0 dBFS))^0.6
        compressor.makeup_db = -0.6 * compressor.curve_db(0.0);
        compressor
    }

    pub fn params(&self) -> CompressorParams {
        self.params
    }

    /// Current gain reduction in dB (0 or negative)
    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }

    /// Static input → output level curve, in dB
    pub fn curve_db(&self, input_db: f32) -> f32 {
        let CompressorParams {
            threshold_db,
            knee_db,
            ratio,
            ..
        } = self.params;
        let over = input_db - threshold_db;

        if 2.0 * over < -knee_db {
            input_db
        } else if knee_db > 0.0 && 2.0 * over.abs() <= knee_db {
            let x = over + knee_db / 2.0;
            input_db + (1.0 / ratio - 1.0) * x * x / (2.0 * knee_db)
        } else {
            threshold_db + over / ratio
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let level_db = gain_to_db(input.abs());
        let target = self.curve_db(level_db) - level_db;

        let coeff = if target < self.reduction_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        let smoothed = coeff * self.reduction_db + (1.0 - coeff) * target;
        self.reduction_db = flush_denormals_to_zero(smoothed);

        input * db_to_gain(self.reduction_db + self.makeup_db)
    }
}
