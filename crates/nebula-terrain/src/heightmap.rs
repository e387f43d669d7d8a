//! Multi-octave fractal Brownian motion (fBm) heightmap sampler.
//!
//! Composites octaves of 2D simplex noise over world block coordinates and
//! maps the result onto a column height around a base level.

use noise::{NoiseFn, Simplex};

/// Configuration for the fBm column heightmap.
#[derive(Clone, Debug)]
pub struct HeightmapParams {
    /// World seed for deterministic generation.
    pub seed: i64,
    /// Number of noise octaves to composite.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves. Default: 2.0.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves. Default: 0.5.
    pub persistence: f64,
    /// Frequency of the first octave, in cycles per block. Default: 0.008.
    pub base_frequency: f64,
    /// Column height the noise oscillates around. Default: 65.
    pub base_height: f64,
    /// Maximum deviation from `base_height`, in blocks. Default: 35.
    pub amplitude: f64,
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 0.008,
            base_height: 65.0,
            amplitude: 35.0,
        }
    }
}

/// Folds a 64-bit world seed into the 32-bit noise seed.
fn noise_seed(seed: i64) -> u32 {
    let s = seed as u64;
    (s ^ (s >> 32)) as u32
}

/// Column heights from fractal Brownian motion over simplex noise.
pub struct HeightmapSampler {
    noise: Simplex,
    params: HeightmapParams,
    norm: f64,
}

impl HeightmapSampler {
    /// Create a new sampler with the given parameters.
    pub fn new(params: HeightmapParams) -> Self {
        let noise = Simplex::new(noise_seed(params.seed));
        let mut norm = 0.0;
        let mut amp = 1.0;
        for _ in 0..params.octaves {
            norm += amp;
            amp *= params.persistence;
        }
        Self {
            noise,
            params,
            norm,
        }
    }

    /// Raw fBm value at a world column, normalized to roughly `[-1, 1]`.
    pub fn sample(&self, x: f64, z: f64) -> f64 {
        if self.norm == 0.0 {
            return 0.0;
        }
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = 1.0;

        for _ in 0..self.params.octaves {
            total += self.noise.get([x * frequency, z * frequency]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        total / self.norm
    }

    /// Surface height of the column at world `(wx, wz)`, clamped to
    /// `[min_y, max_y]`.
    pub fn column_height(&self, wx: i32, wz: i32, min_y: i32, max_y: i32) -> i32 {
        let h = self.params.base_height + self.sample(f64::from(wx), f64::from(wz)) * self.params.amplitude;
        (h.round() as i32).clamp(min_y, max_y)
    }

    /// Return a reference to the current parameters.
    pub fn params(&self) -> &HeightmapParams {
        &self.params
    }
}
