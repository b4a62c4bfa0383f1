use crate::audio::analyzer::SpectrumFrame;

const BASS_MAX_HZ: f32 = 250.0;
const MID_MAX_HZ: f32 = 4_000.0;

const FAST_TAU_S: f32 = 1.0;
const SLOW_TAU_S: f32 = 30.0;
// Shorter long-average time constant while the meter warms up.
const WARMUP_TAU_S: f32 = 3.0;
const WARMUP_FRAMES: u32 = 50;
const SILENT_LONG_AVG: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioLevels {
    pub bass: f32,
    pub mid: f32,
    pub treb: f32,
    pub bass_att: f32,
    pub mid_att: f32,
    pub treb_att: f32,
    pub rms: f32,
    pub beat: f32,
}

impl AudioLevels {
    /// Levels used when no audio is being captured.
    pub fn neutral() -> Self {
        Self {
            bass: 1.0,
            mid: 1.0,
            treb: 1.0,
            bass_att: 1.0,
            mid_att: 1.0,
            treb_att: 1.0,
            rms: 0.0,
            beat: 0.0,
        }
    }
}

impl Default for AudioLevels {
    fn default() -> Self {
        Self::neutral()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GroupAvg {
    fast: f32,
    slow: f32,
}

impl GroupAvg {
    fn update(&mut self, imm: f32, fast_keep: f32, slow_keep: f32) -> (f32, f32) {
        self.fast = self.fast * fast_keep + imm * (1.0 - fast_keep);
        self.slow = self.slow * slow_keep + imm * (1.0 - slow_keep);
        if self.slow < SILENT_LONG_AVG {
            return (1.0, 1.0);
        }
        (imm / self.slow, self.fast / self.slow)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    groups: [GroupAvg; 3],
    frames: u32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn update(&mut self, spectrum: &SpectrumFrame, fps: f32) -> AudioLevels {
        let mut sums = [0.0f32; 3];
        let mut counts = [0u32; 3];
        for (m, hz) in spectrum.bands.iter().zip(&spectrum.band_centers_hz) {
            let g = if *hz < BASS_MAX_HZ {
                0
            } else if *hz < MID_MAX_HZ {
                1
            } else {
                2
            };
            sums[g] += m;
            counts[g] += 1;
        }

        let dt = 1.0 / fps.clamp(1.0, 240.0);
        let slow_tau = if self.frames < WARMUP_FRAMES {
            WARMUP_TAU_S
        } else {
            SLOW_TAU_S
        };
        let fast_keep = (-dt / FAST_TAU_S).exp();
        let slow_keep = (-dt / slow_tau).exp();
        self.frames = self.frames.saturating_add(1);

        let mut now = [1.0f32; 3];
        let mut att = [1.0f32; 3];
        for g in 0..3 {
            let imm = if counts[g] == 0 {
                0.0
            } else {
                sums[g] / counts[g] as f32
            };
            let (n, a) = self.groups[g].update(imm, fast_keep, slow_keep);
            now[g] = n;
            att[g] = a;
        }

        AudioLevels {
            bass: now[0],
            mid: now[1],
            treb: now[2],
            bass_att: att[0],
            mid_att: att[1],
            treb_att: att[2],
            rms: spectrum.rms,
            beat: spectrum.beat,
        }
    }
}
