use pulse_lib::EcgSample;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;

/// Parameters of the built-in synthetic sensor.
#[derive(Debug, Clone)]
pub struct SynthParams {
    pub fs: f64,
    pub duration_s: f64,
    pub heart_rate_bpm: f64,
    /// Uniform jitter applied to each RR interval (ms)
    pub rr_jitter_ms: f64,
    pub resp_rate_bpm: f64,
    /// Fractional R/S amplitude swing caused by breathing
    pub resp_depth: f64,
    pub noise: f64,
    pub seed: u64,
    pub start_ms: i64,
}

fn gaussian(t: f64, centre: f64, width: f64) -> f64 {
    (-0.5 * ((t - centre) / width).powi(2)).exp()
}

/// Single-lead ECG with P-less QRS-T complexes whose R and S amplitudes
/// follow a sinusoidal breathing pattern.
pub fn synthesize(params: &SynthParams) -> Vec<EcgSample> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let base_rr = 60.0 / params.heart_rate_bpm;
    let jitter = params.rr_jitter_ms.abs() / 1000.0;

    let mut beats = Vec::new();
    let mut t = 0.5;
    while t < params.duration_s {
        beats.push(t);
        let wobble = if jitter > 0.0 {
            rng.gen_range(-jitter..=jitter)
        } else {
            0.0
        };
        t += (base_rr + wobble).max(0.25);
    }

    let resp_hz = params.resp_rate_bpm / 60.0;
    let n = (params.duration_s * params.fs) as usize;
    let noise = params.noise.abs();
    let mut first_beat = 0;
    let mut samples = Vec::with_capacity(n);
    for i in 0..n {
        let time = i as f64 / params.fs;
        while first_beat < beats.len() && beats[first_beat] < time - 1.0 {
            first_beat += 1;
        }
        let mut v = 0.05 * (2.0 * PI * time).sin();
        for &bt in beats[first_beat..].iter().take_while(|&&bt| bt < time + 1.0) {
            let gain = 1.0 + params.resp_depth * (2.0 * PI * resp_hz * bt).sin();
            v += gain * (1.2 * gaussian(time, bt, 0.012) - 0.35 * gaussian(time, bt + 0.040, 0.012))
                + 0.2 * gaussian(time, bt + 0.280, 0.050);
        }
        if noise > 0.0 {
            v += rng.gen_range(-noise..=noise);
        }
        let ts = params.start_ms + (time * 1000.0).round() as i64;
        samples.push(EcgSample::new(ts, v));
    }
    samples
}
