//! Envelope follower.
//!
//! Tracks the absolute amplitude of the signal with separate attack and
//! release times and reports the envelope value at the end of every block.

use extraction::{
    AudioFormat, Feature, NativePlugin, OutputDescriptor, OutputId, PluginError, PluginRun,
};

use crate::{mixdown, output};

const AMPLITUDE: &str = "amplitude";

/// Attack and release time, in seconds.
const ATTACK_SECONDS: f64 = 0.01;
const RELEASE_SECONDS: f64 = 0.01;

pub struct AmplitudeFollower;

impl NativePlugin for AmplitudeFollower {
    fn identifier(&self) -> &str {
        "amplitudefollower"
    }

    fn name(&self) -> &str {
        "Amplitude Follower"
    }

    fn description(&self) -> &str {
        "Track the amplitude of the audio signal"
    }

    fn outputs(&self) -> Vec<OutputDescriptor> {
        output(AMPLITUDE, "Amplitude", Some("V")).into_iter().collect()
    }

    fn start(
        &self,
        format: &AudioFormat,
        _output: &OutputId,
    ) -> Result<Box<dyn PluginRun>, PluginError> {
        let sample_rate = f64::from(format.sample_rate);
        if sample_rate <= 0.0 {
            return Err(PluginError(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        Ok(Box::new(FollowerRun {
            sample_rate,
            attack: smoothing_coefficient(ATTACK_SECONDS, sample_rate),
            release: smoothing_coefficient(RELEASE_SECONDS, sample_rate),
            envelope: 0.0,
        }))
    }
}

/// Per-sample coefficient that closes 90% of the gap in `seconds`.
fn smoothing_coefficient(seconds: f64, sample_rate: f64) -> f64 {
    (0.1f64.ln() / (seconds * sample_rate)).exp()
}

struct FollowerRun {
    sample_rate: f64,
    attack: f64,
    release: f64,
    envelope: f64,
}

impl PluginRun for FollowerRun {
    fn process_block(&mut self, channels: &[&[f32]], frame_offset: u64) -> Vec<Feature> {
        let frames = channels.first().map_or(0, |c| c.len());
        for i in 0..frames {
            let level = f64::from(mixdown(channels, i).abs());
            let coefficient = if level < self.envelope {
                self.release
            } else {
                self.attack
            };
            self.envelope = level + (self.envelope - level) * coefficient;
        }

        vec![Feature {
            timestamp: Some(frame_offset as f64 / self.sample_rate),
            values: vec![self.envelope as f32],
            ..Feature::default()
        }]
    }

    fn finish(&mut self) -> Vec<Feature> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> Box<dyn PluginRun> {
        AmplitudeFollower
            .start(
                &AudioFormat {
                    sample_rate: 1000.0,
                    channel_count: 1,
                    frame_length: 0,
                },
                &OutputId::new(AMPLITUDE).unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn envelope_rises_towards_a_constant_signal() {
        let mut run = run();
        let loud = vec![0.5f32; 100];
        let block: [&[f32]; 1] = [&loud];

        let first = run.process_block(&block, 0)[0].values[0];
        let second = run.process_block(&block, 100)[0].values[0];

        assert!(first > 0.0 && first <= 0.5);
        assert!(second >= first);
        assert!((second - 0.5).abs() < 1e-3);
    }

    #[test]
    fn envelope_decays_in_silence() {
        let mut run = run();
        let loud = vec![1.0f32; 100];
        let quiet = vec![0.0f32; 5];
        let loud_block: [&[f32]; 1] = [&loud];
        let quiet_block: [&[f32]; 1] = [&quiet];

        let peak = run.process_block(&loud_block, 0)[0].values[0];
        let decayed = run.process_block(&quiet_block, 100)[0].values[0];

        assert!(decayed < peak);
        assert!(decayed > 0.0);
    }
}
