//! Zero-crossing counter.
//!
//! Counts sign changes of the (mixed-down) signal. The `counts` output emits
//! one feature per block; the `zerocrossings` output emits one timestamped
//! feature per crossing.

use extraction::{
    AudioFormat, Feature, NativePlugin, OutputDescriptor, OutputId, PluginError, PluginRun,
};

use crate::{mixdown, output};

const COUNTS: &str = "counts";
const CROSSINGS: &str = "zerocrossings";

pub struct ZeroCrossing;

impl NativePlugin for ZeroCrossing {
    fn identifier(&self) -> &str {
        "zerocrossing"
    }

    fn name(&self) -> &str {
        "Zero Crossings"
    }

    fn description(&self) -> &str {
        "Detect and count zero crossing points"
    }

    fn outputs(&self) -> Vec<OutputDescriptor> {
        [
            output(COUNTS, "Zero Crossing Counts", Some("crossings")),
            output(CROSSINGS, "Zero Crossings", None),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn start(
        &self,
        format: &AudioFormat,
        output: &OutputId,
    ) -> Result<Box<dyn PluginRun>, PluginError> {
        if format.sample_rate <= 0.0 {
            return Err(PluginError(format!(
                "sample rate must be positive, got {}",
                format.sample_rate
            )));
        }
        Ok(Box::new(ZeroCrossingRun {
            sample_rate: f64::from(format.sample_rate),
            per_crossing: output.as_str() == CROSSINGS,
            previous_positive: None,
        }))
    }
}

struct ZeroCrossingRun {
    sample_rate: f64,
    per_crossing: bool,
    /// Sign of the last sample of the previous block.
    previous_positive: Option<bool>,
}

impl PluginRun for ZeroCrossingRun {
    fn process_block(&mut self, channels: &[&[f32]], frame_offset: u64) -> Vec<Feature> {
        let frames = channels.first().map_or(0, |c| c.len());
        let mut count = 0u32;
        let mut features = Vec::new();

        for i in 0..frames {
            let positive = mixdown(channels, i) >= 0.0;
            if self.previous_positive.is_some_and(|prev| prev != positive) {
                count += 1;
                if self.per_crossing {
                    features.push(Feature {
                        timestamp: Some((frame_offset + i as u64) as f64 / self.sample_rate),
                        ..Feature::default()
                    });
                }
            }
            self.previous_positive = Some(positive);
        }

        if !self.per_crossing {
            features.push(Feature {
                timestamp: Some(frame_offset as f64 / self.sample_rate),
                values: vec![count as f32],
                ..Feature::default()
            });
        }
        features
    }

    fn finish(&mut self) -> Vec<Feature> {
        Vec::new()
    }
}
