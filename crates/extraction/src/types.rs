//! Shared value types for extraction requests and their results.
//!
//! Wire-facing structs use `camelCase` field names so hosts written in any
//! language see the same JSON shape (`combinedKey`, `processedBlockCount`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CombinedKey, ExtractionError, OutputId};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Shape of the audio carried by an [`ExtractionRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    /// Samples per second, per channel.
    pub sample_rate: f32,
    /// Number of channels in `audioChannels`.
    pub channel_count: u32,
    /// Number of sample frames in each channel.
    pub frame_length: u64,
}

/// One feature-extraction request as submitted by the host.
///
/// Immutable once submitted: every layer takes it by value or by shared
/// reference and never edits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    /// Names the owning library (prefix) and the extractor inside it.
    pub combined_key: CombinedKey,
    /// Which of the extractor's outputs to return.
    pub output_id: OutputId,
    /// De-interleaved sample buffers, one per channel, in channel order.
    pub audio_channels: Vec<Vec<f32>>,
    /// Sample rate, channel count and length of `audio_channels`.
    pub audio_format: AudioFormat,
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Describes one output of an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDescriptor {
    pub identifier: OutputId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Describes one extractor offered by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorDescriptor {
    /// Fully qualified key a request uses to reach this extractor.
    pub key: CombinedKey,
    pub name: String,
    pub description: String,
    pub outputs: Vec<OutputDescriptor>,
}

/// Result of a `list` call: every extractor available, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    pub available: Vec<ExtractorDescriptor>,
}

impl ListResponse {
    /// Appends `other`'s extractors after this response's own.
    pub fn concat(mut self, other: ListResponse) -> Self {
        self.available.extend(other.available);
        self
    }
}

// ---------------------------------------------------------------------------
// Progress and results
// ---------------------------------------------------------------------------

/// How far a backend has got through a request, in compute blocks.
///
/// `processed_block_count <= total_block_count` for backends that know their
/// input length up front; streaming backends may exceed it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub processed_block_count: u64,
    pub total_block_count: u64,
}

impl Progress {
    /// Creates a new [`Progress`].
    pub fn new(processed_block_count: u64, total_block_count: u64) -> Self {
        Self {
            processed_block_count,
            total_block_count,
        }
    }

    /// Returns `floor(100 * processed / total)`.
    ///
    /// Fails with [`ExtractionError::DegenerateProgress`] when the total is
    /// zero. Values above 100 are possible for backends that overrun their
    /// announced total.
    pub fn percent(self) -> Result<u64, ExtractionError> {
        if self.total_block_count == 0 {
            return Err(ExtractionError::DegenerateProgress {
                processed: self.processed_block_count,
                total: self.total_block_count,
            });
        }
        let scaled = u128::from(self.processed_block_count) * 100
            / u128::from(self.total_block_count);
        Ok(u64::try_from(scaled).unwrap_or(u64::MAX))
    }
}

/// A single extracted feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Position of the feature in seconds from the start of the audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    /// Duration in seconds, for features that cover a region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One progress-tagged batch of features emitted by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialResult {
    pub features: Vec<Feature>,
    pub progress: Progress,
}

impl PartialResult {
    /// Creates a result carrying `features` at `progress`.
    pub fn new(features: Vec<Feature>, progress: Progress) -> Self {
        Self { features, progress }
    }
}

/// Folds the next backend result into a running aggregate.
pub type Reducer = fn(&mut PartialResult, PartialResult);

/// Default reducer: appends the incoming features and adopts the incoming
/// progress.
pub fn concat_features(aggregate: &mut PartialResult, next: PartialResult) {
    aggregate.features.extend(next.features);
    aggregate.progress = next.progress;
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Milliseconds elapsed between `self` and now (zero if the clock went
    /// backwards).
    pub fn elapsed_millis(self) -> u64 {
        let delta = Utc::now().signed_duration_since(self.0).num_milliseconds();
        u64::try_from(delta).unwrap_or(0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_floors() {
        assert_eq!(Progress::new(1, 3).percent(), Ok(33));
        assert_eq!(Progress::new(2, 3).percent(), Ok(66));
        assert_eq!(Progress::new(3, 3).percent(), Ok(100));
    }

    #[test]
    fn percent_with_zero_total_is_degenerate() {
        assert_eq!(
            Progress::new(5, 0).percent(),
            Err(ExtractionError::DegenerateProgress {
                processed: 5,
                total: 0
            })
        );
    }

    #[test]
    fn percent_does_not_overflow_on_huge_counts() {
        assert_eq!(Progress::new(u64::MAX, u64::MAX).percent(), Ok(100));
    }

    #[test]
    fn request_uses_camel_case_on_the_wire() {
        let json = serde_json::json!({
            "combinedKey": "vamp-example-plugins:zerocrossing",
            "outputId": "counts",
            "audioChannels": [[0.0, 1.0]],
            "audioFormat": { "sampleRate": 44100.0, "channelCount": 1, "frameLength": 2 }
        });
        let request: ExtractionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.combined_key.library_prefix(), "vamp-example-plugins");
        assert_eq!(request.audio_format.frame_length, 2);
    }

    #[test]
    fn concat_features_appends_and_replaces_progress() {
        let mut agg = PartialResult::new(vec![Feature::default()], Progress::new(1, 4));
        concat_features(
            &mut agg,
            PartialResult::new(vec![Feature::default(), Feature::default()], Progress::new(2, 4)),
        );
        assert_eq!(agg.features.len(), 3);
        assert_eq!(agg.progress, Progress::new(2, 4));
    }
}
