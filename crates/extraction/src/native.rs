//! Native block-plugin port and its streaming adapter.
//!
//! Native libraries expose a synchronous, block-at-a-time plugin interface:
//! a plugin is started for one output, fed fixed-size blocks of de-interleaved
//! audio, and finally asked for any trailing features. [`NativeLibraryService`]
//! turns such a library into a [`StreamingService`] by chunking the request's
//! audio and reporting one [`PartialResult`] per block.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::service::{failed_stream, PartialResultStream, StreamingService};
use crate::{
    AudioFormat, CombinedKey, ExtractionError, ExtractionRequest, ExtractorDescriptor, Feature,
    LibraryKey, ListResponse, OutputDescriptor, OutputId, PartialResult, Progress,
};

/// Block size used when a plugin has no preference.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Failure reported by a native plugin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PluginError(pub String);

/// One extractor inside a native library.
pub trait NativePlugin: Send + Sync {
    /// Backend-local identifier; the part of a combined key after the separator.
    fn identifier(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn outputs(&self) -> Vec<OutputDescriptor>;

    /// Number of frames the plugin wants per block.
    fn preferred_block_size(&self) -> usize {
        DEFAULT_BLOCK_SIZE
    }

    /// Prepares a run producing `output` for audio of the given format.
    fn start(&self, format: &AudioFormat, output: &OutputId)
        -> Result<Box<dyn PluginRun>, PluginError>;
}

/// State of one plugin run.
pub trait PluginRun: Send {
    /// Processes one block. `channels` holds one slice per channel, all of
    /// equal length; `frame_offset` is the index of the block's first frame.
    fn process_block(&mut self, channels: &[&[f32]], frame_offset: u64) -> Vec<Feature>;

    /// Returns features that are only known once all audio has been seen.
    fn finish(&mut self) -> Vec<Feature>;
}

/// A native library: a fixed set of block plugins.
pub trait NativeLibrary: Send + Sync {
    fn plugins(&self) -> Vec<Arc<dyn NativePlugin>>;
}

// ---------------------------------------------------------------------------

/// Adapts a [`NativeLibrary`] to the [`StreamingService`] contract.
pub struct NativeLibraryService {
    library: LibraryKey,
    native: Arc<dyn NativeLibrary>,
}

impl NativeLibraryService {
    /// Creates an adapter serving `native` under `library`.
    pub fn new(library: LibraryKey, native: Arc<dyn NativeLibrary>) -> Self {
        Self { library, native }
    }

    fn find_plugin(&self, local_id: &str) -> Option<Arc<dyn NativePlugin>> {
        self.native
            .plugins()
            .into_iter()
            .find(|plugin| plugin.identifier() == local_id)
    }

    fn describe(&self, plugin: &dyn NativePlugin) -> ExtractorDescriptor {
        ExtractorDescriptor {
            key: CombinedKey::from_parts(&self.library, plugin.identifier()),
            name: plugin.name().to_string(),
            description: plugin.description().to_string(),
            outputs: plugin.outputs(),
        }
    }
}

#[async_trait]
impl StreamingService for NativeLibraryService {
    async fn list(&self) -> Result<ListResponse, ExtractionError> {
        let available = self
            .native
            .plugins()
            .iter()
            .map(|plugin| self.describe(plugin.as_ref()))
            .collect();
        Ok(ListResponse { available })
    }

    fn process(&self, request: ExtractionRequest) -> PartialResultStream {
        let library = self.library.clone();

        let Some(plugin) = request
            .combined_key
            .local_id()
            .and_then(|local_id| self.find_plugin(local_id))
        else {
            return failed_stream(ExtractionError::backend(
                library.as_str(),
                format!("no extractor for key '{}'", request.combined_key),
            ));
        };

        if !plugin
            .outputs()
            .iter()
            .any(|output| output.identifier == request.output_id)
        {
            return failed_stream(ExtractionError::backend(
                library.as_str(),
                format!(
                    "extractor '{}' has no output '{}'",
                    plugin.identifier(),
                    request.output_id
                ),
            ));
        }

        let block_size = plugin.preferred_block_size().max(1);

        Box::pin(async_stream::stream! {
            let mut run = match plugin.start(&request.audio_format, &request.output_id) {
                Ok(run) => run,
                Err(e) => {
                    yield Err(ExtractionError::backend(library.as_str(), e.to_string()));
                    return;
                }
            };

            let frames = usable_frames(&request);
            let total = frames.div_ceil(block_size);
            debug!(
                library = %library,
                plugin = plugin.identifier(),
                frames,
                blocks = total,
                "Running native plugin"
            );

            if total == 0 {
                yield Ok(PartialResult::new(run.finish(), Progress::new(0, 0)));
                return;
            }

            for index in 0..total {
                let start = index * block_size;
                let end = (start + block_size).min(frames);
                let mut features = {
                    let block: Vec<&[f32]> = request
                        .audio_channels
                        .iter()
                        .map(|channel| &channel[start..end])
                        .collect();
                    run.process_block(&block, start as u64)
                };
                if index + 1 == total {
                    features.extend(run.finish());
                }
                yield Ok(PartialResult::new(
                    features,
                    Progress::new(index as u64 + 1, total as u64),
                ));
                tokio::task::yield_now().await;
            }
        })
    }
}

/// Frames available in every channel, capped by the declared frame length.
fn usable_frames(request: &ExtractionRequest) -> usize {
    let declared = usize::try_from(request.audio_format.frame_length).unwrap_or(usize::MAX);
    request
        .audio_channels
        .iter()
        .map(Vec::len)
        .min()
        .unwrap_or(0)
        .min(declared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    /// Emits one feature per block holding the block's first frame offset.
    struct OffsetPlugin;

    struct OffsetRun;

    impl PluginRun for OffsetRun {
        fn process_block(&mut self, _channels: &[&[f32]], frame_offset: u64) -> Vec<Feature> {
            vec![Feature {
                values: vec![frame_offset as f32],
                ..Feature::default()
            }]
        }

        fn finish(&mut self) -> Vec<Feature> {
            vec![Feature {
                label: Some("done".into()),
                ..Feature::default()
            }]
        }
    }

    impl NativePlugin for OffsetPlugin {
        fn identifier(&self) -> &str {
            "offsets"
        }
        fn name(&self) -> &str {
            "Offsets"
        }
        fn description(&self) -> &str {
            "Block offsets"
        }
        fn outputs(&self) -> Vec<OutputDescriptor> {
            vec![OutputDescriptor {
                identifier: OutputId::new("offset").unwrap(),
                name: "Offset".into(),
                unit: None,
            }]
        }
        fn preferred_block_size(&self) -> usize {
            4
        }
        fn start(
            &self,
            _format: &AudioFormat,
            _output: &OutputId,
        ) -> Result<Box<dyn PluginRun>, PluginError> {
            Ok(Box::new(OffsetRun))
        }
    }

    struct OneTrick;

    impl NativeLibrary for OneTrick {
        fn plugins(&self) -> Vec<Arc<dyn NativePlugin>> {
            vec![Arc::new(OffsetPlugin)]
        }
    }

    fn service() -> NativeLibraryService {
        NativeLibraryService::new(LibraryKey::new("tricks").unwrap(), Arc::new(OneTrick))
    }

    fn request(key: &str, output: &str, frames: usize) -> ExtractionRequest {
        ExtractionRequest {
            combined_key: CombinedKey::new(key).unwrap(),
            output_id: OutputId::new(output).unwrap(),
            audio_channels: vec![vec![0.0; frames]],
            audio_format: AudioFormat {
                sample_rate: 8.0,
                channel_count: 1,
                frame_length: frames as u64,
            },
        }
    }

    #[tokio::test]
    async fn list_qualifies_keys_with_the_library() {
        let listed = service().list().await.unwrap();
        assert_eq!(listed.available.len(), 1);
        assert_eq!(listed.available[0].key.as_str(), "tricks:offsets");
    }

    #[tokio::test]
    async fn audio_is_split_into_blocks_with_progress() {
        let results: Vec<_> = service()
            .process(request("tricks:offsets", "offset", 10))
            .collect()
            .await;

        let results: Vec<PartialResult> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].progress, Progress::new(1, 3));
        assert_eq!(results[2].progress, Progress::new(3, 3));
        assert_eq!(results[1].features[0].values, vec![4.0]);
        // Final block carries the trailing feature from finish().
        assert_eq!(results[2].features.len(), 2);
        assert_eq!(results[2].features[1].label.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn empty_audio_yields_a_single_degenerate_result() {
        let results: Vec<_> = service()
            .process(request("tricks:offsets", "offset", 0))
            .collect()
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().progress, Progress::new(0, 0));
    }

    #[tokio::test]
    async fn unknown_extractor_fails_with_backend_error() {
        let results: Vec<_> = service()
            .process(request("tricks:missing", "offset", 4))
            .collect()
            .await;
        assert!(matches!(
            results.as_slice(),
            [Err(ExtractionError::BackendError { .. })]
        ));
    }

    #[tokio::test]
    async fn unknown_output_fails_with_backend_error() {
        let results: Vec<_> = service()
            .process(request("tricks:offsets", "nope", 4))
            .collect()
            .await;
        assert!(matches!(
            results.as_slice(),
            [Err(ExtractionError::BackendError { .. })]
        ));
    }
}
