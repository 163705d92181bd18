//! RMS energy library.
//!
//! Unlike the native example plugins, this library implements
//! [`StreamingService`] directly and is registered as a
//! [`LibraryModule::Streaming`] module.

use std::sync::Arc;

use async_trait::async_trait;
use extraction::{
    factory, failed_stream, CombinedKey, ExtractionError, ExtractionRequest, ExtractorDescriptor,
    Feature, LibraryKey, LibraryModule, ListResponse, PartialResult, PartialResultStream,
    Progress, StreamingService,
};
use tracing::debug;

use crate::{mixdown, output};

/// Library key the energy module is conventionally imported under.
pub const ENERGY_LIBRARY: &str = "energy";

const EXTRACTOR: &str = "rms";
const RMS_OUTPUT: &str = "rms";

/// Frames per analysis window.
pub const WINDOW_SIZE: usize = 2048;

/// Streaming RMS energy backend.
pub struct EnergyLibrary {
    library: LibraryKey,
}

impl EnergyLibrary {
    pub fn new(library: LibraryKey) -> Self {
        Self { library }
    }
}

/// The energy library as an importable module served under `library`.
pub fn energy_module(library: LibraryKey) -> LibraryModule {
    LibraryModule::Streaming(factory(move || {
        Arc::new(EnergyLibrary::new(library.clone())) as Arc<dyn StreamingService>
    }))
}

#[async_trait]
impl StreamingService for EnergyLibrary {
    async fn list(&self) -> Result<ListResponse, ExtractionError> {
        Ok(ListResponse {
            available: vec![ExtractorDescriptor {
                key: CombinedKey::from_parts(&self.library, EXTRACTOR),
                name: "RMS Energy".into(),
                description: "Root-mean-square level per analysis window".into(),
                outputs: output(RMS_OUTPUT, "RMS", None).into_iter().collect(),
            }],
        })
    }

    fn process(&self, request: ExtractionRequest) -> PartialResultStream {
        let library = self.library.clone();
        if request.combined_key.local_id() != Some(EXTRACTOR)
            || request.output_id.as_str() != RMS_OUTPUT
        {
            return failed_stream(ExtractionError::backend(
                library.as_str(),
                format!(
                    "no output '{}' for key '{}'",
                    request.output_id, request.combined_key
                ),
            ));
        }

        Box::pin(async_stream::stream! {
            let sample_rate = f64::from(request.audio_format.sample_rate);
            if sample_rate <= 0.0 {
                yield Err(ExtractionError::backend(
                    library.as_str(),
                    format!("sample rate must be positive, got {sample_rate}"),
                ));
                return;
            }

            let frames = request
                .audio_channels
                .iter()
                .map(Vec::len)
                .min()
                .unwrap_or(0);
            let windows = frames.div_ceil(WINDOW_SIZE);
            debug!(library = %library, frames, windows, "Computing RMS energy");

            for index in 0..windows {
                let start = index * WINDOW_SIZE;
                let end = (start + WINDOW_SIZE).min(frames);
                let rms = {
                    let channels: Vec<&[f32]> = request
                        .audio_channels
                        .iter()
                        .map(|channel| &channel[start..end])
                        .collect();
                    window_rms(&channels)
                };
                let feature = Feature {
                    timestamp: Some(start as f64 / sample_rate),
                    duration: Some((end - start) as f64 / sample_rate),
                    values: vec![rms],
                    ..Feature::default()
                };
                yield Ok(PartialResult::new(
                    vec![feature],
                    Progress::new(index as u64 + 1, windows as u64),
                ));
                tokio::task::yield_now().await;
            }
        })
    }
}

fn window_rms(channels: &[&[f32]]) -> f32 {
    let frames = channels.first().map_or(0, |c| c.len());
    if frames == 0 {
        return 0.0;
    }
    let sum: f64 = (0..frames)
        .map(|i| {
            let sample = f64::from(mixdown(channels, i));
            sample * sample
        })
        .sum();
    (sum / frames as f64).sqrt() as f32
}
