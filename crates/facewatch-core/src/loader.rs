//! Reference descriptor loading.
//!
//! Fetches each reference portrait, detects its face and extracts one
//! labeled descriptor. Failures exclude that identity and never abort the
//! whole load.

use crate::identities::{IdentityStore, PortraitSource};
use crate::pipeline::{Describe, Detect, PipelineError};
use crate::types::LabeledDescriptor;
use image::GrayImage;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("fetch {source_ref} failed: {reason}")]
    Fetch { source_ref: String, reason: String },
    #[error("decode {source_ref} failed: {source}")]
    Decode {
        source_ref: String,
        #[source]
        source: image::ImageError,
    },
    #[error("no face found in portrait")]
    NoFaceDetected,
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Fetches portrait images as grayscale rasters.
pub trait PortraitFetcher {
    fn fetch(&self, source: &PortraitSource) -> Result<GrayImage, LoaderError>;
}

/// Reads portraits from disk or over HTTP(S).
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, LoaderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoaderError::Fetch {
                source_ref: "http client".into(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    fn fetch_bytes(&self, source: &PortraitSource) -> Result<Vec<u8>, LoaderError> {
        let fetch_err = |reason: String| LoaderError::Fetch {
            source_ref: source.to_string(),
            reason,
        };

        match source {
            PortraitSource::Path(path) => std::fs::read(path).map_err(|e| fetch_err(e.to_string())),
            PortraitSource::Url(url) => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| fetch_err(e.to_string()))?;
                let bytes = response.bytes().map_err(|e| fetch_err(e.to_string()))?;
                Ok(bytes.to_vec())
            }
        }
    }
}

impl PortraitFetcher for HttpFetcher {
    fn fetch(&self, source: &PortraitSource) -> Result<GrayImage, LoaderError> {
        let bytes = self.fetch_bytes(source)?;
        let decoded = image::load_from_memory(&bytes).map_err(|e| LoaderError::Decode {
            source_ref: source.to_string(),
            source: e,
        })?;
        Ok(decoded.to_luma8())
    }
}

/// An identity left out of the matcher, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedIdentity {
    pub id: String,
    pub reason: String,
}

/// Outcome of a descriptor load.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Descriptors in identity-store order.
    pub descriptors: Vec<LabeledDescriptor>,
    pub skipped: Vec<SkippedIdentity>,
}

impl LoadReport {
    /// True when recognition has nothing to match against.
    pub fn is_detection_only(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Produce one labeled descriptor per identity whose portrait yields a face.
pub fn load_descriptors(
    identities: &IdentityStore,
    fetcher: &dyn PortraitFetcher,
    detector: &mut dyn Detect,
    recognizer: &mut dyn Describe,
) -> LoadReport {
    let mut report = LoadReport::default();

    for identity in identities.iter() {
        match describe_portrait(&identity.image, fetcher, detector, recognizer) {
            Ok(descriptor) => {
                tracing::info!(id = %identity.id, "reference descriptor loaded");
                report.descriptors.push(LabeledDescriptor {
                    label: identity.id.clone(),
                    descriptor,
                });
            }
            Err(e) => {
                tracing::warn!(id = %identity.id, source = %identity.image, error = %e, "skipping reference identity");
                report.skipped.push(SkippedIdentity {
                    id: identity.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if report.is_detection_only() {
        tracing::warn!(identities = identities.len(), "no reference descriptors loaded; recognition unavailable");
    }

    report
}

fn describe_portrait(
    source: &PortraitSource,
    fetcher: &dyn PortraitFetcher,
    detector: &mut dyn Detect,
    recognizer: &mut dyn Describe,
) -> Result<crate::types::Descriptor, LoaderError> {
    let portrait = fetcher.fetch(source)?;
    let (width, height) = portrait.dimensions();
    let pixels = portrait.as_raw();

    let faces = detector.detect(pixels, width, height)?;
    if faces.len() > 1 {
        tracing::debug!(%source, faces = faces.len(), "portrait has several faces; using the most confident");
    }
    let face = faces
        .into_iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .ok_or(LoaderError::NoFaceDetected)?;

    Ok(recognizer.describe(pixels, width, height, &face)?)
}
