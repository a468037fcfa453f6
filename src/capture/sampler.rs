use chrono::{DateTime, Utc};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, GrayImage};
use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};

use super::frame::{CaptureError, FrameSource};

/// A frame ready for the recognition service.
pub struct SampledFrame {
    pub jpeg: Vec<u8>,
    pub captured_at: DateTime<Utc>,
    /// False when the perceptual hash sits within the configured distance
    /// of the previous sample. The poller may skip the network call for an
    /// unchanged scene whose last poll found nothing.
    pub scene_changed: bool,
}

/// Turns raw frames into compressed stills, tracking scene changes across
/// consecutive samples.
pub struct Sampler {
    hasher: Hasher,
    last_hash: Option<ImageHash>,
    jpeg_quality: u8,
    scene_change_threshold: u32,
}

impl Sampler {
    pub fn new(jpeg_quality: u8, scene_change_threshold: u32) -> Self {
        Self {
            hasher: HasherConfig::new()
                .hash_alg(HashAlg::DoubleGradient)
                .hash_size(8, 8)
                .to_hasher(),
            last_hash: None,
            jpeg_quality,
            scene_change_threshold,
        }
    }

    /// Capture one still from `source` and encode it as JPEG.
    ///
    /// Fails with `NoFrame` while the source reports zero dimensions. The
    /// encode is deterministic: a fixed quality setting, so identical input
    /// frames produce identical bytes.
    pub fn capture(&mut self, source: &mut dyn FrameSource) -> Result<SampledFrame, CaptureError> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(CaptureError::NoFrame);
        }

        let frame = source.grab()?;
        let captured_at = Utc::now();

        let gray = GrayImage::from_raw(frame.width, frame.height, frame.data).ok_or_else(|| {
            CaptureError::Encode(format!(
                "frame buffer does not match {}x{}",
                frame.width, frame.height
            ))
        })?;
        let still = DynamicImage::ImageLuma8(gray);

        let hash = self.hasher.hash_image(&still);
        let scene_changed = match &self.last_hash {
            None => true,
            Some(previous) => hash.dist(previous) >= self.scene_change_threshold,
        };
        self.last_hash = Some(hash);

        let mut jpeg = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality);
        still
            .write_with_encoder(encoder)
            .map_err(|err| CaptureError::Encode(err.to_string()))?;

        Ok(SampledFrame {
            jpeg,
            captured_at,
            scene_changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::RawFrame;

    struct PatternSource {
        width: u32,
        height: u32,
        seed: u8,
    }

    impl FrameSource for PatternSource {
        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn grab(&mut self) -> Result<RawFrame, CaptureError> {
            let data = (0..self.width * self.height)
                .map(|i| (i as u8).wrapping_mul(self.seed))
                .collect();
            Ok(RawFrame {
                data,
                width: self.width,
                height: self.height,
            })
        }
    }

    #[test]
    fn zero_dimension_source_is_no_frame() {
        let mut sampler = Sampler::new(80, 8);
        let mut source = PatternSource {
            width: 0,
            height: 0,
            seed: 1,
        };
        assert!(matches!(
            sampler.capture(&mut source),
            Err(CaptureError::NoFrame)
        ));
    }

    #[test]
    fn first_sample_always_counts_as_changed() {
        let mut sampler = Sampler::new(80, 8);
        let mut source = PatternSource {
            width: 64,
            height: 48,
            seed: 3,
        };
        let sample = sampler.capture(&mut source).unwrap();
        assert!(sample.scene_changed);
        assert!(!sample.jpeg.is_empty());
    }

    #[test]
    fn identical_frames_are_not_a_scene_change() {
        let mut sampler = Sampler::new(80, 8);
        let mut source = PatternSource {
            width: 64,
            height: 48,
            seed: 3,
        };
        sampler.capture(&mut source).unwrap();
        let second = sampler.capture(&mut source).unwrap();
        assert!(!second.scene_changed);
    }

    #[test]
    fn encoding_is_deterministic() {
        let mut first = Sampler::new(80, 8);
        let mut second = Sampler::new(80, 8);
        let mut source_a = PatternSource {
            width: 64,
            height: 48,
            seed: 5,
        };
        let mut source_b = PatternSource {
            width: 64,
            height: 48,
            seed: 5,
        };
        let a = first.capture(&mut source_a).unwrap();
        let b = second.capture(&mut source_b).unwrap();
        assert_eq!(a.jpeg, b.jpeg);
    }
}
