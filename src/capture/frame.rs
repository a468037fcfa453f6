use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// The source exists but is not producing frames yet (zero intrinsic
    /// dimensions). Not a device fault; the poller just skips the tick.
    #[error("video source is not producing frames yet")]
    NoFrame,
    /// The device is already held by another unreleased stream.
    #[error("camera device is busy")]
    Busy,
    #[error("camera device error: {0}")]
    Device(String),
    #[error("frame encode failed: {0}")]
    Encode(String),
}

/// A single grayscale frame as delivered by a source.
#[derive(Clone)]
pub struct RawFrame {
    /// `width * height` bytes, row-major.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Anything that can deliver still frames to the sampler: a V4L2 camera in
/// production, a scripted source in tests.
pub trait FrameSource: Send {
    /// Intrinsic dimensions. `(0, 0)` means the source has not started
    /// delivering frames.
    fn dimensions(&self) -> (u32, u32);

    /// Blocking capture of the next frame. Runs on a blocking worker, never
    /// on the async executor.
    fn grab(&mut self) -> Result<RawFrame, CaptureError>;
}

/// Extract the luma channel from packed YUYV 4:2:2 ([Y0 U Y1 V] per pixel
/// pair): grayscale is every even byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(CaptureError::Device(format!(
            "short YUYV buffer: expected {expected} bytes, got {}",
            yuyv.len()
        )));
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_extracts_even_bytes() {
        // One pixel pair: Y0=17, U=128, Y1=211, V=128
        let packed = vec![17, 128, 211, 128];
        assert_eq!(yuyv_to_grayscale(&packed, 2, 1).unwrap(), vec![17, 211]);
    }

    #[test]
    fn yuyv_rejects_short_buffer() {
        assert!(yuyv_to_grayscale(&[1, 2], 2, 2).is_err());
    }
}
