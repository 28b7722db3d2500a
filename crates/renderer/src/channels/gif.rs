use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, Instant};

use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;

use crate::error::AcquireError;

use super::media::{FrameSource, VideoFrame};

/// Browsers treat delays this short as unset.
const MIN_FRAME_DELAY: Duration = Duration::from_millis(20);
const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Looping animated GIF decoded fully up front.
pub(crate) struct GifVideo {
    frames: Vec<(VideoFrame, Duration)>,
    total: Duration,
    start: Option<Instant>,
    current: Option<usize>,
}

impl GifVideo {
    pub fn open(path: &Path) -> Result<Self, AcquireError> {
        let file = File::open(path).map_err(|error| match error.kind() {
            std::io::ErrorKind::NotFound => AcquireError::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                AcquireError::PermissionDenied(path.display().to_string())
            }
            _ => AcquireError::Decode(format!("{}: {error}", path.display())),
        })?;
        let decoder = GifDecoder::new(BufReader::new(file))
            .map_err(|error| AcquireError::Decode(format!("{}: {error}", path.display())))?;
        let decoded = decoder
            .into_frames()
            .collect_frames()
            .map_err(|error| AcquireError::Decode(format!("{}: {error}", path.display())))?;

        let frames: Vec<(VideoFrame, Duration)> = decoded
            .into_iter()
            .map(|frame| {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let delay = Duration::from_secs_f64(numer as f64 / denom.max(1) as f64 / 1000.0);
                let delay = if delay < MIN_FRAME_DELAY {
                    DEFAULT_FRAME_DELAY
                } else {
                    delay
                };
                let buffer = frame.into_buffer();
                let (width, height) = buffer.dimensions();
                (VideoFrame::new(width, height, buffer.into_raw()), delay)
            })
            .collect();
        if frames.is_empty() {
            return Err(AcquireError::Decode(format!(
                "{} contains no frames",
                path.display()
            )));
        }

        let total = frames.iter().map(|(_, delay)| *delay).sum();
        tracing::debug!(path = %path.display(), frames = frames.len(), ?total, "decoded gif");
        Ok(Self {
            frames,
            total,
            start: None,
            current: None,
        })
    }

    fn index_at(&self, elapsed: Duration) -> usize {
        let mut position = Duration::from_nanos(
            (elapsed.as_nanos() % self.total.as_nanos().max(1)) as u64,
        );
        for (index, (_, delay)) in self.frames.iter().enumerate() {
            if position < *delay {
                return index;
            }
            position -= *delay;
        }
        self.frames.len() - 1
    }
}

impl FrameSource for GifVideo {
    fn poll_frame(&mut self, now: Instant) -> Option<VideoFrame> {
        let start = *self.start.get_or_insert(now);
        let index = self.index_at(now.saturating_duration_since(start));
        if self.current == Some(index) {
            return None;
        }
        self.current = Some(index);
        self.frames.get(index).map(|(frame, _)| frame.clone())
    }
}
