//! What the user is currently working on: whether they are captioning images or video
//! frames, the image or frame waiting for a caption, and the caption itself.
//!
//! ```text
//!            load_image / seek
//!   None ───────────────────────▶ ImageReady | FrameReady
//!     ▲                                   │
//!     └──── submit, set_mode, failed seek ┘
//! ```

use std::{
    fmt, io,
    path::Path,
    str::FromStr,
    time::Duration,
};

use capset_video::{ContextLogger, FrameExtractor, Timestamp};
use color_eyre::eyre;
use image::DynamicImage;
use tempfile::TempPath;

use crate::{dataset::Dataset, manifest::Record};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi"];

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("{0} mode can't do that, switch mode first")]
    WrongMode(Mode),
    #[error("{name:?} is not a supported {mode} file, expected one of: {}", .mode.extensions().join(", "))]
    UnsupportedFile { name: String, mode: Mode },
    #[error("no video is loaded")]
    NoVideo,
    #[error("{requested:.1}s is not in the video, pick a time between 0.0 and {max:.1}")]
    OutOfRange { requested: f64, max: f64 },
    #[error("Failed to capture frame at {0:.1} seconds")]
    CaptureFailed(f64),
    #[error("there is no image or frame to save")]
    NothingPending,
    #[error("the caption is empty")]
    EmptyCaption,
    #[error("could not decode the image")]
    Decode(#[from] image::ImageError),
    #[error("could not keep a copy of the video")]
    Io(#[from] io::Error),
    #[error("could not read the video: {0:#}")]
    Video(eyre::Report),
    #[error("could not save: {0:#}")]
    Store(eyre::Report),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Image,
    Video,
}

impl Mode {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Mode::Image => IMAGE_EXTENSIONS,
            Mode::Video => VIDEO_EXTENSIONS,
        }
    }

    fn accepts(self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.extensions().contains(&ext.as_str()))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Image => "image",
            Mode::Video => "video",
        })
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("{0:?} is not a mode, expected image or video")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" | "img" => Ok(Mode::Image),
            "video" | "vid" => Ok(Mode::Video),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// A file handed over by the user, like from an upload form.
#[derive(Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "not a file"))?
            .to_string_lossy()
            .into_owned();
        Ok(Self::new(name, std::fs::read(path)?))
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// The image waiting for a caption
#[derive(Default)]
pub enum Pending {
    #[default]
    None,
    ImageReady {
        name: String,
        image: DynamicImage,
    },
    FrameReady {
        video: String,
        at: f64,
        timestamp: Timestamp,
        image: DynamicImage,
    },
}

impl Pending {
    pub fn image(&self) -> Option<&DynamicImage> {
        match self {
            Pending::None => None,
            Pending::ImageReady { image, .. } | Pending::FrameReady { image, .. } => {
                Some(image)
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Pending::None)
    }
}

impl fmt::Display for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pending::None => f.write_str("nothing"),
            Pending::ImageReady { name, image } => {
                write!(f, "{name} ({}x{})", image.width(), image.height())
            }
            Pending::FrameReady {
                video,
                at,
                timestamp,
                image,
            } => write!(
                f,
                "frame of {video} at {at:.1} seconds, shown at {timestamp} ({}x{})",
                image.width(),
                image.height()
            ),
        }
    }
}

const TICKS_PER_SECOND: f64 = 10.0;
pub const SLIDER_STEP: f64 = 1.0 / TICKS_PER_SECOND;

/// Picks a time in a video, from zero up to one second before its end, in steps of
/// [SLIDER_STEP].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slider {
    ticks: u64,
    max_ticks: u64,
}

impl Slider {
    pub fn new(video_duration: Duration) -> Self {
        let max = (video_duration.as_secs_f64() - 1.0).max(0.0);
        Self {
            ticks: 0,
            // a tiny bit of slack so that 9.0 doesn't become 8.9 because of rounding
            max_ticks: (max * TICKS_PER_SECOND + 1e-6).floor() as u64,
        }
    }

    pub fn value(&self) -> f64 {
        self.ticks as f64 / TICKS_PER_SECOND
    }

    pub fn max(&self) -> f64 {
        self.max_ticks as f64 / TICKS_PER_SECOND
    }

    /// Moves to the step closest to `seconds`, which has to be on the slider.
    pub fn set(&mut self, seconds: f64) -> Result<f64> {
        let out_of_range = SessionError::OutOfRange {
            requested: seconds,
            max: self.max(),
        };
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(out_of_range);
        }
        let ticks = (seconds * TICKS_PER_SECOND).round() as u64;
        if ticks > self.max_ticks {
            return Err(out_of_range);
        }
        self.ticks = ticks;
        Ok(self.value())
    }
}

// the extractor is declared first so that it lets go of the file before it is removed
struct Video {
    extractor: FrameExtractor<ContextLogger>,
    name: String,
    duration: Duration,
    slider: Slider,
    _file: TempPath,
}

impl Video {
    fn open(upload: Upload) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("capset-")
            .suffix(".mp4")
            .tempfile()?;
        io::Write::write_all(&mut file, &upload.bytes)?;
        let file = file.into_temp_path();
        log::debug!("Copied {} to {}", upload.name, file.display());

        let extractor =
            FrameExtractor::new_with_logger(&file, ContextLogger::new(upload.name.as_str()))
                .map_err(SessionError::Video)?;
        let duration = extractor.duration().map_err(SessionError::Video)?;
        log::debug!("{}: {extractor:?}", upload.name);

        Ok(Self {
            extractor,
            name: upload.name,
            duration,
            slider: Slider::new(duration),
            _file: file,
        })
    }
}

/// The annotation form. One per user, created when they show up.
#[derive(Default)]
pub struct Session {
    mode: Mode,
    pending: Pending,
    caption: String,
    video: Option<Video>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pending(&self) -> &Pending {
        &self.pending
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn slider(&self) -> Option<Slider> {
        self.video.as_ref().map(|video| video.slider)
    }

    pub fn video_duration(&self) -> Option<Duration> {
        self.video.as_ref().map(|video| video.duration)
    }

    /// Switching mode starts over, everything that was loaded or typed is forgotten.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode != self.mode {
            log::debug!("Switching from {} to {} mode", self.mode, mode);
        }
        *self = Self {
            mode,
            ..Self::default()
        };
    }

    pub fn set_caption(&mut self, caption: impl Into<String>) {
        self.caption = caption.into();
    }

    /// Loads `upload` according to the mode. Videos are not captured, see [Self::seek].
    pub fn load(&mut self, upload: Upload) -> Result<()> {
        match self.mode {
            Mode::Image => self.load_image(upload),
            Mode::Video => self.load_video(upload).map(|_| ()),
        }
    }

    /// Replaces the pending image. If `upload` can't be decoded, nothing is pending
    /// afterwards.
    pub fn load_image(&mut self, upload: Upload) -> Result<()> {
        self.check_upload(Mode::Image, &upload)?;
        self.pending = Pending::None;
        let image = image::load_from_memory(&upload.bytes)?;
        log::debug!(
            "Decoded {} as a {}x{} image",
            upload.name,
            image.width(),
            image.height()
        );
        self.pending = Pending::ImageReady {
            name: upload.name,
            image,
        };
        Ok(())
    }

    /// Replaces the current video, if any, and returns the duration of the new one. The
    /// slider starts at zero, but nothing is captured until [Self::seek] is called.
    pub fn load_video(&mut self, upload: Upload) -> Result<Duration> {
        self.check_upload(Mode::Video, &upload)?;
        self.pending = Pending::None;
        self.video = None;

        let video = Video::open(upload)?;
        let duration = video.duration;
        self.video = Some(video);
        Ok(duration)
    }

    /// Moves the slider and captures the frame there. If no frame could be captured, the
    /// previously captured one is dropped as well.
    pub fn seek(&mut self, seconds: f64) -> Result<&Pending> {
        if self.mode != Mode::Video {
            return Err(SessionError::WrongMode(self.mode));
        }
        let video = self.video.as_mut().ok_or(SessionError::NoVideo)?;
        let at = video.slider.set(seconds)?;

        self.pending = Pending::None;
        match video.extractor.frame_at_secs(at) {
            Ok(Some((timestamp, frame))) => {
                log::debug!("Captured the frame at {timestamp} for {at:.1}s");
                self.pending = Pending::FrameReady {
                    video: video.name.clone(),
                    at,
                    timestamp,
                    image: DynamicImage::ImageRgb8(frame),
                };
                Ok(&self.pending)
            }
            Ok(None) => Err(SessionError::CaptureFailed(at)),
            Err(e) => {
                log::warn!("Failed to capture the frame at {at:.1}s: {e:#}");
                Err(SessionError::CaptureFailed(at))
            }
        }
    }

    /// Saves the pending image with the caption. Both are cleared afterwards, but a loaded
    /// video stays so that more frames can be picked from it.
    pub fn submit(&mut self, dataset: &mut Dataset) -> Result<Record> {
        let image = self.pending.image().ok_or(SessionError::NothingPending)?;
        if self.caption.trim().is_empty() {
            return Err(SessionError::EmptyCaption);
        }

        let record = dataset
            .save(image, &self.caption)
            .map_err(SessionError::Store)?;

        self.pending = Pending::None;
        self.caption.clear();
        Ok(record)
    }

    fn check_upload(&self, mode: Mode, upload: &Upload) -> Result<()> {
        if self.mode != mode {
            return Err(SessionError::WrongMode(self.mode));
        }
        if !mode.accepts(&upload.name) {
            return Err(SessionError::UnsupportedFile {
                name: upload.name.clone(),
                mode,
            });
        }
        Ok(())
    }
}
