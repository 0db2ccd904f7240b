extern crate ffmpeg_next as ffmpeg;

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use super::logger::{self, fault, verbose, warning};
use super::timestamp::Timestamp;

use capset_common::utils::time::format_duration;
use color_eyre::eyre::{self, Context};
use ffmpeg::codec::Context as CodecContext;
use ffmpeg::decoder::Video as DecoderVideo;
use ffmpeg::format::context::Input as FormatContext;
use ffmpeg::format::{input_with_dictionary, Pixel};
use ffmpeg::frame::Video as FrameVideo;
use ffmpeg::media::Type;
use ffmpeg::software::scaling::context::Context as ScalingContext;
use ffmpeg::util::log as ffmpeglog;
use ffmpeg::{Dictionary, Packet as CodecPacket, Rational, Rescale};
use ffmpeg_sys_next::{AV_NOPTS_VALUE, AV_TIME_BASE_Q};
use image::RgbImage;

pub type Result<T> = eyre::Result<T>;

static FFMPEG_INITIALIZED: OnceLock<std::result::Result<(), ffmpeg::Error>> =
    OnceLock::new();

const MILLISECONDS: Rational = Rational(1, 1000);

/// Grabs single frames out of a video file.
///
/// Frames are converted to RGB and rotated upright according to the display matrix of the
/// stream, if there is one.
pub struct FrameExtractor<L: logger::Logger = logger::LogLogger> {
    logger: L,

    // ffmpeg contexts
    ictx: FormatContext,
    decoder: DecoderVideo,
    converter: ScalingContext,

    // internal timestamp bookkeeping
    seek_target_timestamp: i64,
    cur_timestamp: i64,

    // constants/metadata
    length_timestamp: i64,
    first_timestamp: i64,
    timebase: Rational,
    frame_rate: Rational,
    frame_count: i64,
    video_stream_index: usize,
    orientation: Orientation,
}

impl FrameExtractor<logger::LogLogger> {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new_with_logger(path, logger::LogLogger)
    }
}

impl<L> FrameExtractor<L>
where
    L: logger::Logger,
{
    pub fn new_with_logger(path: impl AsRef<Path>, logger: L) -> Result<Self> {
        if let Err(e) = FFMPEG_INITIALIZED.get_or_init(|| {
            ffmpeg::init()?;
            ffmpeglog::set_level(ffmpeglog::Level::Error);
            Ok(())
        }) {
            return Err(e).wrap_err("Failed to initialize ffmpeg");
        }

        let options = {
            let mut options = Dictionary::new();
            options.set("analyzeduration", "10M");
            options.set("probesize", "5M");
            options
        };
        let mut ictx = input_with_dictionary(&path, options)
            .wrap_err("Failed to open the file")?;

        let video = ictx
            .streams()
            .best(Type::Video)
            .ok_or(eyre::eyre!("No video stream"))?;

        let video_stream_index = video.index();
        eyre::ensure!(
            video.start_time() != AV_NOPTS_VALUE,
            "Does not have a start time"
        );
        let first_timestamp = video.start_time();
        let timebase = video.time_base();
        let length_timestamp = if video.duration() == AV_NOPTS_VALUE {
            eyre::ensure!(
                ictx.duration() != AV_NOPTS_VALUE,
                "Does not have a duration"
            );
            ictx.duration().rescale(AV_TIME_BASE_Q, timebase)
        } else {
            video.duration()
        };
        eyre::ensure!(length_timestamp >= 0, "The video has a negative length");

        let frame_rate = match video.avg_frame_rate() {
            rate if rate.numerator() > 0 && rate.denominator() > 0 => rate,
            _ => video.rate(),
        };
        let frame_count = video.frames();

        let orientation = match get_orientation(&video) {
            Some(x) => x,
            None => {
                warning!(logger, "Got a weird orientation angle, ignoring");
                Orientation::Normal
            }
        };

        let decoder = CodecContext::from_parameters(video.parameters())
            .wrap_err("No codec found")?
            .decoder()
            .video()
            .wrap_err("No codec found, of type video (?)")?;

        let converter = Self::pixel_converter(&decoder)?;

        ictx.streams_mut()
            .filter(|stream| stream.index() != video_stream_index)
            .for_each(|mut stream| stream_set_discard_all(&mut stream));

        Ok(Self {
            logger,
            ictx,
            decoder,
            converter,
            seek_target_timestamp: first_timestamp,
            cur_timestamp: first_timestamp,
            length_timestamp,
            first_timestamp,
            timebase,
            frame_rate,
            frame_count,
            video_stream_index,
            orientation,
        })
    }

    fn pixel_converter(decoder: &DecoderVideo) -> Result<ScalingContext> {
        eyre::ensure!(decoder.format() != Pixel::None, "No pixel format");
        Ok(ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::FAST_BILINEAR,
        )?)
    }

    /// The length of the video, computed as the number of frames over the frame rate.
    ///
    /// Fails if the video doesn't say what its frame rate is. Containers that don't store
    /// a frame count get the length of the stream instead.
    pub fn duration(&self) -> Result<Duration> {
        match frames_over_fps(self.frame_count, self.frame_rate)? {
            Some(duration) => Ok(duration),
            None => {
                warning!(
                    self.logger,
                    "The video doesn't know how many frames it has, using its length instead"
                );
                Ok(self.approx_length())
            }
        }
    }

    /// The length of the stream as written in the container.
    pub fn approx_length(&self) -> Duration {
        Timestamp::new_abs(self.length_timestamp, self.timebase).to_duration()
    }

    /// The frame on screen `offset` into the video, i.e., the last one starting at or
    /// before it. `None` means there is no such frame, because `offset` is past the end.
    pub fn frame_at(&mut self, offset: Duration) -> Result<Option<(Timestamp, RgbImage)>> {
        let millis: i64 = offset
            .as_millis()
            .try_into()
            .wrap_err("the offset is too far into the video")?;
        let target = self.first_timestamp + millis.rescale(MILLISECONDS, self.timebase);

        verbose!(
            self.logger,
            "Seeking to {}ms, i.e., {} in the time base of the stream",
            millis,
            target
        );
        self.seek_internal(target).wrap_err_with(|| {
            format!("Failed when seeking to {}", format_duration(offset))
        })?;

        self.next()
    }

    pub fn frame_at_secs(&mut self, seconds: f64) -> Result<Option<(Timestamp, RgbImage)>> {
        let offset = Duration::try_from_secs_f64(seconds)
            .wrap_err_with(|| format!("Not a point in a video: {seconds}"))?;
        self.frame_at(offset)
    }

    /// Decodes up to the frame that is on screen at the seek target, i.e., the last frame
    /// that starts at or before it.
    fn next(&mut self) -> Result<Option<(Timestamp, RgbImage)>> {
        let mut shown: Option<(i64, FrameVideo)> = None;
        loop {
            loop {
                let mut frame = FrameVideo::empty();
                // avcodec_receive_frame
                match self.decoder.receive_frame(&mut frame) {
                    Ok(()) => (),
                    Err(ffmpeg::Error::Other {
                        errno: libc::EAGAIN,
                    }) => break,
                    Err(ffmpeg::Error::Eof) => {
                        return match shown {
                            Some((ts, frame))
                                if self.seek_target_timestamp < ts + self.frame_length(ts) =>
                            {
                                self.to_image(ts, &frame).map(Some)
                            }
                            _ => Ok(None),
                        };
                    }
                    Err(e) => {
                        return Err(e)
                            .wrap_err("Decoder error when receiving a frame from it");
                    }
                }

                if let Some(ts) = frame.timestamp() {
                    self.cur_timestamp = ts;
                } else {
                    let last =
                        Timestamp::new(self.cur_timestamp, self.timebase, self.first_timestamp);
                    warning!(
                        self.logger,
                        "Frame doesn't have a timestamp somewhere after: {}",
                        last
                    );
                    continue;
                }

                let ts = self.cur_timestamp;
                if ts < self.seek_target_timestamp {
                    shown = Some((ts, frame));
                    continue;
                }

                // the previous frame is still on screen at the target, unless this one
                // starts exactly there
                let (ts, frame) = match shown.take() {
                    Some(prev) if ts > self.seek_target_timestamp => prev,
                    _ => (ts, frame),
                };
                return self.to_image(ts, &frame).map(Some);
            }

            loop {
                let mut packet = CodecPacket::empty();
                match packet.read(&mut self.ictx) {
                    Ok(()) if packet.stream() == self.video_stream_index => {
                        match self.decoder.send_packet(&packet) {
                            Ok(()) => break,
                            Err(e) => {
                                fault!(self.logger, "Failed to decode a packet: {}", e);
                                continue;
                            }
                        }
                    }
                    Ok(()) => continue,
                    Err(ffmpeg::Error::Eof) => {
                        self.decoder
                            .send_eof()
                            .wrap_err("Failed to send EOF to the decoder")?;
                        break;
                    }
                    Err(e) => {
                        eyre::bail!("Failed to read a packet from the stream: {e}");
                    }
                }
            }
        }
    }

    fn to_image(&mut self, ts: i64, frame: &FrameVideo) -> Result<(Timestamp, RgbImage)> {
        let mut converted = FrameVideo::empty();
        self.converter
            .run(frame, &mut converted)
            .wrap_err("Failed to convert the decoded frame")?;
        let img = undo_rotation(create_rust_image(converted), self.orientation);
        Ok((Timestamp::new(ts, self.timebase, self.first_timestamp), img))
    }

    /// For how long, in the time base, the frame starting at `ts` is shown. Without a
    /// frame rate, the last frame is shown until the stream ends.
    fn frame_length(&self, ts: i64) -> i64 {
        let fps = self.frame_rate;
        if fps.numerator() > 0 && fps.denominator() > 0 {
            1i64.rescale(Rational(fps.denominator(), fps.numerator()), self.timebase)
        } else {
            self.first_timestamp + self.length_timestamp - ts
        }
    }

    fn seek_internal(&mut self, target: i64) -> Result<()> {
        let Self {
            ictx,
            video_stream_index,
            decoder,
            seek_target_timestamp,
            ..
        } = self;

        // the upper bound makes sure we land on a keyframe before the target, never after
        seek(ictx, *video_stream_index, target, ..target).wrap_err("Failed to seek")?;
        // also takes the decoder out of draining mode if the last read hit the end
        decoder.flush();
        *seek_target_timestamp = target;
        Ok(())
    }
}

/// `None` if the frame count is unknown.
fn frames_over_fps(frame_count: i64, frame_rate: Rational) -> Result<Option<Duration>> {
    eyre::ensure!(
        frame_rate.numerator() > 0 && frame_rate.denominator() > 0,
        "the video has no frame rate"
    );
    if frame_count <= 0 {
        return Ok(None);
    }
    let fps = frame_rate.numerator() as f64 / frame_rate.denominator() as f64;
    Ok(Some(Duration::from_secs_f64(frame_count as f64 / fps)))
}

#[derive(Clone, Copy, Debug)]
enum Orientation {
    Normal,
    Left,
    Right,
    Upside,
}

fn get_orientation(video: &ffmpeg::Stream) -> Option<Orientation> {
    for data in video.side_data() {
        if data.kind() != ffmpeg::packet::side_data::Type::DisplayMatrix {
            continue;
        }
        let rot = unsafe {
            ffmpeg_sys_next::av_display_rotation_get(data.data().as_ptr() as *const i32)
        };

        if rot.is_finite() {
            return match rot.round() as i32 {
                -90 => Some(Orientation::Right),
                90 => Some(Orientation::Left),
                0 => Some(Orientation::Normal),
                180 | -180 => Some(Orientation::Upside),
                _ => None,
            };
        }
    }

    Some(Orientation::Normal)
}

fn undo_rotation(img: RgbImage, ori: Orientation) -> RgbImage {
    match ori {
        Orientation::Normal => img,
        Orientation::Right => image::imageops::rotate90(&img),
        Orientation::Left => image::imageops::rotate270(&img),
        Orientation::Upside => image::imageops::rotate180(&img),
    }
}

/// Copies an RGB24 frame into an image buffer, dropping the padding ffmpeg puts at the end
/// of each line.
fn create_rust_image(converted: FrameVideo) -> RgbImage {
    assert_eq!(Pixel::RGB24, converted.format());
    assert_eq!(1, converted.planes());

    let width = converted.width();
    let height = converted.height();
    let src_linesize = converted.stride(0);
    let trg_linesize = 3 * width as usize;
    let data = converted.data(0);

    let data = if src_linesize == trg_linesize {
        data[..trg_linesize * height as usize].to_vec()
    } else {
        assert!(src_linesize >= trg_linesize);
        data.chunks(src_linesize)
            .take(height as usize)
            .flat_map(|line| &line[..trg_linesize])
            .copied()
            .collect()
    };

    RgbImage::from_vec(width, height, data).expect("the buffer is big enough!")
}

fn stream_set_discard_all(stream: &mut ffmpeg::StreamMut<'_>) {
    unsafe {
        let ptr = stream.as_mut_ptr();
        if !ptr.is_null() {
            (*ptr).discard = ffmpeg_sys_next::AVDiscard::AVDISCARD_ALL;
        }
    }
}

/// A copy of FormatContext::seek, except that this accepts a stream_index to seek on.
fn seek<R: ffmpeg::util::range::Range<i64>>(
    input: &mut FormatContext,
    stream_index: usize,
    ts: i64,
    range: R,
) -> std::result::Result<(), ffmpeg::Error> {
    unsafe {
        match ffmpeg_sys_next::avformat_seek_file(
            input.as_mut_ptr(),
            stream_index
                .try_into()
                .expect("will probably not be that big"),
            range.start().cloned().unwrap_or(i64::MIN),
            ts,
            range.end().cloned().unwrap_or(i64::MAX),
            0,
        ) {
            s if s >= 0 => Ok(()),
            e => Err(ffmpeg::Error::from(e)),
        }
    }
}

impl<L: logger::Logger> fmt::Debug for FrameExtractor<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            first_timestamp,
            length_timestamp,
            timebase,
            frame_rate,
            frame_count,
            cur_timestamp,
            seek_target_timestamp,
            orientation,
            ..
        } = self;

        f.debug_struct("FrameExtractor")
            .field("first_ts", first_timestamp)
            .field("length_ts", length_timestamp)
            .field("cur_ts", cur_timestamp)
            .field("seek_ts", seek_target_timestamp)
            .field(
                "tb",
                &format_args!("{}/{}", timebase.numerator(), timebase.denominator()),
            )
            .field(
                "fps",
                &format_args!("{}/{}", frame_rate.numerator(), frame_rate.denominator()),
            )
            .field("frames", frame_count)
            .field("orientation", orientation)
            .finish()
    }
}
