// NOTE: every test will complain about the functions it doesn't use
#![allow(unused)]

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use capset::dataset::{Dataset, DatasetConfig, DEFAULT_ROOT};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use tempfile::TempDir;

pub const TEST_VIDEO_FPS: u32 = 30;
pub const TEST_VIDEO_LENGTH_SEC: u32 = 10;

/// Returns cargo's tmpdir
pub fn cargo_tmpdir() -> PathBuf {
    PathBuf::from(option_env!("CARGO_TARGET_TMPDIR").expect("no cargo tmpdir???"))
}

/// A fresh dataset inside a temporary directory, which is removed when dropped.
pub fn tmp_dataset() -> (TempDir, Dataset) {
    let dir = tempfile::tempdir().expect("could not create a temporary directory");
    let dataset = Dataset::open(DatasetConfig::new(dir.path().join(DEFAULT_ROOT)))
        .expect("could not open the dataset");
    (dir, dataset)
}

/// Writes a small gradient as a png, with an alpha channel so that it can't be written as
/// a jpeg as is.
pub fn write_png(dir: &Path, name: &str) -> PathBuf {
    let img = RgbaImage::from_fn(64, 48, |x, y| Rgba([(x * 4) as u8, (y * 5) as u8, 128, 200]));
    let path = dir.join(name);
    img.save(&path).expect("could not write the png");
    path
}

pub fn write_jpeg(dir: &Path, name: &str) -> PathBuf {
    let img = RgbImage::from_fn(32, 32, |x, y| Rgb([x as u8, y as u8, 0]));
    let path = dir.join(name);
    img.save(&path).expect("could not write the jpeg");
    path
}

/// A ten second long video at 30 fps, created once with the ffmpeg cli.
pub fn create_test_video() -> PathBuf {
    let tmpvideo = cargo_tmpdir().join("capset-testvideo.mp4");

    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| ffmpeg_testsrc(&tmpvideo, &[]));

    tmpvideo
}

/// The first half of a video like [create_test_video], whose index is at the start of the
/// file. It opens fine and claims to be ten seconds long, but the frames of the second half
/// are missing.
pub fn truncated_test_video() -> Vec<u8> {
    let tmpvideo = cargo_tmpdir().join("capset-testvideo-faststart.mp4");

    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| ffmpeg_testsrc(&tmpvideo, &["-movflags", "+faststart"]));

    let mut bytes = std::fs::read(&tmpvideo).expect("could not read the test video");
    bytes.truncate(bytes.len() / 2);
    bytes
}

fn ffmpeg_testsrc(tmpvideo: &Path, extra_args: &[&str]) {
    std::fs::remove_file(tmpvideo).ok();
    let status = std::process::Command::new("ffmpeg")
        .args(["-f", "lavfi", "-i"])
        .arg(format!(
            "testsrc=duration={TEST_VIDEO_LENGTH_SEC}:rate={TEST_VIDEO_FPS}"
        ))
        .args(["-pix_fmt", "yuv420p"])
        .args(extra_args)
        .arg(tmpvideo)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .status()
        .expect("failed to execute ffmpeg");
    assert!(status.success(), "ffmpeg could not create the test video");
}
