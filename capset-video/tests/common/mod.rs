// NOTE: every test will complain about the functions it doesn't use
#![allow(unused)]

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

pub const TEST_VIDEO_FPS: u32 = 30;
pub const TEST_VIDEO_LENGTH_SEC: u32 = 10;
pub const TEST_VIDEO_WIDTH: u32 = 320;
pub const TEST_VIDEO_HEIGHT: u32 = 240;

/// Returns cargo's tmpdir
pub fn cargo_tmpdir() -> PathBuf {
    PathBuf::from(option_env!("CARGO_TARGET_TMPDIR").expect("no cargo tmpdir???"))
}

/// A ten second long video at 30 fps, created once with the ffmpeg cli.
pub fn create_test_video() -> PathBuf {
    let tmpvideo = cargo_tmpdir().join("capset-video-testvideo.mp4");

    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| ffmpeg_testsrc(&tmpvideo));

    tmpvideo
}

/// Same as [create_test_video], but in a Matroska container, which doesn't store how many
/// frames there are.
pub fn create_test_video_mkv() -> PathBuf {
    let tmpvideo = cargo_tmpdir().join("capset-video-testvideo.mkv");

    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| ffmpeg_testsrc(&tmpvideo));

    tmpvideo
}

fn ffmpeg_testsrc(tmpvideo: &Path) {
    std::fs::remove_file(tmpvideo).ok();
    let status = std::process::Command::new("ffmpeg")
        .args(["-f", "lavfi", "-i"])
        .arg(format!(
            "testsrc=duration={TEST_VIDEO_LENGTH_SEC}:rate={TEST_VIDEO_FPS}:size={TEST_VIDEO_WIDTH}x{TEST_VIDEO_HEIGHT}"
        ))
        .args(["-pix_fmt", "yuv420p"])
        .arg(tmpvideo)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .status()
        .expect("failed to execute ffmpeg");
    assert!(status.success(), "ffmpeg could not create the test video");
}
