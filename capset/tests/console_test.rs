mod common;

use std::io::Cursor;

use capset::console::Console;
use color_eyre::eyre;
use common::*;

fn run(dataset: &mut capset::dataset::Dataset, script: &str) -> eyre::Result<String> {
    let mut out = Vec::new();
    Console::new(dataset, &mut out).run(Cursor::new(script.to_string()))?;
    Ok(String::from_utf8(out)?)
}

#[test]
fn test_image_session() -> eyre::Result<()> {
    let (dir, mut dataset) = tmp_dataset();
    let png = write_png(dir.path(), "cat.png");
    let preview = dir.path().join("preview.png");

    let output = run(
        &mut dataset,
        &format!(
            "save\nopen {}\npreview {}\ncaption a cat\nsave\nlist\n",
            png.display(),
            preview.display()
        ),
    )?;

    assert!(output.contains("error: there is no image or frame to save"), "{output}");
    assert!(output.contains("Loaded cat.png (64x48)"), "{output}");
    assert!(output.contains("success: Image image1.jpeg saved with caption: a cat"), "{output}");
    assert!(output.contains("image1.jpeg  a cat"), "{output}");
    assert!(preview.is_file());
    assert_eq!(1, dataset.records()?.len());
    Ok(())
}

#[test]
fn test_mistakes_are_reported_and_skipped() -> eyre::Result<()> {
    let (dir, mut dataset) = tmp_dataset();

    let output = run(
        &mut dataset,
        &format!(
            "dance\nmode audio\nopen {}\nseek 1\n\nstatus\n",
            dir.path().join("missing.png").display()
        ),
    )?;

    let errors = output.lines().filter(|l| l.starts_with("error: ")).count();
    assert_eq!(4, errors, "{output}");
    assert!(output.contains("mode:    image"), "{output}");
    Ok(())
}

#[test]
fn test_quit_stops_reading() -> eyre::Result<()> {
    let (_dir, mut dataset) = tmp_dataset();
    let output = run(&mut dataset, "quit\nhelp\n")?;
    assert!(output.is_empty(), "{output}");
    Ok(())
}

#[test]
fn test_video_session() -> eyre::Result<()> {
    let (_dir, mut dataset) = tmp_dataset();

    let output = run(
        &mut dataset,
        &format!(
            "mode video\nopen {}\nseek 5\ncaption mid frame\nseek 12\nsave\nseek 5.0\nsave\n",
            create_test_video().display()
        ),
    )?;

    assert!(output.contains("Switched to video mode"), "{output}");
    assert!(
        output.contains("pick a time between 0.0 and 9.0 seconds"),
        "{output}"
    );
    assert!(output.contains("Captured the frame of"), "{output}");
    assert!(output.contains("at 5.0 seconds"), "{output}");
    assert!(output.contains("error: 12.0s is not in the video"), "{output}");
    assert!(
        output.contains("success: Image image1.jpeg saved with caption: mid frame"),
        "{output}"
    );
    // the caption was used up by the first save
    assert!(output.contains("error: the caption is empty"), "{output}");
    assert_eq!(1, dataset.records()?.len());
    Ok(())
}

#[test]
fn test_failed_capture_is_reported() -> eyre::Result<()> {
    let (dir, mut dataset) = tmp_dataset();
    let cut = dir.path().join("cut.mp4");
    std::fs::write(&cut, truncated_test_video())?;

    let output = run(
        &mut dataset,
        &format!(
            "mode video\nopen {}\nseek 8\ncaption end\nsave\n",
            cut.display()
        ),
    )?;

    assert!(
        output.contains("error: Failed to capture frame at 8.0 seconds"),
        "{output}"
    );
    assert!(
        output.contains("error: there is no image or frame to save"),
        "{output}"
    );
    assert!(dataset.records()?.is_empty());
    Ok(())
}
