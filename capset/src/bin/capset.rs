use std::{ffi::OsString, io::IsTerminal, path::PathBuf};

use capset::{
    console::Console,
    dataset::{Dataset, DatasetConfig, DEFAULT_JPEG_QUALITY, DEFAULT_ROOT},
    manifest,
    session::{Mode, Session, Upload},
};
use capset_common::{
    bin_common::init::{init_eyre, init_logger},
    utils::{
        fsutils::read_optional_file,
        time::{clap_seconds_parser, format_duration},
    },
};
use capset_video::FrameExtractor;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{self, Context};

#[derive(Parser, Debug)]
#[command()]
/// Builds an image captioning dataset out of images and video frames.
///
/// Every captioned image is saved as a jpeg in the images folder of the dataset and gets a
/// row in its manifest, customDataset.csv.
struct Cli {
    /// Folder of the dataset, created if missing
    #[arg(long, short = 'd', default_value = DEFAULT_ROOT)]
    dataset_dir: PathBuf,

    /// Quality of the saved jpegs
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// A file to additionally write the logs to
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Log more, can be repeated
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Caption interactively, one command per line (the default)
    Console,

    /// Only create the dataset folders and manifest
    Init,

    /// Caption an image
    AddImage {
        /// The caption to save the image with
        #[arg(long, short = 'c')]
        caption: String,

        /// A jpg, jpeg or png file
        image: PathBuf,
    },

    /// Caption a frame of a video
    AddFrame {
        /// Where in the video the frame is, like 5, 2.5 or 1m30s
        #[arg(long, short = 't', value_parser = clap_seconds_parser)]
        at: f64,

        /// The caption to save the frame with
        #[arg(long, short = 'c')]
        caption: String,

        /// A mp4, mov or avi file
        video: PathBuf,
    },

    /// Print how long a video is
    Duration { video: PathBuf },

    /// Print the manifest
    List,
}

fn cli_arguments() -> eyre::Result<Cli> {
    const ARGS_FILE: &str = ".capsetrc";
    let mut args: Vec<OsString> = std::env::args_os().collect();

    if args.len() == 1 {
        if let Some(flags) = read_optional_file(ARGS_FILE)
            .wrap_err_with(|| format!("Could not read config file at: {ARGS_FILE}"))?
        {
            args.extend(
                flags
                    .split_whitespace()
                    .map(|s| std::ffi::OsStr::new(s).to_owned()),
            );
        }
    }

    Ok(Cli::parse_from(args))
}

fn main() -> eyre::Result<()> {
    init_eyre()?;
    let cli = cli_arguments()?;
    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    init_logger(cli.logfile.as_deref(), level)?;

    log::debug!("CLI arguments: {cli:#?}");

    let mut dataset = Dataset::open(
        DatasetConfig::new(&cli.dataset_dir).jpeg_quality(cli.jpeg_quality),
    )
    .wrap_err_with(|| {
        format!("failed to set up the dataset at {}", cli.dataset_dir.display())
    })?;

    match cli.command.unwrap_or(Command::Console) {
        Command::Console => {
            let stdin = std::io::stdin();
            let prompt = stdin.is_terminal();
            if prompt {
                println!("Captioning into {}, type help for help", dataset.root().display());
            }
            Console::new(&mut dataset, std::io::stdout())
                .with_prompt(prompt)
                .run(stdin.lock())?;
        }
        Command::Init => {
            println!("The dataset is ready at {}", dataset.root().display());
        }
        Command::AddImage { caption, image } => {
            let mut session = Session::new();
            session.load_image(Upload::from_path(&image).wrap_err_with(|| {
                format!("failed to read {}", image.display())
            })?)?;
            session.set_caption(caption);
            let record = session.submit(&mut dataset)?;
            println!("{} {}", record.sno, record.image_path);
        }
        Command::AddFrame { at, caption, video } => {
            let mut session = Session::new();
            session.set_mode(Mode::Video);
            session.load_video(Upload::from_path(&video).wrap_err_with(|| {
                format!("failed to read {}", video.display())
            })?)?;
            session.seek(at)?;
            session.set_caption(caption);
            let record = session.submit(&mut dataset)?;
            println!("{} {}", record.sno, record.image_path);
        }
        Command::Duration { video } => {
            let extractor = FrameExtractor::new(&video)
                .wrap_err_with(|| format!("failed to open {}", video.display()))?;
            let duration = extractor.duration()?;
            println!("{} ({:.3} seconds)", format_duration(duration), duration.as_secs_f64());
        }
        Command::List => {
            manifest::write_to(std::io::stdout().lock(), &dataset.records()?)
                .wrap_err("failed to print the manifest")?;
        }
    }

    Ok(())
}
