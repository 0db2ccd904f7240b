//! A line based front end for [Session]. Reads one command per line and answers with
//! `success: ...` or `error: ...` notices.

use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use capset_common::utils::time::{format_duration, parse_seconds, ParseTimeError};
use color_eyre::eyre::{self, Context};

use crate::{
    dataset::Dataset,
    session::{Mode, ParseModeError, Session, SessionError, Upload},
};

pub const HELP: &str = "\
commands:
  mode image|video   switch what is being captioned, forgets everything loaded
  open <path>        load an image (jpg, jpeg, png) or a video (mp4, mov, avi)
  seek <time>        capture the video frame at a time, like 5, 2.5 or 1m30s
  caption <text>     set the caption
  save               save the image or frame with the caption
  preview <path>     write the image or frame waiting for a caption to a file
  status             show what is loaded
  list               show the manifest
  help               show this
  quit               exit";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Mode(Mode),
    Open(PathBuf),
    Seek(f64),
    Caption(String),
    Save,
    Preview(PathBuf),
    Status,
    List,
    Help,
    Quit,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("unknown command {0:?}, try help")]
    Unknown(String),
    #[error("{0} needs an argument")]
    MissingArgument(&'static str),
    #[error("{0} doesn't take any arguments")]
    UnexpectedArgument(&'static str),
    #[error(transparent)]
    Mode(#[from] ParseModeError),
    #[error(transparent)]
    Time(#[from] ParseTimeError),
}

impl Command {
    /// Parses one line. Blank lines are `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        fn required(name: &'static str, rest: &str) -> Result<String, ParseError> {
            if rest.is_empty() {
                Err(ParseError::MissingArgument(name))
            } else {
                Ok(rest.to_string())
            }
        }

        fn nothing(name: &'static str, rest: &str, cmd: Command) -> Result<Command, ParseError> {
            if rest.is_empty() {
                Ok(cmd)
            } else {
                Err(ParseError::UnexpectedArgument(name))
            }
        }

        let cmd = match word.to_ascii_lowercase().as_str() {
            "mode" => Command::Mode(required("mode", rest)?.parse()?),
            "open" => Command::Open(required("open", rest)?.into()),
            "seek" => Command::Seek(parse_seconds(&required("seek", rest)?)?),
            "caption" => Command::Caption(rest.to_string()),
            "preview" => Command::Preview(required("preview", rest)?.into()),
            "save" => nothing("save", rest, Command::Save)?,
            "status" => nothing("status", rest, Command::Status)?,
            "list" => nothing("list", rest, Command::List)?,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => return Err(ParseError::Unknown(word.to_string())),
        };

        Ok(Some(cmd))
    }
}

enum Flow {
    Continue,
    Quit,
}

pub struct Console<'a, W> {
    session: Session,
    dataset: &'a mut Dataset,
    out: W,
    prompt: bool,
}

impl<'a, W: Write> Console<'a, W> {
    pub fn new(dataset: &'a mut Dataset, out: W) -> Self {
        Self {
            session: Session::new(),
            dataset,
            out,
            prompt: false,
        }
    }

    /// Print a prompt before reading each line
    pub fn with_prompt(mut self, prompt: bool) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs commands from `input` until it ends or `quit` is read. Problems with the
    /// commands are only reported, failing to read or write the terminal is an error.
    pub fn run(&mut self, input: impl BufRead) -> eyre::Result<()> {
        let mut lines = input.lines();
        loop {
            if self.prompt {
                write!(self.out, "{} > ", self.session.mode())?;
                self.out.flush()?;
            }

            let Some(line) = lines.next() else {
                break;
            };
            let line = line.wrap_err("failed to read a command")?;

            let cmd = match Command::parse(&line) {
                Ok(Some(cmd)) => cmd,
                Ok(None) => continue,
                Err(e) => {
                    writeln!(self.out, "error: {e}")?;
                    continue;
                }
            };

            log::debug!("Running {cmd:?}");
            match self.execute(cmd) {
                Ok(Flow::Continue) => (),
                Ok(Flow::Quit) => break,
                Err(Failure::Session(e)) => writeln!(self.out, "error: {e}")?,
                Err(Failure::Output(e)) => return Err(e).wrap_err("failed to write"),
            }
        }
        Ok(())
    }

    fn execute(&mut self, cmd: Command) -> Result<Flow, Failure> {
        match cmd {
            Command::Mode(mode) => {
                self.session.set_mode(mode);
                writeln!(self.out, "Switched to {mode} mode")?;
            }
            Command::Open(path) => self.open(&path)?,
            Command::Seek(seconds) => self.seek(seconds)?,
            Command::Caption(caption) => {
                let blank = caption.trim().is_empty();
                self.session.set_caption(caption);
                if blank {
                    writeln!(self.out, "Cleared the caption")?;
                } else {
                    writeln!(self.out, "Caption set, save to store it")?;
                }
            }
            Command::Save => {
                let record = self.session.submit(self.dataset)?;
                let name = Path::new(&record.image_path)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| record.image_path.clone());
                writeln!(
                    self.out,
                    "success: Image {name} saved with caption: {}",
                    record.caption
                )?;
            }
            Command::Preview(path) => {
                let image = self
                    .session
                    .pending()
                    .image()
                    .ok_or(SessionError::NothingPending)?;
                match image.save(&path) {
                    Ok(()) => writeln!(self.out, "Wrote the preview to {}", path.display())?,
                    Err(e) => writeln!(
                        self.out,
                        "error: could not write the preview to {}: {e}",
                        path.display()
                    )?,
                }
            }
            Command::Status => self.status()?,
            Command::List => match self.dataset.records() {
                Ok(records) if records.is_empty() => writeln!(self.out, "The manifest is empty")?,
                Ok(records) => {
                    for record in records {
                        writeln!(
                            self.out,
                            "{:>4}  {}  {}",
                            record.sno, record.image_path, record.caption
                        )?;
                    }
                }
                Err(e) => writeln!(self.out, "error: {e:#}")?,
            },
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn open(&mut self, path: &Path) -> Result<(), Failure> {
        let upload = match Upload::from_path(path) {
            Ok(upload) => upload,
            Err(e) => {
                writeln!(self.out, "error: could not read {}: {e}", path.display())?;
                return Ok(());
            }
        };
        let name = upload.name.clone();

        match self.session.mode() {
            Mode::Image => {
                self.session.load_image(upload)?;
                writeln!(self.out, "Loaded {}", self.session.pending())?;
            }
            Mode::Video => {
                let duration = self.session.load_video(upload)?;
                let max = self.session.slider().map(|s| s.max()).unwrap_or(0.0);
                writeln!(
                    self.out,
                    "Loaded {name}, {} long, pick a time between 0.0 and {max:.1} seconds",
                    format_duration(duration)
                )?;
                self.seek(0.0)?;
            }
        }
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<(), Failure> {
        let pending = self.session.seek(seconds)?;
        writeln!(self.out, "Captured the {pending}")?;
        Ok(())
    }

    fn status(&mut self) -> io::Result<()> {
        let session = &self.session;
        writeln!(self.out, "mode:    {}", session.mode())?;
        if let (Some(duration), Some(slider)) = (session.video_duration(), session.slider()) {
            writeln!(
                self.out,
                "video:   {} long, slider at {:.1} of {:.1}",
                format_duration(duration),
                slider.value(),
                slider.max()
            )?;
        }
        writeln!(self.out, "pending: {}", session.pending())?;
        writeln!(self.out, "caption: {:?}", session.caption())?;
        writeln!(self.out, "dataset: {}", self.dataset.root().display())
    }
}

/// Why a command stopped: either something the user can fix, or the output is gone.
enum Failure {
    Session(SessionError),
    Output(io::Error),
}

impl From<SessionError> for Failure {
    fn from(e: SessionError) -> Self {
        Failure::Session(e)
    }
}

impl From<io::Error> for Failure {
    fn from(e: io::Error) -> Self {
        Failure::Output(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(line: &str) -> Command {
        Command::parse(line)
            .expect("parses")
            .expect("is a command")
    }

    #[test]
    fn simple_commands() {
        assert_eq!(Command::Save, parse("save"));
        assert_eq!(Command::Status, parse("  STATUS "));
        assert_eq!(Command::Quit, parse("exit"));
        assert_eq!(Command::Mode(Mode::Video), parse("mode video"));
        assert_eq!(Command::Open("my cat.png".into()), parse("open my cat.png"));
        assert_eq!(Command::Preview("/tmp/p.png".into()), parse("preview /tmp/p.png"));
    }

    #[test]
    fn captions_keep_their_spaces() {
        assert_eq!(
            Command::Caption("a cat,  sleeping".to_string()),
            parse("caption   a cat,  sleeping  ")
        );
        assert_eq!(Command::Caption(String::new()), parse("caption"));
    }

    #[test]
    fn seek_times() {
        assert_eq!(Command::Seek(5.0), parse("seek 5"));
        assert_eq!(Command::Seek(90.0), parse("seek 1m30s"));
        assert!(matches!(
            Command::parse("seek later"),
            Err(ParseError::Time(_))
        ));
    }

    #[test]
    fn blank_lines() {
        assert_eq!(Ok(None), Command::parse(""));
        assert_eq!(Ok(None), Command::parse("   "));
    }

    #[test]
    fn bad_commands() {
        assert_eq!(
            Err(ParseError::Unknown("dance".to_string())),
            Command::parse("dance now")
        );
        assert_eq!(
            Err(ParseError::MissingArgument("open")),
            Command::parse("open")
        );
        assert_eq!(
            Err(ParseError::UnexpectedArgument("save")),
            Command::parse("save now")
        );
        assert!(matches!(
            Command::parse("mode audio"),
            Err(ParseError::Mode(_))
        ));
    }
}
