use std::fmt::Arguments;

/// Where the extractor reports odd things about the video it is reading.
pub trait Logger {
    fn log(&self, level: Level, target: &str, body: Arguments<'_>);
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Level {
    Verbose,
    Warn,
    Error,
}

impl From<Level> for log::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Verbose => log::Level::Debug,
            Level::Warn => log::Level::Warn,
            Level::Error => log::Level::Error,
        }
    }
}

/// Forwards everything to the `log` crate
pub struct LogLogger;

impl Logger for LogLogger {
    fn log(&self, level: Level, target: &str, body: Arguments<'_>) {
        log::log!(target: target, log::Level::from(level), "{}", body);
    }
}

/// Like [LogLogger], but mentions which video the message is about.
pub struct ContextLogger {
    video: String,
}

impl ContextLogger {
    pub fn new(video: impl Into<String>) -> Self {
        Self {
            video: video.into(),
        }
    }
}

impl Logger for ContextLogger {
    fn log(&self, level: Level, target: &str, body: Arguments<'_>) {
        LogLogger.log(level, target, format_args!("{} ({})", body, self.video))
    }
}

#[allow(unused_macros)]
macro_rules! verbose {
    ($logger:expr, $($args:tt),* $(,)*) => {
        $logger.log(
            $crate::frame_extractor::logger::Level::Verbose,
            std::module_path!(),
            std::format_args!($($args),*)
        )
    }
}

#[allow(unused_macros)]
macro_rules! warning {
    ($logger:expr, $($args:tt),* $(,)*) => {
        $logger.log(
            $crate::frame_extractor::logger::Level::Warn,
            std::module_path!(),
            std::format_args!($($args),*)
        )
    }
}

#[allow(unused_macros)]
macro_rules! fault {
    ($logger:expr, $($args:tt),* $(,)*) => {
        $logger.log(
            $crate::frame_extractor::logger::Level::Error,
            std::module_path!(),
            std::format_args!($($args),*)
        )
    }
}

#[allow(unused_imports)]
pub(crate) use fault;
#[allow(unused_imports)]
pub(crate) use verbose;
#[allow(unused_imports)]
pub(crate) use warning;
