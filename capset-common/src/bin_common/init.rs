use std::{path::Path, time::SystemTime};

use color_eyre::{
    config::{HookBuilder, Theme},
    eyre::{self, Context},
};
use fern::colors::{Color, ColoredLevelConfig};

pub fn init_eyre() -> eyre::Result<()> {
    let eyre_color = if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        Theme::dark()
    } else {
        Theme::new()
    };

    let (stderr_panic_hook, eyre_hook) =
        HookBuilder::default().theme(eyre_color).into_hooks();
    eyre_hook
        .install()
        .wrap_err("failed to install eyre hook")?;

    let (log_panic_hook, _) = HookBuilder::default().theme(Theme::new()).into_hooks();

    std::panic::set_hook(Box::new(move |info| {
        eprintln!("{}", stderr_panic_hook.panic_report(info));

        log::error!(target: "panic", "{}", log_panic_hook.panic_report(info));
    }));

    Ok(())
}

/// Logs go to stderr, filtered at `level`, so that they don't interleave with what the
/// binaries print on stdout. Everything is additionally written to `logfile`, if given.
pub fn init_logger(logfile: Option<&Path>, level: log::LevelFilter) -> eyre::Result<()> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::BrightBlack);
    let colored = std::io::IsTerminal::is_terminal(&std::io::stderr());

    let mut dispatch = fern::Dispatch::new().level(log::LevelFilter::Trace).chain(
        fern::Dispatch::new()
            .level(level)
            .format(move |out, message, record| {
                let level = if colored {
                    colors.color(record.level()).to_string()
                } else {
                    record.level().to_string()
                };
                out.finish(format_args!(
                    "[{level:<5} {}] {message}",
                    record.target()
                ))
            })
            .chain(std::io::stderr()),
    );

    if let Some(logfile) = logfile {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "{} {:<5} {}: {message}",
                        humantime::format_rfc3339_seconds(SystemTime::now()),
                        record.level(),
                        record.target()
                    ))
                })
                .chain(fern::log_file(logfile).wrap_err_with(|| {
                    format!("failed to open the log file at: {logfile:?}")
                })?),
        );
    }

    dispatch.apply().wrap_err("failed to set the logger")?;

    Ok(())
}
