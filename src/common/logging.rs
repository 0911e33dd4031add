use owo_colors::{OwoColorize, Stream::Stderr};

/// Enable the logger
pub fn enable_logger(verbose: bool) -> Result<(), log::SetLoggerError> {
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}{}: {}",
                // Level messages are padded to keep the output looking somewhat sane
                match record.level() {
                    log::Level::Error => "ERROR"
                        .if_supports_color(Stderr, |text| text.red())
                        .if_supports_color(Stderr, |text| text.bold())
                        .to_string(),
                    log::Level::Warn => "WARN "
                        .if_supports_color(Stderr, |text| text.yellow())
                        .if_supports_color(Stderr, |text| text.bold())
                        .to_string(),
                    log::Level::Info => "INFO "
                        .if_supports_color(Stderr, |text| text.green())
                        .if_supports_color(Stderr, |text| text.bold())
                        .to_string(),
                    log::Level::Debug => "DEBUG"
                        .if_supports_color(Stderr, |text| text.bright_blue())
                        .if_supports_color(Stderr, |text| text.bold())
                        .to_string(),
                    log::Level::Trace => "TRACE"
                        .if_supports_color(Stderr, |text| text.bright_white())
                        .if_supports_color(Stderr, |text| text.bold())
                        .to_string(),
                },
                // Only show the outer crate name if verbose logging is enabled
                if verbose {
                    format!(" [{}]", record.target().split("::").next().unwrap_or_default())
                } else {
                    String::new()
                }
                .if_supports_color(Stderr, |text| text.bright_black()),
                message
            ));
        })
        .level(if std::env::var("XLAT64_TRACE").is_ok() {
            log::LevelFilter::Trace
        } else if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        // STDOUT carries translated packets
        .chain(std::io::stderr())
        .apply()
}
