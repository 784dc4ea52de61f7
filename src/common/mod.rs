use std::io::Write;

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Format an IO error message without the "(os error N)" suffix.
/// GNU coreutils prints e.g. "No such file or directory" while Rust's
/// Display impl adds " (os error 2)". This strips the suffix for compat.
pub fn io_error_msg(e: &std::io::Error) -> String {
    if let Some(raw) = e.raw_os_error() {
        let os_err = std::io::Error::from_raw_os_error(raw);
        let msg = format!("{}", os_err);
        msg.replace(&format!(" (os error {})", raw), "")
    } else {
        format!("{}", e)
    }
}

/// Send diagnostics to stderr as `<tool>: <level>: <message>`, one line per record.
///
/// Defaults to warnings only; `verbose` lowers the floor to debug. `RUST_LOG`
/// overrides both.
pub fn init_logging(tool: &'static str, verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    Builder::from_env(Env::default().default_filter_or(level.as_str()))
        .format(move |buf, record| {
            writeln!(
                buf,
                "{}: {}: {}",
                tool,
                record.level().as_str().to_lowercase(),
                record.args()
            )
        })
        .init();
}
