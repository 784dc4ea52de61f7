use std::io;
use std::process;

use anyhow::Context;
use clap::Parser;

use jsort_rs::common::{init_logging, io_error_msg};
use jsort_rs::jsort::{JsortConfig, JsortError, KeyPath, SortConfig, run_pipeline};

const TOOL: &str = "fjsort";

#[derive(Parser)]
#[command(
    name = "fjsort",
    about = "Sort newline-delimited JSON by the value at a key path",
    version
)]
struct Cli {
    /// Sort method passed to the sorter (general-numeric, human-numeric,
    /// month, numeric, random or version for GNU sort)
    #[arg(long = "method", value_name = "METHOD")]
    method: Option<String>,

    /// Sort command binary (usually GNU sort)
    #[arg(long = "command", value_name = "PATH", default_value = "sort")]
    command: String,

    /// Ignore case in keys
    #[arg(short = 'f', long = "ignore-case")]
    ignore_case: bool,

    /// Output only one record per distinct framed line
    #[arg(short = 'u', long = "unique")]
    unique: bool,

    /// Compress sort temporaries with PROG
    #[arg(long = "compress-program", value_name = "PROG", default_value = "gzip")]
    compress_program: String,

    /// Do not compress sort temporaries
    #[arg(long = "no-compress")]
    no_compress: bool,

    /// Main memory buffer size for the sorter
    #[arg(short = 'S', long = "buffer-size", value_name = "SIZE")]
    buffer_size: Option<String>,

    /// Directory for the sorter's temporaries
    #[arg(short = 'T', long = "temporary-directory", value_name = "DIR")]
    temporary_directory: Option<String>,

    /// Number of sorts the sorter may run concurrently
    #[arg(long = "parallel", value_name = "N")]
    parallel: Option<usize>,

    /// Print the sort command and every sort key to stderr
    #[arg(long = "debug")]
    debug: bool,

    /// Path to the sort key, one segment per argument (e.g. `user id`)
    key_path: Vec<String>,
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let key_path = KeyPath::new(cli.key_path)?;
    let sort = SortConfig {
        command: cli.command,
        method: cli.method,
        ignore_case: cli.ignore_case,
        unique: cli.unique,
        compress_program: if cli.no_compress {
            None
        } else {
            Some(cli.compress_program)
        },
        buffer_size: cli.buffer_size,
        temporary_directory: cli.temporary_directory,
        parallel: cli.parallel,
    };
    let config = JsortConfig { key_path, sort };

    run_pipeline(&config, io::stdin(), io::stdout()).context("error during sorting")?;
    Ok(())
}

/// Join the error chain, printing IO errors the way coreutils does.
fn error_message(err: &anyhow::Error) -> String {
    err.chain()
        .map(|cause| {
            if let Some(e) = cause.downcast_ref::<io::Error>() {
                io_error_msg(e)
            } else if let Some(JsortError::Io(e)) = cause.downcast_ref::<JsortError>() {
                io_error_msg(e)
            } else {
                cause.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(": ")
}

fn main() {
    let cli = Cli::parse();
    init_logging(TOOL, cli.debug);

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", TOOL, error_message(&e));
        process::exit(1);
    }
}
