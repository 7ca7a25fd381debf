//! cloud-userdata - build cloud-init multipart user-data
//!
//! Reads a JSON list of `[path, mime-type]` pairs and prints a single
//! multipart/mixed document (optionally gzip- and/or base64-encoded).

use clap::Parser;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, debug};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cloud_userdata::{Boundary, BuildOptions, Encoding, build_userdata};

/// Long flags that may also be spelled with a single dash (`-config`)
const LONG_FLAGS: &[&str] = &[
    "config",
    "encode",
    "fixedBoundary",
    "fixed-boundary",
    "boundary",
    "gzip",
    "verbose",
];

/// Long flags that consume the following argument as their value
const VALUE_FLAGS: &[&str] = &["config", "boundary"];

/// Boolean flags that accept an inline value (`-encode=true`)
const BOOL_FLAGS: &[&str] = &["encode", "fixedBoundary", "fixed-boundary", "gzip"];

/// Parse an inline boolean the way Go's `strconv.ParseBool` does
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[derive(Parser, Debug)]
#[command(name = "cloud-userdata")]
#[command(author, version, about = "Build cloud-init multipart/mixed user-data", long_about = None)]
struct Cli {
    /// Config file containing paths and type of the userdata
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base64 encode the userdata
    #[arg(long)]
    encode: bool,

    /// Use the constant MIMEBOUNDARY boundary so output is reproducible
    #[arg(long = "fixed-boundary", alias = "fixedBoundary", conflicts_with = "boundary")]
    fixed_boundary: bool,

    /// Use this multipart boundary instead of a random one
    #[arg(long, value_name = "TOKEN")]
    boundary: Option<String>,

    /// Gzip the document (before base64 when --encode is also given)
    #[arg(long)]
    gzip: bool,

    /// Enable verbose output on stderr
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn build_options(&self) -> BuildOptions {
        let boundary = match (&self.boundary, self.fixed_boundary) {
            (Some(token), _) => Boundary::Explicit(token.clone()),
            (None, true) => Boundary::Fixed,
            (None, false) => Boundary::Random,
        };

        BuildOptions {
            boundary,
            encoding: Encoding {
                gzip: self.gzip,
                base64: self.encode,
            },
        }
    }
}

/// Rewrite single-dash long flags (`-config x`, `-encode`) to clap's `--` form
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = Vec::new();
    let mut takes_value = false;
    let mut passthrough = false;

    for (i, arg) in args.into_iter().enumerate() {
        if i == 0 || passthrough || takes_value {
            takes_value = false;
            out.push(arg);
            continue;
        }

        let Some(s) = arg.to_str() else {
            out.push(arg);
            continue;
        };

        if s == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }

        let name = s.trim_start_matches('-');
        let (flag, inline_value) = match name.split_once('=') {
            Some((flag, value)) => (flag, Some(value)),
            None => (name, None),
        };
        let has_inline_value = inline_value.is_some();
        let dashes = s.len() - name.len();

        if !(dashes == 1 || dashes == 2) || !LONG_FLAGS.contains(&flag) {
            out.push(arg);
            continue;
        }

        // `-flag=false` leaves a boolean at its default; unparseable values go to clap
        if BOOL_FLAGS.contains(&flag)
            && let Some(enabled) = inline_value.and_then(parse_bool)
        {
            if enabled {
                out.push(OsString::from(format!("--{}", flag)));
            }
            continue;
        }

        takes_value = VALUE_FLAGS.contains(&flag) && !has_inline_value;
        out.push(OsString::from(format!("--{}", name)));
    }

    out
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn write_output(data: &[u8], trailing_newline: bool) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    out.write_all(data)?;
    if trailing_newline {
        out.write_all(b"\n")?;
    }
    out.flush()
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logging(cli.verbose);

    let Some(config) = cli.config.as_ref() else {
        println!("No config supplied");
        return ExitCode::FAILURE;
    };

    let options = cli.build_options();
    debug!("Build options: {:?}", options);

    let output = match build_userdata(config, &options) {
        Ok(output) => output,
        Err(e) => {
            println!("{}", e);
            debug!("Build failed: {:?}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = write_output(&output, !options.encoding.is_binary()) {
        eprintln!("Unable to write userdata: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
