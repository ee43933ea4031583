use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use crate::warehouse::DEFAULT_ENDPOINT;

#[derive(Parser, Debug)]
#[command(name = "biql", author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a project skeleton in a directory
    Init {
        /// Directory to initialize
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Extract the schema of a BigQuery table to a JSON file
    Extract {
        /// Table to extract, as project.dataset.table
        #[arg(short, long)]
        table: String,
        /// Output file (default: <table>_schema.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of sample rows to fetch (0 for none)
        #[arg(short, long, default_value_t = 0)]
        samples: usize,
        /// Sample output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        /// Truncate long sample values (0 to disable)
        #[arg(long, default_value_t = 0)]
        truncate: usize,
        /// Give up after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// OAuth access token (default: GOOGLE_OAUTH_ACCESS_TOKEN or gcloud)
        #[arg(long, env = "BIQL_ACCESS_TOKEN", hide_env_values = true)]
        access_token: Option<String>,
        /// BigQuery REST endpoint
        #[arg(long, env = "BIQL_BIGQUERY_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
    },
    /// Parse a provider configuration file
    Parse {
        /// Path to provider configuration file
        #[arg(short, long, default_value = "provider.hcl")]
        config: PathBuf,
        /// Print the parsed configuration as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Long flags that may also be written with a single dash, as in
/// `biql extract -table p.d.t`.
const SINGLE_DASH_FLAGS: &[&str] = &[
    "dir",
    "table",
    "output",
    "samples",
    "format",
    "truncate",
    "timeout",
    "access-token",
    "endpoint",
    "config",
    "json",
    "verbose",
];

/// Rewrite `-name` and `-name=value` words to `--name` so clap does not read
/// them as a short flag with an attached value (`-dir` as `-d ir`).
/// Everything after a bare `--` is left alone.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut passthrough = false;
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            if passthrough {
                return arg;
            }
            let Some(word) = arg.to_str() else {
                return arg;
            };
            if word == "--" {
                passthrough = true;
                return arg;
            }
            match word.strip_prefix('-') {
                Some(rest) if !rest.starts_with('-') => {
                    let name = rest.split_once('=').map_or(rest, |(name, _)| name);
                    if SINGLE_DASH_FLAGS.contains(&name) {
                        OsString::from(format!("-{word}"))
                    } else {
                        arg
                    }
                }
                _ => arg,
            }
        })
        .collect()
}
