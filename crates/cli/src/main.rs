mod cmd;
mod output;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cuebuild_lib::config::parse_jobs;
use cuebuild_lib::consts::BUILD_FILE_NAME;
use cuebuild_lib::package::OutputFormat;

use crate::cmd::BuildOptions;
use crate::output::print_error;

/// cuebuild - build CUE packages and render configuration from them
#[derive(Parser)]
#[command(name = "cuebuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build targets declared in a build file
  Build {
    /// Targets to build; builds everything when empty
    targets: Vec<String>,

    /// Path to the build file
    #[arg(short, long, default_value = BUILD_FILE_NAME)]
    file: PathBuf,

    /// Output directory (default: cuebuild-out next to the build file)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Maximum number of targets built at once
    #[arg(short, long, value_parser = parse_jobs_arg)]
    jobs: Option<NonZeroUsize>,

    /// Evaluator program
    #[arg(long)]
    evaluator: Option<String>,

    /// Output the report as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show the targets of a build file and the order they build in
  Plan {
    /// Path to the build file
    #[arg(short, long, default_value = BUILD_FILE_NAME)]
    file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Package sources listed in a pack manifest into a bundle
  Pack {
    /// JSON manifest with `import_path` and `srcs`
    #[arg(long)]
    manifest: PathBuf,

    /// Bundle to write
    #[arg(short, long)]
    output: PathBuf,
  },

  /// Merge bundles in order; later bundles win on shared paths
  Merge {
    /// Bundle to write
    #[arg(short, long)]
    output: PathBuf,

    /// Input bundles, in closure order
    inputs: Vec<PathBuf>,
  },

  /// Render an entry file from a merged bundle
  Render {
    /// Merged bundle
    #[arg(long)]
    bundle: PathBuf,

    /// Entry file path inside the bundle
    #[arg(long)]
    entry: String,

    /// Output format: json or yaml
    #[arg(long, default_value = "json", value_parser = parse_format_arg)]
    out_format: OutputFormat,

    /// Ask the evaluator to escape HTML in its output
    #[arg(long)]
    escape: bool,

    /// Write the rendered output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Evaluator program
    #[arg(long)]
    evaluator: Option<String>,
  },
}

fn parse_jobs_arg(value: &str) -> Result<NonZeroUsize, String> {
  parse_jobs("--jobs", value).map_err(|e| e.to_string())
}

fn parse_format_arg(value: &str) -> Result<OutputFormat, String> {
  value.parse::<OutputFormat>().map_err(|e| e.to_string())
}

fn init_tracing(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Build {
      targets,
      file,
      out_dir,
      jobs,
      evaluator,
      json,
    } => cmd::cmd_build(BuildOptions {
      file,
      targets,
      out_dir,
      jobs,
      evaluator,
      json,
    }),
    Commands::Plan { file, json } => cmd::cmd_plan(&file, json),
    Commands::Pack { manifest, output } => cmd::cmd_pack(&manifest, &output),
    Commands::Merge { output, inputs } => cmd::cmd_merge(&inputs, &output),
    Commands::Render {
      bundle,
      entry,
      out_format,
      escape,
      output,
      evaluator,
    } => cmd::cmd_render(&bundle, &entry, out_format, escape, output.as_deref(), evaluator),
  };

  match result {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
