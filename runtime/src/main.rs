use clap::{Parser, Subcommand};
use evidence_batch::cli::{doctor, output, run_cmd};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "evidence-batch",
    version,
    about = "Collect website evidence for many pages and merge it into one report"
)]
struct Cli {
    /// Only print errors.
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Debug-level logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a batch described by a configuration file.
    Run {
        /// YAML or JSON configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Override the configured worker count.
        #[arg(short, long)]
        workers: Option<usize>,
        /// Write JSON reports only.
        #[arg(long, default_value_t = false)]
        skip_html: bool,
    },
    /// Check that the external tools and the configuration are usable.
    Doctor {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    output::init(output::OutputFlags {
        quiet: cli.quiet,
        verbose: cli.verbose,
        no_color: cli.no_color,
    });
    init_logging(cli.no_color);

    let result = match cli.command {
        Commands::Run {
            config,
            workers,
            skip_html,
        } => {
            run_cmd::run(run_cmd::RunArgs {
                config: &config,
                workers,
                skip_html,
            })
            .await
        }
        Commands::Doctor { config } => match doctor::run(config.as_deref()).await {
            Ok(true) => Ok(()),
            Ok(false) => std::process::exit(1),
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(no_color: bool) {
    let default_level = if output::is_verbose() {
        "evidence_batch=debug"
    } else if output::is_quiet() {
        "evidence_batch=error"
    } else {
        "evidence_batch=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!no_color && std::env::var_os("NO_COLOR").is_none())
        .init();
}
