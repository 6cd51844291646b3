use clap::Parser;
use miette::Result;
use tracing_subscriber::EnvFilter;
use widgetsmith::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) so piping to
    // `head` or `grep -q` does not panic on a broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    init_logging(global.verbose);

    match cli.command {
        Commands::Init(args) => widgetsmith::cli::commands::init::run(args),
        Commands::Fingerprint(args) => widgetsmith::cli::commands::fingerprint::run(args, &global),
        Commands::Cache(cmd) => widgetsmith::cli::commands::cache::run(cmd, &global),
        Commands::Audit(cmd) => widgetsmith::cli::commands::audit::run(cmd, &global),
        Commands::Validate(args) => widgetsmith::cli::commands::validate::run(args, &global),
        Commands::Config(cmd) => widgetsmith::cli::commands::config::run(cmd, &global),
        Commands::Completions(args) => widgetsmith::cli::commands::completions::run(args),
    }
}

/// Logs go to stderr; `WIDGETSMITH_LOG` takes a tracing filter directive
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("WIDGETSMITH_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
