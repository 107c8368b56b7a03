mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_DECLARATION_ERROR, EXIT_FAILURE};
use declxc_core::{EngineConfig, Operation};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "declxc",
    version,
    about = "Declarative provisioning of LXC containers"
)]
struct Cli {
    /// Engine configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Container directory root, overriding the configured lxc_path.
    #[arg(long, global = true)]
    lxcpath: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create declared containers and apply network, package and user configuration.
    Create {
        /// Path to the YAML file with container definitions.
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Start declared containers.
    Start {
        /// Path to the YAML file with container definitions.
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Stop declared containers.
    Stop {
        /// Path to the YAML file with container definitions.
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Force-destroy declared containers.
    Destroy {
        /// Path to the YAML file with container definitions.
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Run diagnostic checks on the host.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DECLXC_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("declaration error:") {
                EXIT_DECLARATION_ERROR
            } else if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<u8, String> {
    let json_output = cli.json;
    let (operation, file) = match cli.command {
        Commands::Create { file } => (Operation::Create, file),
        Commands::Start { file } => (Operation::Start, file),
        Commands::Stop { file } => (Operation::Stop, file),
        Commands::Destroy { file } => (Operation::Destroy, file),
        Commands::Doctor => {
            let source = config_source(cli.config.as_deref());
            let config = load_config(cli.config.as_deref(), cli.lxcpath)?;
            return commands::doctor::run(&config, source.as_deref(), json_output);
        }
        Commands::Completions { shell } => return commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => return commands::man_pages::run::<Cli>(&dir),
    };

    let config = load_config(cli.config.as_deref(), cli.lxcpath)?;
    let specs = declxc_core::load_specs(&file).map_err(|e| e.to_string())?;
    if std::env::var("DECLXC_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = declxc_runtime::check_prereqs(&config.chroot);
        if !missing.is_empty() {
            return Err(declxc_runtime::format_missing(&missing));
        }
    }
    commands::apply::run(config, operation, &file, &specs, json_output)
}

/// The config file that `load_config` reads, if any.
fn config_source(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => Some(path.to_path_buf()),
        None => declxc_core::default_config_path().filter(|p| p.exists()),
    }
}

fn load_config(
    path: Option<&Path>,
    lxcpath: Option<PathBuf>,
) -> Result<EngineConfig, String> {
    let config = match path {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::load_default(),
    }
    .map_err(|e| e.to_string())?;
    Ok(match lxcpath {
        Some(lxcpath) => config.with_lxc_path(lxcpath),
        None => config,
    })
}
