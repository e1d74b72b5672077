//! nexushound CLI - Command-line interface for the plugin host
//!
//! This binary follows the "Thin Interface" pattern:
//! - Clap handles argument parsing and --help/--version
//! - Delegates to the library for all actual work

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use nexushound::core::plugins::{
    ApproveAll, DynamicLoader, OptionValue, OverridePrompt, ReaderPrompt,
};
use nexushound::core::{logging, DiscoveryEngine, HostConfig, IntegrityRegistry, SecurityAnalyzer};
use std::path::PathBuf;
use std::sync::Arc;

/// Vet, register and run security tooling plugins.
#[derive(Parser, Debug)]
#[command(name = "nexushound")]
#[command(version = nexushound::version())]
#[command(about = "Vet, register and run security tooling plugins.")]
#[command(after_help = "Examples:
  # Find plugin sources without running them
  nexushound discover ./plugins

  # Security verdict for one file
  nexushound analyze ./plugins/dns_enum.lua

  # Load everything and run one plugin with an option override
  nexushound run DnsEnum --set domain=example.com
")]
struct Cli {
    /// Path to a JSON configuration file.
    /// Defaults to <config dir>/nexushound/config.json
    #[arg(short = 'c', long = "config", value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Registry database, overriding the configured path
    #[arg(long = "database", value_name = "DB", global = true)]
    database: Option<PathBuf>,

    /// Skip the external analyzer pass
    #[arg(long = "no-external", global = true)]
    no_external: bool,

    /// Load plugins flagged unsafe without asking
    #[arg(short = 'y', long = "yes", global = true)]
    yes: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List plugin source files under a directory
    Discover {
        /// Plugin directory (defaults to the configured one)
        dir: Option<PathBuf>,
    },

    /// Print the security verdict for a file
    Analyze {
        file: PathBuf,
    },

    /// Load every plugin under a directory and list the catalog
    Load {
        dir: Option<PathBuf>,
    },

    /// Load plugins and run one by name
    Run {
        name: String,

        #[arg(long = "dir", value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Option override, repeatable
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },

    /// Compare a file against a plugin's trusted fingerprint
    Verify {
        name: String,
        file: PathBuf,

        #[arg(long = "category", default_value = "")]
        category: String,
    },

    /// Accept a file's current contents as the plugin's trusted fingerprint
    Trust {
        name: String,
        file: PathBuf,

        #[arg(long = "category", default_value = "")]
        category: String,
    },

    /// Manage stored wordlists
    Wordlists {
        #[command(subcommand)]
        action: WordlistAction,
    },

    /// List recorded results, newest first
    Results {
        #[arg(long = "plugin-id")]
        plugin_id: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
enum WordlistAction {
    List,
    Add { name: String, file: PathBuf },
    Show { id: i64 },
    /// Import every *.txt file from a directory
    Bootstrap { dir: Option<PathBuf> },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = HostConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }
    if cli.no_external {
        config.external_tool.enabled = false;
    }
    config.validate()?;

    logging::init(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Command::Discover { dir } => {
            let root = dir.unwrap_or_else(|| config.plugin_dir.clone());
            for path in DiscoveryEngine::new(config.extensions.clone()).discover(&root) {
                println!("{}", path.display());
            }
        }

        Command::Analyze { file } => {
            let analyzer = SecurityAnalyzer::new(config.external_tool.clone());
            let report = analyzer.analyze(&file, config.thresholds);
            let safe = report.is_safe();
            for warning in report.warnings() {
                println!("{}", warning);
            }
            if !safe {
                bail!("{} is unsafe", file.display());
            }
            println!("{}: safe", file.display());
        }

        Command::Load { dir } => {
            let root = dir.unwrap_or_else(|| config.plugin_dir.clone());
            let mut loader = loader(&config, cli.yes)?;
            loader.load_all(&root);
            for summary in loader.list_modules() {
                println!(
                    "{}\t{}\t{}\tid={}{}",
                    summary.name,
                    if summary.category.is_empty() { "-" } else { summary.category.as_str() },
                    summary.version,
                    summary.plugin_id,
                    if summary.is_modified { "\tMODIFIED" } else { "" }
                );
            }
        }

        Command::Run { name, dir, set } => {
            let root = dir.unwrap_or_else(|| config.plugin_dir.clone());
            let mut loader = loader(&config, cli.yes)?;
            loader.load_all(&root);
            let instance = loader.require(&name)?;

            for assignment in &set {
                let (option, text) = assignment
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{}'", assignment))?;
                let kind = instance
                    .options()
                    .iter()
                    .find(|spec| spec.name == option)
                    .map(|spec| spec.kind)
                    .ok_or_else(|| anyhow!("plugin '{}' has no option '{}'", name, option))?;
                let value = OptionValue::parse_text(kind, text).map_err(|e| anyhow!("{}: {}", option, e))?;
                instance.set_option_value(option, value)?;
            }

            if instance.is_modified() {
                eprintln!("warning: {} changed since it was last trusted", instance.path().display());
            }
            instance.run()?;
            for id in instance.recorded_results() {
                println!("result {}", id);
            }
        }

        Command::Verify { name, file, category } => {
            let registry = registry(&config)?;
            let row = registry
                .find_plugin(&name, &category)?
                .ok_or_else(|| anyhow!("plugin '{}' is not registered", name))?;
            if registry.verify(row.id, &file)? {
                println!("{}: matches trusted fingerprint", name);
            } else {
                bail!("{}: differs from trusted fingerprint {}", name, row.content_hash.short());
            }
        }

        Command::Trust { name, file, category } => {
            let registry = registry(&config)?;
            let row = registry
                .find_plugin(&name, &category)?
                .ok_or_else(|| anyhow!("plugin '{}' is not registered", name))?;
            let fingerprint = registry.update_trusted_fingerprint(row.id, &file)?;
            println!("{}: trusted {}", name, fingerprint);
        }

        Command::Wordlists { action } => wordlists(&config, action)?,

        Command::Results { plugin_id } => {
            let registry = registry(&config)?;
            for record in registry.results(plugin_id)? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
    }

    Ok(())
}

fn wordlists(config: &HostConfig, action: WordlistAction) -> Result<()> {
    let registry = registry(config)?;
    match action {
        WordlistAction::List => {
            for summary in registry.wordlists()? {
                println!("{}\t{}\t{}", summary.id, summary.name, summary.element_count);
            }
        }
        WordlistAction::Add { name, file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let elements = nexushound::core::registry::wordlists::decode_lines(&bytes);
            let id = registry.add_wordlist(&name, &elements)?;
            println!("{}", id);
        }
        WordlistAction::Show { id } => {
            let record = registry
                .get_wordlist(id)?
                .ok_or_else(|| anyhow!("no wordlist with id {}", id))?;
            for element in record.elements {
                println!("{}", element);
            }
        }
        WordlistAction::Bootstrap { dir } => {
            let dir = dir.unwrap_or_else(|| config.wordlist_dir.clone());
            let added = registry.bootstrap_wordlists(&dir)?;
            println!("{} wordlists added", added);
        }
    }
    Ok(())
}

fn registry(config: &HostConfig) -> Result<IntegrityRegistry> {
    IntegrityRegistry::open(&config.database_path)
        .with_context(|| format!("opening registry {}", config.database_path.display()))
}

fn loader(config: &HostConfig, yes: bool) -> Result<DynamicLoader> {
    let registry = Arc::new(registry(config)?);
    let prompt: Box<dyn OverridePrompt> = if yes {
        Box::new(ApproveAll)
    } else {
        Box::new(ReaderPrompt::stdio())
    };
    Ok(DynamicLoader::new(config, registry).with_prompt(prompt))
}
