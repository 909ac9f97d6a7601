#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unnecessary_wraps,
    dead_code
)]

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::Write;
use supportdesk::config::{Config, DEFAULT_PROVIDER};
use supportdesk::escalation::{self, Envelope, EnvelopeBody};
use supportdesk::{gateway, providers, sessions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// Support desk triage: try to resolve a problem, draft a ticket when that fails.
#[derive(Parser, Debug)]
#[command(name = "supportdesk")]
#[command(version)]
#[command(about = "Support conversations that escalate to drafted tickets.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway
    #[command(long_about = "\
Start the HTTP gateway.

Serves POST /api/agents/respond plus session inspection routes. Bind \
address defaults to the values in your config file (gateway.host / \
gateway.port).

Examples:
  supportdesk serve                  # use config defaults
  supportdesk serve -p 8080          # listen on port 8080
  supportdesk serve --host 0.0.0.0   # bind to all interfaces")]
    Serve {
        /// Port to listen on (use 0 for random available port); defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Run one support conversation in the terminal
    #[command(long_about = "\
Run one support conversation in the terminal.

Each line you type is one message in a single session. The session \
ends after a ticket draft is produced, or on EOF.

Examples:
  supportdesk chat
  supportdesk chat -m \"my laptop won't boot\"")]
    Chat {
        /// Single message mode (don't enter interactive mode)
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show effective configuration and supported providers
    Status,

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `supportdesk`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(supportdesk completions bash)
  supportdesk completions zsh > ~/.zfunc/_supportdesk")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("SUPPORTDESK_CONFIG_DIR", config_dir);
    }

    // Completions stay stdout-only: no config load, no logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load_or_init().await?;

    match cli.command {
        Commands::Completions { .. } => unreachable!(),

        Commands::Serve { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            info!("Starting supportdesk gateway on {host}:{port}");
            gateway::run_gateway(&host, port, config).await
        }

        Commands::Chat { message } => run_chat(&config, message).await,

        Commands::Status => {
            print_status(&config);
            Ok(())
        }
    }
}

async fn run_chat(config: &Config, message: Option<String>) -> Result<()> {
    let controller = escalation::create_controller(config, sessions::create_session_store())?;

    if let Some(message) = message {
        let envelope = controller.handle_message(None, &message).await?;
        print_envelope(&envelope);
        return Ok(());
    }

    println!("Describe your problem. Ctrl-D to quit.");
    let mut session_id: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match controller.handle_message(session_id.as_deref(), &line).await {
            Ok(envelope) => {
                session_id = Some(envelope.session_id.clone());
                print_envelope(&envelope);
                if matches!(envelope.body, EnvelopeBody::TicketDraft(_)) {
                    break;
                }
            }
            Err(e) => eprintln!("error ({}): {e}", e.kind()),
        }
    }
    Ok(())
}

fn print_envelope(envelope: &Envelope) {
    match &envelope.body {
        EnvelopeBody::Question(text) => println!("? {text}"),
        EnvelopeBody::Solution(text) => println!("{text}"),
        EnvelopeBody::TicketDraft(draft) => {
            println!("Escalating. Ticket draft:");
            println!("  Title:       {}", draft.title);
            println!("  Description: {}", draft.description);
        }
    }
}

fn print_status(config: &Config) {
    let shown = config.redacted();
    println!("supportdesk status");
    println!();
    println!("Version:       {}", env!("CARGO_PKG_VERSION"));
    println!("Config:        {}", shown.config_path.display());
    println!();
    println!(
        "Provider:      {}",
        shown.default_provider.as_deref().unwrap_or(DEFAULT_PROVIDER)
    );
    println!(
        "Model:         {}",
        shown.default_model.as_deref().unwrap_or("(default)")
    );
    println!("Temperature:   {}", shown.default_temperature);
    println!(
        "API key:       {}",
        shown.api_key.as_deref().unwrap_or("(not set)")
    );
    println!("Max attempts:  {}", shown.escalation.max_attempts);
    println!(
        "Gateway:       {}:{} ({} token(s))",
        shown.gateway.host,
        shown.gateway.port,
        shown.gateway.api_tokens.len()
    );
    println!();
    println!("Supported providers:");
    for p in providers::list_providers() {
        println!("  {:<12} {}", p.name, p.display_name);
    }
    println!("  custom:<URL> Any OpenAI-compatible endpoint");
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}
