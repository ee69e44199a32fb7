//! idcard CLI - Command line interface for identity cards.
//!
//! This tool inspects cards, converts them between the archive and
//! directory representations, and builds new cards from loose files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use idcard_common::Umask;
use idcard_core::{load_card, save_card, CardFormat, CardModel, Credentials, DirectoryOptions};
use idcard_storage::{LocalProvider, StorageProvider};

#[derive(Parser)]
#[command(name = "idcard")]
#[command(about = "idcard - Identity card management")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a summary of a card.
    Inspect {
        /// Card archive file or directory.
        path: PathBuf,
    },

    /// Re-encode a card in another representation.
    Convert {
        /// Card to read.
        from: PathBuf,

        /// Where to write the converted card.
        to: PathBuf,

        /// Output format: "archive" or "directory" (default: from the extension).
        #[arg(short, long)]
        format: Option<CardFormat>,

        /// Octal umask for directory output (default: the process umask).
        #[arg(short, long)]
        umask: Option<String>,
    },

    /// Build a new card from a user name, a connection profile and credential files.
    Create {
        /// User the card authenticates as.
        #[arg(long)]
        user: String,

        /// Connection profile JSON file.
        #[arg(short, long)]
        profile: PathBuf,

        /// Where to write the card.
        #[arg(short, long)]
        output: PathBuf,

        /// Business network the card targets.
        #[arg(short, long)]
        network: Option<String>,

        /// Free text description.
        #[arg(short, long)]
        description: Option<String>,

        /// Enrollment secret.
        #[arg(long)]
        secret: Option<String>,

        /// Role granted to the card (repeatable).
        #[arg(long = "role")]
        roles: Vec<String>,

        /// Credential as NAME=FILE (repeatable).
        #[arg(short, long = "credential")]
        credentials: Vec<String>,

        /// Output format: "archive" or "directory" (default: from the extension).
        #[arg(short, long)]
        format: Option<CardFormat>,

        /// Octal umask for directory output (default: the process umask).
        #[arg(short, long)]
        umask: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let provider: Arc<dyn StorageProvider> = Arc::new(LocalProvider::new());

    match cli.command {
        Commands::Inspect { path } => cmd_inspect(provider, &path).await,

        Commands::Convert {
            from,
            to,
            format,
            umask,
        } => {
            let options = directory_options(umask.as_deref())?;
            cmd_convert(provider, &from, &to, format, options).await
        }

        Commands::Create {
            user,
            profile,
            output,
            network,
            description,
            secret,
            roles,
            credentials,
            format,
            umask,
        } => {
            let options = directory_options(umask.as_deref())?;
            let mut metadata = json!({ "version": idcard_core::CURRENT_VERSION, "userName": user });
            if let Some(network) = network {
                metadata["businessNetwork"] = json!(network);
            }
            if let Some(description) = description {
                metadata["description"] = json!(description);
            }
            if let Some(secret) = secret {
                metadata["enrollmentSecret"] = json!(secret);
            }
            if !roles.is_empty() {
                metadata["roles"] = json!(roles);
            }
            cmd_create(
                provider,
                metadata,
                &profile,
                &credentials,
                &output,
                format,
                options,
            )
            .await
        }
    }
}

/// Build directory options from an optional octal umask argument.
fn directory_options(umask: Option<&str>) -> Result<DirectoryOptions> {
    match umask {
        Some(text) => {
            let bits = u32::from_str_radix(text.trim_start_matches("0o"), 8)
                .with_context(|| format!("Invalid umask '{}'. Use octal, e.g. 022", text))?;
            if bits > 0o777 {
                anyhow::bail!("Invalid umask '{}'. Must be at most 777", text);
            }
            Ok(DirectoryOptions::new(Umask::new(bits)))
        }
        None => Ok(DirectoryOptions::from_process()),
    }
}

/// Split a `NAME=FILE` credential argument.
fn parse_credential_arg(arg: &str) -> Result<(&str, &Path)> {
    match arg.split_once('=') {
        Some((name, file)) if !name.is_empty() && !file.is_empty() => Ok((name, Path::new(file))),
        _ => anyhow::bail!("Invalid credential '{}'. Use NAME=FILE", arg),
    }
}

/// Print a summary of a card.
async fn cmd_inspect(provider: Arc<dyn StorageProvider>, path: &Path) -> Result<()> {
    let card = load_card(provider, path)
        .await
        .with_context(|| format!("Failed to load card from {}", path.display()))?;

    print_summary(&card);
    Ok(())
}

fn print_summary(card: &CardModel) {
    let profile = card.connection_profile();

    println!("Card Information");
    println!("================");
    println!("User:             {}", card.user_name());
    if !card.business_network_name().is_empty() {
        println!("Business network: {}", card.business_network_name());
    }
    if !card.description().is_empty() {
        println!("Description:      {}", card.description());
    }
    println!("Connection:       {}", profile.name());
    if let Some(Value::String(kind)) = profile.get("type") {
        println!("Connection type:  {}", kind);
    }
    if !card.roles().is_empty() {
        println!("Roles:            {}", card.roles().join(", "));
    }
    println!(
        "Enrollment:       {}",
        if card.enrollment_credentials().is_some() {
            "secret present"
        } else {
            "none"
        }
    );

    if card.credentials().is_empty() {
        println!("Credentials:      none");
    } else {
        println!("Credentials:");
        for (name, content) in card.credentials() {
            println!("  {} ({} bytes)", name, content.len());
        }
    }
}

/// Load a card and save it in another representation.
async fn cmd_convert(
    provider: Arc<dyn StorageProvider>,
    from: &Path,
    to: &Path,
    format: Option<CardFormat>,
    options: DirectoryOptions,
) -> Result<()> {
    let card = load_card(provider.clone(), from)
        .await
        .with_context(|| format!("Failed to load card from {}", from.display()))?;

    let format = format.unwrap_or_else(|| CardFormat::for_new_path(to));
    info!("Converting card {} to {} ({})", from.display(), to.display(), format);

    save_card(provider, &card, to, format, options)
        .await
        .with_context(|| format!("Failed to save card to {}", to.display()))?;

    println!("Card written to {} as {}", to.display(), format);
    Ok(())
}

/// Build a card from loose files and save it.
async fn cmd_create(
    provider: Arc<dyn StorageProvider>,
    metadata: Value,
    profile_path: &Path,
    credential_args: &[String],
    output: &Path,
    format: Option<CardFormat>,
    options: DirectoryOptions,
) -> Result<()> {
    let profile_text = provider
        .read_to_string(profile_path)
        .await
        .with_context(|| format!("Failed to read connection profile {}", profile_path.display()))?;
    let profile: Value = serde_json::from_str(&profile_text)
        .with_context(|| format!("Invalid connection profile {}", profile_path.display()))?;

    let mut card = CardModel::new(metadata, profile).context("Invalid card")?;

    let mut credentials = Credentials::new();
    for arg in credential_args {
        let (name, file) = parse_credential_arg(arg)?;
        let content = provider
            .read_to_string(file)
            .await
            .with_context(|| format!("Failed to read credential file {}", file.display()))?;
        debug!(name, file = %file.display(), "Adding credential");
        credentials.insert(name.to_string(), content);
    }
    card.set_credentials(credentials);

    let format = format.unwrap_or_else(|| CardFormat::for_new_path(output));
    info!("Creating card for {} at {}", card.user_name(), output.display());

    save_card(provider, &card, output, format, options)
        .await
        .with_context(|| format!("Failed to save card to {}", output.display()))?;

    println!("Card created successfully!");
    println!("Location: {}", output.display());
    println!("Format:   {}", format);
    Ok(())
}
