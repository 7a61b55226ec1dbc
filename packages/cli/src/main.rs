use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use cumulus_sdk::{
    Client, FileStore, PersistedFile, Scope, SdkConfig, User, UserId, WriteOptions,
};
use tracing::{Level, info};

#[derive(Debug, Parser)]
#[command(name = "cumulus", version, about = "Store and retrieve files in a Cumulus store")]
struct Cli {
    /// Config file; defaults to `config/cumulus.*` or `$CUMULUS_CONFIG`.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct ScopeArgs {
    /// Act on behalf of this user instead of the app scope.
    #[arg(long, env = "CUMULUS_USER", value_name = "ID")]
    user: Option<String>,
}

impl ScopeArgs {
    fn scope(&self) -> Scope {
        Scope::from(self.user.clone().map(UserId::new))
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a local file.
    Put {
        path: PathBuf,
        /// Name to store under; defaults to the file name.
        #[arg(long)]
        name: Option<String>,
        /// MIME type; guessed from the name when omitted.
        #[arg(long)]
        mime_type: Option<String>,
        /// Also keep a copy in the local cache.
        #[arg(long)]
        cache: bool,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Download a stored file.
    Get {
        name: String,
        /// Output path; defaults to the cache directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Fail if the output file already exists.
        #[arg(long)]
        no_clobber: bool,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// List stored files.
    Ls {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Delete a stored file.
    Rm {
        name: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .init();

    let config = match &cli.config {
        Some(path) => SdkConfig::load_from(path),
        None => SdkConfig::load(),
    }
    .context("Failed to load config")?;

    let client = Client::open(config)
        .await
        .context("Failed to open store")?;

    run(&client, cli.command).await
}

async fn run(client: &Client, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Put {
            path,
            name,
            mime_type,
            cache,
            scope,
        } => {
            let name = match name {
                Some(name) => name,
                None => match path.file_name() {
                    Some(name) => name.to_string_lossy().into_owned(),
                    None => bail!("Cannot derive a name from {}", path.display()),
                },
            };
            let content = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;

            let file = PersistedFile::new(content, &name)?;
            file.set_mime_type(mime_type);
            let receipt = match &scope.user {
                Some(user) => file.save_with_user(client, &User::new(user.as_str())).await,
                None => file.save(client).await,
            }
            .with_context(|| format!("Failed to upload {name}"))?;

            if cache {
                let cached = file.write_to_cache(client).await?;
                info!(path = %cached.display(), "Cached");
            }
            println!(
                "{}\t{}\t{}\t{}",
                receipt.scope,
                receipt.name,
                receipt.size,
                receipt.content_hash.short()
            );
        }
        Command::Get {
            name,
            output,
            no_clobber,
            scope,
        } => {
            let file = client
                .fetch_file(&scope.scope(), &name)
                .await
                .with_context(|| format!("Failed to fetch {name}"))?;
            let target = output.unwrap_or_else(|| file.cache_location(client));
            file.write_to_location(&target, WriteOptions::default().overwrite(!no_clobber))
                .await
                .with_context(|| format!("Failed to write {}", target.display()))?;
            println!("{}", target.display());
        }
        Command::Ls { scope } => {
            for object in client.list_files(&scope.scope()).await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    object.name,
                    object.size,
                    object.mime_type,
                    object.updated_at.to_rfc3339()
                );
            }
        }
        Command::Rm { name, scope } => {
            let removed = client
                .default_store()
                .remove(&scope.scope(), &name)
                .await
                .with_context(|| format!("Failed to remove {name}"))?;
            if !removed {
                bail!("{name} not found");
            }
            info!(name, "Removed");
        }
    }
    Ok(())
}
