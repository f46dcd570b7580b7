use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use idvault_repo::{IdVault, RepoResult};
use idvault_scheduler::{BackgroundServices, GrantCleanup};
use idvault_store::{FsObjectStore, FsTableStore};
use idvault_types::{
    ApiResource, ApiScope, Client, DeviceFlowCode, Entity, EntityKind, GrantFilter, IdentityResource,
    KeyHasher, PersistedGrant, SigningKeyRecord,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::*;
use crate::settings::AppConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let format = cli.format;
    let vault = open_vault(&config)?;
    match cli.command {
        Command::Init => cmd_init(&vault, &config).await,
        Command::Hash(args) => cmd_hash(args, format),
        Command::List(args) => cmd_list(&vault, args, format).await,
        Command::Import(args) => cmd_import(&vault, args).await,
        Command::Grants(args) => cmd_grants(&vault, args, format).await,
        Command::PurgeExpired(args) => cmd_purge(&vault, &config, args).await,
        Command::Run => cmd_run(&vault, &config).await,
    }
}

/// Builds repositories over the filesystem backends. Does no I/O.
fn open_vault(config: &AppConfig) -> anyhow::Result<IdVault> {
    let vault = IdVault::new(
        &config.storage,
        Arc::new(FsObjectStore::new(&config.data_dir)),
        Arc::new(FsTableStore::new(&config.data_dir)),
    )?;
    Ok(vault)
}

fn cmd_hash(args: HashArgs, format: OutputFormat) -> anyhow::Result<()> {
    let hashed = KeyHasher::hash(&args.key);
    match format {
        OutputFormat::Text => println!("{hashed}"),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "key": args.key, "hashed": hashed })
        ),
    }
    Ok(())
}

async fn cmd_init(vault: &IdVault, config: &AppConfig) -> anyhow::Result<()> {
    vault.ensure_containers_exist().await?;
    println!(
        "{} Initialized idvault storage in {}",
        "✓".green().bold(),
        config.data_dir.display().to_string().bold()
    );
    Ok(())
}

async fn cmd_list(vault: &IdVault, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    match args.kind {
        EntityKind::Client => print_entities(vault.clients().find_all().await?, format),
        EntityKind::ApiResource => print_entities(vault.api_resources().find_all().await?, format),
        EntityKind::ApiScope => print_entities(vault.api_scopes().find_all().await?, format),
        EntityKind::IdentityResource => {
            print_entities(vault.identity_resources().find_all().await?, format)
        }
        EntityKind::DeviceFlowCode => print_entities(vault.device_codes().find_all().await?, format),
        EntityKind::SigningKey => print_entities(vault.signing_keys().find_all().await?, format),
        EntityKind::PersistedGrant => {
            bail!("persisted grants are not listed in bulk; use `idvault grants --subject <id>`")
        }
    }
}

fn print_entities<T: Entity>(mut entities: Vec<T>, format: OutputFormat) -> anyhow::Result<()> {
    entities.sort_by(|a, b| a.key().cmp(b.key()));
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entities)?),
        OutputFormat::Text => {
            for entity in &entities {
                println!("{}  {}", entity.hashed_key().short_hex().dimmed(), entity.key());
            }
            println!("{} {} {}", entities.len().to_string().bold(), T::KIND, "entities");
        }
    }
    Ok(())
}

async fn cmd_import(vault: &IdVault, args: ImportArgs) -> anyhow::Result<()> {
    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let (stored, failed) = match args.kind {
        EntityKind::Client => import_all(&data, move |e: Client| vault.clients().store(e)).await?,
        EntityKind::ApiResource => {
            import_all(&data, move |e: ApiResource| vault.api_resources().store(e)).await?
        }
        EntityKind::ApiScope => import_all(&data, move |e: ApiScope| vault.api_scopes().store(e)).await?,
        EntityKind::IdentityResource => {
            import_all(&data, move |e: IdentityResource| vault.identity_resources().store(e)).await?
        }
        EntityKind::DeviceFlowCode => {
            import_all(&data, move |e: DeviceFlowCode| vault.device_codes().store(e)).await?
        }
        EntityKind::SigningKey => {
            import_all(&data, move |e: SigningKeyRecord| vault.signing_keys().store(e)).await?
        }
        EntityKind::PersistedGrant => {
            import_all(&data, move |g: PersistedGrant| async move { vault.grants().store(&g).await })
                .await?
        }
    };
    println!(
        "{} Imported {} {} entities from {}",
        "✓".green().bold(),
        stored.to_string().bold(),
        args.kind,
        args.file.display()
    );
    if failed > 0 {
        bail!("{failed} entities could not be stored");
    }
    Ok(())
}

/// Store each entity of a JSON array, continuing past failures.
async fn import_all<T, F, Fut>(data: &[u8], store: F) -> anyhow::Result<(usize, usize)>
where
    T: Entity,
    F: Fn(T) -> Fut,
    Fut: Future<Output = RepoResult<()>>,
{
    let entities: Vec<T> =
        serde_json::from_slice(data).with_context(|| format!("parsing {} array", T::KIND))?;
    let (mut stored, mut failed) = (0, 0);
    for entity in entities {
        let key = entity.key().to_string();
        match store(entity).await {
            Ok(()) => stored += 1,
            Err(err) => {
                warn!(kind = %T::KIND, key = %key, error = %err, "import failed");
                eprintln!("{} {}: {}", "✗".red().bold(), key, err);
                failed += 1;
            }
        }
    }
    Ok((stored, failed))
}

async fn cmd_grants(vault: &IdVault, args: GrantsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut filter = GrantFilter::subject(args.subject);
    filter.client_id = args.client;
    filter.grant_type = args.grant_type;
    filter.session_id = args.session;

    if args.remove {
        let removed = vault.grants().remove_by_filter(&filter).await?;
        println!("{} Removed {} grants", "✓".green().bold(), removed.to_string().bold());
        return Ok(());
    }

    let mut grants = vault.grants().find_by_filter(&filter).await?;
    grants.sort_by(|a, b| a.creation_time.cmp(&b.creation_time));
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&grants)?),
        OutputFormat::Text => {
            for grant in &grants {
                let expiry = grant
                    .expiration
                    .map_or_else(|| "never".to_string(), |exp| exp.to_rfc3339());
                println!(
                    "{}  {}  client={}  expires={}",
                    grant.key.yellow(),
                    grant.grant_type.cyan(),
                    grant.client_id,
                    expiry
                );
            }
            println!("{} grants", grants.len().to_string().bold());
        }
    }
    Ok(())
}

async fn cmd_purge(vault: &IdVault, config: &AppConfig, args: PurgeArgs) -> anyhow::Result<()> {
    let batch_size = args.batch_size.unwrap_or(config.cleanup.batch_size);
    if batch_size == 0 {
        bail!("--batch-size must be at least 1");
    }
    let report = GrantCleanup::new(vault.grants().clone(), batch_size)
        .purge()
        .await?;
    println!(
        "{} Purged {} expired grants in {} batches",
        "✓".green().bold(),
        report.removed.to_string().bold(),
        report.batches
    );
    if report.failed > 0 {
        println!("  {} {} grants could not be removed", "!".yellow().bold(), report.failed);
    }
    Ok(())
}

async fn cmd_run(vault: &IdVault, config: &AppConfig) -> anyhow::Result<()> {
    vault.ensure_containers_exist().await?;
    let services = BackgroundServices::new(vault, &config.refresh, &config.cleanup)?;
    let shutdown = CancellationToken::new();
    services.start(&shutdown)?;
    println!(
        "{} idvault running on {} (Ctrl-C to stop)",
        "✓".green().bold(),
        config.data_dir.display().to_string().bold()
    );
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    services.stop().await?;
    println!("{} Stopped", "✓".green().bold());
    Ok(())
}
