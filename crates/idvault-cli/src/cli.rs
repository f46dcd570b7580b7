use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use idvault_types::EntityKind;

#[derive(Parser)]
#[command(
    name = "idvault",
    about = "idvault: identity entity storage with snapshot caching",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, global = true, env = "IDVAULT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides `data_dir` from the configuration.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create every container and table
    Init,
    /// Print the storage key of a logical key
    Hash(HashArgs),
    /// List all entities of a kind
    List(ListArgs),
    /// Store every entity from a JSON array file
    Import(ImportArgs),
    /// Query persisted grants of a subject
    Grants(GrantsArgs),
    /// Remove expired persisted grants once
    PurgeExpired(PurgeArgs),
    /// Run the background loops until Ctrl-C
    Run,
}

#[derive(Args)]
pub struct HashArgs {
    pub key: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// client, api-resource, api-scope, identity-resource, device-flow-code or signing-key
    pub kind: EntityKind,
}

#[derive(Args)]
pub struct ImportArgs {
    pub kind: EntityKind,
    pub file: PathBuf,
}

#[derive(Args)]
pub struct GrantsArgs {
    #[arg(long)]
    pub subject: String,
    #[arg(long)]
    pub client: Option<String>,
    #[arg(long = "type")]
    pub grant_type: Option<String>,
    #[arg(long)]
    pub session: Option<String>,
    /// Delete the matching grants instead of listing them
    #[arg(long)]
    pub remove: bool,
}

#[derive(Args)]
pub struct PurgeArgs {
    /// Overrides `cleanup.batch_size`
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grant_query() {
        let cli = Cli::try_parse_from([
            "idvault", "grants", "--subject", "alice", "--type", "refresh_token", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Grants(args) => {
                assert_eq!(args.subject, "alice");
                assert_eq!(args.grant_type.as_deref(), Some("refresh_token"));
                assert!(args.client.is_none());
                assert!(!args.remove);
            }
            _ => panic!("expected grants"),
        }
    }

    #[test]
    fn parses_entity_kinds() {
        let cli = Cli::try_parse_from(["idvault", "list", "api-scope"]).unwrap();
        assert!(matches!(cli.command, Command::List(ListArgs { kind: EntityKind::ApiScope })));
        assert!(Cli::try_parse_from(["idvault", "list", "widget"]).is_err());
    }

    #[test]
    fn grants_requires_a_subject() {
        assert!(Cli::try_parse_from(["idvault", "grants"]).is_err());
    }
}
