//! `wizsync`: inspect local drafts and server sessions

use anyhow::{bail, Context};
use clap::{crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wizsync_core::WizsyncConfig;
use wizsync_draft::{keys, read_json, FileStore, LocalStore};
use wizsync_model::{has_meaningful_state, LocalDraft, SessionId};
use wizsync_session::{HttpSessionTransport, WizardSessionClient};

fn cli() -> Command {
    Command::new("wizsync")
        .version(crate_version!())
        .about("Inspect wizard drafts and sessions")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("draft")
                .about("Local draft slot")
                .subcommand_required(true)
                .subcommand(Command::new("show").about("Print the stored draft"))
                .subcommand(Command::new("clear").about("Delete the stored draft")),
        )
        .subcommand(
            Command::new("session")
                .about("Server session")
                .subcommand_required(true)
                .subcommand(
                    Command::new("state")
                        .about("Print the current session state")
                        .arg(Arg::new("id").required(true).help("Session id")),
                )
                .subcommand(
                    Command::new("result")
                        .about("Print the result of a completed session")
                        .arg(Arg::new("id").required(true).help("Session id")),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective configuration"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn file_store(config: &WizsyncConfig) -> anyhow::Result<FileStore> {
    let Some(dir) = &config.draft.store_dir else {
        bail!("draft.store_dir is not configured");
    };
    FileStore::open(dir).with_context(|| format!("opening store at {}", dir.display()))
}

fn draft_command(config: &WizsyncConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let store = file_store(config)?;
    let key = keys::draft_key(&config.draft.instance);
    match args.subcommand() {
        Some(("show", _)) => {
            let Some(draft) = read_json::<LocalDraft>(&store, &key)? else {
                println!("no draft stored under {key}");
                return Ok(());
            };
            let age = chrono::Utc::now().signed_duration_since(draft.timestamp);
            let offered = has_meaningful_state(&draft) && age.num_hours() < config.draft.max_age_hours;
            println!("{}", serde_json::to_string_pretty(&draft)?);
            println!("age: {}h, offered for restore: {offered}", age.num_hours());
        }
        Some(("clear", _)) => {
            store.remove(&key)?;
            println!("cleared {key}");
        }
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}

async fn session_command(config: &WizsyncConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let transport =
        HttpSessionTransport::with_timeout(config.server.base_url.clone(), config.request_timeout())?;
    let client = WizardSessionClient::new(Arc::new(transport));
    let (name, sub) = args.subcommand().context("missing session subcommand")?;
    let id = sub
        .get_one::<String>("id")
        .map(|id| SessionId::new(id.as_str()))
        .context("missing session id")?;

    let session = client
        .resume(&id)
        .await
        .with_context(|| format!("fetching session {id}"))?;
    match name {
        "state" => println!("{}", serde_json::to_string_pretty(&session)?),
        "result" => {
            let result = client.get_result().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let config = WizsyncConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

    match matches.subcommand() {
        Some(("draft", args)) => draft_command(&config, args),
        Some(("session", args)) => session_command(&config, args).await,
        Some(("config", _)) => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        _ => unreachable!("subcommand_required"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn session_state_requires_an_id() {
        let err = cli()
            .try_get_matches_from(["wizsync", "session", "state"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn config_flag_is_global() {
        let matches = cli()
            .try_get_matches_from(["wizsync", "draft", "show", "--config", "w.toml"])
            .unwrap();
        assert_eq!(
            matches.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("w.toml"))
        );
    }
}
