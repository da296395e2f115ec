use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use panlink::cli::{Args, Command};
use panlink::config::EngineConfig;
use panlink::engine::{Resolved, build_default_router};
use panlink::model::{Provider, ShareDescriptor, extras_keys};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let router = build_default_router(&config.adapter_context());

    match args.command {
        Command::Resolve {
            url,
            password,
            username,
            auth_password,
        } => {
            let share = router.descriptor_from_url(&url, &password)?;
            attach_credentials(&share, &config, username, auth_password);
            let resolved = router.resolve(&share).await?;
            print_resolved(&resolved, args.json);
        }
        Command::List { url, password } => {
            let share = router.descriptor_from_url(&url, &password)?;
            let files = router.list_files(&share).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                for file in &files {
                    let marker = if file.is_folder() { "d" } else { "-" };
                    println!("{marker} {:>10}  {}", file.size_human, file.file_name);
                }
                println!("{} entries", files.len());
            }
        }
        Command::ResetAuth { provider } => {
            let provider = Provider::from_id(&provider)
                .with_context(|| format!("unknown provider id: {provider}"))?;
            if router.reset_credentials(&provider).await {
                println!("credentials reset for {provider}");
            } else {
                anyhow::bail!("no adapter registered for {provider}");
            }
        }
    }
    Ok(())
}

/// Attaches login credentials to the request: CLI-supplied ones win and are
/// marked request-scoped, otherwise the configured shared credential for the
/// pinned provider applies.
fn attach_credentials(
    share: &ShareDescriptor,
    config: &EngineConfig,
    username: Option<String>,
    auth_password: Option<String>,
) {
    if let Some(username) = username {
        share.extras().set(
            extras_keys::AUTHS,
            json!({
                "username": username,
                "password": auth_password.unwrap_or_default(),
            }),
        );
        share.extras().set(extras_keys::EPHEMERAL_AUTH, json!(true));
        return;
    }
    if let Some(provider) = share.provider()
        && let Some(credential) = config.credential_value(provider.id())
    {
        share.extras().set(extras_keys::AUTHS, credential);
    }
}

fn print_resolved(resolved: &Resolved, as_json: bool) {
    match resolved {
        Resolved::Link(link) => {
            if as_json {
                let headers: serde_json::Map<String, serde_json::Value> = link
                    .headers
                    .iter()
                    .map(|(name, value)| (name.clone(), json!(value)))
                    .collect();
                println!("{}", json!({ "url": link.url, "headers": headers }));
            } else {
                println!("{}", link.url);
                for (name, value) in &link.headers {
                    println!("  {name}: {value}");
                }
            }
        }
        Resolved::Folder { folder_id } => {
            if as_json {
                println!("{}", json!({ "folderId": folder_id }));
            } else {
                println!("share is a folder (id {folder_id}); use `list` to expand it");
            }
        }
    }
}
