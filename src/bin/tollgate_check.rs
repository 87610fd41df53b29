//!
//! tollgate-check
//! --------------
//! Offline permission inspector: loads a clients file (JSON array of clients with their
//! resource permissions) and prints the access decision one client would get for one
//! action on one resource.

use std::env;
use std::fs;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use tollgate::acl::{resolve, Action};
use tollgate::config::GlobalAclConfig;
use tollgate::identity::{Directory, InMemoryDirectory};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} <clients.json> <client_id> <resource_key> <create|read|update|delete>\n\nExample:\n  {program} clients.json apiClient collection:library_book read\n\nEnvironment:\n  TOLLGATE_OWNER_FIELD         ownership field used for *Own permissions (default _createdBy)\n  RUST_LOG                     log filter (default info)"
    );
}

fn parse_action(s: &str) -> Result<Action> {
    match s.to_ascii_lowercase().as_str() {
        "create" => Ok(Action::Create),
        "read" | "count" => Ok(Action::Read),
        "update" => Ok(Action::Update),
        "delete" => Ok(Action::Delete),
        other => Err(anyhow!("unknown action '{}'", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("tollgate-check");
    if args.len() != 5 {
        print_usage(program);
        bail!("expected 4 arguments, got {}", args.len().saturating_sub(1));
    }
    let (path, client_id, resource, action) = (&args[1], &args[2], &args[3], parse_action(&args[4])?);

    let text = fs::read_to_string(path).with_context(|| format!("reading clients file {}", path))?;
    let directory = InMemoryDirectory::from_json_str(&text).with_context(|| format!("parsing clients file {}", path))?;
    let cfg = GlobalAclConfig::from_env();
    tollgate::tprintln!("tollgate-check owner_field={} file={}", cfg.owner_field, path);

    let client = directory.get_permissions(client_id).await?;
    let decision = resolve(&client, resource, action, &cfg.owner_field);
    info!(target: "tollgate::check", "client={} resource={} action={} allowed={}", client_id, resource, action.as_str(), decision.allowed);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
