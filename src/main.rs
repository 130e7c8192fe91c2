use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use env_logger::Env;
use log::info;
use url::Url;

use rust_openid_client::cli::Args;
use rust_openid_client::{ClientConfig, ClientError, OpenIdClient, ServiceResponse};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let base_url = Url::parse(&args.base_url).context("invalid base URL")?;
    let provider_url = Url::parse(&args.provider_url).context("invalid provider URL")?;

    let mut config = ClientConfig::new(base_url, provider_url)
        .with_insecure(args.insecure)
        .with_retries(args.retries)
        .with_connect_timeout(Duration::from_secs(args.timeout))
        .with_cache_sessions(!args.no_cache);
    if let Some(login_url) = &args.login_url {
        config = config.with_login_url(Url::parse(login_url).context("invalid login URL")?);
    }
    if let Some(path) = &args.cache_path {
        config = config.with_cache_path(PathBuf::from(path));
    }
    if let Some(username) = &args.username {
        config = config.with_username(username.clone());
    }

    let mut client = OpenIdClient::new(config).await?;

    if args.sessions {
        print_sessions(&client).await;
        return Ok(());
    }

    if args.logout {
        client.logout().await?;
        println!("{}", "Sessions cleared.".green());
        return Ok(());
    }

    let path = args
        .path
        .clone()
        .context("--path is required unless --sessions or --logout is given")?;
    let params = parse_params(args.params.as_deref())?;

    match client
        .send_request(&path, &args.verb, !args.anonymous, params.as_ref())
        .await
    {
        Ok(reply) => print_reply(&reply),
        Err(ClientError::LoginRequired { url }) => {
            info!("server redirected to {}", url);
            let username = args
                .username
                .clone()
                .context("a username is required to log in")?;
            let password = match args.password.clone() {
                Some(password) => password,
                None => rpassword::prompt_password(format!("Password for {}: ", username))?,
            };

            println!("{}", "Session expired or missing, logging in...".yellow());
            client.login(&username, &password, None).await?;

            let reply = client
                .send_request(&path, &args.verb, true, params.as_ref())
                .await?;
            print_reply(&reply);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn print_reply(reply: &ServiceResponse) {
    println!("{} {}", reply.status.to_string().green(), reply.url);
    println!("{}", reply.body);
}

fn parse_params(raw: Option<&str>) -> anyhow::Result<Option<HashMap<String, String>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).context("params must be a JSON object")?;
    let object = value.as_object().context("params must be a JSON object")?;

    let mut params = HashMap::new();
    for (key, value) in object {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        params.insert(key.clone(), value);
    }
    Ok(Some(params))
}

async fn print_sessions(client: &OpenIdClient) {
    let records = client.cached_sessions().await;
    if records.is_empty() {
        println!("No sessions cached.");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Username", "Base URL", "Token", "Updated"]);
    for record in &records {
        table.add_row(vec![
            record.username.clone(),
            record.base_url.clone(),
            redact(&record.session_id),
            record.updated_at.to_string(),
        ]);
    }
    println!("{table}");
}

fn redact(token: &str) -> String {
    let head: String = token.chars().take(8).collect();
    if head.len() == token.len() {
        "*".repeat(token.len())
    } else {
        format!("{}...", head)
    }
}
