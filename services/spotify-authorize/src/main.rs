//! Spotify authorization CLI
//!
//! Drives the OAuth flows against Spotify and keeps the resulting
//! credentials on disk:
//! 1. `client` runs the client-credentials grant
//! 2. `authorize-url` prints the URL a user opens to grant access
//! 3. `exchange <code> [state]` trades the redirect's code for user tokens
//! 4. `status` checks whether the stored user tokens are still accepted

mod config;

use anyhow::{Context, Result, bail};
use spotify_auth::{ClientCredentials, UserCredentials, persist};
use spotify_client::{BuildUserOptions, Client};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

const USAGE: &str =
    "usage: spotify-authorize [--config <path>] <client | authorize-url | exchange <code> [state] | status>";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Client,
    AuthorizeUrl,
    Exchange { code: String, state: Option<String> },
    Status,
}

/// Split argv (without the program name) into the `--config` value and the
/// subcommand.
fn parse_args(args: &[String]) -> Result<(Option<&str>, Command)> {
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config requires a path")?;
            config_path = Some(path.as_str());
        } else {
            positional.push(arg.as_str());
        }
    }

    let command = match positional.as_slice() {
        ["client"] => Command::Client,
        ["authorize-url"] => Command::AuthorizeUrl,
        ["exchange", code] => Command::Exchange {
            code: code.to_string(),
            state: None,
        },
        ["exchange", code, state] => Command::Exchange {
            code: code.to_string(),
            state: Some(state.to_string()),
        },
        ["status"] => Command::Status,
        _ => bail!("{USAGE}"),
    };
    Ok((config_path, command))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (cli_config_path, command) = parse_args(&args)?;

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        client_id = %config.spotify.client_id,
        redirect_uri = %config.spotify.redirect_uri,
        credentials_dir = %config.spotify.credentials_dir.display(),
        has_secret = config.spotify.client_secret.is_some(),
        "configuration loaded"
    );

    let dir = config.spotify.credentials_dir.clone();
    let client = Client::new(config.client_credentials(), config.client.clone())
        .context("failed to build Spotify client")?;

    match command {
        Command::Client => authorize_client(&client, &dir).await,
        Command::AuthorizeUrl => authorize_url(&client, &dir).await,
        Command::Exchange { code, state } => {
            exchange(&client, &dir, &code, state.as_deref()).await
        }
        Command::Status => status(&client, &dir).await,
    }
}

async fn authorize_client(client: &Client, dir: &Path) -> Result<()> {
    client
        .authorize_client_creds(None)
        .await
        .context("client credentials flow failed")?;

    let path = persist::default_path::<ClientCredentials>(dir);
    persist::save(&path, &client.client_creds().await).await?;
    info!(path = %path.display(), "client credentials saved");
    println!("client credentials authorized");
    Ok(())
}

async fn authorize_url(client: &Client, dir: &Path) -> Result<()> {
    if !client.is_oauth_ready().await {
        bail!("client_id, redirect_uri and scopes are required to build an authorization URL");
    }

    // Previously granted tokens survive; only the state is renewed
    let path = persist::default_path::<UserCredentials>(dir);
    match persist::load::<UserCredentials>(&path).await {
        Ok(mut stored) => {
            stored.state = client.user_creds().await.state;
            client.restore_user_creds(stored).await;
        }
        Err(e) if path.exists() => {
            warn!(path = %path.display(), error = %e, "unreadable user credentials, replacing them");
        }
        Err(_) => {}
    }

    let url = client.oauth_uri().await?;
    persist::save(&path, &client.user_creds().await).await?;
    info!(path = %path.display(), "pending user state saved");
    println!("{url}");
    Ok(())
}

async fn exchange(client: &Client, dir: &Path, code: &str, state: Option<&str>) -> Result<()> {
    let path = persist::default_path::<UserCredentials>(dir);
    match persist::load::<UserCredentials>(&path).await {
        Ok(pending) => client.restore_user_creds(pending).await,
        Err(e) if state.is_some() => {
            return Err(e).with_context(|| {
                format!(
                    "no pending authorization at {}, run authorize-url first",
                    path.display()
                )
            });
        }
        Err(e) => warn!(error = %e, "no pending authorization, skipping state check"),
    }

    let user_creds = client
        .build_user_credentials(code, state, BuildUserOptions::default())
        .await
        .context("authorization code exchange failed")?;

    persist::save(&path, &user_creds).await?;
    info!(
        path = %path.display(),
        user_id = user_creds.user_id.as_deref().unwrap_or("unknown"),
        "user credentials saved"
    );
    println!(
        "authorized as {}",
        user_creds.user_id.as_deref().unwrap_or("unknown user")
    );
    Ok(())
}

async fn status(client: &Client, dir: &Path) -> Result<()> {
    let path = persist::default_path::<UserCredentials>(dir);
    let user_creds = persist::load::<UserCredentials>(&path)
        .await
        .with_context(|| format!("no user credentials at {}", path.display()))?;
    if user_creds.access_token.is_none() {
        println!("not authorized: authorization was started but never completed");
        return Ok(());
    }

    client.set_user_creds(user_creds).await?;
    let active = client.is_active().await?;
    if !active {
        println!("not authorized: stored credentials were rejected");
        return Ok(());
    }

    // A refresh during the probe rotates the stored token
    persist::save(&path, &client.user_creds().await).await?;
    let user_id = client.user_id().await?;
    println!(
        "authorized as {}",
        user_id.as_deref().unwrap_or("unknown user")
    );
    Ok(())
}
