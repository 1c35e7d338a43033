//! CLI command implementations.

use anyhow::{bail, Context, Result};
use securechat_core::api::RelayApi;
use securechat_core::crypto::LocalOpener;
use securechat_core::identity::format_fingerprint;
use securechat_core::logging::ShortFingerprint;
use securechat_core::messaging::{ChatEvent, EventDispatcher};
use securechat_core::protocol::{DecryptedMessage, MessageId};
use securechat_core::sync::{SyncChannel, WebSocketConnector};
use securechat_core::{ClientConfig, Identity, KeyPair};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Load the local key pair from the configured PEM files.
fn load_keypair(config: &ClientConfig) -> Result<KeyPair> {
    if !config.private_key_path.exists() {
        bail!(
            "No key pair at {}. Run 'securechat keygen' first.",
            config.private_key_path.display()
        );
    }
    KeyPair::load(&config.public_key_path, &config.private_key_path)
        .context("Failed to load key pair")
}

/// Parse a correspondent given as hex modulus and exponent.
fn parse_remote(modulus: &str, exponent: &str) -> Result<Identity> {
    let remote = Identity::from_hex(modulus, exponent).context("Invalid public key")?;
    remote
        .to_public_key()
        .context("Modulus and exponent do not form a usable RSA key")?;
    Ok(remote)
}

fn format_time(timestamp: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(timestamp) {
        Some(time) if timestamp > 0 => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => "-".to_string(),
    }
}

fn print_message(message: &DecryptedMessage, local: &Identity) {
    let who = if message.sender == local.fingerprint() {
        "you".to_string()
    } else {
        ShortFingerprint(&message.sender).to_string()
    };
    let id = message
        .id
        .map(|id| format!(" (#{})", id))
        .unwrap_or_default();
    println!("[{}] {}: {}{}", format_time(message.timestamp), who, message.body, id);
}

/// Generate a new key pair.
pub fn keygen(config: &ClientConfig, bits: usize, force: bool) -> Result<()> {
    if config.private_key_path.exists() && !force {
        bail!("Key pair already exists. Use --force to overwrite.");
    }

    for path in [&config.public_key_path, &config.private_key_path] {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).context("Failed to create key directory")?;
        }
    }

    println!("Generating {}-bit RSA key pair...", bits);
    let keypair = KeyPair::generate(bits).context("Failed to generate key pair")?;
    keypair
        .write_pem(&config.public_key_path, &config.private_key_path)
        .context("Failed to write key files")?;

    println!("\nGenerated new identity:");
    println!("  Public key:  {}", config.public_key_path.display());
    println!("  Private key: {}", config.private_key_path.display());
    println!("  Exponent:    {}", keypair.identity().exponent_hex());
    println!("\nFingerprint:");
    println!("  {}", format_fingerprint(keypair.identity().fingerprint()));
    println!("\nShare the fingerprint (your modulus) with the people you want to talk to.");
    println!("Anyone with your private key can read all of your messages.");

    Ok(())
}

/// Show the local identity.
pub fn show_identity(config: &ClientConfig) -> Result<()> {
    let keypair = load_keypair(config)?;
    let identity = keypair.identity();

    println!("\nYour SecureChat identity:");
    println!("  Exponent:    {}", identity.exponent_hex());
    println!("  Fingerprint:");
    println!("  {}", format_fingerprint(identity.fingerprint()));

    Ok(())
}

/// List chats known to the relay.
pub async fn list_chats(config: &ClientConfig) -> Result<()> {
    let keypair = Arc::new(load_keypair(config)?);
    let api = RelayApi::new(config, keypair)?;

    let remotes = api
        .discover_chats()
        .await
        .context("Failed to fetch chats")?;

    if remotes.is_empty() {
        println!("No chats yet.");
        return Ok(());
    }

    println!("\nChats ({}):", remotes.len());
    for remote in &remotes {
        println!("  {}  (exponent {})", remote.fingerprint(), remote.exponent_hex());
    }

    Ok(())
}

/// Show verified history with a correspondent.
pub async fn show_history(config: &ClientConfig, modulus: &str, exponent: &str) -> Result<()> {
    let remote = parse_remote(modulus, exponent)?;
    let keypair = Arc::new(load_keypair(config)?);
    let api = RelayApi::new(config, keypair.clone())?;

    let history = api
        .fetch_history(&remote)
        .await
        .context("Failed to fetch history")?;

    if history.is_empty() {
        println!("No messages.");
    }
    for message in &history {
        print_message(message, keypair.identity());
    }

    Ok(())
}

/// Send a message.
pub async fn send_message(
    config: &ClientConfig,
    modulus: &str,
    exponent: &str,
    text: &str,
) -> Result<()> {
    let remote = parse_remote(modulus, exponent)?;
    let keypair = Arc::new(load_keypair(config)?);
    let api = RelayApi::new(config, keypair)?;

    let sent = api
        .post_message(&remote, text)
        .await
        .context("Failed to send message")?;

    if let Some(id) = sent.id {
        println!("Sent (#{}).", id);
    }
    Ok(())
}

/// Delete one of our own messages.
pub async fn delete_message(config: &ClientConfig, id: MessageId) -> Result<()> {
    let keypair = Arc::new(load_keypair(config)?);
    let api = RelayApi::new(config, keypair)?;

    api.delete_message(id)
        .await
        .context("Failed to delete message")?;

    println!("Deleted #{}.", id);
    Ok(())
}

/// Mark a chat as read.
pub async fn mark_read(config: &ClientConfig, modulus: &str, exponent: &str) -> Result<()> {
    let remote = parse_remote(modulus, exponent)?;
    let keypair = Arc::new(load_keypair(config)?);
    let api = RelayApi::new(config, keypair)?;

    api.mark_chat_read(&remote)
        .await
        .context("Failed to mark chat as read")?;

    Ok(())
}

/// Follow the realtime channel, optionally with one chat focused.
pub async fn listen(config: &ClientConfig, with: Option<&str>, exponent: &str) -> Result<()> {
    let focus = with.map(|modulus| parse_remote(modulus, exponent)).transpose()?;
    let keypair = Arc::new(load_keypair(config)?);
    let local = keypair.identity().clone();
    let api = RelayApi::new(config, keypair.clone())?;
    let dispatcher = Arc::new(EventDispatcher::new(
        local.clone(),
        Arc::new(LocalOpener::new(keypair.clone())),
    ));

    // Chats opened by others while we were offline
    match api.discover_chats().await {
        Ok(remotes) => {
            for remote in remotes {
                dispatcher.add_chat(remote, None).await;
            }
        }
        Err(e) => warn!(error = %e, "Chat discovery failed"),
    }

    if let Some(remote) = &focus {
        let history = match api.fetch_history(remote).await {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "History fetch failed");
                Vec::new()
            }
        };
        println!("\nChat with {}:", format_fingerprint(remote.fingerprint()));
        for message in dispatcher.focus(remote.clone(), history).await {
            print_message(&message, &local);
        }
    }

    let mut events = dispatcher.subscribe();
    let printer = tokio::spawn({
        let local = local.clone();
        async move {
            loop {
                match events.recv().await {
                    Ok(ChatEvent::MessageShown { message }) => print_message(&message, &local),
                    Ok(ChatEvent::MessageRemoved { id }) => println!("[deleted #{}]", id),
                    Ok(ChatEvent::ChatAdded { remote }) => {
                        println!("[new chat with {}]", remote.fingerprint())
                    }
                    Ok(ChatEvent::FrameDropped { .. }) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "UI fell behind; some notifications were skipped")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    });

    let channel = Arc::new(SyncChannel::new(
        Arc::new(WebSocketConnector::new()),
        config.ws_uri(),
        local.clone(),
        config.sync.clone(),
    ));
    let health = channel.clone().spawn_health_check();
    let reader = channel.clone().spawn_read_loop(dispatcher.clone());

    println!("\nListening on {}. Press Ctrl+C to stop.", config.ws_uri());
    match focus {
        Some(remote) => {
            println!("Type a message and press Enter to send. Commands: /delete <id>, /read, /quit");
            tokio::select! {
                result = input_loop(&api, &dispatcher, &remote) => result?,
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    println!("\nShutting down...");
    reader.abort();
    health.abort();
    printer.abort();

    Ok(())
}

/// Send lines typed on stdin to the focused chat.
async fn input_loop(api: &RelayApi, dispatcher: &EventDispatcher, remote: &Identity) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "/quit" {
            break;
        } else if line == "/read" {
            if let Err(e) = api.mark_chat_read(remote).await {
                eprintln!("Failed to mark chat as read: {}", e);
            }
        } else if let Some(id) = line.strip_prefix("/delete ") {
            let Ok(id) = id.trim().parse::<MessageId>() else {
                eprintln!("Usage: /delete <id>");
                continue;
            };
            match api.delete_message(id).await {
                Ok(()) => {
                    dispatcher.remove_local(id).await;
                }
                Err(e) => eprintln!("Failed to delete #{}: {}", id, e),
            }
        } else {
            match api.post_message(remote, line).await {
                Ok(sent) => dispatcher.push_local(sent).await,
                Err(e) => eprintln!("Failed to send: {}", e),
            }
        }
    }

    Ok(())
}
