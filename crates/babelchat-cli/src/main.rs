//! Babelchat CLI
//!
//! Thin wrapper around babelchat-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Show local identity and endpoint information
//! babelchat info
//!
//! # Set the local profile
//! babelchat profile set "Haeun" --language ko
//!
//! # Issue an invite for an English-speaking guest and wait for them
//! babelchat invite create --guest-language en --ttl 300
//!
//! # Join a chat from an invite string
//! babelchat join "babel-invite:..."
//!
//! # List persisted friends
//! babelchat friends list
//!
//! # Remove a friend
//! babelchat friends remove babel:...
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use babelchat_core::{
    ExpiryTimer, HandshakeEvent, HandshakeManager, Keypair, Language, SessionContext, Storage,
    UserId, UserProfile,
};
use clap::{Parser, Subcommand};
use qrcode::render::unicode::Dense1x2;
use qrcode::QrCode;

/// Babelchat - P2P translated chat invites
#[derive(Parser)]
#[command(name = "babelchat")]
#[command(version = "0.1.0")]
#[command(about = "Babelchat - P2P translated chat invites")]
#[command(
    long_about = "Issue time-limited chat invites, share them as QR codes, and turn them into persisted friend connections over direct peer-to-peer channels."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.babelchat)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show local identity and endpoint information
    Info,

    /// Profile management
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Invite management
    Invite {
        #[command(subcommand)]
        action: InviteAction,
    },

    /// Join a chat from an invite string
    Join {
        /// Encoded invite (babel-invite:...)
        invite: String,
    },

    /// Friend directory
    Friends {
        #[command(subcommand)]
        action: FriendsAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Set nickname and language
    Set {
        /// Display name shown to friends
        nickname: String,

        /// Chat language (ko, en, ja, zh, th, vi)
        #[arg(short, long, default_value = "en")]
        language: Language,
    },
}

#[derive(Subcommand)]
enum InviteAction {
    /// Issue an invite and wait for a guest to join
    Create {
        /// Language offered to the guest (ko, en, ja, zh, th, vi)
        #[arg(short, long, default_value = "en")]
        guest_language: Language,

        /// Seconds until the invite expires
        #[arg(short, long, default_value_t = 300)]
        ttl: i64,

        /// Skip the terminal QR code
        #[arg(long)]
        no_qr: bool,
    },
}

#[derive(Subcommand)]
enum FriendsAction {
    /// List persisted friends in insertion order
    List,

    /// Remove a friend by user id
    Remove {
        /// Friend user id (babel:...)
        user_id: String,
    },
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!("{},quinn=warn,iroh=warn", filter))
            }),
        )
        .init();
}

fn data_dir(cli: &Cli) -> Result<PathBuf> {
    if let Some(dir) = &cli.data_dir {
        return Ok(dir.clone());
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".babelchat"))
}

/// Load the persisted session or bootstrap a fresh one
fn load_session(storage: &Storage) -> Result<SessionContext> {
    let keypair = match storage.load_identity()? {
        Some(keypair) => keypair,
        None => {
            let keypair = Keypair::generate();
            storage.save_identity(&keypair)?;
            keypair
        }
    };

    let profile = storage
        .load_profile()?
        .unwrap_or_else(|| UserProfile::new("Anonymous", Language::English));

    Ok(SessionContext::new(keypair, profile))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let dir = data_dir(&cli)?;
    let storage = Storage::new(dir.join("data.db"))?;

    match cli.command {
        Commands::Info => {
            let session = load_session(&storage)?;
            let manager = HandshakeManager::start(session, storage, None).await?;

            println!("User id:   {}", manager.session().user_id());
            println!("Nickname:  {}", manager.session().profile().nickname);
            println!("Language:  {}", manager.session().profile().language);
            println!("Endpoint:  {}", manager.transport().endpoint_id());
            println!("Friends:   {}", manager.list_friends()?.len());

            manager.shutdown().await;
        }

        Commands::Profile { action } => match action {
            ProfileAction::Set { nickname, language } => {
                let profile = UserProfile::new(&nickname, language);
                storage.save_profile(&profile)?;
                println!("Profile saved: {} ({})", nickname, language);
            }
        },

        Commands::Invite { action } => match action {
            InviteAction::Create {
                guest_language,
                ttl,
                no_qr,
            } => {
                let session = load_session(&storage)?;
                let manager = HandshakeManager::start(session, storage, None).await?;

                // Let the endpoint learn its reachable addresses before
                // embedding them in the invite
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;

                let credential = manager.issue_invite(guest_language, ttl)?;
                let invite = credential.encode()?;

                println!("Invite (expires in {}s):", ttl);
                println!("{}\n", invite);

                if !no_qr {
                    let code = QrCode::new(invite.as_bytes())
                        .context("Invite too large for a QR code")?;
                    println!("{}", code.render::<Dense1x2>().build());
                }

                wait_for_guest(&manager, &credential.credential_id, credential.expires_at)
                    .await?;
                manager.shutdown().await;
            }
        },

        Commands::Join { invite } => {
            let session = load_session(&storage)?;
            let manager = HandshakeManager::start(session, storage, None).await?;

            println!("Joining...");
            let record = manager.join(&invite).await?;

            println!("Connected! You are now friends with:");
            println!("  {} ({})", record.profile.nickname, record.user_id);
            println!("  Language: {}", record.profile.language);

            manager.shutdown().await;
        }

        Commands::Friends { action } => match action {
            FriendsAction::List => {
                let friends = storage.list_friends()?;
                if friends.is_empty() {
                    println!("No friends yet. Share an invite with `babelchat invite create`.");
                } else {
                    for record in friends {
                        let added = chrono::DateTime::from_timestamp(record.added_at, 0)
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| record.added_at.to_string());
                        println!(
                            "{}  {} ({})  added {}",
                            record.user_id,
                            record.profile.nickname,
                            record.profile.language,
                            added
                        );
                    }
                }
            }
            FriendsAction::Remove { user_id } => {
                let user_id = UserId::parse(&user_id)?;
                match storage.get_friend(&user_id)? {
                    Some(record) => {
                        storage.delete_friend(&user_id)?;
                        println!("Removed {}", record.profile.nickname);
                    }
                    None => println!("No friend with id {}", user_id),
                }
            }
        },
    }

    Ok(())
}

/// Block until the issued invite is used or its expiry timer fires
async fn wait_for_guest(
    manager: &HandshakeManager,
    credential_id: &[u8; 16],
    expires_at: i64,
) -> Result<()> {
    let mut events = manager.subscribe_events();

    let (expire_tx, mut expire_rx) = tokio::sync::oneshot::channel();
    let timer = ExpiryTimer::start(expires_at, move || {
        let _ = expire_tx.send(());
    });

    println!("Waiting for a guest to scan the invite (Ctrl-C to abort)...");

    loop {
        tokio::select! {
            _ = &mut expire_rx => {
                println!("Invite expired before anyone joined.");
                return Ok(());
            }
            event = events.recv() => {
                match event {
                    Ok(HandshakeEvent::RequestReceived { credential_id: id, from })
                        if id == *credential_id =>
                    {
                        println!("Guest {} is connecting...", from.nickname);
                    }
                    Ok(HandshakeEvent::FriendAdded { record }) => {
                        timer.cancel();
                        println!(
                            "Connected! You are now friends with {} ({}).",
                            record.profile.nickname, record.user_id
                        );
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(_) => return Ok(()),
                }
            }
        }
    }
}
