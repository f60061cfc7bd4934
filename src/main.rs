//! `forum-core` command-line front end.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Password;
use forum_core::{Config, Disposition, Registration, Services, TargetKind};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forum-core", version)]
#[command(about = "Forum sessions and like/dislike voting", long_about = None)]
struct Cli {
    /// Config file path (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the database file from the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Register {
        username: String,
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Log in and print a session token
    Login {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// Revoke a session token
    Logout {
        #[arg(long)]
        token: String,
    },

    /// Show who a session token belongs to
    Whoami {
        #[arg(long)]
        token: String,
    },

    /// Toggle a like or dislike
    Vote {
        kind: TargetKind,
        id: i64,
        disposition: Disposition,
        #[arg(long)]
        token: Option<String>,
    },

    /// Show like/dislike counters for a target
    Tally { kind: TargetKind, id: i64 },

    /// List usernames holding a disposition on a target
    Voters {
        kind: TargetKind,
        id: i64,
        disposition: Disposition,
    },

    /// List the targets a user liked or disliked
    VotedBy {
        username: String,
        kind: TargetKind,
        disposition: Disposition,
    },

    /// Most liked or most disliked targets
    Top {
        kind: TargetKind,
        disposition: Disposition,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },

    /// Create an empty post
    Post,

    /// Create an empty comment under a post
    Comment { post_id: i64 },

    /// Report targets whose counters disagree with their votes
    Audit,

    /// Delete expired sessions
    PurgeSessions,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.database {
        config.database.path = db;
    }
    let services = Services::from_config(&config)?;

    match cli.command {
        Commands::Register {
            username,
            email,
            password,
        } => {
            let (password, confirm) = match password {
                Some(p) => (p.clone(), p),
                None => {
                    let p = Password::new().with_prompt("Password").interact()?;
                    let c = Password::new().with_prompt("Confirm password").interact()?;
                    (p, c)
                }
            };
            let id = services.auth.register(&Registration {
                username: &username,
                email: &email,
                password: &password,
                confirm_password: &confirm,
            })?;
            println!("registered {username} (id {id})");
        }

        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => Password::new().with_prompt("Password").interact()?,
            };
            let session = services.auth.login(&username, &password)?;
            println!("{}", session.token);
            eprintln!("expires {}", session.expires_at.to_rfc3339());
        }

        Commands::Logout { token } => {
            services.auth.logout(&token)?;
            println!("logged out");
        }

        Commands::Whoami { token } => {
            let identity = services.identify(Some(&token))?;
            println!("{identity}");
        }

        Commands::Vote {
            kind,
            id,
            disposition,
            token,
        } => {
            let held = services.toggle_vote(token.as_deref(), kind, id, disposition)?;
            let tally = services.votes.tally(kind, id)?;
            match held {
                Some(d) => println!("{kind} {id}: you {d} it"),
                None => println!("{kind} {id}: vote removed"),
            }
            println!("likes {} dislikes {}", tally.likes, tally.dislikes);
        }

        Commands::Tally { kind, id } => {
            let tally = services.votes.tally(kind, id)?;
            println!("likes {} dislikes {}", tally.likes, tally.dislikes);
        }

        Commands::Voters {
            kind,
            id,
            disposition,
        } => {
            for name in services.votes.voters(kind, id, disposition)? {
                println!("{name}");
            }
        }

        Commands::VotedBy {
            username,
            kind,
            disposition,
        } => {
            for id in services.votes.voted_by(&username, kind, disposition)? {
                println!("{kind} {id}");
            }
        }

        Commands::Top {
            kind,
            disposition,
            limit,
        } => {
            for (id, tally) in services.votes.ranked(kind, disposition, limit)? {
                println!("{kind} {id}: likes {} dislikes {}", tally.likes, tally.dislikes);
            }
        }

        Commands::Post => {
            println!("{}", services.store.create_post()?);
        }

        Commands::Comment { post_id } => {
            let id = services
                .store
                .create_comment(post_id)
                .with_context(|| format!("post {post_id} does not exist"))?;
            println!("{id}");
        }

        Commands::Audit => {
            let drift = services.votes.audit()?;
            if drift.is_empty() {
                println!("counters consistent");
            }
            for d in &drift {
                println!(
                    "{} {}: recorded {}/{} counted {}/{}",
                    d.kind,
                    d.id,
                    d.recorded.likes,
                    d.recorded.dislikes,
                    d.counted.likes,
                    d.counted.dislikes
                );
            }
            if !drift.is_empty() {
                anyhow::bail!("{} target(s) with counter drift", drift.len());
            }
        }

        Commands::PurgeSessions => {
            let removed = services.auth.sessions().purge_expired()?;
            println!("removed {removed} expired session(s)");
        }
    }

    Ok(())
}
