use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chirpy_core::{
    api::{
        auth::{self, LoginRequest},
        chirps::{self, ChirpRequest, SortOrder},
        middleware::authenticate,
        users::{self, RegisterRequest, UpdateUserRequest},
        webhooks::{self, WebhookData, WebhookEvent, USER_UPGRADED},
        AppState,
    },
    config::Config,
    error::AppError,
};

/// Administer a chirpy store from the command line.
#[derive(Parser)]
#[command(name = "chirpy", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the configured store if it does not exist yet
    Init,
    Register {
        email: String,
        password: String,
    },
    /// Print an access token and a refresh token
    Login {
        email: String,
        password: String,
    },
    /// Exchange a refresh token for a new access token
    Refresh {
        refresh_token: String,
        /// Previous access token, checked against the refresh token's owner
        #[arg(long)]
        access_token: Option<String>,
    },
    Revoke {
        refresh_token: String,
    },
    /// Change the email or password of the account behind an access token
    UpdateUser {
        access_token: String,
        id: u64,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        password: String,
    },
    DeleteUser {
        access_token: String,
        id: u64,
    },
    Post {
        access_token: String,
        body: String,
    },
    Chirps {
        #[arg(long)]
        author_id: Option<u64>,
        #[arg(long, default_value = "asc")]
        sort: SortOrder,
    },
    DeleteChirp {
        access_token: String,
        id: u64,
    },
    Users,
    /// Replay a `user.upgraded` payment webhook
    Upgrade {
        api_key: String,
        user_id: u64,
    },
    /// Drop refresh tokens that have already expired
    PruneTokens,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chirpy_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Arc::new(Config::from_env()?);
    tracing::debug!(?config, "configuration loaded");

    let state = AppState::from_config(config).await?;

    match cli.command {
        Command::Init => {
            tracing::info!("store ready");
        }
        Command::Register { email, password } => {
            print_json(&users::register(&state, RegisterRequest { email, password }).await?)?;
        }
        Command::Login { email, password } => {
            print_json(&auth::login(&state, LoginRequest { email, password }).await?)?;
        }
        Command::Refresh {
            refresh_token,
            access_token,
        } => {
            let header = bearer(&refresh_token);
            let response = auth::refresh(&state, Some(&header), access_token.as_deref()).await?;
            print_json(&response)?;
        }
        Command::Revoke { refresh_token } => {
            print_json(&auth::logout(&state, Some(&bearer(&refresh_token))).await?)?;
        }
        Command::UpdateUser {
            access_token,
            id,
            email,
            password,
        } => {
            let subject = authenticate(&state, Some(&bearer(&access_token)))?;
            let req = UpdateUserRequest { email, password };
            print_json(&users::update_user(&state, subject, id, req).await?)?;
        }
        Command::DeleteUser { access_token, id } => {
            let subject = authenticate(&state, Some(&bearer(&access_token)))?;
            users::delete_user(&state, subject, id).await?;
        }
        Command::Post { access_token, body } => {
            let subject = authenticate(&state, Some(&bearer(&access_token)))?;
            print_json(&chirps::post_chirp(&state, subject, ChirpRequest { body }).await?)?;
        }
        Command::Chirps { author_id, sort } => {
            print_json(&chirps::list_chirps(&state, author_id, sort).await?)?;
        }
        Command::DeleteChirp { access_token, id } => {
            let subject = authenticate(&state, Some(&bearer(&access_token)))?;
            chirps::delete_chirp(&state, subject, id).await?;
        }
        Command::Users => {
            print_json(&users::list_users(&state).await?)?;
        }
        Command::Upgrade { api_key, user_id } => {
            let event = WebhookEvent {
                event: USER_UPGRADED.to_string(),
                data: WebhookData { user_id },
            };
            let header = format!("ApiKey {}", api_key);
            let outcome = webhooks::handle_webhook(&state, Some(&header), event).await?;
            tracing::info!(?outcome, user_id, "webhook handled");
        }
        Command::PruneTokens => {
            let removed = state.credentials.prune_expired(Utc::now()).await?;
            println!("{}", removed);
        }
    }

    Ok(())
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
