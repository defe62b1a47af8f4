//! sentinel — policy-gated AWS credential broker.
//!
//! Thin driver over the library crates. Exit 0 on success, exit 1 on any
//! deny or error, with a single JSON error object on stderr. `issue`
//! prints the SDK credential-process JSON on stdout.

use std::env;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sentinel_core::models::EvalMode;
use sentinel_issuer::{DecisionLog, IssueRequest, Issuer, ProfileConfig};
use sentinel_policy::{PolicyStore, SigningMode};
use sentinel_server::{AppState, BearerToken};
use sentinel_store::{ApprovalStore, BreakGlassStore, SessionStore};

mod output;

use output::CliError;

#[derive(Parser)]
#[command(name = "sentinel", about = "Policy-gated AWS credential broker")]
struct Cli {
    /// SSM parameter path of the access policy document.
    #[arg(long, global = true, default_value = "/sentinel/policies/access")]
    policy_path: String,

    /// SSM parameter path of the break-glass policy document.
    #[arg(long, global = true, default_value = "/sentinel/policies/breakglass")]
    breakglass_policy_path: String,

    /// SSM parameter path of the break-glass rate-limit document.
    #[arg(long, global = true, default_value = "/sentinel/policies/ratelimit")]
    ratelimit_policy_path: String,

    /// Profile definitions file (default: <config dir>/sentinel/profiles.json).
    #[arg(long, global = true)]
    profiles_file: Option<PathBuf>,

    /// Accept unsigned policy documents. Signed is the default.
    #[arg(long, global = true)]
    unsigned_policies: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate policy and print credential-process JSON for a profile.
    Issue {
        #[arg(long)]
        profile: String,
        /// Requested session length in seconds (clamped by the profile).
        #[arg(long)]
        duration_seconds: Option<i64>,
        /// Use an active break-glass event as the grant.
        #[arg(long)]
        breakglass_id: Option<String>,
    },
    /// Issue a revocable session and serve it on a local endpoint.
    Serve {
        #[arg(long)]
        profile: String,
        /// Unix socket path (default: runtime dir). Ignored with --port.
        #[arg(long)]
        socket: Option<PathBuf>,
        /// Serve on loopback TCP instead of a Unix socket. 0 = ephemeral.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Open a break-glass event; its id can then be fed to `issue`.
    BreakGlass {
        #[arg(long)]
        profile: String,
        /// incident | maintenance | security | recovery | other
        #[arg(long)]
        reason_code: sentinel_core::models::ReasonCode,
        #[arg(long)]
        justification: String,
        #[arg(long)]
        duration_seconds: Option<i64>,
    },
    /// Revoke a server session; the next fetch against it returns 403.
    Revoke {
        #[arg(long)]
        session_id: String,
    },
    /// Create the Sentinel DynamoDB tables (idempotent).
    Provision,
}

/// The global flags, separated so subcommand handling can consume the
/// subcommand without fighting the borrow of these.
struct BrokerOpts {
    policy_path: String,
    breakglass_policy_path: String,
    ratelimit_policy_path: String,
    profiles_file: Option<PathBuf>,
    signing: SigningMode,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        output::print_error(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let opts = BrokerOpts {
        policy_path: cli.policy_path,
        breakglass_policy_path: cli.breakglass_policy_path,
        ratelimit_policy_path: cli.ratelimit_policy_path,
        profiles_file: cli.profiles_file,
        signing: if cli.unsigned_policies {
            SigningMode::Disabled
        } else {
            SigningMode::Required
        },
    };

    match cli.command {
        Command::Issue {
            profile,
            duration_seconds,
            breakglass_id,
        } => {
            let issuer = build_issuer(&aws, &opts, EvalMode::Standard)?;
            let issued = issuer
                .issue(IssueRequest {
                    profile: &profile,
                    requested_duration: duration_seconds.map(jiff::SignedDuration::from_secs),
                    mode: EvalMode::Standard,
                    caller: None,
                    breakglass_id: breakglass_id.as_deref(),
                })
                .await?;

            let json = serde_json::to_string(&issued.credentials.to_process_output())
                .map_err(|e| CliError::Config(e.to_string()))?;
            println!("{json}");
            Ok(())
        }

        Command::Serve {
            profile,
            socket,
            port,
        } => {
            let issuer = build_issuer(&aws, &opts, EvalMode::Server)?;
            let issued = issuer
                .issue(IssueRequest {
                    profile: &profile,
                    requested_duration: None,
                    mode: EvalMode::Server,
                    caller: None,
                    breakglass_id: None,
                })
                .await?;
            let session_id = issued.session_id.ok_or_else(|| {
                CliError::Config("server mode produced no session id".to_string())
            })?;
            tracing::info!(
                session_id = %session_id,
                source_identity = %issued.source_identity,
                "server session issued"
            );

            let state = AppState::new(issuer, SessionStore::new(&aws), session_id);

            match port {
                Some(port) => {
                    let token = BearerToken::generate();
                    let listener = sentinel_server::bind_loopback(port).await?;
                    let addr = listener
                        .local_addr()
                        .map_err(|e| CliError::Config(e.to_string()))?;
                    // The two env vars the SDK needs to reach this server.
                    println!("export AWS_CONTAINER_CREDENTIALS_FULL_URI=http://{addr}/");
                    println!(
                        "export AWS_CONTAINER_AUTHORIZATION_TOKEN={}",
                        token.reveal()
                    );
                    sentinel_server::serve_loopback(listener, state, token).await?;
                }
                None => {
                    let path = socket.unwrap_or_else(|| default_socket_path(&profile));
                    println!("# credential server socket: {}", path.display());
                    sentinel_server::serve_unix(state, &path).await?;
                }
            }
            Ok(())
        }

        Command::BreakGlass {
            profile,
            reason_code,
            justification,
            duration_seconds,
        } => {
            let issuer = build_issuer(&aws, &opts, EvalMode::Standard)?;
            let event = issuer
                .open_breakglass(sentinel_issuer::BreakGlassRequest {
                    profile: &profile,
                    reason_code,
                    justification: &justification,
                    duration: duration_seconds.map(jiff::SignedDuration::from_secs),
                    caller: None,
                })
                .await?;

            let json = serde_json::json!({
                "id": event.id,
                "request_id": event.request_id,
                "expires_at": event.expires_at.to_string(),
            });
            println!("{json}");
            Ok(())
        }

        Command::Revoke { session_id } => {
            let sessions = SessionStore::new(&aws);
            let session = sessions.get(&session_id).await?;
            sessions.revoke(&session, jiff::Timestamp::now()).await?;
            tracing::info!(session_id = %session_id, "session revoked");
            Ok(())
        }

        Command::Provision => {
            let outcomes = sentinel_provisioner::provision_tables(
                &aws,
                &sentinel_provisioner::sentinel_tables(),
            )
            .await?;
            for (table, outcome) in outcomes {
                tracing::info!(table = %table, outcome = ?outcome, "provisioned");
            }
            Ok(())
        }
    }
}

fn build_issuer(
    aws: &aws_config::SdkConfig,
    opts: &BrokerOpts,
    mode: EvalMode,
) -> Result<Issuer, CliError> {
    let policy_store = PolicyStore::new(aws, opts.signing);

    let profiles = match &opts.profiles_file {
        Some(path) => ProfileConfig::load(path)?,
        None => ProfileConfig::load_default()?,
    };

    let mut issuer = Issuer::new(
        aws,
        policy_store,
        profiles,
        ApprovalStore::new(aws),
        opts.policy_path.clone(),
    )
    .with_breakglass(sentinel_issuer::BreakGlassConfig {
        store: BreakGlassStore::new(aws),
        policy_path: opts.breakglass_policy_path.clone(),
        ratelimit_path: opts.ratelimit_policy_path.clone(),
    });

    if mode == EvalMode::Server {
        issuer = issuer.with_sessions(SessionStore::new(aws));
    }

    // Signed decision log, when the deployment provides the key material.
    if let (Ok(log_path), Ok(secret)) = (
        env::var("SENTINEL_LOG_FILE"),
        env::var("SENTINEL_LOG_SECRET"),
    ) {
        issuer = issuer.with_decision_log(DecisionLog::open(log_path, secret.as_bytes())?);
    }

    Ok(issuer)
}

fn default_socket_path(profile: &str) -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(env::temp_dir)
        .join("sentinel")
        .join(format!("{profile}.sock"))
}
