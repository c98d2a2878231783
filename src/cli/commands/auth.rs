use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use serde_json::json;
use tracing::warn;

use crate::auth::{AdminGuard, AuthResolver};
use crate::backend::{AuthApi, RestBackend};
use crate::cli::config::{clear_session_state, load_session_state, save_session_state};
use crate::cli::utils::{output_error, output_success};
use crate::cli::OutputFormat;
use crate::config::config;
use crate::security::{record_security_event, SecurityEvent, SecurityPolicy, SecurityState, Severity};
use crate::services::{AccountType, SignupForm, SignupService};

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Sign in as an admin and keep the session locally")]
    Login {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, env = "SDA_PASSWORD", hide_env_values = true, help = "Password")]
        password: String,
    },

    #[command(about = "Sign out and forget the local session")]
    Logout,

    #[command(about = "Check the local admin session against the security policy")]
    Status,

    #[command(about = "Register a participant or investor account")]
    Signup {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Full name")]
        full_name: String,
        #[arg(long, env = "SDA_PASSWORD", hide_env_values = true, help = "Password")]
        password: String,
        #[arg(long, help = "Register an investor instead of a participant")]
        investor: bool,
        #[arg(long, help = "Investor company name")]
        company: Option<String>,
    },
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config();

    match cmd {
        AuthCommands::Login { email, password } => {
            let backend = Arc::new(RestBackend::new(&config.backend)?);

            let session = match backend.sign_in_with_password(&email, &password).await {
                Ok(session) => session,
                Err(e) => {
                    let event = SecurityEvent::new("admin_login_failed", Severity::Medium)
                        .details(json!({ "email": email, "reason": e.to_string() }));
                    record_security_event(backend.as_ref(), event).await;
                    return Err(e.into());
                }
            };

            let resolution = AuthResolver::from_backend(backend.clone()).resolve::<AdminGuard>().await;
            if !resolution.authorized {
                let reason = resolution.denial.map(|d| d.as_str()).unwrap_or("denied");
                let event = SecurityEvent::new("admin_access_denied", Severity::High)
                    .user(session.user_id())
                    .details(json!({ "email": email, "reason": reason }));
                record_security_event(backend.as_ref(), event).await;
                if let Err(e) = backend.sign_out().await {
                    warn!("Sign-out after denied login failed: {}", e);
                }
                anyhow::bail!("Access denied: {}", reason);
            }

            record_security_event(
                backend.as_ref(),
                SecurityEvent::new("admin_login", Severity::Low).user(session.user_id()),
            )
            .await;

            save_session_state(&SecurityState::signed_in(&session, Utc::now()))?;
            output_success(
                &output_format,
                &format!("Signed in as {}", email),
                Some(json!({ "user_id": session.user_id(), "expires_at": session.expires_at })),
            )
        }
        AuthCommands::Logout => {
            let state = load_session_state()?;
            if let Some(meta) = &state.admin_session {
                let backend = RestBackend::new(&config.backend)?;
                backend.restore_session(meta.to_session()).await;
                if let Err(e) = backend.sign_out().await {
                    warn!("Remote sign-out failed, clearing local session anyway: {}", e);
                }
            }

            clear_session_state()?;
            output_success(&output_format, "Signed out", None)
        }
        AuthCommands::Status => {
            let mut state = load_session_state()?;
            let policy = SecurityPolicy::from_config(&config.security);

            match state.validate(&policy) {
                Ok(()) => {
                    state.touch(Utc::now());
                    save_session_state(&state)?;
                    let meta = state.admin_session.as_ref();
                    output_success(
                        &output_format,
                        &format!(
                            "Admin session active for {}",
                            meta.and_then(|m| m.email.as_deref()).unwrap_or("unknown user")
                        ),
                        Some(json!({
                            "user_id": meta.map(|m| m.user_id),
                            "expires_at": meta.map(|m| m.expires_at),
                            "last_activity": state.last_activity,
                        })),
                    )
                }
                Err(violation) => {
                    // An invalid session is never reused
                    clear_session_state()?;
                    output_error(&output_format, &violation.to_string(), Some("SESSION_INVALID"))?;
                    Err(violation.into())
                }
            }
        }
        AuthCommands::Signup {
            email,
            full_name,
            password,
            investor,
            company,
        } => {
            let account_type = if investor {
                AccountType::Investor
            } else {
                AccountType::Participant
            };
            let form = SignupForm {
                email,
                password,
                full_name,
                company_name: company,
            };

            let backend = Arc::new(RestBackend::new(&config.backend)?);
            let outcome = SignupService::from_backend(backend).register(&form, account_type).await?;

            let message = if outcome.session.is_some() {
                format!("Registered {} account {}", account_type.as_str(), form.email)
            } else {
                format!(
                    "Registered {} account {}; confirm the email to sign in",
                    account_type.as_str(),
                    form.email
                )
            };
            output_success(
                &output_format,
                &message,
                Some(json!({ "user_id": outcome.user.id, "account_type": account_type })),
            )
        }
    }
}
