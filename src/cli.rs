use clap::{Args, Parser, Subcommand};
use doorbell_push::config::{AppConfig, DEFAULT_PUSH_TIMEOUT};
use doorbell_push::push::{self, PushOptions, Urgency};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_VAPID_SUBJECT: &str = "mailto:admin@localhost";

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Serve(AppConfig),
    Exit(u8),
}

pub(crate) async fn run() -> RunOutcome {
    let mut cli = Cli::parse();
    match cli.command.take() {
        Some(Command::Init(args)) => RunOutcome::Exit(run_init(args, cli.store.as_deref()).await),
        Some(Command::Send(args)) => match resolve_config(&cli) {
            Ok(config) => RunOutcome::Exit(run_send(config, args).await),
            Err(err) => {
                eprintln!("error: {err}");
                RunOutcome::Exit(2)
            }
        },
        None => match resolve_config(&cli) {
            Ok(config) => RunOutcome::Serve(config),
            Err(err) => {
                eprintln!("error: {err}");
                RunOutcome::Exit(2)
            }
        },
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "doorbell-push",
    version,
    about = "Web Push delivery service for doorbell notifications"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "DOORBELL_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
    /// JSON file holding subscriptions and, optionally, VAPID keys.
    #[arg(long, env = "DOORBELL_STORE")]
    store: Option<PathBuf>,
    #[arg(long, env = "DOORBELL_VAPID_PRIVATE_KEY")]
    vapid_private_key: Option<String>,
    #[arg(long, env = "DOORBELL_VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "DOORBELL_VAPID_SUBJECT")]
    vapid_subject: Option<String>,
    #[arg(long, env = "DOORBELL_PUSH_TTL")]
    push_ttl: Option<String>,
    #[arg(long, env = "DOORBELL_PUSH_URGENCY", default_value = "high")]
    push_urgency: Urgency,
    /// Empty disables the Topic header.
    #[arg(long, env = "DOORBELL_PUSH_TOPIC", default_value = push::DEFAULT_TOPIC)]
    push_topic: String,
    #[arg(long, env = "DOORBELL_PUSH_TIMEOUT")]
    push_timeout: Option<String>,
    #[arg(long, env = "DOORBELL_PUSH_CONCURRENCY", default_value_t = push::DEFAULT_CONCURRENCY)]
    push_concurrency: usize,
    #[arg(long, env = "DOORBELL_ICON", default_value = push::DEFAULT_ICON)]
    icon: String,
    #[arg(long, env = "DOORBELL_BADGE", default_value = push::DEFAULT_BADGE)]
    badge: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate VAPID keys; with --store they are also written to the store.
    Init(InitArgs),
    /// Send one notification to every subscription of a user.
    Send(SendArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    #[arg(long)]
    subject: Option<String>,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[arg(long)]
    user_id: String,
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    body: String,
    /// JSON object forwarded to the service worker as `data`.
    #[arg(long, value_parser = parse_json_data)]
    data: Option<serde_json::Value>,
}

async fn run_init(args: InitArgs, store: Option<&Path>) -> u8 {
    let (subject, show_subject_note) = match resolve_init_subject(args.subject.as_deref()) {
        Ok(resolved) => resolved,
        Err(err) => {
            eprintln!("error: {err}");
            return 2;
        }
    };
    let credentials = match store {
        Some(path) => match doorbell_push::init_vapid_keys(path).await {
            Ok(credentials) => credentials,
            Err(err) => {
                eprintln!("failed to store VAPID credentials: {err}");
                return 1;
            }
        },
        None => doorbell_push::generate_vapid_credentials(),
    };

    println!("VAPID credentials generated.");
    if let Some(path) = store {
        println!("Stored in {}.", path.display());
    }
    println!();
    println!("DOORBELL_VAPID_PRIVATE_KEY=\"{}\"", credentials.private_key);
    println!("DOORBELL_VAPID_PUBLIC_KEY=\"{}\"", credentials.public_key);
    println!("DOORBELL_VAPID_SUBJECT=\"{subject}\"");
    if show_subject_note {
        println!();
        println!("Note: replace DOORBELL_VAPID_SUBJECT with a contact URI you control.");
    }
    0
}

/// Returns the subject to print and whether it is only a placeholder.
fn resolve_init_subject(subject: Option<&str>) -> Result<(String, bool), String> {
    match subject {
        Some(subject) => push::normalize_subject(subject)
            .map(|subject| (subject, false))
            .map_err(|err| err.to_string()),
        None => Ok(("mailto:you@example.com".to_string(), true)),
    }
}

async fn run_send(config: AppConfig, args: SendArgs) -> u8 {
    let outcome = match doorbell_push::send_notification(
        config,
        args.user_id.trim(),
        &args.title,
        &args.body,
        args.data,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };
    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to encode outcome: {err}"),
    }
    if outcome.success { 0 } else { 1 }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig, String> {
    let vapid_subject = match cli.vapid_subject.as_deref() {
        Some(subject) => push::normalize_subject(subject).map_err(|err| err.to_string())?,
        None => DEFAULT_VAPID_SUBJECT.to_string(),
    };
    if cli.push_concurrency == 0 {
        return Err("push concurrency must be greater than 0".to_string());
    }

    let ttl_secs = match cli.push_ttl.as_deref() {
        Some(raw) => {
            let ttl = parse_duration("push ttl", raw)?;
            u32::try_from(ttl.as_secs()).map_err(|_| format!("push ttl '{raw}' is too large"))?
        }
        None => push::DEFAULT_TTL_SECS,
    };
    let push_timeout = match cli.push_timeout.as_deref() {
        Some(raw) => parse_duration("push timeout", raw)?,
        None => DEFAULT_PUSH_TIMEOUT,
    };

    Ok(AppConfig {
        bind: cli.bind,
        store_path: cli.store.clone(),
        vapid_private_key: non_empty(cli.vapid_private_key.as_deref()),
        vapid_public_key: non_empty(cli.vapid_public_key.as_deref()),
        vapid_subject,
        push: PushOptions {
            ttl_secs,
            urgency: cli.push_urgency,
            topic: push::parse_topic(&cli.push_topic)?,
            concurrency: cli.push_concurrency,
            icon: cli.icon.clone(),
            badge: cli.badge.clone(),
        },
        push_timeout,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_duration(name: &str, raw: &str) -> Result<Duration, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(format!("{name} cannot be empty"));
    }

    let (amount, unit) = match value.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => {
            (&value[..value.len() - 1], ch.to_ascii_lowercase())
        }
        _ => (value, 's'),
    };

    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("invalid {name} '{value}'; expected <number>[s|m|h|d]"))?;

    if amount == 0 {
        return Err(format!("{name} must be greater than 0"));
    }

    let seconds = match unit {
        's' => amount,
        'm' => amount.saturating_mul(60),
        'h' => amount.saturating_mul(60 * 60),
        'd' => amount.saturating_mul(24 * 60 * 60),
        _ => {
            return Err(format!(
                "invalid {name} '{value}'; expected <number>[s|m|h|d]"
            ));
        }
    };
    Ok(Duration::from_secs(seconds))
}

fn parse_json_data(raw: &str) -> Result<serde_json::Value, String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| format!("invalid JSON: {err}"))?;
    if !value.is_object() {
        return Err("data must be a JSON object".to_string());
    }
    Ok(value)
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            command: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            store: None,
            vapid_private_key: None,
            vapid_public_key: None,
            vapid_subject: None,
            push_ttl: None,
            push_urgency: Urgency::High,
            push_topic: push::DEFAULT_TOPIC.to_string(),
            push_timeout: None,
            push_concurrency: push::DEFAULT_CONCURRENCY,
            icon: push::DEFAULT_ICON.to_string(),
            badge: push::DEFAULT_BADGE.to_string(),
        }
    }

    #[test]
    fn parse_duration__should_parse_seconds_when_unit_missing() {
        // When
        let duration = parse_duration("push ttl", "30").expect("parse ttl");

        // Then
        assert_eq!(duration, Duration::from_secs(30));
    }

    #[test]
    fn parse_duration__should_parse_units() {
        // When
        let duration = parse_duration("push ttl", "15m").expect("parse ttl");

        // Then
        assert_eq!(duration, Duration::from_secs(15 * 60));
    }

    #[test]
    fn parse_duration__should_reject_invalid_values() {
        // Then
        assert!(parse_duration("push ttl", "").is_err());
        assert!(parse_duration("push ttl", "0").is_err());
        assert!(parse_duration("push ttl", "abc").is_err());
        assert!(parse_duration("push ttl", "5w").is_err());
    }

    #[test]
    fn resolve_config__should_apply_defaults() {
        // When
        let config = resolve_config(&base_cli()).expect("resolve config");

        // Then
        assert_eq!(config.vapid_subject, DEFAULT_VAPID_SUBJECT);
        assert_eq!(config.push.ttl_secs, push::DEFAULT_TTL_SECS);
        assert_eq!(config.push.topic.as_deref(), Some(push::DEFAULT_TOPIC));
        assert_eq!(config.push_timeout, DEFAULT_PUSH_TIMEOUT);
        assert!(config.vapid_private_key.is_none());
    }

    #[test]
    fn resolve_config__should_normalize_bare_subject_address() {
        // Given
        let mut cli = base_cli();
        cli.vapid_subject = Some("ops@doorbell.example".to_string());

        // When
        let config = resolve_config(&cli).expect("resolve config");

        // Then
        assert_eq!(config.vapid_subject, "mailto:ops@doorbell.example");
    }

    #[test]
    fn resolve_config__should_disable_topic_when_empty() {
        // Given
        let mut cli = base_cli();
        cli.push_topic = String::new();
        cli.push_ttl = Some("1h".to_string());

        // When
        let config = resolve_config(&cli).expect("resolve config");

        // Then
        assert!(config.push.topic.is_none());
        assert_eq!(config.push.ttl_secs, 3600);
    }

    #[test]
    fn resolve_config__should_reject_invalid_options() {
        // Given
        let mut bad_topic = base_cli();
        bad_topic.push_topic = "not a topic".to_string();
        let mut bad_concurrency = base_cli();
        bad_concurrency.push_concurrency = 0;
        let mut bad_subject = base_cli();
        bad_subject.vapid_subject = Some("nobody".to_string());

        // Then
        assert!(resolve_config(&bad_topic).is_err());
        assert!(resolve_config(&bad_concurrency).is_err());
        assert!(resolve_config(&bad_subject).is_err());
    }

    #[test]
    fn resolve_init_subject__should_normalize_like_vapid_subject() {
        // When
        let bare = resolve_init_subject(Some("ops@doorbell.example")).expect("bare address");
        let placeholder = resolve_init_subject(None).expect("placeholder");

        // Then
        assert_eq!(bare, ("mailto:ops@doorbell.example".to_string(), false));
        assert_eq!(placeholder, ("mailto:you@example.com".to_string(), true));
        assert!(resolve_init_subject(Some("nobody")).is_err());
    }

    #[test]
    fn parse_json_data__should_require_object() {
        // Then
        assert!(parse_json_data(r#"{"callId":"c-1"}"#).is_ok());
        assert!(parse_json_data("[1,2]").is_err());
        assert!(parse_json_data("{oops").is_err());
    }

    #[test]
    fn cli__should_parse_send_subcommand() {
        // When
        let cli = Cli::try_parse_from([
            "doorbell-push",
            "--push-urgency",
            "normal",
            "send",
            "--user-id",
            "user-1",
            "--title",
            "Doorbell",
            "--data",
            r#"{"callId":"c-1"}"#,
        ])
        .expect("parse");

        // Then
        assert_eq!(cli.push_urgency, Urgency::Normal);
        let Some(Command::Send(args)) = cli.command else {
            panic!("expected send command");
        };
        assert_eq!(args.user_id, "user-1");
        assert_eq!(args.body, "");
        assert_eq!(args.data, Some(serde_json::json!({"callId": "c-1"})));
    }
}
