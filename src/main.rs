use std::env;
use std::io::{IsTerminal, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use dashrewrite::auth::{AuthState, ConfiguredIdentity};
use dashrewrite::config::Config;
use dashrewrite::error::Error;
use dashrewrite::http::HttpClient;
use dashrewrite::rewrite::{NO_RESULT_PLACEHOLDER, RequestState, RewriteClient, RewriteOutcome};

/// How long to wait for anonymous sign-in before submitting anyway.
const AUTH_WAIT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() {
    // Fails only if a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("config") => {
            run_config_command();
            return;
        }
        Some("-h" | "--help" | "help") => {
            print_help();
            return;
        }
        Some("-V" | "--version" | "version") => {
            println!("dashrewrite {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        _ => {}
    }

    let rest = match args.first().map(String::as_str) {
        Some("rewrite") => &args[1..],
        _ => &args[..],
    };

    let mut base_url: Option<String> = None;
    let mut token: Option<String> = None;
    let mut debug = false;
    let mut words: Vec<&str> = Vec::new();

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--url" => base_url = Some(required_value(iter.next(), "--url")),
            "--token" => token = Some(required_value(iter.next(), "--token")),
            "--debug" | "-d" => debug = true,
            "--" => {
                words.extend(iter.by_ref().map(String::as_str));
            }
            flag if flag.starts_with("--") => {
                eprintln!("\x1b[31mUnknown option:\x1b[0m {}", flag);
                eprintln!();
                eprintln!("Run '\x1b[33mdashrewrite --help\x1b[0m' for usage information.");
                std::process::exit(2);
            }
            word => words.push(word),
        }
    }

    let config = match load_config(base_url, token, debug) {
        Ok(config) => config,
        Err(e) => exit_with_error("Config error:", &e),
    };

    init_logging(config.logging.debug);

    let text = if words.is_empty() {
        match read_stdin() {
            Ok(text) => text,
            Err(e) => {
                eprintln!("\x1b[31mFailed to read input:\x1b[0m {}", e);
                std::process::exit(1);
            }
        }
    } else {
        words.join(" ")
    };

    if let Err(e) = run_rewrite(&config, &text).await {
        exit_with_error("Rewrite failed:", &e);
    }
}

/// File config with CLI and environment overrides applied.
fn load_config(
    base_url: Option<String>,
    token: Option<String>,
    debug: bool,
) -> Result<Config, Error> {
    let config = Config::load()?.with_overrides(base_url, token, debug);
    config.validate_auth()?;
    Ok(config)
}

fn exit_with_error(label: &str, e: &Error) -> ! {
    eprintln!("\x1b[31m{}\x1b[0m {}", label, e);
    if let Some(suggestion) = e.suggestion() {
        eprintln!();
        eprintln!("  \x1b[33mTip:\x1b[0m {}", suggestion);
    }
    std::process::exit(1);
}

fn required_value(value: Option<&String>, flag: &str) -> String {
    match value {
        Some(v) => v.clone(),
        None => {
            eprintln!("\x1b[31mMissing value for\x1b[0m {}", flag);
            std::process::exit(2);
        }
    }
}

fn read_stdin() -> std::io::Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("\x1b[2mEnter text to rewrite, then Ctrl-D:\x1b[0m");
    }
    let mut text = String::new();
    stdin.read_to_string(&mut text)?;
    Ok(text)
}

async fn run_rewrite(config: &Config, text: &str) -> Result<(), Error> {
    let http_client = HttpClient::new();
    let identity = Arc::new(ConfiguredIdentity::from_config(config, http_client.clone())?);

    tokio::spawn({
        let identity = identity.clone();
        async move { identity.start().await }
    });

    match identity.store().wait_settled(AUTH_WAIT).await {
        AuthState::Ready(principal) => {
            debug!(uid = %principal.uid, anonymous = principal.anonymous, "Identity ready");
        }
        AuthState::Failed(reason) => warn!(reason = %reason, "Sign-in failed"),
        AuthState::Pending => warn!(waited = ?AUTH_WAIT, "Sign-in still pending"),
    }

    let client = RewriteClient::new(identity, http_client, config);
    let printer = tokio::spawn(print_live(client.subscribe()));

    let result = client
        .submit(text)
        .await
        .map_err(|e| e.with_auth_state(&client.identity().store().current()));

    // Closing the state channel ends the printer
    drop(client);
    let printed = printer.await.unwrap_or(0);

    let mut stdout = std::io::stdout();
    match result? {
        RewriteOutcome::Completed(text) => {
            let rest = text.get(printed..).unwrap_or_default();
            write!(stdout, "{}", rest)?;
            if !text.ends_with('\n') {
                writeln!(stdout)?;
            }
            stdout.flush()?;
        }
        RewriteOutcome::Empty => {
            eprintln!("\x1b[2m{}\x1b[0m", NO_RESULT_PLACEHOLDER);
        }
    }

    Ok(())
}

/// Print each newly streamed suffix while the request is in flight.
/// Returns how many bytes of the result were written.
async fn print_live(mut rx: watch::Receiver<RequestState>) -> usize {
    let mut printed = 0;
    let mut stdout = std::io::stdout();

    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        if !state.in_flight {
            continue;
        }
        if let Some(suffix) = state.result_text.get(printed..)
            && !suffix.is_empty()
        {
            if write!(stdout, "{}", suffix).and_then(|_| stdout.flush()).is_err() {
                break;
            }
            printed = state.result_text.len();
        }
    }

    printed
}

fn run_config_command() {
    let path = Config::path();
    println!("\x1b[1mConfig file:\x1b[0m {}", path.display());
    if !path.exists() {
        println!("\x1b[2m(not found, using defaults)\x1b[0m");
    }
    println!();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\x1b[31mConfig error:\x1b[0m {}", e);
            std::process::exit(1);
        }
    };
    if config.auth.token.is_some() {
        config.auth.token = Some("<redacted>".to_string());
    }

    match toml::to_string_pretty(&config) {
        Ok(content) => print!("{}", content),
        Err(e) => {
            eprintln!("\x1b[31mFailed to render config:\x1b[0m {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("dashrewrite=debug,warn"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dashrewrite=info,warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

fn print_help() {
    println!(
        "\x1b[1mdashrewrite\x1b[0m {}
Rewrite text with the dashboard rewrite service, streaming the result.

\x1b[1mUSAGE:\x1b[0m
    dashrewrite [rewrite] [OPTIONS] [TEXT...]
    dashrewrite config

Reads TEXT from stdin when none is given.

\x1b[1mOPTIONS:\x1b[0m
    --url <URL>        Base URL of the rewrite service
    --token <TOKEN>    Use a fixed credential instead of anonymous sign-in
    -d, --debug        Enable debug logging
    -h, --help         Print help
    -V, --version      Print version

\x1b[1mENVIRONMENT:\x1b[0m
    DASHREWRITE_TOKEN     Fixed credential (same as --token)
    DASHREWRITE_API_KEY   Identity service key for anonymous sign-in
    RUST_LOG              Log filter override

\x1b[1mCONFIG:\x1b[0m
    {}",
        env!("CARGO_PKG_VERSION"),
        Config::path().display()
    );
}
