//! One session engine serving several simulated requests.
//!
//! Run with: cargo run -p persistent-worker-demo [path/to/session.toml]
//!
//! Set `RUST_LOG=session_state=debug` to watch the lifecycle.

use std::{collections::HashMap, path::PathBuf};

use anyhow::Context as _;
use session_state::{IniDefaults, Session, SessionOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("session.toml"), PathBuf::from);
    let defaults = IniDefaults::load(&config)
        .with_context(|| format!("loading {}", config.display()))?;

    let dir = std::env::temp_dir().join("session-state-demo");
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut session = Session::builder().defaults(defaults).build();
    session.set_options(
        SessionOptions::new()
            .handler("files")
            .save_path(dir.to_string_lossy().into_owned())
            .set("cookie_httponly", true),
        true,
    )?;

    // The first request has no cookie; later ones send back what they were given.
    let mut client_cookie: Option<(String, String)> = None;
    for request in 1..=3 {
        let mut scope = session.scope();
        let cookies: HashMap<String, String> = client_cookie.iter().cloned().collect();
        scope.set_request_cookies(Some(cookies));

        if !scope.start()? {
            tracing::warn!(request, "Session backend unavailable");
            continue;
        }

        let visits = scope.get("visits").and_then(serde_json::Value::as_i64).unwrap_or(0) + 1;
        scope.set("visits", visits);
        tracing::info!(request, id = scope.id(), visits, "Handled request");

        if let Some(cookie) = scope.response_cookie() {
            tracing::info!(request, set_cookie = %cookie, "Sending session cookie");
            client_cookie = Some((cookie.name, cookie.value));
        }

        if request == 3 {
            scope.destroy();
        }
    }

    Ok(())
}
