use rosterd::config::Config;
use rosterd::{ipc, logging};
use std::io::{self, BufRead, Write};

fn main() {
    let config = Config::from_env();
    logging::init(config.log_format);
    for warning in &config.warnings {
        tracing::warn!("{warning}");
    }

    let mut state = ipc::AppState::new(config.clone());
    if let Some(path) = &config.workspace {
        // A bad startup workspace must not keep the sidecar from answering.
        if let Err(e) = state.open_workspace(path) {
            tracing::error!(workspace = %path.display(), error = %format!("{e:#}"), "startup workspace failed to open");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed; shutting down");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                ipc::bad_json(e.to_string())
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    tracing::info!("stdin closed; exiting");
}
