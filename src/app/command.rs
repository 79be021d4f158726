// Author: Dustin Pilgrim
// License: MIT

use crate::cli::{Args, Command};
use crate::ipc::client::{send_raw, send_raw_with_timeout, TRACKER_TIMEOUT};

type AnyError = Box<dyn std::error::Error + Send + Sync>;

const NOT_RUNNING_JSON: &str =
    r#"{"text":"","alt":"not_running","class":"not_running","tooltip":"ticktrack not running"}"#;

pub async fn run(args: Args) -> Result<(), AnyError> {
    // command mode: args.command is Some
    let Some(cmd) = args.command.as_ref() else {
        return Err("no command given".into());
    };

    let line = cmd.request_line();
    let sent = if cmd.talks_to_tracker() {
        send_raw_with_timeout(&line, TRACKER_TIMEOUT).await
    } else {
        send_raw(&line).await
    };

    let raw = match sent {
        Ok(raw) => raw,
        Err(e) => {
            if matches!(cmd, Command::Info { json: true }) {
                // Waybar needs valid JSON on stdout even when the daemon isn't running.
                println!("{NOT_RUNNING_JSON}");
                return Ok(());
            }
            eprintln!("ticktrack: {e}");
            std::process::exit(1);
        }
    };

    match crate::ipc::decode_reply(&raw) {
        Ok(out) => {
            let out = out.trim_end();
            if !out.is_empty() {
                println!("{out}");
            }
            Ok(())
        }
        Err(msg) => {
            eprintln!("ticktrack: {msg}");
            std::process::exit(1);
        }
    }
}
