// Author: Dustin Pilgrim
// License: MIT

use crate::core::manager_msg::Request;
use crate::core::state::StatePatch;

fn no_args(cmd: &str, rest: &str, req: Request) -> Result<Request, String> {
    if rest.is_empty() {
        Ok(req)
    } else {
        Err(format!("'{cmd}' takes no arguments"))
    }
}

/// Parse one request line into a `Request`. Errors are user-facing.
pub fn parse_request(line: &str) -> Result<Request, String> {
    let line = line.trim();
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };

    match cmd {
        "" => Err("empty request".to_string()),

        "select" => match rest {
            "" => Err("usage: select <TICKET>|none".to_string()),
            r if r.eq_ignore_ascii_case("none") => Ok(Request::Select(None)),
            r => Ok(Request::Select(Some(r.to_string()))),
        },

        "add" => Ok(Request::Add(rest.to_string())),

        "replace" => Ok(Request::Replace(
            rest.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )),

        "save" => {
            if rest.is_empty() {
                return Err("usage: save <json>".to_string());
            }
            serde_json::from_str::<StatePatch>(rest)
                .map(Request::Save)
                .map_err(|e| format!("invalid state json: {e}"))
        }

        "info" => match rest {
            "" => Ok(Request::Info { json: false }),
            "--json" => Ok(Request::Info { json: true }),
            other => Err(format!("unknown info option: {other}")),
        },

        "sessions" => {
            if rest.is_empty() {
                return Ok(Request::Sessions(None));
            }
            rest.parse::<usize>()
                .map(|n| Request::Sessions(Some(n)))
                .map_err(|_| format!("invalid session count: {rest}"))
        }

        "start" => no_args(cmd, rest, Request::Start),
        "stop" => no_args(cmd, rest, Request::Stop),
        "reset" => no_args(cmd, rest, Request::Reset),
        "tickets" => no_args(cmd, rest, Request::Tickets),
        "sync" => no_args(cmd, rest, Request::Sync),
        "test-connection" => no_args(cmd, rest, Request::TestConnection),
        "quit" => no_args(cmd, rest, Request::Quit),

        other => Err(format!("unknown command: {other}")),
    }
}
