// Author: Dustin Pilgrim
// License: MIT

pub mod client;
pub mod router;
pub mod server;

use std::path::PathBuf;

pub const ERROR_PREFIX: &str = "ERROR: ";

pub fn runtime_dir() -> Result<PathBuf, String> {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| "XDG_RUNTIME_DIR is not set".to_string())
}

pub fn socket_path() -> Result<PathBuf, String> {
    Ok(runtime_dir()?.join("ticktrack").join("ticktrack.sock"))
}

/// Wire form of a handler result.
pub fn encode_reply(reply: Result<String, String>) -> String {
    match reply {
        Ok(msg) => msg,
        Err(msg) => format!("{ERROR_PREFIX}{msg}"),
    }
}

/// Inverse of `encode_reply`, used by the client.
pub fn decode_reply(raw: &str) -> Result<String, String> {
    match raw.strip_prefix(ERROR_PREFIX) {
        Some(msg) => Err(msg.trim_end().to_string()),
        None => Ok(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_replies_are_prefixed() {
        assert_eq!(encode_reply(Ok("Started A-1".into())), "Started A-1");
        assert_eq!(
            encode_reply(Err("Please select a ticket first".into())),
            "ERROR: Please select a ticket first"
        );
        assert_eq!(
            decode_reply("ERROR: nope\n"),
            Err("nope".to_string())
        );
        assert_eq!(decode_reply("fine"), Ok("fine".to_string()));
    }
}
