// Author: Dustin Pilgrim
// License: MIT

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::error::ValidationError;

static TICKET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]+-[0-9]+$").expect("static ticket pattern")
});

/// Trim + uppercase user input and check it looks like `ABC-123`.
pub fn normalize_ticket(raw: &str) -> Result<String, ValidationError> {
    let ticket = raw.trim().to_uppercase();

    if ticket.is_empty() {
        return Err(ValidationError::EmptyTicket);
    }

    if !TICKET_PATTERN.is_match(&ticket) {
        return Err(ValidationError::MalformedTicket(raw.trim().to_string()));
    }

    Ok(ticket)
}

/// Drop repeated ids, keeping first occurrence order.
pub fn dedup_preserving_order(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if id.is_empty() || out.iter().any(|t| t == id) {
            continue;
        }
        out.push(id.to_string());
    }
    out
}
