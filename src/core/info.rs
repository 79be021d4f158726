// Author: Dustin Pilgrim
// License: MIT

use serde::Serialize;

use crate::core::utils::format_hms;

/// Snapshot returned from the daemon for `ticktrack info`.
///
/// - `waybar` is the stable JSON contract, flattened to the top level.
/// - `pretty_text` is CLI-facing output.
#[derive(Debug, Clone, Serialize)]
pub struct InfoSnapshot {
    #[serde(flatten)]
    pub waybar: WaybarInfo,

    #[serde(skip_serializing)]
    pub pretty_text: String,

    pub current_ticket: Option<String>,
    pub running: bool,
    pub display_ms: u64,
    pub tickets: Vec<TicketTotal>,
    pub sync_in_flight: bool,
}

/// Waybar JSON contract.
#[derive(Debug, Clone, Serialize)]
pub struct WaybarInfo {
    pub text: String,
    pub alt: String,
    pub class: String,
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketTotal {
    pub ticket: String,
    pub total_ms: u64,
}

impl InfoSnapshot {
    pub fn new(
        current_ticket: Option<String>,
        running: bool,
        display_ms: u64,
        tickets: Vec<TicketTotal>,
        sync_in_flight: bool,
    ) -> Self {
        let text = format_hms(display_ms);

        let alt = if running {
            "running"
        } else if current_ticket.is_some() {
            "stopped"
        } else {
            "idle"
        };

        let tooltip = match &current_ticket {
            Some(t) => format!("{t} ({alt})"),
            None => "No ticket selected".to_string(),
        };

        let mut pretty = String::new();
        pretty.push_str(&format!(
            "Ticket:   {}\n",
            current_ticket.as_deref().unwrap_or("-")
        ));
        pretty.push_str(&format!("Status:   {alt}\n"));
        pretty.push_str(&format!("Elapsed:  {text}\n"));
        pretty.push_str(&format!("Tickets:  {}", tickets.len()));
        if sync_in_flight {
            pretty.push_str("\nSync:     in progress");
        }

        Self {
            waybar: WaybarInfo {
                text,
                alt: alt.to_string(),
                class: alt.to_string(),
                tooltip,
            },
            pretty_text: pretty,
            current_ticket,
            running,
            display_ms,
            tickets,
            sync_in_flight,
        }
    }
}
