// Author: Dustin Pilgrim
// License: MIT

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ticktrack",
    version = env!("CARGO_PKG_VERSION"),
    about = "Ticket stopwatch daemon with Jira sync"
)]
pub struct Args {
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(short, long, action)]
    pub verbose: bool,

    /// Override the state file location
    #[arg(long, value_name = "FILE")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    #[command(about = "Select the ticket to time")]
    Select { ticket: String },

    #[command(about = "Clear the selection (stops a running timer)")]
    Clear,

    #[command(about = "Start the stopwatch on the selected ticket")]
    Start,

    #[command(about = "Stop the stopwatch and log the session")]
    Stop,

    #[command(about = "Zero the selected ticket's time")]
    Reset,

    #[command(about = "Add a ticket (e.g. ABC-123) and select it")]
    Add {
        #[arg(required = true, num_args = 1..)]
        ticket: Vec<String>,
    },

    #[command(about = "Replace the whole ticket list")]
    Replace {
        #[arg(num_args = 0..)]
        tickets: Vec<String>,
    },

    #[command(about = "Display current timer information")]
    Info {
        #[arg(long)]
        json: bool,
    },

    #[command(about = "List tickets with their totals")]
    Tickets,

    #[command(about = "Show recent sessions")]
    Sessions {
        #[arg(short = 'n', long = "count", value_name = "N")]
        count: Option<usize>,
    },

    #[command(about = "Fetch in-progress tickets from Jira and replace the list")]
    Sync,

    #[command(about = "Check the Jira credentials")]
    TestConnection,

    #[command(about = "Stop the running daemon")]
    Quit,
}

impl Command {
    /// The IPC request line for this command.
    pub fn request_line(&self) -> String {
        match self {
            Command::Select { ticket } => format!("select {ticket}"),
            Command::Clear => "select none".to_string(),
            Command::Start => "start".to_string(),
            Command::Stop => "stop".to_string(),
            Command::Reset => "reset".to_string(),
            Command::Add { ticket } => format!("add {}", ticket.join(" ")),
            Command::Replace { tickets } => {
                let mut line = String::from("replace");
                for t in tickets {
                    line.push(' ');
                    line.push_str(t);
                }
                line
            }
            Command::Info { json: true } => "info --json".to_string(),
            Command::Info { json: false } => "info".to_string(),
            Command::Tickets => "tickets".to_string(),
            Command::Sessions { count: Some(n) } => format!("sessions {n}"),
            Command::Sessions { count: None } => "sessions".to_string(),
            Command::Sync => "sync".to_string(),
            Command::TestConnection => "test-connection".to_string(),
            Command::Quit => "quit".to_string(),
        }
    }

    /// Whether the reply waits on the tracker.
    pub fn talks_to_tracker(&self) -> bool {
        matches!(self, Command::Sync | Command::TestConnection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manager_msg::Request;
    use crate::ipc::router::parse_request;

    fn command(argv: &[&str]) -> Command {
        let mut full = vec!["ticktrack"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap().command.unwrap()
    }

    #[test]
    fn no_subcommand_means_daemon() {
        let args = Args::try_parse_from(["ticktrack", "-v", "--data", "/tmp/s.json"]).unwrap();
        assert!(args.command.is_none());
        assert!(args.verbose);
        assert_eq!(args.data, Some(PathBuf::from("/tmp/s.json")));
    }

    #[test]
    fn request_lines_parse_back_on_the_daemon_side() {
        let cases = [
            (vec!["select", "abc-1"], Request::Select(Some("abc-1".into()))),
            (vec!["clear"], Request::Select(None)),
            (vec!["add", "abc-9"], Request::Add("abc-9".into())),
            (
                vec!["replace", "A-1", "A-2"],
                Request::Replace(vec!["A-1".into(), "A-2".into()]),
            ),
            (vec!["info", "--json"], Request::Info { json: true }),
            (vec!["sessions", "-n", "3"], Request::Sessions(Some(3))),
            (vec!["test-connection"], Request::TestConnection),
            (vec!["quit"], Request::Quit),
        ];

        for (argv, expected) in cases {
            let line = command(&argv).request_line();
            assert_eq!(parse_request(&line), Ok(expected), "argv={argv:?}");
        }
    }

    #[test]
    fn add_requires_a_ticket() {
        assert!(Args::try_parse_from(["ticktrack", "add"]).is_err());
    }

    #[test]
    fn tracker_commands_are_flagged() {
        assert!(command(&["sync"]).talks_to_tracker());
        assert!(!command(&["start"]).talks_to_tracker());
    }
}
