// Author: Dustin Pilgrim
// License: MIT

pub mod engine;
pub mod error;
pub mod info;
pub mod manager_msg;
pub mod state;
pub mod ticket;
pub mod utils;
