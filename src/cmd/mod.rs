//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled                      |
//! |----------|---------------------------------------|
//! | `serve`  | `Serve`                               |
//! | `board`  | `Board`, `Show`, `Watch`, `Recent`    |
//! | `config` | `Config`                              |

pub mod board;
pub mod config;
pub mod serve;

pub use board::{cmd_board, cmd_recent, cmd_show, cmd_watch};
pub use config::cmd_config;
pub use serve::cmd_serve;
