//! HTTP server command: `issueboard serve`.

use anyhow::Result;

use issueboard::board::server::{ServerConfig, start_server};
use issueboard::config::BoardConfig;

pub async fn cmd_serve(config: &BoardConfig, port: Option<u16>, dev: bool) -> Result<()> {
    let server = ServerConfig::from_board_config(config, port, dev);
    start_server(config, server).await
}
