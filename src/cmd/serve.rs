//! The `serve` command: run the stdio query server until the client goes
//! away. All protocol traffic is on stdin/stdout; logs stay on stderr.

use anyhow::Result;

use steward::config::StewardConfig;
use steward::project::ProjectPaths;
use steward::serve::Server;

pub async fn cmd_serve(paths: &ProjectPaths, config: &StewardConfig) -> Result<()> {
    let mut server = Server::new(paths.clone(), config.clone());
    server.run().await
}
