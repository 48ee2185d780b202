//! Serve command - run the HTTP endpoints.

use anyhow::Result;

use fragments_server::{FragmentsServer, ServerConfig};

use crate::config::ConfigFile;

pub async fn run(config: &ConfigFile, port: Option<u16>) -> Result<()> {
    let compiler = config.compiler()?;

    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: port.unwrap_or(config.server.port),
        content_dir: config.content.dir.clone(),
        prewarm_concurrency: config.content.concurrency,
    };

    println!(
        "Serving on http://{}:{}",
        server_config.host, server_config.port
    );

    FragmentsServer::new(server_config, compiler).start().await?;
    Ok(())
}
