//! `askgate gateway` — Start the HTTP API server.

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("askgate gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Backend:   {} ({})", config.completion.backend, config.completion.model);
    println!("   History:   {} (retention {} days)", config.memory.backend, config.memory.retention_days);

    askgate_gateway::start(config).await?;

    Ok(())
}
