use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cleankiln",
    version,
    about = "Telemetry gateway for air-quality and irrigation sensors"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the WebSocket + REST gateway
    Serve(GatewayOpts),
    Config(ConfigOpts),
    Version,
}

#[derive(clap::Args, Default)]
pub struct GatewayOpts {
    #[arg(short, long, env = "CLEANKILN_CONFIG")]
    pub config: Option<String>,
    #[arg(short, long)]
    pub port: Option<u16>,
    /// loopback, lan or custom
    #[arg(short, long)]
    pub bind: Option<String>,
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    #[arg(short, long, env = "CLEANKILN_CONFIG")]
    pub config: Option<String>,
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Validate,
    Init,
}
