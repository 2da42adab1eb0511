use clap::Parser;
use cleankiln::cli::{Cli, Commands, ConfigAction};
use cleankiln::config::{validate_config, validate_config_object, Config};
use cleankiln::gateway::GatewayServer;
use cleankiln::logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(opts) => {
            info!("Starting CleanKiln gateway server");
            let config = Config::load(opts.config.as_deref())?;
            validate_config_object(&config)?;
            let server = GatewayServer::start(config, opts).await?;
            server.run_until_shutdown().await?;
        }
        Commands::Config(opts) => match opts.action {
            ConfigAction::Show => {
                let config = Config::load(opts.config.as_deref())?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Validate => {
                let config = Config::load(opts.config.as_deref())?;
                let errors = validate_config(&config);
                if errors.is_empty() {
                    info!("Configuration is valid");
                } else {
                    for e in &errors {
                        error!("{}", e);
                    }
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
            }
            ConfigAction::Init => {
                let path = opts.config.as_deref().unwrap_or("cleankiln.json");
                Config::write_default(path)?;
                info!("Configuration file created at {}", path);
            }
        },
        Commands::Version => {
            println!("cleankiln {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
