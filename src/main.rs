use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use routekit::{
    HttpHandler, app,
    config::{ServerConfig, ServerConfigValidator, load_config},
    tracing_setup,
    utils::GracefulShutdown,
};
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "routekit.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "routekit.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "routekit.yaml")]
        config: String,
    },
    /// Start the server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "routekit.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve_command(&config).await,
        None => serve_command(&args.config).await,
    }
}

async fn serve_command(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    ServerConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration in {config_path}: {e}"))?;

    tracing_setup::init_from_config(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    tracing::info!("Loaded configuration from {config_path}");

    let server = Arc::new(app::build_server(&config).context("Failed to build router")?);
    app::log_server_events(&server);

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", config.listen_addr))?;

    let shutdown = Arc::new(GracefulShutdown::new());
    let handler = Arc::new(HttpHandler::new(server.clone()).with_max_body_bytes(config.max_body_bytes));
    let serving = tokio::spawn(handler.serve(listener, shutdown.token()));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = shutdown.run_signal_handler().await {
                tracing::error!("Signal handler failed: {:?}", e);
                shutdown.trigger_shutdown(routekit::utils::ShutdownReason::Manual);
            }
        });
    }

    shutdown.token().cancelled().await;
    tracing::info!("Shutting down, waiting for in-flight requests");

    if let Err(e) = shutdown.drain(serving).await {
        server.fail(e.to_string());
        return Err(e);
    }

    tracing::info!("routekit stopped");
    Ok(())
}

/// Validate configuration file
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config: ServerConfig = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:?}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Static Mounts: {}", config.static_files.len());
            println!("   • CORS: {}", config.cors.is_some());
            println!("   • Basic Auth: {}", config.basic_auth.is_some());
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '127.0.0.1:3000')");
            println!("   • Start every static prefix with '/'");
            println!("   • List explicit CORS origins instead of '*'");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# routekit configuration

# The address to listen on
listen_addr: "127.0.0.1:3000"

# Limits applied to request targets before routing
limits:
  max_url_len: 4096
  max_path_len: 1024
  max_query_keys: 100

# Directories served below URL prefixes, checked in order
static_files:
  - prefix: "/"
    root: "./public"
    index_file: "index.html"

security_headers: true

# headers:
#   X-Served-By: routekit

# cors:
#   origins: ["https://app.example.com"]

# basic_auth:
#   username: admin
#   password: change-me
#   realm: routekit

logging:
  level: info
  json: true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'routekit serve --config {config_path}' to start the server");
    Ok(())
}
