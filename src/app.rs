use crate::{
    collector::SysinfoProcessTable,
    config::{AgentConfig, ConfigOverrides},
    local_logger::{PROCWATCH_U8_COLOR_CODE, init_local_logger},
    prelude::*,
    scheduler::Agent,
    system::system_hostname,
};
use clap::{
    Parser,
    builder::{Styles, styling},
};

fn create_styles() -> Styles {
    styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(
            styling::Ansi256Color(PROCWATCH_U8_COLOR_CODE).on_default() | styling::Effects::BOLD,
        )
        .placeholder(styling::AnsiColor::Cyan.on_default())
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Report the processes running on this host to a procwatch store",
    styles = create_styles()
)]
pub struct Cli {
    /// Run a single collection cycle and exit, with a non-zero status if it failed
    #[arg(long)]
    pub once: bool,

    /// Path of the configuration file
    /// Defaults to ~/.config/procwatch/agent.yaml
    #[arg(long, env = "PROCWATCH_CONFIG")]
    pub config: Option<String>,

    /// Ingestion endpoint of the store, overrides `backend.url`
    #[arg(long, env = "PROCWATCH_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Overrides `backend.api-key`
    #[arg(long, env = "PROCWATCH_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Hostname to report, overrides `hostname`
    #[arg(long, env = "PROCWATCH_HOSTNAME")]
    pub hostname: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            backend_url: self.backend_url.clone(),
            api_key: self.api_key.clone(),
            hostname: self.hostname.clone(),
        }
    }
}

/// Resolves when the process is asked to stop
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_local_logger()?;

    let config = AgentConfig::load_with_override(cli.config.as_deref(), &cli.overrides())?;
    let hostname = match &config.hostname {
        Some(hostname) => hostname.trim().to_string(),
        None => system_hostname()?,
    };
    info!("Agent initialized for host: {hostname}");
    debug!("Backend: {}", config.backend.url);

    let table = SysinfoProcessTable::new(config.collection.collect_command_line);
    let mut agent = Agent::new(config, hostname, table)?;

    if cli.once {
        if !agent.run_once().await {
            bail!("Collection cycle failed");
        }
        return Ok(());
    }

    agent.run_continuous(shutdown_signal()).await;
    Ok(())
}
