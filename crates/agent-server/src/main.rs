use clap::Parser;
use std::io;
use std::path::PathBuf;

use agent_server::logging::init_logging;
use agent_server::run_server;
use chat_core::Config;

#[derive(Parser, Debug, Clone)]
#[command(name = "branchchat-server")]
#[command(about = "Branching chat HTTP/SSE server")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, env = "BRANCHCHAT_DEBUG")]
    debug: bool,

    /// Server port
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Model id
    #[arg(long, env = "MODEL")]
    model: Option<String>,

    /// Directory for conversations and event logs
    #[arg(long, env = "BRANCHCHAT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Provider turns allowed per request
    #[arg(long, env = "MAX_ITERATIONS")]
    max_iterations: Option<u32>,

    /// System prompt sent before the conversation
    #[arg(long, env = "SYSTEM_PROMPT")]
    system_prompt: Option<String>,
}

impl Cli {
    fn apply(self, mut config: Config) -> Config {
        config.debug |= self.debug;
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = Some(data_dir);
        }
        if let Some(max_iterations) = self.max_iterations.filter(|n| *n > 0) {
            config.max_iterations = max_iterations;
        }
        if let Some(system_prompt) = self.system_prompt {
            config.system_prompt = Some(system_prompt);
        }
        config
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();
    let config = cli.apply(Config::new());
    init_logging(config.debug);

    log::info!("Model: {}", config.model);
    log::info!("Data directory: {:?}", config.data_dir());
    log::debug!("Max iterations: {}", config.max_iterations);

    run_server(config).await
}
