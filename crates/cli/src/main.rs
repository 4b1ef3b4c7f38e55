use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "estagiario")]
#[command(about = "Discord bot that answers prefixed messages with a local Ollama model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Connect to Discord and relay prefixed messages to Ollama until Ctrl+C.
    Run {
        /// Config file path (default: ESTAGIARIO_CONFIG_PATH or ~/.estagiario/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Ollama model (overrides OLLAMA_MODEL_NAME and the config file)
        #[arg(long, short)]
        model: Option<String>,

        /// Ollama base URL (overrides OLLAMA_BASE_URL and the config file)
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,

        /// Command prefix, used verbatim (overrides BOT_PREFIX and the config file)
        #[arg(long)]
        prefix: Option<String>,
    },

    /// List the models installed in Ollama.
    Models {
        /// Config file path (default: ESTAGIARIO_CONFIG_PATH or ~/.estagiario/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Ollama base URL (overrides OLLAMA_BASE_URL and the config file)
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenv::dotenv() {
        if !e.not_found() {
            eprintln!("failed to load .env: {}", e);
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("estagiario {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run {
            config,
            model,
            base_url,
            prefix,
        }) => {
            if let Err(e) = run(config, model, base_url, prefix).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Models { config, base_url }) => {
            if let Err(e) = run_models(config, base_url).await {
                log::error!("listing models failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run(
    config_path: Option<std::path::PathBuf>,
    model: Option<String>,
    base_url: Option<String>,
    prefix: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    config.overrides = lib::config::Overrides {
        model,
        base_url,
        prefix,
    };
    lib::bot::run_bot(config, &path).await
}

async fn run_models(
    config_path: Option<std::path::PathBuf>,
    base_url: Option<String>,
) -> anyhow::Result<()> {
    let (mut config, _) = lib::config::load_config(config_path)?;
    config.overrides.base_url = base_url;
    let client = lib::llm::OllamaClient::new(Some(lib::config::resolve_base_url(&config)));
    let models = client.list_models().await?;
    if models.is_empty() {
        println!("no models installed at {}", client.base_url());
    }
    for m in models {
        match m.size {
            Some(size) => println!("{}\t{:.1} GB", m.name, size as f64 / 1e9),
            None => println!("{}", m.name),
        }
    }
    Ok(())
}
