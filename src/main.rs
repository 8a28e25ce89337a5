use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use kindling::host::{IdleScheduler, PluginDescriptor, TokioIdleScheduler, TypeRegistry};
use kindling::{LoaderConfig, LuaPluginLoader};

/// Kindling - load a Lua plugin and call one of its extensions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Directory containing the plugin module
    #[arg(long)]
    module_dir: PathBuf,

    /// Module to import from the plugin directory
    #[arg(short, long)]
    module: String,

    /// Interface the extension must implement
    #[arg(short, long, default_value = "Greeter")]
    interface: String,

    /// Methods declared by the interface; the first one is called
    #[arg(long, value_delimiter = ',', default_value = "greet")]
    methods: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging to stderr so stdout only carries the result
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    // Load configuration
    let config = if let Some(config_path) = args.config {
        LoaderConfig::load_from_file(&config_path)?
    } else {
        LoaderConfig::load_default()?
    };

    let host = Arc::new(TypeRegistry::new());
    let method_names: Vec<&str> = args.methods.iter().map(String::as_str).collect();
    let interface = host
        .register_interface(&args.interface, &method_names)
        .context("Failed to register interface")?;

    let scheduler: Arc<dyn IdleScheduler> = Arc::new(TokioIdleScheduler::current());
    let loader = Arc::new(LuaPluginLoader::new(config, Arc::clone(&host), scheduler));
    loader.initialize().context("Failed to initialize the Lua plugin loader")?;

    let plugin = PluginDescriptor::new(args.module.clone(), &args.module_dir, args.module.clone());
    let Some(method) = args.methods.first().cloned() else {
        bail!("no interface methods given");
    };

    // Calls into Lua may block on the execution lock; keep them off the async workers.
    let worker = Arc::clone(&loader);
    let reply = tokio::task::spawn_blocking(move || -> Result<serde_json::Value> {
        worker.load(&plugin).context("Failed to load plugin")?;
        let extension = worker
            .create_extension(&plugin, interface, &[])
            .context("Failed to create extension")?;
        info!(extension = %extension.id(), plugin = %plugin, "created extension");

        let reply = extension.call(&method, &[]).context("Extension call failed")?;
        drop(extension);
        worker.unload(&plugin);
        worker.garbage_collect();
        Ok(reply)
    })
    .await
    .context("Plugin worker panicked")??;

    println!("{reply}");

    let loader = Arc::try_unwrap(loader)
        .map_err(|_| anyhow::anyhow!("loader is still shared"))?;
    tokio::task::spawn_blocking(move || loader.finalize())
        .await
        .context("Finalizing the loader panicked")?;

    Ok(())
}
