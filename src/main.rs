use mensura::config::Config;
use mensura::inventory::{Inventory, Resource, ResourceLookup};
use mensura::plugin::{Component, HostComponent};
use mensura::transport::{HttpTransport, LogTransport, Transport};
use mensura::{exposition, Engine, EngineConfig};

use anyhow::{bail, Context};
use backtrace::Backtrace;
use clap::{Arg, Command};
use tracing::{debug, error, info};
use tracing_subscriber::filter::LevelFilter;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

static RUNNING: AtomicBool = AtomicBool::new(true);

fn main() {
    // custom panic hook to terminate whole process after unwinding
    std::panic::set_hook(Box::new(|s| {
        eprintln!("{s}");
        eprintln!("{:?}", Backtrace::new());
        std::process::exit(101);
    }));

    // parse command line options
    let matches = Command::new(env!("CARGO_BIN_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_about(
            "Mensura schedules, collects and delivers measurements from managed resources.",
        )
        .arg(
            Arg::new("CONFIG")
                .help("Agent configuration file")
                .action(clap::ArgAction::Set)
                .required(true)
                .index(1),
        )
        .get_matches();

    // load config from file
    let config = {
        let Some(file) = matches.get_one::<String>("CONFIG") else {
            eprintln!("no configuration file given");
            std::process::exit(1);
        };
        match Config::load(file) {
            Ok(c) => c,
            Err(error) => {
                eprintln!("error loading config file: {file}\n{error}");
                std::process::exit(1);
            }
        }
    };

    // configure logging
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(config.log().level()))
        .with_thread_names(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("failed to bridge log records: {e}");
    }

    if let Err(e) = run(config) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(config: Config) -> anyhow::Result<()> {
    let inventory = Arc::new(Inventory::new());

    for resource in config.resources() {
        let component = component(resource.component())?;

        let mut entry = Resource::new(resource.id(), resource.resource_type(), component)
            .with_category(resource.category());
        if let Some(name) = resource.name() {
            entry = entry.with_name(name);
        }

        debug!("registering resource {} ({})", resource.id(), entry.name);
        inventory.register(entry);
        inventory.store_schedules(resource.id(), &resource.schedule_request().requests, false);
    }

    let transport: Arc<dyn Transport> = match config.general().collector() {
        Some(url) => {
            info!("delivering reports to {url}");
            Arc::new(HttpTransport::new(url, config.sender().timeout())?)
        }
        None => {
            info!("no collector configured, reports will be logged");
            Arc::new(LogTransport)
        }
    };

    let engine = Arc::new(Engine::new(EngineConfig::from(&config), inventory, transport)?);
    engine.start();

    let listen = config.general().listen().map_err(anyhow::Error::msg)?;

    // initialize async runtime for the admin endpoint
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(1)
        .thread_name("mensura-admin")
        .build()
        .context("failed to launch async runtime")?;

    rt.spawn({
        let engine = engine.clone();
        async move {
            if let Err(e) = exposition::serve(listen, engine).await {
                error!("admin endpoint failed: {e}");
            }
        }
    });

    ctrlc::set_handler(move || {
        if RUNNING.load(Ordering::SeqCst) {
            eprintln!("shutting down... please wait...");
            RUNNING.store(false, Ordering::SeqCst);
        } else {
            eprintln!("terminating...");
            std::process::exit(2);
        }
    })
    .context("failed to set ctrl-c handler")?;

    while RUNNING.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    engine.shutdown();
    rt.shutdown_background();

    info!("stopped");

    Ok(())
}

fn component(name: &str) -> anyhow::Result<Component> {
    match name {
        "host" => Ok(HostComponent::default().component()),
        other => bail!("unknown component: {other}"),
    }
}
