//! plottr server
//!
//! Listens for producer messages, structures them into the in-memory
//! registry and logs every change until Ctrl+C.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plottr::ingest::Ingestor;
use plottr::listener::{Listener, ListenerConfig, DEFAULT_PORT};
use plottr::registry::SharedRegistry;

/// Server configuration
struct Config {
    /// Address to bind to
    addr: SocketAddr,
}

fn parse_args(defaults: SocketAddr) -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config { addr: defaults };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                if i + 1 < args.len() {
                    let host: IpAddr = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("error: invalid host address: {}", args[i + 1]);
                        std::process::exit(1);
                    });
                    config.addr.set_ip(host);
                    i += 2;
                } else {
                    eprintln!("error: --host requires a value");
                    std::process::exit(1);
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    let port: u16 = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("error: invalid port number: {}", args[i + 1]);
                        std::process::exit(1);
                    });
                    config.addr.set_port(port);
                    i += 2;
                } else {
                    eprintln!("error: --port requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                println!("plottr-server - structured dataset receiver");
                println!();
                println!("USAGE:");
                println!("    plottr-server [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("        --host <ADDR>         Interface to bind [default: 127.0.0.1]");
                println!("    -p, --port <PORT>         Port to listen on [default: {DEFAULT_PORT}]");
                println!("    -h, --help                Print help information");
                println!();
                println!("ENVIRONMENT:");
                println!("    PLOTTR_ADDR               Listen address (host:port or port)");
                println!("    RUST_LOG                  Log filter [default: plottr=info]");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    config
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("plottr=info,plottr_server=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Log a summary of every registry change until `running` is cleared.
fn spawn_reporter(registry: &SharedRegistry, running: Arc<AtomicBool>) -> std::io::Result<thread::JoinHandle<()>> {
    let changes = registry.subscribe();
    thread::Builder::new().name("plottr-reporter".to_string()).spawn(move || {
        while running.load(Ordering::Acquire) {
            match changes.recv_timeout(Duration::from_millis(200)) {
                Ok(Some(change)) => {
                    for array in &change.shape {
                        info!(
                            dataset_id = %change.dataset_id,
                            array = %array.name,
                            points = array.points,
                            axes = ?array.axes.iter().map(|a| format!("{}[{}]", a.name, a.len)).collect::<Vec<_>>(),
                            "dataset shape"
                        );
                    }
                }
                Ok(None) => {}
                Err(_) => break,
            }
        }
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut listener_cfg = ListenerConfig::from_env()?;
    let config = parse_args(listener_cfg.addr);
    listener_cfg.addr = config.addr;

    init_logging();
    info!(version = env!("CARGO_PKG_VERSION"), "plottr server starting");

    let registry = SharedRegistry::default();
    let listener = Listener::bind(listener_cfg)?;
    let ingestor = Ingestor::spawn(listener.events(), registry.clone())?;

    let reporting = Arc::new(AtomicBool::new(true));
    let reporter = spawn_reporter(&registry, Arc::clone(&reporting))?;

    let mut handle = listener.start()?;
    info!(addr = %handle.local_addr(), "press Ctrl+C to stop");

    signal::ctrl_c().await?;
    info!("shutting down");

    handle.stop();
    drop(handle);
    let counts = ingestor.join();

    reporting.store(false, Ordering::Release);
    if reporter.join().is_err() {
        warn!("reporter thread panicked");
    }

    let ids = registry.dataset_ids()?;
    info!(
        datasets = ids.len(),
        applied = counts.applied,
        rejected = counts.rejected,
        invalid = counts.decode_failures + counts.missing_identifiers,
        "shut down"
    );
    Ok(())
}
