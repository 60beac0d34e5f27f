use std::path::PathBuf;
use std::process;

use tracing::info;
use tracing_subscriber::EnvFilter;

use kiln::common::ServerConfig;
use kiln::server::Server;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = parse_args();

    info!(
        port = config.port,
        workers = config.workers,
        frames = config.frame_count,
        cache_mb = config.frame_count * kiln::common::FRAME_SIZE / 1024 / 1024,
        k = config.k,
        doc_root = %config.doc_root.display(),
        "starting kiln"
    );

    let mut server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("failed to start: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        eprintln!("server exited: {e}");
        process::exit(1);
    }
}

fn parse_args() -> ServerConfig {
    let mut config = ServerConfig::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next().unwrap_or_else(|| {
                eprintln!("{name} requires a value");
                process::exit(2);
            })
        };
        match arg.as_str() {
            "--port" => config.port = parse_or_die(&value("--port"), "--port"),
            "--workers" => config.workers = parse_or_die(&value("--workers"), "--workers"),
            "--frames" => config.frame_count = parse_or_die(&value("--frames"), "--frames"),
            "--k" => config.k = parse_or_die(&value("--k"), "--k"),
            "--root" => config.doc_root = PathBuf::from(value("--root")),
            "--help" | "-h" => {
                println!(
                    "usage: kiln [--port N] [--workers N] [--frames N] [--k N] [--root DIR]"
                );
                process::exit(0);
            }
            other => {
                eprintln!("unknown argument: {other}");
                process::exit(2);
            }
        }
    }

    config
}

fn parse_or_die<T: std::str::FromStr>(value: &str, name: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("invalid value for {name}: {value}");
        process::exit(2);
    })
}
