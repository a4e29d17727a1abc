// CLI entry point for the Chordsmith server.
//
// Loads the chord vocabulary, voicings, and predictor, then serves the HTTP
// API until the process is killed. See `config.rs` for the flags and
// `server.rs` for the routes.
//
// Usage:
//   chordsmith [--config PATH] [--port PORT] [--host HOST] [--model PATH] ...
//
// Logging goes through `env_logger`; set `RUST_LOG=debug` to see every request.

use chordsmith_server::config::{CliAction, ServerConfig, usage};
use chordsmith_server::loader::load_model_context;
use chordsmith_server::start_server;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match ServerConfig::from_args(&args) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            println!("{}", usage());
            return;
        }
        Err(e) => {
            eprintln!("{e}");
            eprintln!();
            eprintln!("{}", usage());
            std::process::exit(1);
        }
    };

    let context = match load_model_context(&config) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Failed to load model: {e}");
            std::process::exit(1);
        }
    };

    let (handle, addr) = match start_server(config, context) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start server: {e}");
            std::process::exit(1);
        }
    };

    log::info!("Listening on http://{addr}");
    handle.wait();
}
