// chordsmith_server: HTTP front end for the Chordsmith chord generator.
//
// Serves the chord vocabulary, generates progressions on request, writes each
// result to a MIDI file, and serves that file along with the web frontend.
// All generation logic lives in `chordsmith_model`; this crate is the glue
// between HTTP and a shared, read-only `ModelContext`.
//
// Module overview:
// - `api.rs`:    Request/response bodies, input validation, the
//                repetitiveness remap, and error-to-status mapping.
// - `config.rs`: `ServerConfig` defaults, JSON config file, CLI flags.
// - `loader.rs`: Builds the `ModelContext` from the configured files.
// - `server.rs`: `tiny_http` listener, worker threads, routing, static files.
//
// The server can run as a standalone binary (`main.rs`) or be embedded via
// the library API (`start_server`).

pub mod api;
pub mod config;
pub mod loader;
pub mod server;

pub use server::start_server;
