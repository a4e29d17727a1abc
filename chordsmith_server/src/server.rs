// HTTP server and request routing.
//
// Architecture: a `tiny_http::Server` shared by a fixed pool of worker
// threads. Each worker loops on `recv_timeout`, handles one request to
// completion, and checks the `keep_running` flag between requests. Requests
// are independent: every one gets its own RNG and its own sequence, and the
// only shared state is the read-only `ModelContext` plus a mutex around the
// single MIDI output file, so two requests never interleave writes to it.
//
// Routes:
// - `GET /chords`: the full vocabulary.
// - `POST /generate`: generate a progression and (re)write the MIDI file.
// - `GET /`: `index.html` from the static directory.
// - `GET /static/...`: files from the static directory (including the MIDI).
// - any other `GET`: files from the built frontend.
// - `OPTIONS` anything: CORS preflight.
//
// Every response carries `Access-Control-Allow-Origin: *`.
//
// Shutdown: `ServerHandle::stop` clears the flag, unblocks the listener, and
// joins the workers.

use std::fs::File;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chordsmith_model::{ModelContext, ModelError, RenderedChord, midi};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, ResponseBox, Server};

use crate::api::{ApiError, ChordsResponse, GenerateRequest, GenerateResponse};
use crate::config::ServerConfig;

/// How long a worker waits for a request before rechecking `keep_running`.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Request bodies beyond this are truncated and will fail to parse.
const MAX_BODY_BYTES: u64 = 64 * 1024;

const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// State shared by all worker threads.
struct AppState {
    config: ServerConfig,
    context: ModelContext,
    /// Held while the MIDI file is being written.
    midi_lock: Mutex<()>,
    /// Mixed into the configured seed so each request gets its own stream.
    request_counter: AtomicU64,
}

impl AppState {
    fn request_rng(&self) -> StdRng {
        match self.config.rng_seed {
            Some(seed) => {
                let n = self.request_counter.fetch_add(1, Ordering::Relaxed);
                StdRng::seed_from_u64(seed.wrapping_add(n))
            }
            None => StdRng::from_os_rng(),
        }
    }

    fn write_midi(&self, chords: &[RenderedChord]) -> Result<(), ModelError> {
        let path = self.config.midi_path();
        let _guard = self
            .midi_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::fs::create_dir_all(&self.config.static_dir).map_err(|source| {
            ModelError::ArtifactWriteFailure {
                path: path.clone(),
                source,
            }
        })?;
        midi::write_midi(chords, self.config.tempo_bpm, &path)
    }
}

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    server: Arc<Server>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Signal the workers to stop and wait for them to finish.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        for _ in &self.workers {
            self.server.unblock();
        }
        for worker in self.workers {
            let _ = worker.join();
        }
    }

    /// Block until every worker exits.
    pub fn wait(self) {
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

/// Bind the listener and start the worker pool. Returns a handle for stopping
/// the server and the actual bound address (useful when port 0 is used to let
/// the OS pick a free port).
pub fn start_server(
    config: ServerConfig,
    context: ModelContext,
) -> io::Result<(ServerHandle, SocketAddr)> {
    let server = Server::http(config.bind_addr()).map_err(io::Error::other)?;
    let addr = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| io::Error::other("listener is not bound to an IP address"))?;
    let server = Arc::new(server);
    let keep_running = Arc::new(AtomicBool::new(true));

    let worker_count = config.workers.max(1);
    let state = Arc::new(AppState {
        config,
        context,
        midi_lock: Mutex::new(()),
        request_counter: AtomicU64::new(0),
    });

    let mut workers = Vec::with_capacity(worker_count);
    for i in 0..worker_count {
        let server = server.clone();
        let state = state.clone();
        let keep_running = keep_running.clone();
        let worker = thread::Builder::new()
            .name(format!("http-worker-{i}"))
            .spawn(move || worker_loop(&server, &state, &keep_running))?;
        workers.push(worker);
    }

    Ok((
        ServerHandle {
            keep_running,
            server,
            workers,
        },
        addr,
    ))
}

fn worker_loop(server: &Server, state: &AppState, keep_running: &AtomicBool) {
    while keep_running.load(Ordering::SeqCst) {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => handle_request(state, request),
            Ok(None) => {}
            Err(e) => {
                log::error!("Listener failed: {e}");
                break;
            }
        }
    }
}

fn handle_request(state: &AppState, mut request: Request) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let path = url.split_once('?').map_or(url.as_str(), |(path, _)| path);

    let response = route(state, &method, path, &mut request).unwrap_or_else(|err| {
        let status = err.status_code();
        if status >= 500 {
            log::error!("{method} {path}: {err}");
        } else {
            log::info!("{method} {path}: {err}");
        }
        json_response(status, &err.to_response_body())
    });
    let response = with_headers(response, &CORS_HEADERS);

    log::debug!("{method} {path} -> {}", response.status_code().0);
    if let Err(e) = request.respond(response) {
        log::debug!("Failed to send response for {method} {path}: {e}");
    }
}

fn route(
    state: &AppState,
    method: &Method,
    path: &str,
    request: &mut Request,
) -> Result<ResponseBox, ApiError> {
    match (method, path) {
        (Method::Options, _) => Ok(Response::empty(204u16).boxed()),
        (Method::Get, "/chords") => Ok(json_response(
            200,
            &ChordsResponse {
                all_chords: state.context.vocabulary().labels().to_vec(),
            },
        )),
        (Method::Post, "/generate") => {
            let body = read_body(request)?;
            handle_generate(state, &body)
        }
        (_, "/chords" | "/generate") => Err(ApiError::MethodNotAllowed),
        (Method::Get, "/") => serve_file(&state.config.static_dir, "index.html"),
        (Method::Get, _) => match path.strip_prefix("/static/") {
            Some(rest) => serve_file(&state.config.static_dir, rest),
            None => serve_file(&state.config.frontend_dir, path),
        },
        _ => Err(ApiError::MethodNotAllowed),
    }
}

fn read_body(request: &mut Request) -> Result<Vec<u8>, ApiError> {
    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_BODY_BYTES)
        .read_to_end(&mut body)
        .map_err(ApiError::UnreadableBody)?;
    Ok(body)
}

fn handle_generate(state: &AppState, body: &[u8]) -> Result<ResponseBox, ApiError> {
    let request: GenerateRequest = serde_json::from_slice(body)?;
    let (seed, params) = request.into_generation(state.config.max_length)?;

    let mut rng = state.request_rng();
    let chords = state.context.generate_progression(seed.as_slice(), &params, &mut rng)?;
    log::info!(
        "Generated {} chords from {} seed chords (temperature {}, repetitiveness {})",
        chords.len(),
        seed.len(),
        params.temperature,
        params.repetitiveness
    );

    // The progression is still worth returning if the MIDI file is not.
    let midi_url = match state.write_midi(&chords) {
        Ok(()) => Some(state.config.midi_url()),
        Err(e) => {
            log::error!("{e}");
            None
        }
    };

    Ok(json_response(200, &GenerateResponse::new(&chords, midi_url)))
}

/// Serve `relative` from under `root`. Components are percent-decoded before
/// checking, and any `..` component is refused.
fn serve_file(root: &Path, relative: &str) -> Result<ResponseBox, ApiError> {
    let not_found = || ApiError::NotFound(relative.to_string());
    let mut path = PathBuf::from(root);
    for raw in relative.split('/') {
        let component = percent_decode(raw).ok_or_else(not_found)?;
        match component.as_str() {
            "" | "." => {}
            ".." => return Err(not_found()),
            c if c.contains(['/', '\\', '\0']) => return Err(not_found()),
            c => path.push(c),
        }
    }
    if path.is_dir() {
        path.push("index.html");
    }

    let file = File::open(&path).map_err(|_| not_found())?;
    let response = Response::from_file(file).boxed();
    Ok(with_headers(response, &[("Content-Type", content_type(&path))]))
}

/// Decode `%XX` escapes in one URL path component. `None` for a malformed
/// escape or a result that is not UTF-8.
fn percent_decode(component: &str) -> Option<String> {
    let bytes = component.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = component.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("mid" | "midi") => "audio/midi",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn json_response<T: Serialize>(status: u16, body: &T) -> ResponseBox {
    let (status, bytes) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(e) => {
            log::error!("Failed to serialize response: {e}");
            (500, br#"{"error":"internal error"}"#.to_vec())
        }
    };
    let response = Response::from_data(bytes).with_status_code(status).boxed();
    with_headers(response, &[("Content-Type", "application/json")])
}

fn with_headers(mut response: ResponseBox, headers: &[(&str, &str)]) -> ResponseBox {
    for (name, value) in headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => response.add_header(header),
            Err(()) => log::warn!("Skipping malformed header {name}: {value}"),
        }
    }
    response
}
