// Server configuration.
//
// Defaults cover a checkout run from the repository root. A JSON file passed
// with `--config` can override any subset of fields (missing fields keep
// their defaults), and individual command-line flags override both. Flags are
// matched by hand from `std::env::args()`; there is no clap dependency.

use chordsmith_model::error::{LoadError, read_json_file};
use chordsmith_model::midi::DEFAULT_TEMPO_BPM;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Number of request-handling threads.
    pub workers: usize,
    pub vocabulary_path: PathBuf,
    pub voicings_path: PathBuf,
    /// N-gram model file. A missing or invalid file aborts startup; `None`
    /// (`--uniform`) makes every chord equally likely at every step.
    pub model_path: Option<PathBuf>,
    /// Served under `/static/`; the generated MIDI file is written here.
    pub static_dir: PathBuf,
    /// Built frontend, served for any other GET path.
    pub frontend_dir: PathBuf,
    pub midi_file_name: String,
    pub tempo_bpm: u16,
    /// Upper bound on the `length` a client may request.
    pub max_length: usize,
    /// Fixed RNG seed for reproducible output. Each request still gets a
    /// distinct stream.
    pub rng_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            workers: 4,
            vocabulary_path: "data/vocabulary.json".into(),
            voicings_path: "data/voicings.json".into(),
            model_path: Some("data/transitions.json".into()),
            static_dir: "static".into(),
            frontend_dir: "frontend/build".into(),
            midi_file_name: "chord_progression.mid".into(),
            tempo_bpm: DEFAULT_TEMPO_BPM,
            max_length: 256,
            rng_seed: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{flag} requires {expected}")]
    MissingValue {
        flag: String,
        expected: &'static str,
    },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// What the command line asked for.
#[derive(Debug)]
pub enum CliAction {
    Run(ServerConfig),
    Help,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        read_json_file(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.tempo_bpm == 0 {
            return Err(ConfigError::Invalid("tempo_bpm must be positive".into()));
        }
        if self.max_length == 0 {
            return Err(ConfigError::Invalid("max_length must be at least 1".into()));
        }
        if self.midi_file_name.is_empty()
            || self.midi_file_name.contains(['/', '\\'])
            || self.midi_file_name == ".."
        {
            return Err(ConfigError::Invalid(format!(
                "midi_file_name must be a plain file name, got '{}'",
                self.midi_file_name
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Where the generated MIDI file is written.
    pub fn midi_path(&self) -> PathBuf {
        self.static_dir.join(&self.midi_file_name)
    }

    /// URL the generated MIDI file is served from.
    pub fn midi_url(&self) -> String {
        format!("/static/{}", self.midi_file_name)
    }

    /// Build a configuration from command-line arguments (program name
    /// excluded). `--config` is applied first regardless of its position, then
    /// every other flag overrides it.
    pub fn from_args(args: &[String]) -> Result<CliAction, ConfigError> {
        let mut config = match flag_value(args, "--config")? {
            Some(path) => ServerConfig::load(Path::new(path))?,
            None => ServerConfig::default(),
        };

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--help" | "-h" => return Ok(CliAction::Help),
                "--config" => {
                    i += 1;
                }
                "--host" => {
                    i += 1;
                    config.host = value(args, i, flag, "a host name")?.to_string();
                }
                "--port" => {
                    i += 1;
                    config.port = parse(args, i, flag, "a valid port number")?;
                }
                "--workers" => {
                    i += 1;
                    config.workers = parse(args, i, flag, "a thread count")?;
                }
                "--vocabulary" => {
                    i += 1;
                    config.vocabulary_path = value(args, i, flag, "a path")?.into();
                }
                "--voicings" => {
                    i += 1;
                    config.voicings_path = value(args, i, flag, "a path")?.into();
                }
                "--model" => {
                    i += 1;
                    config.model_path = Some(value(args, i, flag, "a path")?.into());
                }
                "--uniform" => {
                    config.model_path = None;
                }
                "--static-dir" => {
                    i += 1;
                    config.static_dir = value(args, i, flag, "a path")?.into();
                }
                "--frontend-dir" => {
                    i += 1;
                    config.frontend_dir = value(args, i, flag, "a path")?.into();
                }
                "--max-length" => {
                    i += 1;
                    config.max_length = parse(args, i, flag, "a chord count")?;
                }
                "--seed" => {
                    i += 1;
                    config.rng_seed = Some(parse(args, i, flag, "an integer seed")?);
                }
                other => return Err(ConfigError::UnknownArgument(other.to_string())),
            }
            i += 1;
        }

        config.validate()?;
        Ok(CliAction::Run(config))
    }
}

pub fn usage() -> String {
    [
        "Usage: chordsmith [OPTIONS]",
        "",
        "Options:",
        "  --config <PATH>        JSON config file (fields override defaults)",
        "  --host <HOST>          Bind address (default: 127.0.0.1)",
        "  --port <PORT>          Listen port (default: 5000)",
        "  --workers <N>          Request threads (default: 4)",
        "  --vocabulary <PATH>    Chord label list (default: data/vocabulary.json)",
        "  --voicings <PATH>      Chord notes table (default: data/voicings.json)",
        "  --model <PATH>         N-gram model (default: data/transitions.json)",
        "  --uniform              Ignore the model and sample uniformly",
        "  --static-dir <PATH>    Static files and MIDI output (default: static)",
        "  --frontend-dir <PATH>  Built frontend (default: frontend/build)",
        "  --max-length <N>       Longest progression a client may request (default: 256)",
        "  --seed <N>             Fixed RNG seed for reproducible output",
        "  --help, -h             Show this help",
    ]
    .join("\n")
}

fn value<'a>(
    args: &'a [String],
    i: usize,
    flag: &str,
    expected: &'static str,
) -> Result<&'a str, ConfigError> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue {
            flag: flag.to_string(),
            expected,
        })
}

fn parse<T: std::str::FromStr>(
    args: &[String],
    i: usize,
    flag: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value(args, i, flag, expected)?
        .parse()
        .map_err(|_| ConfigError::MissingValue {
            flag: flag.to_string(),
            expected,
        })
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>, ConfigError> {
    match args.iter().position(|a| a == flag) {
        Some(i) => value(args, i + 1, flag, "a path").map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run_config(list: &[&str]) -> ServerConfig {
        match ServerConfig::from_args(&args(list)).unwrap() {
            CliAction::Run(config) => config,
            CliAction::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:5000");
        assert_eq!(config.midi_url(), "/static/chord_progression.mid");
        assert_eq!(config.midi_path(), Path::new("static/chord_progression.mid"));
    }

    #[test]
    fn flags_override_defaults() {
        let config = run_config(&["--port", "8080", "--workers", "2", "--uniform", "--seed", "7"]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.workers, 2);
        assert!(config.model_path.is_none());
        assert_eq!(config.rng_seed, Some(7));
    }

    #[test]
    fn config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chordsmith.json");
        std::fs::write(&path, r#"{"port": 9000, "max_length": 16, "static_dir": "/tmp/out"}"#)
            .unwrap();
        let path_str = path.to_str().unwrap();

        // Flags win over the file even when they come first.
        let config = run_config(&["--port", "9100", "--config", path_str]);
        assert_eq!(config.port, 9100);
        assert_eq!(config.max_length, 16);
        assert_eq!(config.static_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn help_and_errors() {
        assert!(matches!(
            ServerConfig::from_args(&args(&["--help"])).unwrap(),
            CliAction::Help
        ));
        assert!(matches!(
            ServerConfig::from_args(&args(&["--port"])),
            Err(ConfigError::MissingValue { .. })
        ));
        assert!(matches!(
            ServerConfig::from_args(&args(&["--port", "http"])),
            Err(ConfigError::MissingValue { .. })
        ));
        assert!(matches!(
            ServerConfig::from_args(&args(&["--verbose"])),
            Err(ConfigError::UnknownArgument(_))
        ));
        assert!(matches!(
            ServerConfig::from_args(&args(&["--workers", "0"])),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServerConfig::from_args(&args(&["--config", "/no/such/config.json"])),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn midi_file_name_must_stay_in_static_dir() {
        let config = ServerConfig {
            midi_file_name: "../escape.mid".into(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
