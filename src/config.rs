use std::env;
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama2";

/// Plain values read from the environment by the front-end and injected
/// into the core as constructor arguments. The core itself never touches
/// the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub default_model: String,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let base_url =
            env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let default_model =
            env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self {
            base_url,
            default_model,
            data_dir: Self::data_dir(),
        }
    }

    fn data_dir() -> PathBuf {
        let data_home = env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".local/share")
            });
        data_home.join("murmur").join("conversations")
    }
}
