//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::time::Duration;

use url::Url;

use crate::constants::{DEFAULT_GEMINI_API_BASE, DEFAULT_GEMINI_MODEL};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "THEMEBOOTH_DEBUG")]
    /// Enable debug logging. Env: THEMEBOOTH_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "THEMEBOOTH_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: THEMEBOOTH_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "THEMEBOOTH_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: THEMEBOOTH_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(
        long,
        short,
        default_value = "themebooth.sqlite",
        env = "THEMEBOOTH_DATABASE_PATH"
    )]
    /// Path to the database file, eg `/data/themebooth.sqlite`.
    /// Env: THEMEBOOTH_DATABASE_PATH
    pub database_path: String,

    #[clap(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    /// Gemini API key. Required unless `--offline` is set.
    /// Env: GEMINI_API_KEY
    pub gemini_api_key: Option<String>,
    #[clap(long, default_value = DEFAULT_GEMINI_MODEL, env = "THEMEBOOTH_GEMINI_MODEL")]
    /// Image-capable model to call.
    /// Env: THEMEBOOTH_GEMINI_MODEL
    pub gemini_model: String,
    #[clap(long, default_value = DEFAULT_GEMINI_API_BASE, env = "THEMEBOOTH_GEMINI_API_BASE")]
    /// API root the model path is appended to.
    /// Env: THEMEBOOTH_GEMINI_API_BASE
    pub gemini_api_base: Url,
    #[clap(long, default_value = "120", env = "THEMEBOOTH_GENERATION_TIMEOUT")]
    /// Seconds before a single generation call is abandoned.
    /// Env: THEMEBOOTH_GENERATION_TIMEOUT
    pub generation_timeout: u64,

    #[clap(long, env = "THEMEBOOTH_OFFLINE")]
    /// Echo the uploaded photo back instead of calling Gemini.
    /// Env: THEMEBOOTH_OFFLINE
    pub offline: bool,

    #[clap(long, default_value = "10", env = "THEMEBOOTH_MAX_UPLOAD_MB")]
    /// Largest accepted request body, in megabytes.
    /// Env: THEMEBOOTH_MAX_UPLOAD_MB
    pub max_upload_mb: usize,
}

impl CliOptions {
    /// Generation timeout as a [`Duration`].
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout)
    }

    /// Upload limit in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
