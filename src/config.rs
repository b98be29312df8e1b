use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Hosted function serving both the credential and the chat routes
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub function_url: String,
    #[serde(default = "default_auth_route")]
    pub auth_route: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_listen_url")]
    pub listen_url: String,
    #[serde(default = "default_speak_url")]
    pub speak_url: String,
    #[serde(default = "default_stt_model")]
    pub stt_model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_true")]
    pub smart_format: bool,
    #[serde(default = "default_true")]
    pub sentiment: bool,
    #[serde(default = "default_true")]
    pub punctuate: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            listen_url: default_listen_url(),
            speak_url: default_speak_url(),
            stt_model: default_stt_model(),
            voice: default_voice(),
            smart_format: true,
            sentiment: true,
            punctuate: true,
        }
    }
}

/// Where synthesized replies are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Write each reply as a WAV file and hold it for its duration
    File,
    /// Play through the default output device
    Speaker,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_chunk_interval_ms")]
    pub chunk_interval_ms: u64,
    #[serde(default = "default_output")]
    pub output: OutputKind,
    #[serde(default = "default_playback_dir")]
    pub playback_dir: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            chunk_interval_ms: default_chunk_interval_ms(),
            output: default_output(),
            playback_dir: default_playback_dir(),
        }
    }
}

fn default_auth_route() -> String {
    "auth".to_string()
}

fn default_listen_url() -> String {
    "wss://api.deepgram.com/v1/listen".to_string()
}

fn default_speak_url() -> String {
    "https://api.deepgram.com/v1/speak".to_string()
}

fn default_stt_model() -> String {
    "nova-2".to_string()
}

fn default_voice() -> String {
    "aura-asteria-en".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_sample_rate() -> u32 {
    16000
}

const fn default_channels() -> u16 {
    1
}

const fn default_chunk_interval_ms() -> u64 {
    250
}

const fn default_output() -> OutputKind {
    OutputKind::File
}

fn default_playback_dir() -> PathBuf {
    PathBuf::from("replies")
}

impl Config {
    /// Load from a config file, overridden by `TALKBACK__SECTION__KEY` variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("TALKBACK").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {path}"))?;

        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize config")?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Reject values the capture pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.audio.chunk_interval_ms > 0,
            "audio.chunk_interval_ms must be greater than zero"
        );
        ensure!(
            self.audio.sample_rate > 0,
            "audio.sample_rate must be greater than zero"
        );
        ensure!(
            self.audio.channels > 0,
            "audio.channels must be greater than zero"
        );
        Ok(())
    }
}
