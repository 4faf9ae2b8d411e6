use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::trace;

use crate::tags::TagSet;

/// Where collected points go
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    /// JSON lines on stdout
    #[default]
    Print,

    /// Batched JSON POSTs to an OpenTSDB-compatible `/api/put`
    Http {
        url: String,

        #[serde(default = "default_batch_size")]
        batch_size: usize,

        #[serde(default = "default_flush_secs")]
        flush_secs: u64,
    },
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_secs() -> u64 {
    5
}

/// Local push listener
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_listener_addr")]
    pub addr: SocketAddr,
}

fn default_listener_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4242))
}

/// Tag rewrite applied to every collector whose name matches `collector_expr`
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct TagOverrideConfig {
    pub collector_expr: String,

    /// Tag key -> regex with named capture groups
    #[serde(default)]
    pub matched_tags: BTreeMap<String, String>,

    /// Static overlay; an empty value deletes the tag
    #[serde(default)]
    pub tags: TagSet,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub hostname: Option<String>,

    /// Keep the domain part of the hostname
    #[serde(default)]
    pub full_host: bool,

    /// Tags added under every point
    #[serde(default)]
    pub default_tags: TagSet,

    /// Default collection interval in seconds
    #[serde(default = "default_freq")]
    pub freq: u64,

    /// Turn off `scollector.collector.*` self-monitoring
    #[serde(default)]
    pub disable_self: bool,

    /// Collector name substrings; empty runs everything
    #[serde(default)]
    pub filter: Vec<String>,

    #[serde(default)]
    pub tag_override: Vec<TagOverrideConfig>,

    pub listener: Option<ListenerConfig>,

    #[serde(default)]
    pub sink: SinkConfig,

    /// Bound of the shared output channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: None,
            full_host: false,
            default_tags: TagSet::new(),
            freq: default_freq(),
            disable_self: false,
            filter: vec![],
            tag_override: vec![],
            listener: None,
            sink: SinkConfig::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    pub fn freq(&self) -> Duration {
        Duration::from_secs(self.freq.max(1))
    }
}

fn default_freq() -> u64 {
    15
}

fn default_channel_capacity() -> usize {
    1000
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
