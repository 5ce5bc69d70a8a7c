//! Target selection and stub settings parsed from the protoc parameter string
//!
//! The parameter is a comma-separated token list such as
//! `client_csharp,server_ts,max_message_size=32768`. Unknown tokens are
//! ignored so that one `protoc` invocation can share a parameter string
//! between plugins.

use bridgerpc_core::{ChannelConfig, protocol};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Which side of a call a stub implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }

    /// Suffix appended to the service name in class and file names
    pub fn suffix(&self) -> &'static str {
        match self {
            Role::Client => "Client",
            Role::Server => "Base",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "client" => Some(Role::Client),
            "server" => Some(Role::Server),
            _ => None,
        }
    }
}

/// Language a stub is generated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    CSharp,
    JavaScript,
    TypeScript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::CSharp => "csharp",
            Language::JavaScript => "js",
            Language::TypeScript => "ts",
        }
    }

    /// Accepted spellings, canonical name first
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Language::CSharp => &["csharp", "cs"],
            Language::JavaScript => &["js", "javascript"],
            Language::TypeScript => &["ts", "typescript"],
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Language::CSharp => "cs",
            Language::JavaScript => "js",
            Language::TypeScript => "ts",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|language| language.aliases().contains(&s))
    }

    pub const ALL: [Language; 3] = [Language::CSharp, Language::JavaScript, Language::TypeScript];
}

/// One (role, language) stub generator; ordered by role, then language
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Target {
    pub role: Role,
    pub language: Language,
}

impl Target {
    pub fn new(role: Role, language: Language) -> Self {
        Self { role, language }
    }

    /// Parse a `<role>_<language>` token
    pub fn parse(token: &str) -> Option<Self> {
        let (role, language) = token.split_once('_')?;
        Some(Self::new(Role::parse(role)?, Language::parse(language)?))
    }

    /// Every target, in iteration order
    pub fn all() -> impl Iterator<Item = Target> {
        [Role::Client, Role::Server].into_iter().flat_map(|role| {
            Language::ALL
                .into_iter()
                .map(move |language| Target::new(role, language))
        })
    }

    /// Class name of the generated stub, e.g. `EchoClient` or `EchoBase`
    pub fn class_name(&self, service_name: &str) -> String {
        format!("{service_name}{}", self.role.suffix())
    }

    /// Output file name, e.g. `protos/echo_EchoClient.cs`
    pub fn file_name(&self, base_name: &str, service_name: &str) -> String {
        format!(
            "{base_name}_{}.{}",
            self.class_name(service_name),
            self.language.extension()
        )
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.role.as_str(), self.language.as_str())
    }
}

/// Protocol constants rendered into every generated stub
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StubSettings {
    pub max_message_size: usize,
    pub chunk_size: usize,
    pub call_timeout_ms: u64,
    pub reassembly_timeout_ms: u64,
    pub max_chunk_sets: usize,
    pub max_reassembly_bytes: usize,
    pub retired_per_set: usize,
}

impl StubSettings {
    /// Settings for a configuration that has already been validated
    fn from_config(config: &ChannelConfig, chunk_size: usize) -> Self {
        Self {
            max_message_size: config.max_message_size,
            chunk_size,
            call_timeout_ms: config.call_timeout_ms,
            reassembly_timeout_ms: config.reassembly_timeout_ms,
            max_chunk_sets: config.max_chunk_sets,
            max_reassembly_bytes: config.max_reassembly_bytes,
            retired_per_set: protocol::RETIRED_PER_CHUNK_SET,
        }
    }
}

impl Default for StubSettings {
    fn default() -> Self {
        let config = ChannelConfig::default();
        let chunk_size = protocol::chunk_payload_size(config.max_message_size).unwrap_or(0);
        Self::from_config(&config, chunk_size)
    }
}

/// Everything the parameter string selects
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeneratorOptions {
    pub targets: BTreeSet<Target>,
    pub settings: StubSettings,
}

impl GeneratorOptions {
    /// Parse the protoc parameter string
    ///
    /// Order-independent and deduplicating; unrecognized or invalid tokens
    /// are skipped.
    pub fn parse(parameter: &str) -> Self {
        let mut targets = BTreeSet::new();
        let mut config = ChannelConfig::default();

        for token in parameter.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(target) = Target::parse(token) {
                targets.insert(target);
                continue;
            }
            let candidate = match token.split_once('=') {
                Some(("max_message_size", value)) => {
                    value.trim().parse().ok().map(|size: usize| {
                        // one message must always fit in the reassembly budget
                        let budget = config.max_reassembly_bytes.max(size);
                        config
                            .clone()
                            .with_max_message_size(size)
                            .with_reassembly_limits(config.max_chunk_sets, budget)
                    })
                }
                Some(("timeout_ms", value)) => value
                    .trim()
                    .parse()
                    .ok()
                    .map(|ms| ChannelConfig {
                        call_timeout_ms: ms,
                        ..config.clone()
                    }),
                _ => None,
            };
            match candidate {
                Some(next) if next.validate().is_ok() => config = next,
                _ => debug!(token, "ignoring unrecognized parameter token"),
            }
        }

        let chunk_size = config.chunk_size().unwrap_or(0);
        Self {
            targets,
            settings: StubSettings::from_config(&config, chunk_size),
        }
    }

    /// Every accepted token form, for `--targets`
    pub fn known_tokens() -> Vec<String> {
        let mut tokens: Vec<String> = [Role::Client, Role::Server]
            .into_iter()
            .flat_map(|role| {
                Language::ALL.into_iter().flat_map(move |language| {
                    language
                        .aliases()
                        .iter()
                        .map(move |alias| format!("{}_{alias}", role.as_str()))
                })
            })
            .collect();
        tokens.push("max_message_size=<bytes>".to_string());
        tokens.push("timeout_ms=<millis>".to_string());
        tokens
    }
}
