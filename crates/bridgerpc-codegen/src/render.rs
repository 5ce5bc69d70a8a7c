//! Stub renderers
//!
//! Every [`Target`] is served by one [`StubRenderer`]. The built-in renderers
//! are minijinja templates compiled into the binary; each language has a
//! shared `runtime` template (envelope framing, chunking and reassembly)
//! included by its `client` and `server` templates.
//!
//! ```text
//! ServiceModel + StubSettings
//!     ↓
//!  [RendererRegistry::render]  (rejects streaming methods)
//!     ↓
//!  ├─→ [TemplateRenderer client_csharp] → echo_EchoClient.cs
//!  ├─→ [TemplateRenderer server_ts]     → echo_EchoBase.ts
//!  └─→ ...
//! ```

use crate::naming::lower_first;
use crate::options::{Language, Role};
use crate::{GenerateError, MethodModel, RenderError, ServiceModel, StubSettings, Target};
use minijinja::{AutoEscape, Environment, UndefinedBehavior, context};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Identifies the generator in every file header
pub const GENERATOR: &str = concat!("protoc-gen-bridgerpc ", env!("CARGO_PKG_VERSION"));

const TEMPLATES: &[(&str, &str)] = &[
    ("csharp/runtime.cs.j2", include_str!("../templates/csharp/runtime.cs.j2")),
    ("csharp/client.cs.j2", include_str!("../templates/csharp/client.cs.j2")),
    ("csharp/server.cs.j2", include_str!("../templates/csharp/server.cs.j2")),
    ("js/runtime.js.j2", include_str!("../templates/js/runtime.js.j2")),
    ("js/client.js.j2", include_str!("../templates/js/client.js.j2")),
    ("js/server.js.j2", include_str!("../templates/js/server.js.j2")),
    ("ts/runtime.ts.j2", include_str!("../templates/ts/runtime.ts.j2")),
    ("ts/client.ts.j2", include_str!("../templates/ts/client.ts.j2")),
    ("ts/server.ts.j2", include_str!("../templates/ts/server.ts.j2")),
];

/// One output file of the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the protoc output directory
    pub name: String,
    pub content: String,
}

/// Produces the source text of one stub for one service
pub trait StubRenderer: Send + Sync {
    fn target(&self) -> Target;

    fn render(&self, service: &ServiceModel, settings: &StubSettings) -> Result<String, RenderError>;
}

/// Top-level names of the JS runtime shared by both stubs
const JS_RUNTIME_NAMES: &[&str] = &[
    "MAX_MESSAGE_SIZE", "CHUNK_SIZE", "CALL_TIMEOUT_MS", "REASSEMBLY_TIMEOUT_MS",
    "MAX_CHUNK_SETS", "MAX_REASSEMBLY_BYTES", "MAX_RETIRED_SETS", "utf8Encoder", "utf8Decoder",
    "toBase64", "fromBase64", "sameBytes", "truncateUtf8", "decodeEnvelope", "byteLength",
    "fitError", "chunkSizeFor", "frameEnvelope", "ChunkAssembler",
    // globals the runtime calls, shadowed by an imported message of the same name
    "Map", "Error", "Promise", "Uint8Array", "TextEncoder", "TextDecoder", "Math", "Number",
    "JSON", "String", "Date", "Infinity", "AbortSignal",
];

/// Type names the TS runtime adds on top of the JS ones
const TS_RUNTIME_TYPES: &[&str] = &["ChunkInfo", "Envelope", "PartialSet", "Assembled", "ReturnType", "Record"];

const TS_CLIENT_TYPES: &[&str] = &["CallOptions", "PendingCall"];

const JS_CLIENT_MEMBERS: &[&str] = &["constructor", "onMessage", "dispose", "defaultTimeoutMs"];

const JS_SERVER_MEMBERS: &[&str] = &["constructor", "onMessage", "dispose"];

/// Members and nested types of the C# runtime; each hides a type of the same name
const CSHARP_RUNTIME_NAMES: &[&str] = &[
    "MaxMessageSize", "ChunkSize", "CallTimeoutMs", "ReassemblyTimeoutMs", "MaxChunkSets",
    "MaxReassemblyBytes", "MaxRetiredSets", "JsonOptions", "ChunkHeader", "Envelope",
    "DecodeEnvelope", "FrameEnvelope", "FitError", "ChunkSizeFor", "TruncateUtf8",
    "ChunkAssembler", "OnMessage", "Dispose",
    // framework types the runtime names without qualification
    "Action", "ArgumentNullException", "Buffer", "CancellationToken", "CancellationTokenSource",
    "ConcurrentDictionary", "Convert", "DateTime", "Dictionary", "Encoding", "Exception",
    "FormatException", "Guid", "IDisposable", "Interlocked", "InvalidOperationException",
    "JavaScriptEncoder", "JsonException", "JsonIgnore", "JsonIgnoreCondition",
    "JsonPropertyName", "JsonSerializer", "JsonSerializerOptions", "List", "Math",
    "ObjectDisposedException", "Queue", "SortedDictionary", "Task", "TaskCompletionSource",
    "TaskCreationOptions", "TimeSpan", "TimeoutException", "Timer", "Volatile",
];

const CSHARP_CLIENT_NAMES: &[&str] = &["BridgeException", "DefaultTimeout", "CallAsync"];

const CSHARP_SERVER_NAMES: &[&str] = &["DispatchAsync", "Reply"];

/// Names a message type may not take in a built-in stub for `target`
fn reserved_type_names(target: Target) -> Vec<&'static str> {
    let role_names: &[&str] = match (target.language, target.role) {
        (Language::CSharp, Role::Client) => CSHARP_CLIENT_NAMES,
        (Language::CSharp, Role::Server) => CSHARP_SERVER_NAMES,
        (Language::TypeScript, Role::Client) => TS_CLIENT_TYPES,
        _ => &[],
    };
    let runtime: &[&[&str]] = match target.language {
        Language::CSharp => &[CSHARP_RUNTIME_NAMES],
        Language::JavaScript => &[JS_RUNTIME_NAMES],
        Language::TypeScript => &[JS_RUNTIME_NAMES, TS_RUNTIME_TYPES],
    };
    runtime.iter().chain([&role_names]).flat_map(|names| names.iter().copied()).collect()
}

/// Names a generated method member may not take in a built-in stub for `target`
fn reserved_member_names(target: Target) -> Vec<&'static str> {
    match (target.language, target.role) {
        (Language::CSharp, _) => reserved_type_names(target),
        (_, Role::Client) => JS_CLIENT_MEMBERS.to_vec(),
        (_, Role::Server) => JS_SERVER_MEMBERS.to_vec(),
    }
}

/// Member name the built-in stub gives a method
fn member_name(target: Target, method: &MethodModel) -> String {
    match (target.language, target.role) {
        (Language::CSharp, Role::Client) => format!("{}Async", method.name),
        (Language::CSharp, Role::Server) => method.name.clone(),
        _ => lower_first(&method.name),
    }
}

/// Method fields as the templates see them
#[derive(Serialize)]
struct MethodView<'a> {
    name: &'a str,
    input_type: &'a str,
    output_type: &'a str,
    /// Wire method string, `package.Service.Method`
    path: String,
}

/// Build the template environment with every built-in template loaded
///
/// Templates are parsed here, so a broken template fails at startup rather
/// than on the first service that uses it.
pub fn template_environment() -> Result<Environment<'static>, GenerateError> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    env.add_filter("lower_first", |value: String| lower_first(&value));

    for &(name, source) in TEMPLATES {
        env.add_template(name, source)?;
    }
    Ok(env)
}

/// A [`StubRenderer`] backed by one template of a shared environment
pub struct TemplateRenderer {
    target: Target,
    template: String,
    env: Arc<Environment<'static>>,
}

impl TemplateRenderer {
    /// Renderer for `target` using its built-in template
    pub fn builtin(target: Target, env: Arc<Environment<'static>>) -> Self {
        let template = format!(
            "{}/{}.{}.j2",
            target.language.as_str(),
            target.role.as_str(),
            target.language.extension()
        );
        Self::new(target, template, env)
    }

    pub fn new(target: Target, template: impl Into<String>, env: Arc<Environment<'static>>) -> Self {
        Self {
            target,
            template: template.into(),
            env,
        }
    }

    pub fn template_name(&self) -> &str {
        &self.template
    }

    /// Reject services whose names would collide with the stub's own declarations
    fn check_names(&self, service: &ServiceModel) -> Result<(), RenderError> {
        let class_name = self.target.class_name(&service.service_name);
        let collision = |kind: &str, name: &str| {
            RenderError::new(
                self.target,
                service.full_name(),
                format!("{kind} `{name}` collides with a name the generated stub declares"),
            )
        };

        let types = reserved_type_names(self.target);
        let messages = service.message_names.iter().chain(
            service
                .methods
                .iter()
                .flat_map(|method| [&method.input_type, &method.output_type]),
        );
        for message in messages {
            if *message == class_name || types.contains(&message.as_str()) {
                return Err(collision("message", message));
            }
        }

        let members = reserved_member_names(self.target);
        for method in &service.methods {
            let member = member_name(self.target, method);
            if member == class_name || members.contains(&member.as_str()) {
                return Err(collision("method", &method.name));
            }
        }
        Ok(())
    }
}

impl StubRenderer for TemplateRenderer {
    fn target(&self) -> Target {
        self.target
    }

    fn render(&self, service: &ServiceModel, settings: &StubSettings) -> Result<String, RenderError> {
        self.check_names(service)?;
        let fail = |err: minijinja::Error| {
            RenderError::new(
                self.target,
                service.full_name(),
                format!("template {} failed: {err}", self.template),
            )
        };

        let methods: Vec<MethodView<'_>> = service
            .methods
            .iter()
            .map(|method| MethodView {
                name: &method.name,
                input_type: &method.input_type,
                output_type: &method.output_type,
                path: service.method_path(method),
            })
            .collect();

        let template = self.env.get_template(&self.template).map_err(&fail)?;
        template
            .render(context! {
                generator => GENERATOR,
                service => service,
                methods => methods,
                full_name => service.full_name(),
                import_stem => service.import_stem(),
                class_name => self.target.class_name(&service.service_name),
                settings => settings,
            })
            .map_err(&fail)
    }
}

/// Maps each [`Target`] to the renderer that produces it
#[derive(Default)]
pub struct RendererRegistry {
    renderers: BTreeMap<Target, Box<dyn StubRenderer>>,
}

impl RendererRegistry {
    /// A registry with no renderers
    pub fn empty() -> Self {
        Self::default()
    }

    /// The template renderers for every target
    pub fn builtin() -> Result<Self, GenerateError> {
        let env = Arc::new(template_environment()?);
        Ok(Target::all().fold(Self::empty(), |registry, target| {
            registry.with_renderer(TemplateRenderer::builtin(target, Arc::clone(&env)))
        }))
    }

    /// Add a renderer, replacing any earlier one for the same target
    pub fn with_renderer(mut self, renderer: impl StubRenderer + 'static) -> Self {
        self.renderers.insert(renderer.target(), Box::new(renderer));
        self
    }

    pub fn contains(&self, target: Target) -> bool {
        self.renderers.contains_key(&target)
    }

    /// Render one (service, target) pair into an output file
    ///
    /// Streaming methods are rejected here for every target.
    pub fn render(
        &self,
        target: Target,
        service: &ServiceModel,
        settings: &StubSettings,
    ) -> Result<GeneratedFile, RenderError> {
        if let Some(method) = service.methods.iter().find(|m| m.is_streaming()) {
            let kind = match (method.client_streaming, method.server_streaming) {
                (true, true) => "bidirectional",
                (true, false) => "client",
                _ => "server",
            };
            return Err(RenderError::new(
                target,
                service.full_name(),
                format!("method {} is {kind} streaming; only unary methods are supported", method.name),
            ));
        }

        let renderer = self.renderers.get(&target).ok_or_else(|| {
            RenderError::new(target, service.full_name(), "no renderer registered for this target")
        })?;

        Ok(GeneratedFile {
            name: target.file_name(&service.base_name, &service.service_name),
            content: renderer.render(service, settings)?,
        })
    }
}
