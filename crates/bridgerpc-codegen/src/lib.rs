//! bridgerpc-codegen - protoc plugin for bridge RPC stubs
//!
//! The `protoc-gen-bridgerpc` binary reads a `CodeGeneratorRequest`, extracts
//! one [`ServiceModel`] per service, renders every activated [`Target`] for it
//! and answers with a `CodeGeneratorResponse`.
//!
//! # Architecture
//!
//! ```text
//! CodeGeneratorRequest
//!     ↓
//!  [model::extract_services]      [GeneratorOptions::parse]
//!     ↓                                   ↓
//!  ServiceModel  ──────→  [RendererRegistry] (one StubRenderer per Target)
//!                                          ↓
//!                              [ResponseAssembler] → CodeGeneratorResponse
//! ```
//!
//! A render failure for one (service, target) pair is recorded in the
//! response's `error` field; every other file is still produced.

pub mod error;
pub mod logging;
pub mod model;
pub mod naming;
pub mod options;
pub mod plugin;
pub mod render;
pub mod response;

pub use error::{GenerateError, RenderError};
pub use model::{MethodModel, ServiceModel, extract_services};
pub use options::{GeneratorOptions, Language, Role, StubSettings, Target};
pub use plugin::{generate, run};
pub use render::{GeneratedFile, RendererRegistry, StubRenderer, TemplateRenderer};
pub use response::ResponseAssembler;
