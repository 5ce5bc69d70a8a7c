//! Language-neutral model of the services in a `CodeGeneratorRequest`

use crate::naming::{file_stem, short_type_name, strip_extension, title_case};
use prost_types::FileDescriptorProto;
use prost_types::compiler::CodeGeneratorRequest;
use serde::Serialize;
use std::collections::HashSet;

/// Namespace used when a file has neither `csharp_namespace` nor a package
pub const DEFAULT_NAMESPACE: &str = "DefaultNamespace";

/// One RPC method
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodModel {
    pub name: String,
    /// Unqualified input message name
    pub input_type: String,
    /// Unqualified output message name
    pub output_type: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

impl MethodModel {
    pub fn is_streaming(&self) -> bool {
        self.client_streaming || self.server_streaming
    }
}

/// One service of one requested schema file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceModel {
    pub namespace: String,
    /// Protobuf package, possibly empty
    pub package: String,
    pub service_name: String,
    pub methods: Vec<MethodModel>,
    /// Top-level messages of the owning file, in declaration order
    pub message_names: Vec<String>,
    /// Schema file name without its extension, directories kept
    pub base_name: String,
}

impl ServiceModel {
    /// `package.Service`, or just `Service` without a package
    pub fn full_name(&self) -> String {
        if self.package.is_empty() {
            self.service_name.clone()
        } else {
            format!("{}.{}", self.package, self.service_name)
        }
    }

    /// Wire method string for one of this service's methods
    pub fn method_path(&self, method: &MethodModel) -> String {
        format!("{}.{}", self.full_name(), method.name)
    }

    /// Module name the JS/TS stubs import messages from, minus the `_pb` suffix
    pub fn import_stem(&self) -> &str {
        file_stem(&self.base_name)
    }
}

/// Build one model per service of every requested file
///
/// Files follow `proto_file` order and services follow declaration order.
pub fn extract_services(request: &CodeGeneratorRequest) -> Vec<ServiceModel> {
    let requested: HashSet<&str> = request.file_to_generate.iter().map(String::as_str).collect();

    request
        .proto_file
        .iter()
        .filter(|file| requested.contains(file.name()))
        .flat_map(services_of_file)
        .collect()
}

fn services_of_file(file: &FileDescriptorProto) -> Vec<ServiceModel> {
    let namespace = resolve_namespace(file);
    let base_name = strip_extension(file.name()).to_string();
    let message_names = message_names(file);

    file.service
        .iter()
        .map(|service| ServiceModel {
            namespace: namespace.clone(),
            package: file.package().to_string(),
            service_name: service.name().to_string(),
            methods: service
                .method
                .iter()
                .map(|method| MethodModel {
                    name: method.name().to_string(),
                    input_type: short_type_name(method.input_type()).to_string(),
                    output_type: short_type_name(method.output_type()).to_string(),
                    client_streaming: method.client_streaming(),
                    server_streaming: method.server_streaming(),
                })
                .collect(),
            message_names: message_names.clone(),
            base_name: base_name.clone(),
        })
        .collect()
}

/// `csharp_namespace` option, else the title-cased package, else [`DEFAULT_NAMESPACE`]
pub fn resolve_namespace(file: &FileDescriptorProto) -> String {
    let explicit = file
        .options
        .as_ref()
        .map(|options| options.csharp_namespace())
        .unwrap_or_default();
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    match file.package() {
        "" => DEFAULT_NAMESPACE.to_string(),
        package => title_case(package),
    }
}

fn message_names(file: &FileDescriptorProto) -> Vec<String> {
    let mut seen = HashSet::new();
    file.message_type
        .iter()
        .map(|message| message.name())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}
