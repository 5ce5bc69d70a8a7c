//! Accumulates generated files and render failures into one response

use crate::{GeneratedFile, RenderError};
use prost_types::compiler::code_generator_response::{Feature, File};
use prost_types::compiler::CodeGeneratorResponse;

/// Collects the outcome of every (service, target) pair
///
/// Files keep push order. Failures are joined one per line into the
/// response's `error` field, which stays unset when nothing failed.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    files: Vec<File>,
    errors: Vec<String>,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_file(&mut self, file: GeneratedFile) {
        self.files.push(File {
            name: Some(file.name),
            content: Some(file.content),
            ..Default::default()
        });
    }

    pub fn push_error(&mut self, error: &RenderError) {
        self.errors.push(error.to_string());
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn finish(self) -> CodeGeneratorResponse {
        CodeGeneratorResponse {
            error: (!self.errors.is_empty()).then(|| self.errors.join("\n")),
            supported_features: Some(Feature::Proto3Optional as u64),
            file: self.files,
            ..Default::default()
        }
    }
}
