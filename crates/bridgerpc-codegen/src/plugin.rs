//! Plugin driver: `CodeGeneratorRequest` in, `CodeGeneratorResponse` out

use crate::{
    GenerateError, GeneratorOptions, RendererRegistry, ResponseAssembler, extract_services,
};
use prost::Message;
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use std::io::{Read, Write};
use tracing::{debug, info, warn};

/// Render every (service, target) pair of the request
///
/// Services follow request order and targets follow [`crate::Target`]
/// order. A failed pair is reported in the response's `error` field and
/// does not stop the others.
pub fn generate(request: &CodeGeneratorRequest, registry: &RendererRegistry) -> CodeGeneratorResponse {
    let options = GeneratorOptions::parse(request.parameter());
    let services = extract_services(request);

    if options.targets.is_empty() {
        debug!(parameter = request.parameter(), "no targets selected");
    }
    debug!(
        services = services.len(),
        targets = options.targets.len(),
        max_message_size = options.settings.max_message_size,
        "generating stubs"
    );

    let mut response = ResponseAssembler::new();
    for service in &services {
        for &target in &options.targets {
            match registry.render(target, service, &options.settings) {
                Ok(file) => {
                    debug!(file = %file.name, %target, "rendered stub");
                    response.push_file(file);
                }
                Err(err) => {
                    warn!(service = %err.service, %target, error = %err.message, "failed to render stub");
                    response.push_error(&err);
                }
            }
        }
    }

    info!(
        files = response.file_count(),
        errors = response.error_count(),
        "generation finished"
    );
    response.finish()
}

/// Read one encoded request from `input` and write the encoded response to `output`
///
/// Nothing is written when the request cannot be read or decoded.
pub fn run(
    mut input: impl Read,
    mut output: impl Write,
    registry: &RendererRegistry,
) -> Result<(), GenerateError> {
    let mut buf = Vec::new();
    input.read_to_end(&mut buf)?;
    let request = CodeGeneratorRequest::decode(buf.as_slice())?;

    let response = generate(&request, registry);

    output.write_all(&response.encode_to_vec())?;
    output.flush()?;
    Ok(())
}
