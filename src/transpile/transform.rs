//! Single-file transformation.
//!
//! TypeScript/JSX in, plain JavaScript with an inline base64 source map out.
//! Everything else about module format is internal to this module; callers
//! only see loadable output bodies.

use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions};
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::SourceType;
use oxc::transformer::{TransformOptions, Transformer};

use crate::errors::RunnerError;

/// Read and transform one source file.
pub fn transform_file(path: &Path) -> Result<String, RunnerError> {
    let source_text = std::fs::read_to_string(path).map_err(|e| RunnerError::Compile {
        path: path.to_path_buf(),
        message: format!("failed to read source: {e}"),
    })?;
    transform_source(path, &source_text)
}

/// Transform source text belonging to `path`.
///
/// The path determines the dialect (`.ts`, `.tsx`, `.jsx`, ...) and is
/// recorded in the source map so runtime stack traces point at the authored
/// file.
pub fn transform_source(path: &Path, source_text: &str) -> Result<String, RunnerError> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_default();

    let parsed = Parser::new(&allocator, source_text, source_type).parse();
    if !parsed.errors.is_empty() {
        return Err(compile_error(path, &parsed.errors));
    }
    let mut program = parsed.program;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();

    let options = TransformOptions::default();
    let transformed =
        Transformer::new(&allocator, path, &options).build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(compile_error(path, &transformed.errors));
    }

    let output = Codegen::new()
        .with_options(CodegenOptions {
            source_map_path: Some(path.to_path_buf()),
            ..CodegenOptions::default()
        })
        .build(&program);

    let mut code = output.code;
    if let Some(map) = output.map {
        let encoded = STANDARD.encode(map.to_json_string());
        code.push_str("\n//# sourceMappingURL=data:application/json;base64,");
        code.push_str(&encoded);
        code.push('\n');
    }
    Ok(code)
}

fn compile_error<E: std::fmt::Display>(path: &Path, errors: &[E]) -> RunnerError {
    let message = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    RunnerError::Compile {
        path: path.to_path_buf(),
        message,
    }
}
