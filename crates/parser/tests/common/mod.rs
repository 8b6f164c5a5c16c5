use quill_ir::{ir_writer::ModuleWriter, Module};
use quill_parser::parse_module;

/// Parses a fixture, printing every error against the source before
/// failing.
pub fn parse_fixture(path: &str, content: &str) -> Module {
    match parse_module(content) {
        Ok(module) => module,
        Err(errs) => {
            for err in &errs {
                eprintln!("{}", err.print_to_string(path, content, true));
            }
            panic!("failed to parse {path}");
        }
    }
}

pub fn write_module(module: &Module) -> String {
    ModuleWriter::new(module).dump_string().unwrap()
}
