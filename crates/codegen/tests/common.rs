use quill_interpreter::EvalValue;
use quill_ir::{insn::Callee, ir_writer::ModuleWriter, module::FuncRef, Immediate, Module, Type};

pub fn parse_module(file_path: &str) -> (Module, String) {
    let content = std::fs::read_to_string(file_path).unwrap();

    match quill_parser::parse_module(&content) {
        Ok(module) => (module, content),
        Err(errs) => {
            let mut s = String::new();
            for err in errs {
                s.push_str(&err.print_to_string(file_path, &content, false));
                s.push('\n');
            }
            panic!("{s}");
        }
    }
}

pub fn write_module(module: &Module) -> String {
    ModuleWriter::new(module).dump_string().unwrap()
}

/// Calls listed as `# %func(args)` lines. Arguments are typed literals such
/// as `-3.i32`.
pub fn parse_calls(module: &Module, content: &str) -> Vec<(FuncRef, Vec<EvalValue>)> {
    content
        .lines()
        .filter_map(|line| line.strip_prefix("# %"))
        .map(|call| {
            let (name, rest) = call
                .split_once('(')
                .unwrap_or_else(|| panic!("malformed call `{call}`"));
            let Some(Callee::Func(func)) = module.lookup_callee(name) else {
                panic!("no function `%{name}`");
            };
            let args = rest
                .trim_end()
                .strip_suffix(')')
                .unwrap_or_else(|| panic!("malformed call `{call}`"))
                .split(',')
                .map(str::trim)
                .filter(|arg| !arg.is_empty())
                .map(parse_value)
                .collect();
            (func, args)
        })
        .collect()
}

/// Text listed after `# <directive>: ` lines.
pub fn directives<'a>(content: &'a str, directive: &'a str) -> impl Iterator<Item = &'a str> {
    content.lines().filter_map(move |line| {
        line.strip_prefix("# ")?
            .strip_prefix(directive)?
            .strip_prefix(": ")
    })
}

fn parse_value(input: &str) -> EvalValue {
    if input == "undef" {
        return EvalValue::Undef;
    }
    let (literal, ty) = input
        .rsplit_once('.')
        .unwrap_or_else(|| panic!("`{input}`: expected `<literal>.<type>`"));
    let ty = Type::from_scalar_name(ty).unwrap_or_else(|| panic!("`{input}`: unknown type"));
    match Immediate::parse_literal(literal, &ty) {
        Some(imm) => EvalValue::Imm(imm),
        None => panic!("`{input}`: invalid literal"),
    }
}
