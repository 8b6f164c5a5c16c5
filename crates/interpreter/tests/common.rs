use once_cell::sync::Lazy;
use quill_interpreter::{EvalError, EvalValue, Machine};
use quill_ir::{insn::Callee, module::FuncRef, Immediate, Module, Type};
use regex::Regex;

/// Reads a fixture module, printing every parse error before failing.
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

/// A run described by a `# %func(args) -> ret` comment line.
///
/// `ret` is a typed literal such as `3.i32`, `undef`, or `error: <message>`.
/// Without `-> ret` the function is expected to exit without a value.
#[derive(Debug)]
pub struct TestCase {
    func: FuncRef,
    args: Vec<EvalValue>,
    expected: Expected,
    text: String,
}

#[derive(Debug)]
enum Expected {
    Value(Option<EvalValue>),
    Error(String),
}

impl TestCase {
    pub fn run(&self, machine: &mut Machine) -> Result<(), String> {
        let evaluated = machine.run(self.func, self.args.clone());
        machine.clear_state();

        let ok = match (&self.expected, &evaluated) {
            (Expected::Value(expected), Ok(value)) => expected == value,
            (Expected::Error(msg), Err(err)) => err.to_string().contains(msg.as_str()),
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            Err(format!(
                "case `{}`\n  expected: {:?}\n  evaluated: {}",
                self.text,
                self.expected,
                display_result(&evaluated)
            ))
        }
    }
}

pub fn display_result(result: &Result<Option<EvalValue>, EvalError>) -> String {
    match result {
        Ok(Some(value)) => value.to_string(),
        Ok(None) => "<no value>".to_string(),
        Err(err) => format!("error: {err}"),
    }
}

pub fn parse_test_cases(module: &Module, content: &str) -> Result<Vec<TestCase>, String> {
    content
        .lines()
        .filter(|line| line.starts_with("# %"))
        .map(|line| parse_case(module, line))
        .collect()
}

fn parse_case(module: &Module, line: &str) -> Result<TestCase, String> {
    let caps = PATTERN
        .captures(line)
        .ok_or_else(|| format!("malformed case `{line}`, expected `# %func(args) -> ret`"))?;

    let name = &caps["func"];
    let Some(Callee::Func(func)) = module.lookup_callee(name) else {
        return Err(format!("`{line}`: no function `%{name}`"));
    };

    let args = caps["args"]
        .split(',')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(parse_value)
        .collect::<Result<_, _>>()?;

    let expected = match caps.name("ret").map(|m| m.as_str().trim()) {
        None => Expected::Value(None),
        Some(ret) => match ret.strip_prefix("error:") {
            Some(msg) => Expected::Error(msg.trim().to_string()),
            None => Expected::Value(Some(parse_value(ret)?)),
        },
    };

    Ok(TestCase {
        func,
        args,
        expected,
        text: line.to_string(),
    })
}

fn parse_value(input: &str) -> Result<EvalValue, String> {
    if input == "undef" {
        return Ok(EvalValue::Undef);
    }

    let (literal, ty) = input
        .rsplit_once('.')
        .ok_or_else(|| format!("`{input}`: expected `<literal>.<type>`"))?;
    let ty = Type::from_scalar_name(ty).ok_or_else(|| format!("`{input}`: unknown type"))?;
    Immediate::parse_literal(literal, &ty)
        .map(EvalValue::Imm)
        .ok_or_else(|| format!("`{input}`: invalid literal"))
}

static PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^\#\s*%(?P<func>[A-Za-z_][A-Za-z0-9_]*)
        \((?P<args>[^)]*)\)
        (?:\s*->\s*(?P<ret>.+))?
        $",
    )
    .unwrap()
});
