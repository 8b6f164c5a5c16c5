mod common;

use common::{parse_test_cases, TestCase};
use dir_test::{dir_test, Fixture};
use quill_interpreter::Machine;
use quill_ir::Module;

#[dir_test(
    dir: "$CARGO_MANIFEST_DIR/test_files",
    glob: "*.qir",
    loader: common::parse_module,
)]
fn test(fixture: Fixture<(Module, String)>) {
    let (module, content) = fixture.into_content();
    let test_cases: Vec<TestCase> = match parse_test_cases(&module, &content) {
        Ok(test_cases) => test_cases,
        Err(e) => panic!("{e}"),
    };
    assert!(!test_cases.is_empty(), "fixture has no `# %func(..)` cases");

    let mut machine = Machine::new(&module);

    let errors: Vec<_> = test_cases
        .iter()
        .filter_map(|case| case.run(&mut machine).err())
        .collect();

    if !errors.is_empty() {
        panic!("{}", errors.join("\n"));
    }
}
