use std::path::Path;

use dir_test::{dir_test, Fixture};
use quill_parser::parse_module;

#[dir_test(
    dir: "$CARGO_MANIFEST_DIR/test_files/errors",
    glob: "*.qir"
)]
fn test_errors(fixture: Fixture<&str>) {
    let Err(errs) = parse_module(fixture.content()) else {
        panic!("expected parse_module to fail with errors");
    };
    let path = Path::new(fixture.path())
        .file_name()
        .unwrap()
        .to_string_lossy();

    let mut v = vec![];
    for err in errs {
        err.print(&mut v, &path, fixture.content(), false).unwrap();
    }
    let s = String::from_utf8(v).unwrap();

    let expected = fixture
        .content()
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("# expect: "))
        .expect("error fixtures start with `# expect: <message>`");
    assert!(s.contains(expected), "`{expected}` not in:\n{s}");
    assert!(s.contains(path.as_ref()), "{s}");
}
