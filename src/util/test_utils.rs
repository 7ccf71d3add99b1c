use crate::{
    error::CheckErrorKind,
    lexer, parser,
    source::SourceFile,
    util::{
        fmt::{tree, Context},
        intern::TokenMap,
    },
    verifier::{self, VerifiedProgram},
};

pub const TEST_FILE: &str = "test.ward";

/// Each variant contains the input.
pub enum Test {
    ParserProgram(&'static str),
    ParserExpr(&'static str),
    VerifierProgram(&'static str),
}

pub enum Assertion {
    TreeOk(&'static str),
    ExpectedErrors(&'static [&'static str]),
}

#[track_caller]
pub fn run_pipeline(test: Test) -> (String, Vec<String>) {
    let tm = TokenMap::with_capacity(128);
    let ctx = Context { tm: &tm };

    match test {
        Test::ParserProgram(input) => {
            let source = SourceFile::new(TEST_FILE, input.as_bytes());
            match lexer::tokenize(&tm, &source).and_then(|t| parser::parse(&tm, &source, &t)) {
                Ok(file) => (tree::file(&ctx, &file, false).to_string(), vec![]),
                Err(error) => (String::new(), vec![error.to_string()]),
            }
        }
        Test::ParserExpr(input) => {
            let source = SourceFile::new(TEST_FILE, input.as_bytes());
            match lexer::tokenize(&tm, &source).and_then(|t| parser::parse_expr(&tm, &source, &t))
            {
                Ok(expr) => (tree::expr(&ctx, &expr).to_string(), vec![]),
                Err(error) => (String::new(), vec![error.to_string()]),
            }
        }
        Test::VerifierProgram(input) => match verify_sources(&tm, &[(TEST_FILE, input)]) {
            Ok(program) => {
                let tree = program
                    .files
                    .iter()
                    .map(|file| tree::file(&ctx, file, false).to_string())
                    .collect();
                (tree, vec![])
            }
            Err(error) => (String::new(), vec![error]),
        },
    }
}

/// Lexes, parses and verifies the named sources, rendering any error.
pub fn verify_sources(tm: &TokenMap, sources: &[(&str, &str)]) -> Result<VerifiedProgram, String> {
    let mut files = Vec::with_capacity(sources.len());
    for (name, text) in sources {
        let source = SourceFile::new(name, text.as_bytes());
        let tokens = lexer::tokenize(tm, &source).map_err(|e| e.to_string())?;
        files.push(parser::parse(tm, &source, &tokens).map_err(|e| e.to_string())?);
    }
    verifier::verify(tm, files).map_err(|e| e.to_string())
}

/// Verifies a single source, expecting it to be accepted.
#[track_caller]
pub fn accept(src: &str) -> VerifiedProgram {
    let tm = TokenMap::new();
    match verify_sources(&tm, &[(TEST_FILE, src)]) {
        Ok(program) => program,
        Err(error) => panic!("expected the program to verify, got: {error}"),
    }
}

/// Verifies a single source, expecting a check error. Returns its kind and
/// its `line:column`.
#[track_caller]
pub fn reject(src: &str) -> (CheckErrorKind, (u32, u32)) {
    let tm = TokenMap::new();
    let source = SourceFile::new(TEST_FILE, src.as_bytes());
    let tokens = lexer::tokenize(&tm, &source).expect("failed to lex");
    let file = parser::parse(&tm, &source, &tokens).expect("failed to parse");
    match verifier::verify(&tm, vec![file]) {
        Ok(_) => panic!("expected the program to be rejected"),
        Err(error) => (error.kind, (error.location.line, error.location.column)),
    }
}

#[track_caller]
pub fn run_assertion(
    assertion: Assertion,
    formatted_actual_tree: &str,
    formatted_actual_errors: &[String],
) {
    match assertion {
        Assertion::TreeOk(expected_tree) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors)
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), $source);
                let (formatted_actual_tree, formatted_actual_errors) =
                    crate::util::test_utils::run_pipeline(test);
                let ctx = (&formatted_actual_tree, &formatted_actual_errors);
                tree_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        tree_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeOk(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::ParserProgram($source)
    };
    (@@get_test(parser, expr), $source:expr) => {
        crate::util::test_utils::Test::ParserExpr($source)
    };
    (@@get_test(verifier, program), $source:expr) => {
        crate::util::test_utils::Test::VerifierProgram($source)
    };
}
pub(crate) use tree_tests;
