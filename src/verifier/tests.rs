use indoc::indoc;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::{facts::Facts, symbols, verify_with, Checker, FuncKey, Mode, Scope, VerifyOptions};
use crate::{
    ast::{Decl, File, Untyped},
    error::CheckErrorKind,
    interval::Interval,
    lexer, parser,
    source::SourceFile,
    util::{
        fmt::{tree, Context},
        intern::TokenMap,
        test_utils::{accept, reject, tree_tests, verify_sources, TEST_FILE},
    },
};

fn parse_all(tm: &TokenMap, sources: &[(&str, &str)]) -> Vec<File<Untyped>> {
    sources
        .iter()
        .map(|(name, text)| {
            let source = SourceFile::new(name, text.as_bytes());
            let tokens = lexer::tokenize(tm, &source).unwrap();
            parser::parse(tm, &source, &tokens).unwrap()
        })
        .collect()
}

tree_tests! {
    use verifier;

    fn test_typed_tree() {
        let program = "
            const LIMIT = 16

            func get(s: []u8, i: u64) -> u8, pre i < s.len() {
                return s[i]
            }
        ";
        let tree_ok = "
            const LIMIT
              int 16 %: integer constant
            func get(s: []u8, i: u64) -> u8
              pre
                binary Lt %: bool
                  ident i %: u64
                  call len %: u64
                    receiver
                      ident s %: []u8
              body
                return
                  index %: u8
                    ident s %: []u8
                    ident i %: u64
        ";
    }

    fn test_unguarded_increment_overflows() {
        let program = "func f(x: u8) -> u8 { return x + 1; };";
        let expected_errors = &[
            "test.ward:1:30: check error: x + 1 may overflow: computed [1, 256], but u8 only holds [0, 255]",
        ];
    }

    fn test_unreachable_statement() {
        let program = "func f() -> u8 { return 1; return 2; };";
        let expected_errors = &["test.ward:1:28: check error: statement is unreachable"];
    }
}

#[test]
fn precondition_guards_increment() {
    accept("func f(x: u8) -> u8, pre x < 255 { return x + 1; };");
    accept("func f(x: u8[..254]) -> u8 { assert x < 255; return x + 1; };");
    let (kind, _) = reject("func f(x: u8) -> u8 { assert x < 255; return x + 1; };");
    assert_eq!(
        kind,
        CheckErrorKind::UnprovenAssertion {
            cond: "x < 255".to_string()
        }
    );
}

#[test]
fn assertion_needs_facts() {
    let (kind, at) = reject("func f(x: u8) { assert x < 10; };");
    assert_eq!(
        kind,
        CheckErrorKind::UnprovenAssertion {
            cond: "x < 10".to_string()
        }
    );
    assert_eq!(at, (1, 17));
    accept("func f(x: u8[..9]) { assert x < 10; };");
}

#[test]
fn array_index_within_length() {
    accept("func f(a: [4]u8, i: u32) -> u8, pre i < 4 { return a[i]; };");
    let (kind, _) = reject("func f(a: [4]u8, i: u32) -> u8, pre i <= 4 { return a[i]; };");
    let CheckErrorKind::PossibleOutOfBounds { index, length, .. } = kind else {
        panic!("expected an out-of-bounds error, got {kind:?}");
    };
    assert_eq!(index, Interval::new(0, 4));
    assert_eq!(length, Interval::singleton(4));
}

#[test]
fn slice_length_from_precondition() {
    accept("func f(s: []u8) -> u8, pre s.len() == 4 { return s[3]; };");
    let (kind, _) = reject("func f(s: []u8) -> u8, pre s.len() == 4 { return s[4]; };");
    let CheckErrorKind::PossibleOutOfBounds {
        expr,
        index,
        length,
    } = kind
    else {
        panic!("expected an out-of-bounds error, got {kind:?}");
    };
    assert_eq!(expr, "s[4]");
    assert_eq!(index, Interval::singleton(4));
    assert_eq!(length, Interval::singleton(4));
}

#[test]
fn duplicate_across_files_is_order_independent() {
    let a = ("a.ward", "func decode() -> u8 { return 1; };");
    let b = ("b.ward", "func decode() -> u8 { return 2; };");
    let forward = verify_sources(&TokenMap::new(), &[a, b]).unwrap_err();
    let backward = verify_sources(&TokenMap::new(), &[b, a]).unwrap_err();
    assert_eq!(forward, backward);
    assert!(forward.starts_with("b.ward:1:6: check error: decode is already defined at a.ward"));
}

#[test]
fn branches_merge_their_facts() {
    accept(indoc! {"
        func clamp(x: u8) -> u8 {
            var y: u8 = x
            if y > 100 {
                y = 100
            }
            return y + 100
        }
    "});
    let (kind, _) = reject(indoc! {"
        func clamp(x: u8) -> u8 {
            var y: u8 = x
            if y > 100 {
                y = 100
            } else {
                y = 200
            }
            return y + 100
        }
    "});
    assert!(matches!(kind, CheckErrorKind::PossibleOverflow { .. }));
}

#[test]
fn loop_over_slice_with_invariant() {
    accept(indoc! {"
        func last_zero(s: []u8) -> u64 {
            var at: u64 = 0
            var i: u64 = 0
            while i < s.len(), inv i <= s.len() {
                if s[i] == 0 {
                    at = i
                }
                i += 1
            }
            return at
        }
    "});
}

#[test]
fn counted_loop_proves_postcondition() {
    accept(indoc! {"
        func scan(src: []u8, n: u64) -> u64,
            pre n <= src.len(),
            post result <= n,
        {
            var i: u64 = 0
            while i < n, inv i <= n {
                if src[i] == 0 {
                    break
                }
                i += 1
            }
            return i
        }
    "});
}

#[test]
fn invariant_must_hold_on_entry() {
    let (kind, at) = reject(indoc! {"
        func f(s: []u8) {
            var i: u64 = 0
            while i < s.len(), inv i < s.len() {
                i += 1
            }
        }
    "});
    assert_eq!(
        kind,
        CheckErrorKind::UnprovenAssertion {
            cond: "i < s.len()".to_string()
        }
    );
    assert_eq!(at, (3, 24));
}

#[test]
fn invariant_must_be_preserved() {
    let (kind, _) = reject(indoc! {"
        func f(n: u32) {
            var i: u32 = 0
            while i < n, inv i <= 5 {
                i += 1
            }
        }
    "});
    assert_eq!(
        kind,
        CheckErrorKind::UnprovenAssertion {
            cond: "i <= 5".to_string()
        }
    );
}

#[test]
fn loop_without_invariant_uses_condition() {
    accept(indoc! {"
        func f() {
            var i: u32 = 0
            while i < 10 {
                i += 1
            }
        }
    "});
    let (kind, _) = reject(indoc! {"
        func f() {
            var i: u32 = 0
            while i != 10 {
                i += 1
            }
        }
    "});
    assert!(matches!(kind, CheckErrorKind::PossibleOverflow { .. }));
}

#[test]
fn call_preconditions_are_substituted() {
    let callee = indoc! {"
        func pick(s: []u8, i: u64) -> u8, pre i < s.len() {
            return s[i]
        }
    "};
    accept(&format!(
        "{callee}func first(s: []u8) -> u8, pre s.len() > 0 {{ return pick(s, 0); }};"
    ));
    let tm = TokenMap::new();
    let source = format!("{callee}func first(s: []u8) -> u8 {{ return pick(s, 0); }};");
    let error = verify_sources(&tm, &[(TEST_FILE, &source)]).unwrap_err();
    assert_eq!(
        error,
        "test.ward:4:36: check error: cannot prove precondition i < s.len() of pick"
    );
}

#[test]
fn argument_must_fit_parameter() {
    let (kind, _) = reject(indoc! {"
        func small(x: u8[..9]) {
        }
        func f(y: u8) {
            small(y)
        }
    "});
    assert_eq!(
        kind,
        CheckErrorKind::UnprovenPrecondition {
            callee: "small".to_string(),
            cond: "x: u8[0..9]".to_string(),
        }
    );
}

#[test]
fn postconditions_bound_call_results() {
    accept(indoc! {"
        func min(a: u16, b: u16) -> u16, post result <= a, post result <= b {
            if a < b {
                return a
            }
            return b
        }

        func get(t: [8]u8, k: u16) -> u8 {
            var i: u16 = min(k, 7)
            return t[i]
        }
    "});
}

#[test]
fn postcondition_must_hold_at_return() {
    let (kind, at) = reject(indoc! {"
        func f(a: u16) -> u16, post result < a {
            return a
        }
    "});
    assert_eq!(
        kind,
        CheckErrorKind::UnprovenAssertion {
            cond: "result < a".to_string()
        }
    );
    assert_eq!(at, (2, 5));
}

#[test]
fn effectful_call_must_be_outermost() {
    let (kind, _) = reject(indoc! {"
        struct cursor(pos: u32)

        func cursor.advance() -> u32 {
            return 1
        }

        func f(c: ptr cursor) -> u32 {
            return c.advance() + 1
        }
    "});
    assert_eq!(
        kind,
        CheckErrorKind::NestedEffect {
            callee: "advance".to_string()
        }
    );
}

#[test]
fn effects_forget_field_facts() {
    let cursor = indoc! {"
        struct cursor(pos: u32)

        func cursor.reset() {
            this.pos = 0
        }
    "};
    accept(&format!(
        "{cursor}func f(c: ptr cursor), pre c.pos < 10 {{ assert c.pos < 10; }};"
    ));
    let tm = TokenMap::new();
    let source = format!(
        "{cursor}func f(c: ptr cursor), pre c.pos < 10 {{ c.reset(); assert c.pos < 10; }};"
    );
    let error = verify_sources(&tm, &[(TEST_FILE, &source)]).unwrap_err();
    assert!(error.ends_with("check error: cannot prove c.pos < 10"), "{error}");
}

#[test]
fn element_writes_forget_aliased_fields() {
    let program = |write: &str| {
        format!(
            "struct header(f: u8, g: u8)\n\n\
             func f(p: ptr header, q: ptr header, a: ptr [4]header, v: header) {{\n\
             \x20   if p.f < 5 {{\n\
             \x20       {write}\n\
             \x20       p.f = p.f + 250\n\
             \x20   }}\n\
             }}\n"
        )
    };
    accept(&program("a[0].g = 255"));
    for write in ["q.f = 255", "a[0].f = 255", "a[1] = v", "q = v"] {
        let tm = TokenMap::new();
        let source = program(write);
        let error = verify_sources(&tm, &[(TEST_FILE, &source)]).unwrap_err();
        let expected = "p.f + 250 may overflow: computed [250, 505], but u8 only holds [0, 255]";
        assert!(error.ends_with(expected), "after `{write}`: {error}");
    }
}

#[test]
fn loop_element_writes_forget_aliased_fields() {
    let program = |write: &str| {
        format!(
            "struct header(f: u8)\n\n\
             func f(p: ptr header, q: ptr header, a: ptr [4]header, b: ptr [4]u8, v: header, \
             n: u32) {{\n\
             \x20   if p.f < 5 {{\n\
             \x20       var i: u32 = 0\n\
             \x20       while i < n {{\n\
             \x20           var x: u8 = p.f + 250\n\
             \x20           {write}\n\
             \x20           i += 1\n\
             \x20       }}\n\
             \x20   }}\n\
             }}\n"
        )
    };
    accept(&program("b[0] = 7"));
    for write in ["a[0] = v", "q = v", "q.f = 1"] {
        let (kind, _) = reject(&program(write));
        assert!(
            matches!(kind, CheckErrorKind::PossibleOverflow { .. }),
            "after `{write}`: {kind:?}"
        );
    }
}

#[test]
fn slices_stay_within_their_base() {
    accept(indoc! {"
        func f(s: []u8, i: u64, j: u64) -> u64, pre i <= j, pre j <= s.len() {
            var t: []u8 = s[i..j]
            return t.len()
        }
    "});
    accept(indoc! {"
        func f(s: []u8) -> u8, pre s.len() == 8 {
            var t: []u8 = s[2..6]
            var u: []u8 = t[1..]
            var x: u8 = t[3]
            return u[2]
        }
    "});

    let (kind, _) = reject(indoc! {"
        func f(s: []u8) -> u8, pre s.len() == 8 {
            var t: []u8 = s[2..6]
            return t[4]
        }
    "});
    let CheckErrorKind::PossibleOutOfBounds { expr, length, .. } = kind else {
        panic!("expected an out-of-bounds error, got {kind:?}");
    };
    assert_eq!(expr, "t[4]");
    assert_eq!(length, Interval::singleton(4));

    let program = |slice: &str| {
        format!(
            "func f(s: []u8), pre s.len() == 4 {{ var t: []u8 = {slice}; assert t.len() == 1; }};"
        )
    };
    accept(&program("s[3..]"));
    for slice in ["s[2..1]", "s[..5]"] {
        let (kind, _) = reject(&program(slice));
        let CheckErrorKind::PossibleOutOfBounds { expr, .. } = kind else {
            panic!("expected an out-of-bounds error for {slice}, got {kind:?}");
        };
        assert_eq!(expr, slice);
    }
}

#[test]
fn wrapping_arithmetic_never_overflows() {
    accept("func f(x: u8) -> u8 { return x ~+ 1; };");
    accept("func f(x: u8) -> u8 { return x ~- 200; };");
    // Exact while the result fits, the whole type once it may wrap.
    accept("func f(x: u8[..9]) -> u8 { return (x ~+ 1) + 245; };");
    let (kind, _) = reject("func f(x: u8[..9]) -> u8 { return (x ~+ 1) + 246; };");
    assert!(matches!(kind, CheckErrorKind::PossibleOverflow { .. }));
    let (kind, _) = reject("func f(x: u8) -> u8 { return (x ~+ 1) + 1; };");
    let CheckErrorKind::PossibleOverflow { bound, .. } = kind else {
        panic!("expected an overflow, got {kind:?}");
    };
    assert_eq!(bound, Interval::new(1, 256));
    let (kind, _) = reject("func f() -> u8 { return 1 ~+ 2; };");
    assert!(matches!(kind, CheckErrorKind::TypeMismatch { .. }));
}

#[test]
fn accepted_program_is_order_independent() {
    let pick = (
        "pick.ward",
        "func pick(s: []u8, i: u64) -> u8, pre i < s.len() { return s[i]; };",
    );
    let first = (
        "first.ward",
        "const N = 4; func first(s: []u8) -> u8, pre s.len() > N { return pick(s, N); };",
    );
    let render = |sources: &[(&str, &str)]| {
        let tm = TokenMap::new();
        let program = verify_sources(&tm, sources).unwrap();
        let ctx = Context { tm: &tm };
        program
            .files
            .iter()
            .map(|file| format!("{}\n{}", file.source.name(), tree::file(&ctx, file, false)))
            .collect::<Vec<_>>()
    };
    let forward = render(&[pick, first]);
    assert_eq!(forward, render(&[first, pick]));
    assert!(forward[0].starts_with("first.ward"));
}

#[test]
fn first_check_error_is_order_independent() {
    let a = ("a.ward", "func f(x: u8) -> u8 { return x + 1; };");
    let b = ("b.ward", "func g(s: []u8) -> u8 { return s[0]; };");
    let forward = verify_sources(&TokenMap::new(), &[a, b]).unwrap_err();
    assert_eq!(forward, verify_sources(&TokenMap::new(), &[b, a]).unwrap_err());
    assert!(forward.starts_with("a.ward:1:30: check error: x + 1 may overflow"), "{forward}");
}

#[test]
fn missing_return_at_closing_brace() {
    let (kind, at) = reject(indoc! {"
        func f(x: u8) -> u8 {
            if x > 1 {
                return 1
            }
        }
    "});
    assert_eq!(
        kind,
        CheckErrorKind::MissingReturn {
            name: "f".to_string()
        }
    );
    assert_eq!(at, (5, 1));
}

#[test]
fn parameters_and_constants_are_immutable() {
    let (kind, _) = reject("func f(x: u8) { x = 1; };");
    assert_eq!(
        kind,
        CheckErrorKind::InvalidAssignment {
            target: "x".to_string(),
            reason: "parameters are immutable",
        }
    );
    let (kind, _) = reject("const N = 1; func f() { N = 2; };");
    assert_eq!(
        kind,
        CheckErrorKind::InvalidAssignment {
            target: "N".to_string(),
            reason: "constants are immutable",
        }
    );
}

#[test]
fn divisor_must_be_nonzero() {
    let (kind, _) = reject("func f(a: u8, b: u8) -> u8 { return a / b; };");
    assert_eq!(
        kind,
        CheckErrorKind::PossibleDivisionByZero {
            expr: "a / b".to_string(),
            bound: Interval::new(0, 255),
        }
    );
    accept("func f(a: u8, b: u8) -> u8, pre b != 0 { return a / b; };");
}

#[test]
fn comparisons_chain_through_facts() {
    accept("func f(s: []u8, n: u64, i: u64) -> u8, pre n <= s.len(), pre i < n { return s[i]; };");
}

#[test]
fn result_only_in_postconditions() {
    let (kind, at) = reject("func f() -> u8 { return result; };");
    assert_eq!(
        kind,
        CheckErrorKind::UnresolvedName {
            name: "result".to_string()
        }
    );
    assert_eq!(at, (1, 25));
}

#[test]
fn uninitialised_variable_needs_zero() {
    let (kind, _) = reject("func f() { var x: u8[1..]; };");
    let CheckErrorKind::PossibleOverflow { expr, .. } = kind else {
        panic!("expected an overflow error, got {kind:?}");
    };
    assert_eq!(expr, "x (zero)");
}

#[test]
fn return_type_must_match() {
    let (kind, _) = reject("func f(x: u8) -> bool { return x; };");
    assert!(matches!(kind, CheckErrorKind::TypeMismatch { .. }));
}

#[test]
fn assuming_twice_changes_nothing() {
    let tm = TokenMap::new();
    let files = parse_all(&tm, &[(TEST_FILE, "func f(i: u32, n: u32) {};")]);
    let symbols = symbols::build(&tm, &files).unwrap();
    let Decl::Func(func) = &files[0].decls[0] else {
        panic!("expected a function");
    };
    let mut checker = Checker::new(&tm, &symbols, &files[0].source);
    checker.scope = Scope::for_func(func, &symbols.funcs[&FuncKey::of(func)]);

    let cond_source = SourceFile::new("cond.ward", b"i < n and n <= 100");
    let tokens = lexer::tokenize(&tm, &cond_source).unwrap();
    let cond = parser::parse_expr(&tm, &cond_source, &tokens).unwrap();
    let cond = checker
        .expr(&cond, &Facts::default(), Mode::Proof, false)
        .unwrap()
        .expr;

    let mut once = Facts::default();
    checker.assume(&cond, None, &mut once);
    assert!(checker.prove(&cond, None, &once));
    let mut twice = once.clone();
    checker.assume(&cond, None, &mut twice);
    assert_eq!(once, twice);
}

#[test]
fn parallel_and_sequential_agree() {
    let sources = [
        (
            "b.ward",
            "func g(s: []u8) -> u8, pre s.len() > 2 { return s[2]; };",
        ),
        ("a.ward", "const K = 3; func f(x: u8) -> u8, pre x < K { return x + 1; };"),
    ];
    let render = |parallel| {
        let tm = TokenMap::new();
        let files = parse_all(&tm, &sources);
        let program = verify_with(&tm, files, &VerifyOptions { parallel }).unwrap();
        let ctx = Context { tm: &tm };
        program
            .files
            .iter()
            .map(|file| format!("{}\n{}", file.source.name(), tree::file(&ctx, file, false)))
            .collect::<Vec<_>>()
    };
    let parallel = render(true);
    assert_eq!(parallel, render(false));
    assert!(parallel[0].starts_with("a.ward"));
}

proptest! {
    #[test]
    fn offset_fits_iff_bound_allows(c in 0u32..=254, k in 0u32..=255) {
        let source = format!("func f(x: u8) -> u8, pre x <= {c} {{ return x + {k}; }};");
        let result = verify_sources(&TokenMap::new(), &[(TEST_FILE, &source)]);
        prop_assert_eq!(result.is_ok(), c + k <= 255);
        if let Err(error) = result {
            prop_assert!(error.contains("may overflow"), "{}", error);
        }
    }

    #[test]
    fn arithmetic_is_accepted_iff_no_execution_overflows(
        op in prop::sample::select(&["+", "-", "*", "/", "%", "<<"][..]),
        x in small_range(),
        y in small_range(),
    ) {
        let source = format!(
            "func f(x: u8[{}..{}], y: u8[{}..{}]) -> u8 {{ return x {op} y; }};",
            x.0, x.1, y.0, y.1
        );
        let result = verify_sources(&TokenMap::new(), &[(TEST_FILE, &source)]);
        let safe = (x.0..=x.1).all(|a| {
            (y.0..=y.1).all(|b| run(op, a, b).is_some_and(|v| (0..=255).contains(&v)))
        });
        prop_assert_eq!(result.is_ok(), safe, "{}: {:?}", source, result.err());
    }

    #[test]
    fn indexing_is_accepted_iff_no_execution_is_out_of_bounds(
        len in 1u8..=12,
        i in small_range(),
        j in small_range(),
    ) {
        let index = format!(
            "func f(a: [{len}]u8, i: u8[{}..{}]) -> u8 {{ return a[i]; }};",
            i.0, i.1
        );
        let result = verify_sources(&TokenMap::new(), &[(TEST_FILE, &index)]);
        prop_assert_eq!(result.is_ok(), i.1 < len, "{}", index);

        let slice = format!(
            "func f(a: [{len}]u8, i: u8[{}..{}], j: u8[{}..{}]) {{ var t: []u8 = a[i..j]; }};",
            i.0, i.1, j.0, j.1
        );
        let result = verify_sources(&TokenMap::new(), &[(TEST_FILE, &slice)]);
        let safe = (i.0..=i.1).all(|lo| (j.0..=j.1).all(|hi| lo <= hi && hi <= len));
        prop_assert_eq!(result.is_ok(), safe, "{}", slice);
    }

    #[test]
    fn merged_branches_are_accepted_iff_no_execution_overflows(
        c in 1u8..=255,
        k in 0u8..=255,
        d in 0u8..=255,
    ) {
        let source = format!(
            "func f(x: u8) -> u8 {{ var y: u8 = 0; \
             if x < {c} {{ y = x; }} else {{ y = {k}; }}; \
             return y + {d}; }};"
        );
        let result = verify_sources(&TokenMap::new(), &[(TEST_FILE, &source)]);
        let safe = (0..=255u8).all(|x| {
            let y = if x < c { x } else { k };
            u16::from(y) + u16::from(d) <= 255
        });
        prop_assert_eq!(result.is_ok(), safe, "{}", source);
    }
}

/// An inclusive range of `u8` values, kept small so that every execution can
/// be enumerated.
fn small_range() -> impl Strategy<Value = (u8, u8)> {
    (0u8..=40, 0u8..=24).prop_map(|(lo, width)| (lo, lo + width))
}

/// Executes `a op b` on unbounded integers. `None` where the operation traps.
fn run(op: &str, a: u8, b: u8) -> Option<i128> {
    let (a, b) = (i128::from(a), i128::from(b));
    match op {
        "+" => Some(a + b),
        "-" => Some(a - b),
        "*" => Some(a * b),
        "/" => (b != 0).then(|| a / b),
        "%" => (b != 0).then(|| a % b),
        "<<" => (b < 8).then(|| a << b),
        _ => unreachable!("unknown operator {op}"),
    }
}
