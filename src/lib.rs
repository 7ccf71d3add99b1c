use rayon::prelude::*;

/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The verifier takes the untyped ASTs of a program, resolves and types them,
/// and proves every function safe, producing a typed program.
pub mod verifier;

/// What a code generator receives.
pub mod codegen;

pub mod ast;
pub mod error;
pub mod interval;
pub mod source;
pub mod token;
pub mod types;

pub mod util {
    pub mod fmt;
    pub mod intern;
    #[cfg(test)]
    pub(crate) mod test_utils;
}

pub use codegen::Generator;
pub use error::{CheckError, CheckErrorKind, Error, SyntaxError, SyntaxErrorKind};
pub use util::intern::TokenMap;
pub use verifier::{verify, verify_with, VerifiedProgram, VerifyOptions};

use crate::{
    ast::{File, Untyped},
    source::SourceFile,
};

/// Lexes and parses one compilation unit.
pub fn parse_source(tm: &TokenMap, name: &str, text: &[u8]) -> Result<File<Untyped>, SyntaxError> {
    let source = SourceFile::new(name, text);
    let tokens = lexer::tokenize(tm, &source)?;
    parser::parse(tm, &source, &tokens)
}

/// Lexes and parses every `(name, text)` unit on the rayon pool. Files come
/// back in input order; so does the error, which is the first one in that
/// order.
#[tracing::instrument(level = "debug", skip_all, fields(units = units.len()))]
pub fn parse_sources<S>(tm: &TokenMap, units: &[(S, S)]) -> Result<Vec<File<Untyped>>, SyntaxError>
where
    S: AsRef<str> + Sync,
{
    units
        .par_iter()
        .map(|(name, text)| parse_source(tm, name.as_ref(), text.as_ref().as_bytes()))
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_sources_keeps_input_order() {
        let tm = TokenMap::new();
        let units = [
            ("z.ward", "const Z = 1"),
            ("a.ward", "const A = 2"),
            ("m.ward", "struct m(x: u8)"),
        ];
        let files = parse_sources(&tm, &units).unwrap();
        let names: Vec<&str> = files.iter().map(|file| &**file.source.name()).collect();
        assert_eq!(names, ["z.ward", "a.ward", "m.ward"]);
    }

    #[test]
    fn parse_sources_reports_first_error() {
        let tm = TokenMap::new();
        let units = [
            ("a.ward", "const A = 1"),
            ("b.ward", "const B = $"),
            ("c.ward", "const C = \"open"),
        ];
        let error = parse_sources(&tm, &units).unwrap_err();
        assert_eq!(error.to_string(), "b.ward:1:11: syntax error: invalid character '$'");
    }

    #[test]
    fn whole_pipeline() {
        let tm = TokenMap::new();
        let files = parse_sources(
            &tm,
            &[(
                "cursor.ward",
                "func get(s: []u8, i: u64) -> u8, pre i < s.len() { return s[i]; };",
            )],
        )
        .unwrap();
        let program = verify(&tm, files).map_err(Error::from).unwrap();
        assert_eq!(program.symbols.funcs.len(), 1);
    }
}
