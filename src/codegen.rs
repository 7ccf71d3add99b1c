//! The contract between the front end and a code generator.
//!
//! Generators live outside this crate. They receive only programs the
//! verifier accepted, so every index and arithmetic operation in the typed
//! AST may be emitted without runtime checks.

use crate::{util::intern::TokenMap, verifier::VerifiedProgram};

pub trait Generator {
    type Error;

    /// Emits the decoder package named `package` for `program`. Names in the
    /// program are resolved through `tm`.
    fn generate(
        &self,
        package: &str,
        tm: &TokenMap,
        program: &VerifiedProgram,
    ) -> Result<Vec<u8>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        ast::Decl,
        util::{
            fmt::{Context, Show},
            test_utils::verify_sources,
        },
    };

    /// Lists the package's functions with their signatures.
    struct Listing;

    impl Generator for Listing {
        type Error = std::fmt::Error;

        fn generate(
            &self,
            package: &str,
            tm: &TokenMap,
            program: &VerifiedProgram,
        ) -> Result<Vec<u8>, Self::Error> {
            let ctx = Context { tm };
            let mut out = format!("package {package}\n");
            for file in &program.files {
                for decl in &file.decls {
                    let Decl::Func(func) = decl else {
                        continue;
                    };
                    write!(out, "{}", func.name.display(&ctx))?;
                    if let Some(ret) = &func.ret {
                        write!(out, " -> {}", ret.display(&ctx))?;
                    }
                    writeln!(out)?;
                }
            }
            Ok(out.into_bytes())
        }
    }

    #[test]
    fn generator_sees_canonical_order() {
        let tm = TokenMap::new();
        let program = verify_sources(
            &tm,
            &[
                ("png.ward", "func chunk() -> u32 { return 0; };"),
                ("header.ward", "func magic() -> u8 { return 137; };"),
            ],
        )
        .unwrap();
        let bytes = Listing.generate("png", &tm, &program).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            indoc! {"
                package png
                magic -> u8
                chunk -> u32
            "}
        );
    }
}
