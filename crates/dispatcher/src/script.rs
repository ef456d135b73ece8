//! Scripts run in the engine's debug context
use std::borrow::Cow;

/// A script to run with [`crate::Dispatcher::run_in_debug_context`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script<'a> {
    /// An expression or statement list, evaluated for its value
    Source(&'a str),
    /// The source of a function, which is invoked without arguments
    Function(&'a str),
}

impl Script<'_> {
    /// The source handed to the engine
    ///
    /// Scripts are evaluated as a parenthesised expression statement; a
    /// script that already ends in `);` is passed through untouched.
    pub fn normalize(&self) -> String {
        let source = match self {
            Script::Source(source) => Cow::Borrowed(*source),
            Script::Function(function) => Cow::Owned(format!("{function}()")),
        };

        if source.ends_with(");") {
            source.into_owned()
        } else {
            format!("({source});")
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::expression(Script::Source("1 + 1"), "(1 + 1);")]
    #[case::already_wrapped(Script::Source("(foo());"), "(foo());")]
    #[case::call_statement(Script::Source("bar(1);"), "bar(1);")]
    #[case::function(Script::Function("function () { return 1 }"), "(function () { return 1 }());")]
    #[case::trailing_semicolon(Script::Source("x;"), "(x;);")]
    fn normalize(#[case] script: Script<'_>, #[case] expected: &str) {
        assert_eq!(script.normalize(), expected);
    }
}
