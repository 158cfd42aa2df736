//! Regular-expression translation.
//!
//! The host's match test is a whole-string affair only when the caller
//! anchors the pattern, but REGEXP_CONTAINS searches anywhere. We inject
//! `^`/`$` around the pattern expression so the translated predicate keeps
//! the semantics the query was written against. The instance form carries
//! the pattern as the receiver, so its arguments swap into SQL order
//! (searched string first).

use crate::ast::Method;
use crate::sql::{BinaryOp, SqlExpr, StoreType};
use crate::translate::MethodTranslator;

pub struct RegexMethods;

impl MethodTranslator for RegexMethods {
    fn translate(
        &self,
        receiver: Option<&SqlExpr>,
        method: Method,
        args: &[SqlExpr],
    ) -> Option<SqlExpr> {
        match (receiver, method, args) {
            (Some(pattern), Method::RegexIsMatch, [input]) => Some(contains(input, pattern)),
            (None, Method::RegexIsMatch, [input, pattern]) => Some(contains(input, pattern)),
            (Some(pattern), Method::RegexReplace, [input, replacement]) => {
                Some(replace(input, pattern, replacement))
            }
            (None, Method::RegexReplace, [input, pattern, replacement]) => {
                Some(replace(input, pattern, replacement))
            }
            _ => None,
        }
    }
}

fn contains(input: &SqlExpr, pattern: &SqlExpr) -> SqlExpr {
    SqlExpr::func(
        "REGEXP_CONTAINS",
        vec![input.clone(), anchored(pattern)],
        Some(StoreType::Bool),
    )
}

fn replace(input: &SqlExpr, pattern: &SqlExpr, replacement: &SqlExpr) -> SqlExpr {
    SqlExpr::func(
        "REGEXP_REPLACE",
        vec![input.clone(), pattern.clone(), replacement.clone()],
        Some(StoreType::String),
    )
}

fn anchored(pattern: &SqlExpr) -> SqlExpr {
    SqlExpr::binary(
        BinaryOp::Concat,
        SqlExpr::binary(BinaryOp::Concat, "^".into(), pattern.clone()),
        "$".into(),
    )
}

#[cfg(test)]
mod tests {
    use crate::ast::{Method, QueryExpr};
    use crate::sql::StoreType;
    use crate::to_sql::sql_string;
    use crate::translate::Translator;

    fn name() -> QueryExpr {
        QueryExpr::column("Name", StoreType::String, true)
    }

    fn translate(expr: QueryExpr) -> String {
        sql_string(&Translator::new().translate(&expr).unwrap())
    }

    #[test]
    fn instance_match_swaps_and_anchors() {
        // regex.IsMatch(input): the receiver is the pattern.
        let s = translate(QueryExpr::call(
            QueryExpr::parameter("pat", Some(StoreType::String)),
            Method::RegexIsMatch,
            vec![name()],
        ));
        assert_eq!(s, "REGEXP_CONTAINS(Name, '^' || @pat || '$')");
    }

    #[test]
    fn static_match_keeps_argument_order() {
        let s = translate(QueryExpr::call_static(
            Method::RegexIsMatch,
            vec![name(), QueryExpr::constant("[0-9]+")],
        ));
        assert_eq!(s, "REGEXP_CONTAINS(Name, '^' || '[0-9]+' || '$')");
    }

    #[test]
    fn replace_does_not_anchor() {
        let s = translate(QueryExpr::call(
            QueryExpr::constant("a+"),
            Method::RegexReplace,
            vec![name(), QueryExpr::constant("b")],
        ));
        assert_eq!(s, "REGEXP_REPLACE(Name, 'a+', 'b')");

        let s = translate(QueryExpr::call_static(
            Method::RegexReplace,
            vec![name(), QueryExpr::constant("a+"), QueryExpr::constant("b")],
        ));
        assert_eq!(s, "REGEXP_REPLACE(Name, 'a+', 'b')");
    }
}
