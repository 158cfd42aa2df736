//! String method translation.
//!
//! The host's string indexes are 0-based while SUBSTR and STRPOS are
//! 1-based, so starts gain a `+ 1` and search results lose one. Constant
//! starts are folded at translation time; anything else becomes an
//! arithmetic node.

use crate::ast::Method;
use crate::sql::{BinaryOp, SqlExpr, StoreType};
use crate::translate::{MethodTranslator, int_const};
use crate::value::Value;

pub struct StringMethods;

impl MethodTranslator for StringMethods {
    fn translate(
        &self,
        receiver: Option<&SqlExpr>,
        method: Method,
        args: &[SqlExpr],
    ) -> Option<SqlExpr> {
        match (receiver, method, args) {
            (Some(r), Method::Contains, [needle]) => Some(SqlExpr::binary(
                BinaryOp::Gt,
                strpos(r, needle),
                0i64.into(),
            )),
            (Some(r), Method::StartsWith, [prefix]) => Some(SqlExpr::func(
                "STARTS_WITH",
                vec![r.clone(), prefix.clone()],
                Some(StoreType::Bool),
            )),
            (Some(r), Method::EndsWith, [suffix]) => Some(SqlExpr::func(
                "ENDS_WITH",
                vec![r.clone(), suffix.clone()],
                Some(StoreType::Bool),
            )),
            (Some(r), Method::IndexOf, [needle]) => Some(SqlExpr::binary(
                BinaryOp::Sub,
                strpos(r, needle),
                1i64.into(),
            )),
            (Some(r), Method::Substring, [start]) => Some(SqlExpr::func(
                "SUBSTR",
                vec![r.clone(), one_based(start)],
                Some(StoreType::String),
            )),
            (Some(r), Method::Substring, [start, len]) => Some(SqlExpr::func(
                "SUBSTR",
                vec![r.clone(), one_based(start), len.clone()],
                Some(StoreType::String),
            )),
            (Some(r), Method::Replace, [from, to]) => Some(SqlExpr::func(
                "REPLACE",
                vec![r.clone(), from.clone(), to.clone()],
                Some(StoreType::String),
            )),
            (Some(r), Method::ToUpper, []) => {
                Some(SqlExpr::func("UPPER", vec![r.clone()], Some(StoreType::String)))
            }
            (Some(r), Method::ToLower, []) => {
                Some(SqlExpr::func("LOWER", vec![r.clone()], Some(StoreType::String)))
            }
            (Some(r), Method::Trim, []) => {
                Some(SqlExpr::func("TRIM", vec![r.clone()], Some(StoreType::String)))
            }
            (Some(r), Method::Trim, [chars]) => Some(SqlExpr::func(
                "TRIM",
                vec![r.clone(), chars.clone()],
                Some(StoreType::String),
            )),
            (Some(r), Method::TrimStart, []) => {
                Some(SqlExpr::func("LTRIM", vec![r.clone()], Some(StoreType::String)))
            }
            (Some(r), Method::TrimStart, [chars]) => Some(SqlExpr::func(
                "LTRIM",
                vec![r.clone(), chars.clone()],
                Some(StoreType::String),
            )),
            (Some(r), Method::TrimEnd, []) => {
                Some(SqlExpr::func("RTRIM", vec![r.clone()], Some(StoreType::String)))
            }
            (Some(r), Method::TrimEnd, [chars]) => Some(SqlExpr::func(
                "RTRIM",
                vec![r.clone(), chars.clone()],
                Some(StoreType::String),
            )),
            (Some(r), Method::PadLeft, rest @ ([_] | [_, _])) => {
                let mut args = vec![r.clone()];
                args.extend(rest.iter().cloned());
                Some(SqlExpr::func("LPAD", args, Some(StoreType::String)))
            }
            (Some(r), Method::PadRight, rest @ ([_] | [_, _])) => {
                let mut args = vec![r.clone()];
                args.extend(rest.iter().cloned());
                Some(SqlExpr::func("RPAD", args, Some(StoreType::String)))
            }
            (None, Method::Concat, args) if (2..=4).contains(&args.len()) => Some(SqlExpr::func(
                "CONCAT",
                args.to_vec(),
                Some(StoreType::String),
            )),
            (None, Method::Join, [sep, values]) => Some(join(sep, values)),
            (None, Method::Format, args) if !args.is_empty() => Some(SqlExpr::func(
                "FORMAT",
                args.to_vec(),
                Some(StoreType::String),
            )),
            _ => None,
        }
    }
}

fn strpos(haystack: &SqlExpr, needle: &SqlExpr) -> SqlExpr {
    SqlExpr::func(
        "STRPOS",
        vec![haystack.clone(), needle.clone()],
        Some(StoreType::Int64),
    )
}

/// 0-based host index to 1-based SQL position.
fn one_based(start: &SqlExpr) -> SqlExpr {
    match int_const(start) {
        Some(n) => (n + 1).into(),
        None => SqlExpr::binary(BinaryOp::Add, start.clone(), 1i64.into()),
    }
}

/// `ARRAY_TO_STRING` treats a NULL separator as NULL output, which is not
/// what the host's Join does, so the separator is pinned to a string. NULL
/// elements render as ''.
fn join(sep: &SqlExpr, values: &SqlExpr) -> SqlExpr {
    let sep = match sep {
        SqlExpr::Constant(Value::Null, _) => "".into(),
        SqlExpr::Constant(Value::String(_), _) => sep.clone(),
        other => SqlExpr::func_with_nullability(
            "COALESCE",
            vec![other.clone(), "".into()],
            false,
            vec![false, false],
            Some(StoreType::String),
        ),
    };
    SqlExpr::func(
        "ARRAY_TO_STRING",
        vec![values.clone(), sep, "".into()],
        Some(StoreType::String),
    )
}

#[cfg(test)]
mod tests {
    use crate::ast::{Method, QueryExpr};
    use crate::sql::StoreType;
    use crate::to_sql::sql_string;
    use crate::translate::Translator;
    use crate::value::Value;

    fn name() -> QueryExpr {
        QueryExpr::column("Name", StoreType::String, true)
    }

    fn translate(expr: QueryExpr) -> String {
        sql_string(&Translator::new().translate(&expr).unwrap())
    }

    #[test]
    fn contains_lowers_to_strpos() {
        let s = translate(QueryExpr::call(
            name(),
            Method::Contains,
            vec![QueryExpr::constant("ab")],
        ));
        assert_eq!(s, "STRPOS(Name, 'ab') > 0");
    }

    #[test]
    fn index_of_shifts_to_zero_based() {
        let s = translate(QueryExpr::call(
            name(),
            Method::IndexOf,
            vec![QueryExpr::constant("x")],
        ));
        assert_eq!(s, "STRPOS(Name, 'x') - 1");
    }

    #[test]
    fn substring_shifts_to_one_based() {
        let s = translate(QueryExpr::call(
            name(),
            Method::Substring,
            vec![QueryExpr::constant(2i64), QueryExpr::constant(3i64)],
        ));
        assert_eq!(s, "SUBSTR(Name, 3, 3)");

        // A non-constant start keeps the shift in SQL.
        let s = translate(QueryExpr::call(
            name(),
            Method::Substring,
            vec![QueryExpr::parameter("start", Some(StoreType::Int64))],
        ));
        assert_eq!(s, "SUBSTR(Name, @start + 1)");
    }

    #[test]
    fn trim_family() {
        let s = translate(QueryExpr::call(name(), Method::Trim, vec![]));
        assert_eq!(s, "TRIM(Name)");
        let s = translate(QueryExpr::call(
            name(),
            Method::TrimStart,
            vec![QueryExpr::constant("-")],
        ));
        assert_eq!(s, "LTRIM(Name, '-')");
        let s = translate(QueryExpr::call(
            name(),
            Method::PadLeft,
            vec![QueryExpr::constant(8i64), QueryExpr::constant("0")],
        ));
        assert_eq!(s, "LPAD(Name, 8, '0')");
    }

    #[test]
    fn concat_accepts_two_to_four_args() {
        let args = |n: usize| (0..n).map(|i| QueryExpr::constant(format!("a{i}"))).collect();
        let t = Translator::new();
        assert!(t
            .translate(&QueryExpr::call_static(Method::Concat, args(2)))
            .is_ok());
        assert!(t
            .translate(&QueryExpr::call_static(Method::Concat, args(4)))
            .is_ok());
        assert!(t
            .translate(&QueryExpr::call_static(Method::Concat, args(5)))
            .is_err());
    }

    #[test]
    fn join_pins_the_separator() {
        let values = QueryExpr::parameter(
            "tags",
            Some(StoreType::Array(Box::new(StoreType::String))),
        );
        let s = translate(QueryExpr::call_static(
            Method::Join,
            vec![QueryExpr::constant(", "), values.clone()],
        ));
        assert_eq!(s, "ARRAY_TO_STRING(@tags, ', ', '')");

        let s = translate(QueryExpr::call_static(
            Method::Join,
            vec![QueryExpr::Constant(Value::Null, None), values.clone()],
        ));
        assert_eq!(s, "ARRAY_TO_STRING(@tags, '', '')");

        let s = translate(QueryExpr::call_static(
            Method::Join,
            vec![
                QueryExpr::parameter("sep", Some(StoreType::String)),
                values,
            ],
        ));
        assert_eq!(s, "ARRAY_TO_STRING(@tags, COALESCE(@sep, ''), '')");
    }
}
