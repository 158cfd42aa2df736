//! Math method translation. All of these are static host methods, so the
//! receiver is always absent.

use crate::ast::{Method, RoundingMode};
use crate::sql::{SqlExpr, StoreType};
use crate::translate::{MethodTranslator, int_const};

pub struct MathMethods;

impl MethodTranslator for MathMethods {
    fn translate(
        &self,
        receiver: Option<&SqlExpr>,
        method: Method,
        args: &[SqlExpr],
    ) -> Option<SqlExpr> {
        if receiver.is_some() {
            return None;
        }
        match (method, args) {
            (Method::Abs, [x]) => Some(passthrough("ABS", x)),
            (Method::Ceiling, [x]) => Some(passthrough("CEIL", x)),
            (Method::Floor, [x]) => Some(passthrough("FLOOR", x)),
            (Method::Max, [a, b]) => Some(SqlExpr::func(
                "GREATEST",
                vec![a.clone(), b.clone()],
                a.store_type().or_else(|| b.store_type()),
            )),
            (Method::Min, [a, b]) => Some(SqlExpr::func(
                "LEAST",
                vec![a.clone(), b.clone()],
                a.store_type().or_else(|| b.store_type()),
            )),
            (Method::Log, [x]) => Some(SqlExpr::func(
                "LN",
                vec![x.clone()],
                Some(StoreType::Float64),
            )),
            (Method::Log, [x, base]) => Some(SqlExpr::func(
                "LOG",
                vec![x.clone(), base.clone()],
                Some(StoreType::Float64),
            )),
            (Method::Log10, [x]) => Some(SqlExpr::func(
                "LOG10",
                vec![x.clone()],
                Some(StoreType::Float64),
            )),
            (Method::Round, [x]) => Some(passthrough("ROUND", x)),
            (Method::Round, [x, digits]) => Some(SqlExpr::func(
                "ROUND",
                vec![x.clone(), digits.clone()],
                x.store_type(),
            )),
            // The dialect's ROUND is half-away-from-zero. Only that mode
            // translates; the mode argument itself is dropped.
            (Method::RoundWithMode, [x, mode]) if is_away_from_zero(mode) => {
                Some(passthrough("ROUND", x))
            }
            (Method::RoundWithMode, [x, digits, mode]) if is_away_from_zero(mode) => {
                Some(SqlExpr::func(
                    "ROUND",
                    vec![x.clone(), digits.clone()],
                    x.store_type(),
                ))
            }
            _ => None,
        }
    }
}

fn passthrough(name: &str, x: &SqlExpr) -> SqlExpr {
    SqlExpr::func(name, vec![x.clone()], x.store_type())
}

fn is_away_from_zero(mode: &SqlExpr) -> bool {
    int_const(mode).and_then(RoundingMode::from_ordinal) == Some(RoundingMode::AwayFromZero)
}

#[cfg(test)]
mod tests {
    use crate::ast::{Method, QueryExpr, RoundingMode};
    use crate::sql::StoreType;
    use crate::to_sql::sql_string;
    use crate::translate::Translator;

    fn price() -> QueryExpr {
        QueryExpr::column("Price", StoreType::Float64, false)
    }

    fn mode(m: RoundingMode) -> QueryExpr {
        QueryExpr::constant(m as i64)
    }

    #[test]
    fn plain_round_forms() {
        let t = Translator::new();
        let s = t
            .translate(&QueryExpr::call_static(Method::Round, vec![price()]))
            .unwrap();
        assert_eq!(sql_string(&s), "ROUND(Price)");
        let s = t
            .translate(&QueryExpr::call_static(
                Method::Round,
                vec![price(), QueryExpr::constant(2i64)],
            ))
            .unwrap();
        assert_eq!(sql_string(&s), "ROUND(Price, 2)");
    }

    #[test]
    fn away_from_zero_strips_the_mode() {
        let t = Translator::new();
        let s = t
            .translate(&QueryExpr::call_static(
                Method::RoundWithMode,
                vec![price(), QueryExpr::constant(2i64), mode(RoundingMode::AwayFromZero)],
            ))
            .unwrap();
        assert_eq!(sql_string(&s), "ROUND(Price, 2)");
    }

    #[test]
    fn other_rounding_modes_decline() {
        let t = Translator::new();
        for m in [
            RoundingMode::ToEven,
            RoundingMode::ToZero,
            RoundingMode::ToNegativeInfinity,
            RoundingMode::ToPositiveInfinity,
        ] {
            let r = t.translate(&QueryExpr::call_static(
                Method::RoundWithMode,
                vec![price(), mode(m)],
            ));
            assert!(r.is_err(), "mode {m:?} should not translate");
        }
    }

    #[test]
    fn log_family() {
        let t = Translator::new();
        let s = t
            .translate(&QueryExpr::call_static(Method::Log, vec![price()]))
            .unwrap();
        assert_eq!(sql_string(&s), "IF(Price <= 0, CAST('NaN' AS FLOAT64), LN(Price))");
        let s = t
            .translate(&QueryExpr::call_static(Method::Max, vec![price(), QueryExpr::constant(1.0f64)]))
            .unwrap();
        assert_eq!(sql_string(&s), "GREATEST(Price, 1.0)");
    }
}
