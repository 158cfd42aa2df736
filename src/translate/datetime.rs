//! Date and timestamp translation.
//!
//! The receiver's store type picks the function family: DATE columns get
//! DATE_ADD and bare EXTRACT, TIMESTAMP columns get TIMESTAMP_ADD and an
//! EXTRACT pinned to the '+0' zone. A method that does not exist for the
//! receiver's family (hours on a DATE, years on a TIMESTAMP) declines.

use crate::ast::{Member, Method};
use crate::sql::{
    BinaryOp, DatePart, ExtractExpr, IntervalExpr, IntervalUnit, SqlExpr, StoreType,
};
use crate::translate::{MemberTranslator, MethodTranslator, int_const};

pub struct DateTimeMethods;

impl MethodTranslator for DateTimeMethods {
    fn translate(
        &self,
        receiver: Option<&SqlExpr>,
        method: Method,
        args: &[SqlExpr],
    ) -> Option<SqlExpr> {
        let (r, amount) = match (receiver, args) {
            (Some(r), [amount]) => (r, amount),
            _ => return None,
        };
        match (r.store_type()?, method) {
            (StoreType::Date, Method::AddYears) => date_add(r, amount, IntervalUnit::Year),
            (StoreType::Date, Method::AddMonths) => date_add(r, amount, IntervalUnit::Month),
            (StoreType::Date, Method::AddDays) => date_add(r, amount, IntervalUnit::Day),
            (StoreType::Timestamp, Method::AddDays) => ts_add(r, amount, IntervalUnit::Day),
            (StoreType::Timestamp, Method::AddHours) => ts_add(r, amount, IntervalUnit::Hour),
            (StoreType::Timestamp, Method::AddMinutes) => ts_add(r, amount, IntervalUnit::Minute),
            (StoreType::Timestamp, Method::AddSeconds) => ts_add(r, amount, IntervalUnit::Second),
            (StoreType::Timestamp, Method::AddMilliseconds) => {
                ts_add(r, amount, IntervalUnit::Millisecond)
            }
            (StoreType::Timestamp, Method::AddTicks) => {
                // One tick is 100ns.
                let nanos = match int_const(amount) {
                    Some(n) => (n * 100).into(),
                    None => SqlExpr::binary(BinaryOp::Mul, amount.clone(), 100i64.into()),
                };
                ts_add_interval(r, nanos, IntervalUnit::Nanosecond)
            }
            _ => None,
        }
    }
}

fn date_add(value: &SqlExpr, amount: &SqlExpr, unit: IntervalUnit) -> Option<SqlExpr> {
    Some(SqlExpr::func(
        "DATE_ADD",
        vec![value.clone(), interval(amount, unit)],
        Some(StoreType::Date),
    ))
}

fn ts_add(value: &SqlExpr, amount: &SqlExpr, unit: IntervalUnit) -> Option<SqlExpr> {
    ts_add_interval(value, integral(amount), unit)
}

fn ts_add_interval(value: &SqlExpr, count: SqlExpr, unit: IntervalUnit) -> Option<SqlExpr> {
    Some(SqlExpr::func(
        "TIMESTAMP_ADD",
        vec![
            value.clone(),
            SqlExpr::Interval(IntervalExpr {
                count: Box::new(count),
                unit,
            }),
        ],
        Some(StoreType::Timestamp),
    ))
}

fn interval(amount: &SqlExpr, unit: IntervalUnit) -> SqlExpr {
    SqlExpr::Interval(IntervalExpr {
        count: Box::new(integral(amount)),
        unit,
    })
}

/// INTERVAL counts must be INT64; the host passes f64 for several of the
/// Add methods.
fn integral(amount: &SqlExpr) -> SqlExpr {
    match amount.store_type() {
        Some(StoreType::Float64) => SqlExpr::cast(amount.clone(), StoreType::Int64),
        _ => amount.clone(),
    }
}

pub struct DateTimeMembers;

impl MemberTranslator for DateTimeMembers {
    fn translate(&self, receiver: &SqlExpr, member: &Member) -> Option<SqlExpr> {
        let ty = receiver.store_type()?;
        let is_ts = match ty {
            StoreType::Timestamp => true,
            StoreType::Date => false,
            _ => return None,
        };
        let part = match (member, is_ts) {
            (Member::Year, _) => DatePart::Year,
            (Member::Month, _) => DatePart::Month,
            (Member::Day, _) => DatePart::Day,
            (Member::DayOfYear, _) => DatePart::DayOfYear,
            (Member::DayOfWeek, _) => DatePart::DayOfWeek,
            (Member::Hour, true) => DatePart::Hour,
            (Member::Minute, true) => DatePart::Minute,
            (Member::Second, true) => DatePart::Second,
            (Member::Millisecond, true) => DatePart::Millisecond,
            (Member::Date, true) => DatePart::Date,
            // The calendar date of a DATE is the value itself.
            (Member::Date, false) => return Some(receiver.clone()),
            _ => return None,
        };
        let extract = SqlExpr::Extract(ExtractExpr {
            part,
            value: Box::new(receiver.clone()),
            at_time_zone: is_ts.then(|| "+0".to_owned()),
        });
        Some(if part == DatePart::DayOfWeek {
            // Dialect weekdays are 1-based starting Sunday; the host counts
            // from 0.
            SqlExpr::binary(BinaryOp::Sub, extract, 1i64.into())
        } else {
            extract
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Member, Method, QueryExpr};
    use crate::sql::StoreType;
    use crate::to_sql::sql_string;
    use crate::translate::Translator;

    fn birthday() -> QueryExpr {
        QueryExpr::column("Birthday", StoreType::Date, true)
    }

    fn created_at() -> QueryExpr {
        QueryExpr::column("CreatedAt", StoreType::Timestamp, false)
    }

    fn translate(expr: QueryExpr) -> String {
        sql_string(&Translator::new().translate(&expr).unwrap())
    }

    #[test]
    fn date_add_units() {
        let s = translate(QueryExpr::call(
            birthday(),
            Method::AddDays,
            vec![QueryExpr::constant(7i64)],
        ));
        assert_eq!(s, "DATE_ADD(Birthday, INTERVAL 7 DAY)");
        let s = translate(QueryExpr::call(
            birthday(),
            Method::AddYears,
            vec![QueryExpr::constant(1i64)],
        ));
        assert_eq!(s, "DATE_ADD(Birthday, INTERVAL 1 YEAR)");
    }

    #[test]
    fn timestamp_add_units() {
        let s = translate(QueryExpr::call(
            created_at(),
            Method::AddMinutes,
            vec![QueryExpr::constant(30i64)],
        ));
        assert_eq!(s, "TIMESTAMP_ADD(CreatedAt, INTERVAL 30 MINUTE)");
    }

    #[test]
    fn float_amounts_are_cast() {
        let s = translate(QueryExpr::call(
            created_at(),
            Method::AddSeconds,
            vec![QueryExpr::constant(1.5f64)],
        ));
        assert_eq!(s, "TIMESTAMP_ADD(CreatedAt, INTERVAL CAST(1.5 AS INT64) SECOND)");
    }

    #[test]
    fn ticks_scale_to_nanoseconds() {
        let s = translate(QueryExpr::call(
            created_at(),
            Method::AddTicks,
            vec![QueryExpr::constant(5i64)],
        ));
        assert_eq!(s, "TIMESTAMP_ADD(CreatedAt, INTERVAL 500 NANOSECOND)");
        let s = translate(QueryExpr::call(
            created_at(),
            Method::AddTicks,
            vec![QueryExpr::parameter("ticks", Some(StoreType::Int64))],
        ));
        assert_eq!(s, "TIMESTAMP_ADD(CreatedAt, INTERVAL @ticks * 100 NANOSECOND)");
    }

    #[test]
    fn family_mismatches_decline() {
        let t = Translator::new();
        assert!(t
            .translate(&QueryExpr::call(
                birthday(),
                Method::AddHours,
                vec![QueryExpr::constant(1i64)],
            ))
            .is_err());
        assert!(t
            .translate(&QueryExpr::call(
                created_at(),
                Method::AddYears,
                vec![QueryExpr::constant(1i64)],
            ))
            .is_err());
    }

    #[test]
    fn member_extraction() {
        let s = translate(QueryExpr::member(birthday(), Member::Year));
        assert_eq!(s, "EXTRACT(YEAR FROM Birthday)");

        let s = translate(QueryExpr::member(created_at(), Member::Year));
        assert_eq!(
            s,
            "EXTRACT(YEAR FROM CAST(CreatedAt AS TIMESTAMP) AT TIME ZONE '+0')"
        );

        let s = translate(QueryExpr::member(birthday(), Member::DayOfWeek));
        assert_eq!(s, "EXTRACT(DAYOFWEEK FROM Birthday) - 1");

        let s = translate(QueryExpr::member(created_at(), Member::Date));
        assert_eq!(
            s,
            "EXTRACT(DATE FROM CAST(CreatedAt AS TIMESTAMP) AT TIME ZONE '+0')"
        );
    }

    #[test]
    fn hour_on_a_date_declines() {
        let t = Translator::new();
        assert!(t
            .translate(&QueryExpr::member(birthday(), Member::Hour))
            .is_err());
    }
}
