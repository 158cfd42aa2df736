//! JSON property access translation.
//!
//! A property read on a JSON-typed expression becomes JSON_VALUE with a
//! JSONPath. Plain identifiers use dot paths; anything with dots,
//! whitespace or quotes switches to a bracket path with the quote
//! characters escaped inside the path itself. Single quotes are left for
//! the literal renderer, which escapes them when it quotes the path
//! string.

use crate::ast::{Member, Method};
use crate::sql::{SqlExpr, StoreType};
use crate::translate::{MemberTranslator, MethodTranslator, str_const};

pub struct JsonMembers;

impl MemberTranslator for JsonMembers {
    fn translate(&self, receiver: &SqlExpr, member: &Member) -> Option<SqlExpr> {
        let Member::Json { name, store_type } = member else {
            return None;
        };
        if receiver.store_type() != Some(StoreType::Json) {
            return None;
        }
        Some(json_value(receiver, name, store_type.as_ref()))
    }
}

pub struct JsonMethods;

impl MethodTranslator for JsonMethods {
    fn translate(
        &self,
        receiver: Option<&SqlExpr>,
        method: Method,
        args: &[SqlExpr],
    ) -> Option<SqlExpr> {
        match (receiver, method, args) {
            (Some(r), Method::GetJsonProperty, [name])
                if r.store_type() == Some(StoreType::Json) =>
            {
                // Only constant property names have a static path.
                let name = str_const(name)?.to_owned();
                Some(json_value(r, &name, None))
            }
            _ => None,
        }
    }
}

fn json_value(receiver: &SqlExpr, name: &str, store_type: Option<&StoreType>) -> SqlExpr {
    // JSON_VALUE is NULL for a missing property even when the document
    // itself is not NULL, so it is nullable in its own right.
    let extraction = SqlExpr::func_with_nullability(
        "JSON_VALUE",
        vec![receiver.clone(), json_path(name).into()],
        true,
        vec![true, true],
        Some(StoreType::String),
    );
    match store_type {
        Some(StoreType::Date) => SqlExpr::cast(extraction, StoreType::Date),
        _ => extraction,
    }
}

fn json_path(name: &str) -> String {
    let needs_brackets = name
        .chars()
        .any(|c| c == '.' || c == '\'' || c == '"' || c.is_whitespace());
    if !needs_brackets {
        return format!("$.{name}");
    }
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '\\' || c == '"' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("$[\"{escaped}\"]")
}

#[cfg(test)]
mod tests {
    use super::json_path;
    use crate::ast::{Member, Method, QueryExpr};
    use crate::sql::StoreType;
    use crate::to_sql::sql_string;
    use crate::translate::Translator;

    fn attrs() -> QueryExpr {
        QueryExpr::column("Attrs", StoreType::Json, true)
    }

    fn json_member(name: &str, store_type: Option<StoreType>) -> QueryExpr {
        QueryExpr::member(
            attrs(),
            Member::Json {
                name: name.into(),
                store_type,
            },
        )
    }

    fn translate(expr: QueryExpr) -> String {
        sql_string(&Translator::new().translate(&expr).unwrap())
    }

    #[test]
    fn plain_names_use_dot_paths() {
        let s = translate(json_member("Color", Some(StoreType::String)));
        assert_eq!(s, "JSON_VALUE(Attrs, '$.Color')");
    }

    #[test]
    fn awkward_names_use_bracket_paths() {
        assert_eq!(json_path("a.b"), r#"$["a.b"]"#);
        assert_eq!(json_path("spaced out"), r#"$["spaced out"]"#);
        assert_eq!(json_path(r#"say "hi""#), r#"$["say \"hi\""]"#);

        // The single quote survives to the renderer, which escapes it
        // inside the quoted path literal.
        let s = translate(json_member("it's", Some(StoreType::String)));
        assert_eq!(s, r#"JSON_VALUE(Attrs, '$["it\'s"]')"#);
    }

    #[test]
    fn date_members_are_cast() {
        let s = translate(json_member("Born", Some(StoreType::Date)));
        assert_eq!(s, "CAST(JSON_VALUE(Attrs, '$.Born') AS DATE)");
    }

    #[test]
    fn method_form_requires_a_constant_name() {
        let t = Translator::new();
        let ok = QueryExpr::call(
            attrs(),
            Method::GetJsonProperty,
            vec![QueryExpr::constant("Color")],
        );
        assert_eq!(
            sql_string(&t.translate(&ok).unwrap()),
            "JSON_VALUE(Attrs, '$.Color')"
        );

        let dynamic = QueryExpr::call(
            attrs(),
            Method::GetJsonProperty,
            vec![QueryExpr::parameter("name", Some(StoreType::String))],
        );
        assert!(t.translate(&dynamic).is_err());
    }

    #[test]
    fn non_json_receivers_decline() {
        let t = Translator::new();
        let not_json = QueryExpr::member(
            QueryExpr::column("Name", StoreType::String, true),
            Member::Json {
                name: "x".into(),
                store_type: None,
            },
        );
        assert!(t.translate(&not_json).is_err());
    }
}
