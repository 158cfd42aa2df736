//! Array and list translation: element counts and membership tests.

use crate::ast::{Member, Method};
use crate::sql::{ContainsExpr, SqlExpr, StoreType};
use crate::translate::{MemberTranslator, MethodTranslator};

pub struct ArrayMethods;

impl MethodTranslator for ArrayMethods {
    fn translate(
        &self,
        receiver: Option<&SqlExpr>,
        method: Method,
        args: &[SqlExpr],
    ) -> Option<SqlExpr> {
        let (values, item) = match (receiver, method, args) {
            (Some(list), Method::CollectionContains, [item]) => (list, item),
            (None, Method::CollectionContains, [collection, item]) => (collection, item),
            _ => return None,
        };
        if !is_collection(values) {
            return None;
        }
        Some(SqlExpr::Contains(ContainsExpr {
            item: Box::new(item.clone()),
            values: Box::new(values.clone()),
            negated: false,
        }))
    }
}

/// Array-shaped, or unmapped (a bound collection parameter with no store
/// type of its own). A scalar-typed expression is somebody else's
/// Contains.
fn is_collection(expr: &SqlExpr) -> bool {
    match expr.store_type() {
        Some(StoreType::Array(_)) | None => true,
        Some(_) => false,
    }
}

pub struct ArrayMembers;

impl MemberTranslator for ArrayMembers {
    fn translate(&self, receiver: &SqlExpr, member: &Member) -> Option<SqlExpr> {
        if *member != Member::Count {
            return None;
        }
        match receiver.store_type() {
            Some(StoreType::Array(_)) => Some(SqlExpr::func(
                "ARRAY_LENGTH",
                vec![receiver.clone()],
                Some(StoreType::Int64),
            )),
            _ => None,
        }
    }
}
