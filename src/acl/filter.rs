//! Structural AND-merging of query filters.
//!
//! Nothing here evaluates a query. Conflicting constraints on one field are left in
//! place; the storage layer matching nothing is the correct result for them.

use serde_json::{Map, Value};

use super::model::{Query, ID_FIELD};

pub const AND_OPERATOR: &str = "$and";

fn present(q: Option<&Query>) -> Option<&Query> {
    q.filter(|m| !m.is_empty())
}

/// AND two optional filters. `None` when neither restricts anything.
pub fn combine_opt(user: Option<&Query>, acl: Option<&Query>) -> Option<Query> {
    match (present(user), present(acl)) {
        (None, None) => None,
        (Some(q), None) | (None, Some(q)) => Some(q.clone()),
        (Some(u), Some(a)) => {
            let mut out = Map::new();
            // ACL term last so it stays visible in logs and audits
            out.insert(AND_OPERATOR.into(), Value::Array(vec![Value::Object(u.clone()), Value::Object(a.clone())]));
            Some(out)
        }
    }
}

/// AND a caller query with an ACL filter; an empty query matches everything.
pub fn combine(user: Option<&Query>, acl: Option<&Query>) -> Query {
    combine_opt(user, acl).unwrap_or_default()
}

/// Left fold of `combine` over any number of optional terms.
pub fn combine_all<'a, I>(terms: I) -> Query
where
    I: IntoIterator<Item = Option<&'a Query>>,
{
    terms
        .into_iter()
        .fold(None, |acc: Option<Query>, t| combine_opt(acc.as_ref(), t))
        .unwrap_or_default()
}

/// `{field: value}` equality term.
pub fn field_equals(field: &str, value: impl Into<Value>) -> Query {
    let mut m = Map::new();
    m.insert(field.to_string(), value.into());
    m
}

pub fn id_equals(id: &str) -> Query {
    field_equals(ID_FIELD, id)
}
