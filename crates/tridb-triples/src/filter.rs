//! Filter evaluator (C7): nested boolean predicate trees over timestamped
//! entities, and the write-rule predicates collections attach to their
//! schema.
//!
//! A predicate is either a literal boolean, a leaf `[path, op, value]`
//! triple, or a boolean combinator (`and`/`or`/`not`) over other
//! predicates. `value` may reference a `$`-prefixed session variable,
//! resolved against a [`Variables`] scope before comparison.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tridb_errors::{Result, TdbError, TdbErrorKind};

/// A shared, mutable `$variable -> value` scope. Subscriptions snapshot it
/// at subscribe time; `Db::update_variables` mutates the shared map for
/// everyone else.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    inner: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.read().expect("variables lock poisoned").get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.inner
            .write()
            .expect("variables lock poisoned")
            .insert(name.into(), value);
    }

    /// A point-in-time copy, independent of further mutation.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.read().expect("variables lock poisoned").clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Nin,
    Has,
    NotHas,
    Like,
}

impl FilterOp {
    fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "=" => FilterOp::Eq,
            "!=" => FilterOp::Ne,
            "<" => FilterOp::Lt,
            "<=" => FilterOp::Le,
            ">" => FilterOp::Gt,
            ">=" => FilterOp::Ge,
            "in" => FilterOp::In,
            "nin" => FilterOp::Nin,
            "has" => FilterOp::Has,
            "!has" => FilterOp::NotHas,
            "like" => FilterOp::Like,
            other => {
                return Err(TdbError::new(TdbErrorKind::InvalidSchema)
                    .with_op("filter::parse_op")
                    .with_message(format!("unknown filter operator '{other}'")))
            }
        })
    }
}

#[derive(Debug, Clone)]
pub enum Predicate {
    Literal(bool),
    Leaf {
        path: Vec<String>,
        op: FilterOp,
        value: Value,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Parse the opaque JSON shape write rules and query filters use.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(Predicate::Literal(*b)),
            Value::Array(items) if items.len() == 3 => {
                let path = parse_path(&items[0])?;
                let op = FilterOp::parse(items[1].as_str().ok_or_else(|| {
                    TdbError::new(TdbErrorKind::InvalidSchema)
                        .with_op("filter::parse")
                        .with_message("operator must be a string")
                })?)?;
                Ok(Predicate::Leaf {
                    path,
                    op,
                    value: items[2].clone(),
                })
            }
            Value::Object(obj) => {
                if let Some(and) = obj.get("and") {
                    return Ok(Predicate::And(parse_list(and)?));
                }
                if let Some(or) = obj.get("or") {
                    return Ok(Predicate::Or(parse_list(or)?));
                }
                if let Some(not) = obj.get("not") {
                    return Ok(Predicate::Not(Box::new(Predicate::parse(not)?)));
                }
                Err(TdbError::new(TdbErrorKind::InvalidSchema)
                    .with_op("filter::parse")
                    .with_message("expected 'and'/'or'/'not' combinator"))
            }
            other => Err(TdbError::new(TdbErrorKind::InvalidSchema)
                .with_op("filter::parse")
                .with_message(format!("cannot parse predicate from {other}"))),
        }
    }

    /// Evaluate against `resolve`, a lookup from (collection-relative)
    /// field path to the entity's current value there (`None` for a
    /// missing path, compared as JSON `null`).
    pub fn evaluate(&self, resolve: &dyn Fn(&[String]) -> Option<Value>, variables: &Variables) -> Result<bool> {
        match self {
            Predicate::Literal(b) => Ok(*b),
            Predicate::And(items) => {
                for item in items {
                    if !item.evaluate(resolve, variables)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(items) => {
                for item in items {
                    if item.evaluate(resolve, variables)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Not(inner) => Ok(!inner.evaluate(resolve, variables)?),
            Predicate::Leaf { path, op, value } => {
                let resolved_rhs = resolve_variable(value, variables)?;
                let lhs = resolve(path).unwrap_or(Value::Null);
                Ok(compare(&lhs, *op, &resolved_rhs))
            }
        }
    }
}

/// Evaluate all rules in `predicates` as an implicit AND; an empty list is
/// vacuously true (no rule configured for the collection).
pub fn evaluate_all(
    predicates: &[Predicate],
    resolve: &dyn Fn(&[String]) -> Option<Value>,
    variables: &Variables,
) -> Result<bool> {
    for predicate in predicates {
        if !predicate.evaluate(resolve, variables)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn parse_list(value: &Value) -> Result<Vec<Predicate>> {
    value
        .as_array()
        .ok_or_else(|| {
            TdbError::new(TdbErrorKind::InvalidSchema)
                .with_op("filter::parse_list")
                .with_message("expected an array of predicates")
        })?
        .iter()
        .map(Predicate::parse)
        .collect()
}

fn parse_path(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str().map(|s| s.to_string()).ok_or_else(|| {
                    TdbError::new(TdbErrorKind::InvalidSchema)
                        .with_op("filter::parse_path")
                        .with_message("path segments must be strings")
                })
            })
            .collect(),
        other => Err(TdbError::new(TdbErrorKind::InvalidSchema)
            .with_op("filter::parse_path")
            .with_message(format!("cannot parse path from {other}"))),
    }
}

fn resolve_variable(value: &Value, variables: &Variables) -> Result<Value> {
    if let Value::String(s) = value {
        if let Some(name) = s.strip_prefix('$') {
            return variables.get(name).ok_or_else(|| {
                TdbError::new(TdbErrorKind::SessionVariableNotFound)
                    .with_op("filter::resolve_variable")
                    .with_message(format!("no binding for '${name}'"))
            });
        }
    }
    Ok(value.clone())
}

fn compare(lhs: &Value, op: FilterOp, rhs: &Value) -> bool {
    match op {
        FilterOp::Eq => lhs == rhs,
        FilterOp::Ne => lhs != rhs,
        FilterOp::Lt => numeric_cmp(lhs, rhs).map(|o| o.is_lt()).unwrap_or(false),
        FilterOp::Le => numeric_cmp(lhs, rhs).map(|o| o.is_le()).unwrap_or(false),
        FilterOp::Gt => numeric_cmp(lhs, rhs).map(|o| o.is_gt()).unwrap_or(false),
        FilterOp::Ge => numeric_cmp(lhs, rhs).map(|o| o.is_ge()).unwrap_or(false),
        FilterOp::In => rhs.as_array().map(|items| items.contains(lhs)).unwrap_or(false),
        FilterOp::Nin => !rhs.as_array().map(|items| items.contains(lhs)).unwrap_or(false),
        FilterOp::Has => lhs.as_array().map(|items| items.contains(rhs)).unwrap_or(false),
        FilterOp::NotHas => !lhs.as_array().map(|items| items.contains(rhs)).unwrap_or(false),
        FilterOp::Like => match (lhs.as_str(), rhs.as_str()) {
            (Some(l), Some(r)) => l.contains(r),
            _ => false,
        },
    }
}

fn numeric_cmp(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver(doc: &Value) -> impl Fn(&[String]) -> Option<Value> + '_ {
        move |path: &[String]| {
            let mut current = doc;
            for segment in path {
                current = current.get(segment)?;
            }
            Some(current.clone())
        }
    }

    #[test]
    fn literal_false_always_fails() {
        let predicate = Predicate::parse(&json!(false)).unwrap();
        let doc = json!({});
        assert!(!predicate.evaluate(&resolver(&doc), &Variables::new()).unwrap());
    }

    #[test]
    fn leaf_equality_against_missing_path_compares_as_null() {
        let predicate = Predicate::parse(&json!(["name", "=", Value::Null])).unwrap();
        let doc = json!({});
        assert!(predicate.evaluate(&resolver(&doc), &Variables::new()).unwrap());
    }

    #[test]
    fn variable_reference_resolves_from_scope() {
        let variables = Variables::new();
        variables.set("minAge", json!(18));
        let predicate = Predicate::parse(&json!(["age", ">=", "$minAge"])).unwrap();
        let doc = json!({ "age": 21 });
        assert!(predicate.evaluate(&resolver(&doc), &variables).unwrap());
    }

    #[test]
    fn unresolved_variable_is_an_error() {
        let predicate = Predicate::parse(&json!(["age", ">=", "$minAge"])).unwrap();
        let doc = json!({ "age": 21 });
        let err = predicate
            .evaluate(&resolver(&doc), &Variables::new())
            .unwrap_err();
        assert_eq!(err.kind(), TdbErrorKind::SessionVariableNotFound);
    }

    #[test]
    fn has_checks_set_membership() {
        let predicate = Predicate::parse(&json!(["tags", "has", "admin"])).unwrap();
        let doc = json!({ "tags": ["admin", "beta"] });
        assert!(predicate.evaluate(&resolver(&doc), &Variables::new()).unwrap());
    }

    #[test]
    fn and_combinator_requires_every_branch() {
        let predicate = Predicate::parse(&json!({ "and": [true, false] })).unwrap();
        let doc = json!({});
        assert!(!predicate.evaluate(&resolver(&doc), &Variables::new()).unwrap());
    }
}
