//! Triple values (`V`): scalars plus the set-membership
//! boolean, represented as JSON so the same wire type covers every
//! attribute kind the schema can describe.

use serde_json::Value as JsonValue;

/// A triple's value. A thin alias over `serde_json::Value` — the schema
/// layer (`tridb-schema`), not this type, is responsible for knowing which
/// JSON shape is valid at a given path.
pub type Value = JsonValue;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_is_plain_json() {
        let v: Value = json!({"a": 1});
        assert_eq!(v["a"], 1);
    }
}
