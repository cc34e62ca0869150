//! Attribute descriptors: the discriminated union at the heart of the
//! schema model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The function used to compute a missing attribute's default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "func", rename_all = "lowercase")]
pub enum DefaultSpec {
    Uuid,
    Now,
    Literal { args: serde_json::Value },
}

/// Options every leaf (scalar or `Set`) descriptor carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AttributeOptions {
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultSpec>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "enum")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl AttributeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_default(mut self, default: DefaultSpec) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: Vec<serde_json::Value>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// A node in an attribute tree: a discriminated union, not open
/// inheritance. The diff walker (`tridb-diff`) dispatches on this tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AttributeDescriptor {
    Id {
        options: AttributeOptions,
    },
    String {
        options: AttributeOptions,
    },
    Number {
        options: AttributeOptions,
    },
    Boolean {
        options: AttributeOptions,
    },
    Date {
        options: AttributeOptions,
    },
    Set {
        item: Box<AttributeDescriptor>,
        options: AttributeOptions,
    },
    Record {
        fields: BTreeMap<String, AttributeDescriptor>,
    },
    Optional {
        inner: Box<AttributeDescriptor>,
    },
}

impl AttributeDescriptor {
    pub fn id() -> Self {
        AttributeDescriptor::Id {
            options: AttributeOptions::new(),
        }
    }

    pub fn string() -> Self {
        AttributeDescriptor::String {
            options: AttributeOptions::new(),
        }
    }

    pub fn number() -> Self {
        AttributeDescriptor::Number {
            options: AttributeOptions::new(),
        }
    }

    pub fn boolean() -> Self {
        AttributeDescriptor::Boolean {
            options: AttributeOptions::new(),
        }
    }

    pub fn date() -> Self {
        AttributeDescriptor::Date {
            options: AttributeOptions::new(),
        }
    }

    pub fn set(item: AttributeDescriptor) -> Self {
        AttributeDescriptor::Set {
            item: Box::new(item),
            options: AttributeOptions::new(),
        }
    }

    pub fn record(fields: BTreeMap<String, AttributeDescriptor>) -> Self {
        AttributeDescriptor::Record { fields }
    }

    /// Wrap `self` as optional. Panics if already `Optional` — double-wrapping
    /// a descriptor is a builder error, not a representable schema state.
    pub fn optional(self) -> Self {
        assert!(
            !matches!(self, AttributeDescriptor::Optional { .. }),
            "descriptor is already optional"
        );
        AttributeDescriptor::Optional {
            inner: Box::new(self),
        }
    }

    /// Attach or replace the leaf/Set options. No-op-safe on `Record`
    /// (returns `self` unchanged) since records have no options of their own.
    pub fn with_options(self, options: AttributeOptions) -> Self {
        match self {
            AttributeDescriptor::Id { .. } => AttributeDescriptor::Id { options },
            AttributeDescriptor::String { .. } => AttributeDescriptor::String { options },
            AttributeDescriptor::Number { .. } => AttributeDescriptor::Number { options },
            AttributeDescriptor::Boolean { .. } => AttributeDescriptor::Boolean { options },
            AttributeDescriptor::Date { .. } => AttributeDescriptor::Date { options },
            AttributeDescriptor::Set { item, .. } => AttributeDescriptor::Set { item, options },
            other @ AttributeDescriptor::Record { .. } => other,
            AttributeDescriptor::Optional { inner } => {
                AttributeDescriptor::Optional {
                    inner: Box::new(inner.with_options(options)),
                }
            }
        }
    }

    /// True iff this descriptor (at its outermost layer) is `Optional`.
    pub fn is_optional(&self) -> bool {
        matches!(self, AttributeDescriptor::Optional { .. })
    }

    /// Strip any `Optional` wrapper, returning the underlying descriptor.
    pub fn unwrap_optional(&self) -> &AttributeDescriptor {
        match self {
            AttributeDescriptor::Optional { inner } => inner.unwrap_optional(),
            other => other,
        }
    }

    /// A stable tag for the descriptor's base type, ignoring `Optional`.
    /// Used by the diff engine to detect `changes.type`.
    pub fn type_tag(&self) -> &'static str {
        match self.unwrap_optional() {
            AttributeDescriptor::Id { .. } => "id",
            AttributeDescriptor::String { .. } => "string",
            AttributeDescriptor::Number { .. } => "number",
            AttributeDescriptor::Boolean { .. } => "boolean",
            AttributeDescriptor::Date { .. } => "date",
            AttributeDescriptor::Set { .. } => "set",
            AttributeDescriptor::Record { .. } => "record",
            AttributeDescriptor::Optional { .. } => unreachable!("unwrap_optional strips this"),
        }
    }

    /// Options of the base (non-`Optional`) descriptor, if it's a leaf or
    /// `Set`. `None` for `Record`.
    pub fn options(&self) -> Option<&AttributeOptions> {
        match self.unwrap_optional() {
            AttributeDescriptor::Id { options }
            | AttributeDescriptor::String { options }
            | AttributeDescriptor::Number { options }
            | AttributeDescriptor::Boolean { options }
            | AttributeDescriptor::Date { options }
            | AttributeDescriptor::Set { options, .. } => Some(options),
            AttributeDescriptor::Record { .. } => None,
            AttributeDescriptor::Optional { .. } => unreachable!("unwrap_optional strips this"),
        }
    }

    /// The item descriptor of a `Set`, if this (modulo `Optional`) is one.
    pub fn set_item(&self) -> Option<&AttributeDescriptor> {
        match self.unwrap_optional() {
            AttributeDescriptor::Set { item, .. } => Some(item),
            _ => None,
        }
    }

    /// The field map of a `Record`, if this (modulo `Optional`) is one.
    pub fn record_fields(&self) -> Option<&BTreeMap<String, AttributeDescriptor>> {
        match self.unwrap_optional() {
            AttributeDescriptor::Record { fields } => Some(fields),
            _ => None,
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.options().map(|o| o.nullable).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_ignores_optional_wrapper() {
        let a = AttributeDescriptor::string();
        let b = AttributeDescriptor::string().optional();
        assert_eq!(a.type_tag(), "string");
        assert_eq!(b.type_tag(), "string");
        assert!(!a.is_optional());
        assert!(b.is_optional());
    }

    #[test]
    fn set_item_descriptor_is_reachable() {
        let set = AttributeDescriptor::set(AttributeDescriptor::boolean());
        assert_eq!(set.set_item().unwrap().type_tag(), "boolean");
    }

    #[test]
    fn record_has_no_options() {
        let record = AttributeDescriptor::record(BTreeMap::new());
        assert!(record.options().is_none());
    }

    #[test]
    fn with_options_threads_through_optional_wrapper() {
        let descriptor = AttributeDescriptor::string()
            .optional()
            .with_options(AttributeOptions::new().nullable(true));
        assert!(descriptor.is_optional());
        assert!(descriptor.is_nullable());
    }

    #[test]
    #[should_panic(expected = "already optional")]
    fn double_optional_panics() {
        AttributeDescriptor::string().optional().optional();
    }
}
