//! Attribute expressions
//!
//! A declared attribute is either a literal, a reference to another
//! resource's attribute (`${type.name.attribute}`), or a list of those.

use crate::model::ResourceAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to one attribute of another resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub address: ResourceAddress,
    pub attribute: String,
}

impl Reference {
    pub fn new(address: ResourceAddress, attribute: impl Into<String>) -> Self {
        Self {
            address,
            attribute: attribute.into(),
        }
    }

    /// Parse `${type.name.attribute}`. Anything else is not a reference.
    pub fn parse_interpolation(s: &str) -> Option<Self> {
        let inner = s.strip_prefix("${")?.strip_suffix('}')?;
        let mut parts = inner.splitn(3, '.');
        let resource_type = parts.next()?;
        let name = parts.next()?;
        let attribute = parts.next()?;
        let address: ResourceAddress = format!("{}.{}", resource_type, name).parse().ok()?;
        if attribute.is_empty() || attribute.contains('.') {
            return None;
        }
        Some(Self::new(address, attribute))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.address, self.attribute)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(serde_json::Value),
    Ref(Reference),
    List(Vec<Expr>),
}

impl Expr {
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn reference(address: ResourceAddress, attribute: impl Into<String>) -> Self {
        Expr::Ref(Reference::new(address, attribute))
    }

    /// All references contained in this expression, depth first.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ref(r) => out.push(r),
            Expr::List(items) => items.iter().for_each(|i| i.collect_references(out)),
        }
    }

    /// Resolve against a lookup. Returns `None` when any reference is unknown.
    pub fn resolve<F>(&self, lookup: &F) -> Option<serde_json::Value>
    where
        F: Fn(&Reference) -> Option<serde_json::Value>,
    {
        match self {
            Expr::Literal(v) => Some(v.clone()),
            Expr::Ref(r) => lookup(r),
            Expr::List(items) => items
                .iter()
                .map(|i| i.resolve(lookup))
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Ref(r) => write!(f, "{}", r),
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_interpolation() {
        let r = Reference::parse_interpolation("${vpc.main.id}").unwrap();
        assert_eq!(r.address, ResourceAddress::new("vpc", "main"));
        assert_eq!(r.attribute, "id");

        assert!(Reference::parse_interpolation("vpc.main.id").is_none());
        assert!(Reference::parse_interpolation("${vpc.main}").is_none());
        assert!(Reference::parse_interpolation("prefix-${vpc.main.id}").is_none());
    }

    #[test]
    fn test_resolve_list_with_unknown() {
        let expr = Expr::List(vec![
            Expr::literal("a"),
            Expr::reference(ResourceAddress::new("subnet", "a"), "id"),
        ]);
        assert_eq!(expr.references().len(), 1);

        let known = expr.resolve(&|_| Some(json!("subnet-1")));
        assert_eq!(known, Some(json!(["a", "subnet-1"])));

        let unknown = expr.resolve(&|_| None);
        assert_eq!(unknown, None);
    }
}
