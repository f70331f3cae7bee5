//! `resource` node parsing

use crate::error::{CoreError, Result};
use crate::model::{Expr, Reference, ResourceAddress, ResourceSpec};
use kdl::{KdlNode, KdlValue};
use serde_json::Value;

/// Parse `resource "<type>" "<name>" { ... }`.
pub fn parse_resource(node: &KdlNode) -> Result<ResourceSpec> {
    let args: Vec<&str> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .collect();

    let [resource_type, name] = args.as_slice() else {
        return Err(CoreError::config(
            "resource requires a type and a name: resource \"<type>\" \"<name>\"",
        ));
    };
    let address: ResourceAddress = format!("{}.{}", resource_type, name).parse()?;
    let mut spec = ResourceSpec::new(address);

    let Some(children) = node.children() else {
        return Ok(spec);
    };

    for child in children.nodes() {
        match child.name().value() {
            "depends_on" | "depends-on" => {
                for entry in child.entries() {
                    let target = entry.value().as_string().ok_or_else(|| {
                        CoreError::config(format!(
                            "{}: depends_on expects resource addresses",
                            spec.address
                        ))
                    })?;
                    spec.depends_on.push(target.parse()?);
                }
            }
            "lifecycle" => {
                if let Some(flags) = child.children() {
                    for flag in flags.nodes() {
                        let value = flag.entries().first().and_then(|e| e.value().as_bool());
                        match (flag.name().value(), value) {
                            ("create_before_destroy" | "create-before-destroy", Some(v)) => {
                                spec.lifecycle.create_before_destroy = Some(v);
                            }
                            ("prevent_destroy" | "prevent-destroy", Some(v)) => {
                                spec.lifecycle.prevent_destroy = v;
                            }
                            (other, _) => {
                                return Err(CoreError::config(format!(
                                    "{}: invalid lifecycle setting '{}'",
                                    spec.address, other
                                )));
                            }
                        }
                    }
                }
            }
            attribute => {
                let expr = parse_attribute(&spec.address, child)?;
                if spec.attributes.insert(attribute.to_string(), expr).is_some() {
                    return Err(CoreError::config(format!(
                        "{}: attribute '{}' is set more than once",
                        spec.address, attribute
                    )));
                }
            }
        }
    }

    Ok(spec)
}

/// Attribute forms:
/// - `name value` is a scalar
/// - `name a b c` is a list
/// - `name key=value ...` is a map of literals
/// - `name { - a; - b; }` is a list, including single-item lists
fn parse_attribute(address: &ResourceAddress, node: &KdlNode) -> Result<Expr> {
    let name = node.name().value();
    let args: Vec<&KdlValue> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
        .collect();
    let props: Vec<(&str, &KdlValue)> = node
        .entries()
        .iter()
        .filter_map(|e| e.name().map(|n| (n.value(), e.value())))
        .collect();

    if !args.is_empty() && !props.is_empty() {
        return Err(CoreError::config(format!(
            "{}: attribute '{}' mixes values and properties",
            address, name
        )));
    }

    if !props.is_empty() {
        let mut map = serde_json::Map::new();
        for (key, value) in props {
            let value = kdl_to_json(value);
            if value.as_str().is_some_and(|s| Reference::parse_interpolation(s).is_some()) {
                return Err(CoreError::config(format!(
                    "{}: references are not supported inside map attribute '{}'",
                    address, name
                )));
            }
            map.insert(key.to_string(), value);
        }
        return Ok(Expr::Literal(Value::Object(map)));
    }

    match args.as_slice() {
        [] => match node.children() {
            Some(items) => items
                .nodes()
                .iter()
                .map(|item| {
                    let value = item.entries().first().map(|e| e.value());
                    match (item.name().value(), value) {
                        ("-", Some(v)) => Ok(value_to_expr(v)),
                        _ => Err(CoreError::config(format!(
                            "{}: list attribute '{}' expects `- <value>` items",
                            address, name
                        ))),
                    }
                })
                .collect::<Result<Vec<_>>>()
                .map(Expr::List),
            None => Err(CoreError::config(format!(
                "{}: attribute '{}' has no value",
                address, name
            ))),
        },
        [single] => Ok(value_to_expr(single)),
        many => Ok(Expr::List(many.iter().map(|v| value_to_expr(v)).collect())),
    }
}

fn value_to_expr(value: &KdlValue) -> Expr {
    if let Some(reference) = value.as_string().and_then(Reference::parse_interpolation) {
        return Expr::Ref(reference);
    }
    Expr::Literal(kdl_to_json(value))
}

fn kdl_to_json(value: &KdlValue) -> Value {
    if let Some(s) = value.as_string() {
        Value::from(s)
    } else if let Some(i) = value.as_integer() {
        Value::from(i as i64)
    } else if let Some(f) = value.as_float() {
        Value::from(f)
    } else if let Some(b) = value.as_bool() {
        Value::from(b)
    } else {
        Value::Null
    }
}
