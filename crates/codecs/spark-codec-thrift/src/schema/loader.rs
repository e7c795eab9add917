//! 从 TOML 声明加载 [`SchemaRegistry`]。
//!
//! ```toml
//! [[struct]]
//! name = "Work"
//! fields = [
//!   { id = 1, name = "num1", type = "i32" },
//!   { id = 4, name = "comment", type = "string", optional = true },
//! ]
//!
//! [[method]]
//! name = "calculate"
//! args = [ { id = 1, name = "logid", type = "i32" }, { id = 2, name = "w", type = "Work" } ]
//! result = [ { id = 0, name = "success", type = "i32" } ]
//! ```
//!
//! 类型写作 `bool`、`i8`、`i16`、`i32`、`i64`、`double`、`binary`、`string`、`uuid`、
//! `list<T>`、`set<T>`、`map<K, V>`，或已声明结构体的名字（声明顺序无关，不支持递归结构体）。

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::SchemaError;

use super::{FieldSchema, MethodSchema, SchemaRegistry, SchemaType, StructSchema};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFile {
    #[serde(default, rename = "struct")]
    structs: Vec<RawStruct>,
    #[serde(default, rename = "method")]
    methods: Vec<RawMethod>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStruct {
    name: String,
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMethod {
    name: String,
    #[serde(default)]
    args: Vec<RawField>,
    #[serde(default)]
    result: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    id: i16,
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    optional: bool,
}

struct Resolver<'r> {
    raw: HashMap<&'r str, &'r RawStruct>,
    done: HashMap<String, Arc<StructSchema>>,
    visiting: Vec<String>,
}

impl<'r> Resolver<'r> {
    fn new(structs: &'r [RawStruct]) -> Result<Self, SchemaError> {
        let mut raw = HashMap::with_capacity(structs.len());
        for item in structs {
            if raw.insert(item.name.as_str(), item).is_some() {
                return Err(SchemaError::DuplicateDefinition {
                    name: item.name.clone(),
                });
            }
        }
        Ok(Self {
            raw,
            done: HashMap::new(),
            visiting: Vec::new(),
        })
    }

    fn resolve(&mut self, name: &str) -> Result<Option<Arc<StructSchema>>, SchemaError> {
        if let Some(done) = self.done.get(name) {
            return Ok(Some(done.clone()));
        }
        let Some(raw) = self.raw.get(name).copied() else {
            return Ok(None);
        };
        if self.visiting.iter().any(|v| v == name) {
            return Err(SchemaError::RecursiveStruct {
                name: name.to_owned(),
            });
        }
        self.visiting.push(name.to_owned());
        let fields = self.fields(&raw.fields, name)?;
        self.visiting.pop();
        let schema = Arc::new(StructSchema::new(name, fields)?);
        self.done.insert(name.to_owned(), schema.clone());
        Ok(Some(schema))
    }

    fn fields(&mut self, raw: &[RawField], context: &str) -> Result<Vec<FieldSchema>, SchemaError> {
        raw.iter()
            .map(|field| {
                Ok(FieldSchema {
                    id: field.id,
                    name: Arc::from(field.name.as_str()),
                    ty: self.parse_type(&field.ty, context)?,
                    optional: field.optional,
                })
            })
            .collect()
    }

    fn parse_type(&mut self, expr: &str, context: &str) -> Result<SchemaType, SchemaError> {
        let expr = expr.trim();
        let unknown = || SchemaError::UnknownType {
            ty: expr.to_owned(),
            context: context.to_owned(),
        };
        let scalar = match expr {
            "bool" => Some(SchemaType::Bool),
            "i8" | "byte" => Some(SchemaType::I8),
            "i16" => Some(SchemaType::I16),
            "i32" => Some(SchemaType::I32),
            "i64" => Some(SchemaType::I64),
            "double" => Some(SchemaType::Double),
            "binary" => Some(SchemaType::Binary),
            "string" => Some(SchemaType::String),
            "uuid" => Some(SchemaType::Uuid),
            _ => None,
        };
        if let Some(scalar) = scalar {
            return Ok(scalar);
        }
        if let Some((outer, inner)) = split_generic(expr) {
            return match outer {
                "list" => Ok(SchemaType::List(Box::new(self.parse_type(inner, context)?))),
                "set" => Ok(SchemaType::Set(Box::new(self.parse_type(inner, context)?))),
                "map" => {
                    let (key, value) = split_top_level_comma(inner).ok_or_else(unknown)?;
                    Ok(SchemaType::Map(
                        Box::new(self.parse_type(key, context)?),
                        Box::new(self.parse_type(value, context)?),
                    ))
                }
                _ => Err(unknown()),
            };
        }
        match self.resolve(expr)? {
            Some(schema) => Ok(SchemaType::Struct(schema)),
            None => Err(unknown()),
        }
    }
}

/// `outer<inner>` → `(outer, inner)`。
fn split_generic(expr: &str) -> Option<(&str, &str)> {
    let open = expr.find('<')?;
    let inner = expr.strip_suffix('>')?.get(open + 1..)?;
    Some((expr[..open].trim(), inner))
}

fn split_top_level_comma(expr: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    for (idx, ch) in expr.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => return Some((&expr[..idx], &expr[idx + 1..])),
            _ => {}
        }
    }
    None
}

impl SchemaRegistry {
    /// 从 TOML 声明构建注册表。
    pub fn from_toml_str(text: &str) -> Result<Self, SchemaError> {
        let file: RawFile = toml::from_str(text)?;
        let mut resolver = Resolver::new(&file.structs)?;
        for item in &file.structs {
            resolver.resolve(&item.name)?;
        }
        let mut registry = SchemaRegistry::new();
        for method in &file.methods {
            let args_name = format!("{}_args", method.name);
            let result_name = format!("{}_result", method.name);
            let args = StructSchema::new(&args_name, resolver.fields(&method.args, &args_name)?)?;
            let result =
                StructSchema::new(&result_name, resolver.fields(&method.result, &result_name)?)?;
            registry.register(MethodSchema::new(&method.name, args, result))?;
        }
        tracing::debug!(methods = registry.len(), "loaded thrift schema registry");
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALCULATOR: &str = r#"
        [[method]]
        name = "calculate"
        args = [ { id = 1, name = "logid", type = "i32" }, { id = 2, name = "w", type = "Work" } ]
        result = [ { id = 0, name = "success", type = "i32" }, { id = 1, name = "ouch", type = "InvalidOperation" } ]

        [[struct]]
        name = "Work"
        fields = [
            { id = 1, name = "num1", type = "i32" },
            { id = 2, name = "num2", type = "i32" },
            { id = 4, name = "comment", type = "string", optional = true },
            { id = 5, name = "tags", type = "map<string, list<i64>>", optional = true },
        ]

        [[struct]]
        name = "InvalidOperation"
        fields = [ { id = 1, name = "whatOp", type = "i32" }, { id = 2, name = "why", type = "string" } ]
    "#;

    #[test]
    fn loads_methods_with_forward_struct_references() {
        let registry = SchemaRegistry::from_toml_str(CALCULATOR).unwrap();
        let method = registry.method("calculate").unwrap();
        let work = method.args().field(2).unwrap();
        let SchemaType::Struct(work) = &work.ty else {
            panic!("expected struct, got {:?}", work.ty);
        };
        assert_eq!(work.name(), "Work");
        assert_eq!(
            work.field(5).map(|f| &f.ty),
            Some(&SchemaType::Map(
                Box::new(SchemaType::String),
                Box::new(SchemaType::List(Box::new(SchemaType::I64)))
            ))
        );
        assert!(method.result().fields().iter().all(|f| f.optional));
        assert!(registry.method("Calculate").is_none(), "lookup is case-sensitive");
    }

    #[test]
    fn unknown_type_names_the_context() {
        let err = SchemaRegistry::from_toml_str(
            "[[method]]\nname = \"m\"\nargs = [ { id = 1, name = \"a\", type = \"Missing\" } ]\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnknownType { ref ty, ref context } if ty == "Missing" && context == "m_args"
        ));
    }

    #[test]
    fn recursive_structs_are_rejected() {
        let err = SchemaRegistry::from_toml_str(
            "[[struct]]\nname = \"Node\"\nfields = [ { id = 1, name = \"next\", type = \"list<Node>\" } ]\n",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::RecursiveStruct { .. }));
    }
}
