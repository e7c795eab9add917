//! Schema 驱动的结构体解码（sub-dissector 契约）。
//!
//! # 教案目的（Why）
//! - 调用方以声明式 [`StructSchema`] 描述方法的参数与结果，解码器据此给字段命名、
//!   校验类型，并在缺失必填字段时报错；
//! - Schema 只读、可跨线程共享（`Arc`），注册表按大小写敏感的方法名索引。
//!
//! # 匹配规则（What）
//! - 以 Schema 游标做顺序敏感匹配：先从游标向后查找字段 id，命中则游标前移，
//!   跳过的可选字段静默忽略；
//! - 在游标之前命中（乱序到达）只产生 [`ErrorKind::WrongFieldId`] 诊断；
//! - Schema 未声明的 id 退回通用解码，仅影响该字段；
//! - 线上类型与声明不符是 [`ErrorKind::WrongType`]；
//! - Stop 之前未出现的必填字段是 [`ErrorKind::StructFieldNotInSequence`]；
//! - 开启 `try_generic_if_schema_fails` 时，整个结构体回滚游标与日志后以通用方式重解一次。

mod exception;
pub mod loader;

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{Diagnostic, ErrorKind, SchemaError, ThriftError};
use crate::generic::{self, Shape};
use crate::header;
use crate::outcome::{DecodeOutcome, DecodeResult, ready};
use crate::reader::{DecodeContext, DecodeCursor};
use crate::sink::Label;
use crate::types::TypeTag;
use crate::value::{Field, Value};

pub use exception::{
    ApplicationException, ApplicationExceptionType, application_exception_schema,
};

/// 声明类型。
#[derive(Clone, Debug, PartialEq)]
pub enum SchemaType {
    /// 布尔。
    Bool,
    /// 8 位整数。
    I8,
    /// 16 位整数。
    I16,
    /// 32 位整数。
    I32,
    /// 64 位整数。
    I64,
    /// 64 位浮点。
    Double,
    /// 字节串。
    Binary,
    /// UTF-8 字符串（线上与 `Binary` 相同，额外校验编码）。
    String,
    /// UUID。
    Uuid,
    /// 列表。
    List(Box<SchemaType>),
    /// 集合。
    Set(Box<SchemaType>),
    /// 映射。
    Map(Box<SchemaType>, Box<SchemaType>),
    /// 嵌套结构体。
    Struct(Arc<StructSchema>),
}

impl SchemaType {
    /// 对应的线上类型标签。
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        match self {
            SchemaType::Bool => TypeTag::Bool,
            SchemaType::I8 => TypeTag::I8,
            SchemaType::I16 => TypeTag::I16,
            SchemaType::I32 => TypeTag::I32,
            SchemaType::I64 => TypeTag::I64,
            SchemaType::Double => TypeTag::Double,
            SchemaType::Binary | SchemaType::String => TypeTag::Binary,
            SchemaType::Uuid => TypeTag::Uuid,
            SchemaType::List(_) => TypeTag::List,
            SchemaType::Set(_) => TypeTag::Set,
            SchemaType::Map(..) => TypeTag::Map,
            SchemaType::Struct(_) => TypeTag::Struct,
        }
    }
}

/// 字段声明。
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSchema {
    /// 字段 id。
    pub id: i16,
    /// 字段名。
    pub name: Arc<str>,
    /// 声明类型。
    pub ty: SchemaType,
    /// 是否可缺省。
    pub optional: bool,
}

impl FieldSchema {
    /// 必填字段。
    #[must_use]
    pub fn required(id: i16, name: &str, ty: SchemaType) -> Self {
        Self {
            id,
            name: Arc::from(name),
            ty,
            optional: false,
        }
    }

    /// 可选字段。
    #[must_use]
    pub fn optional(id: i16, name: &str, ty: SchemaType) -> Self {
        Self {
            optional: true,
            ..Self::required(id, name, ty)
        }
    }
}

enum Lookup {
    Ahead(usize),
    Behind(usize),
    Unknown,
}

/// 结构体声明：按线上期望顺序排列的字段表，表尾即 Stop 标记。
#[derive(Clone, Debug, PartialEq)]
pub struct StructSchema {
    name: Arc<str>,
    fields: Vec<FieldSchema>,
}

impl StructSchema {
    /// 构造并检查字段 id 唯一。
    pub fn new(name: &str, fields: Vec<FieldSchema>) -> Result<Self, SchemaError> {
        for (idx, field) in fields.iter().enumerate() {
            if fields[..idx].iter().any(|earlier| earlier.id == field.id) {
                return Err(SchemaError::DuplicateFieldId {
                    id: field.id,
                    context: name.to_owned(),
                });
            }
        }
        Ok(Self {
            name: Arc::from(name),
            fields,
        })
    }

    /// 结构体名。
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 字段表。
    #[must_use]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// 按 id 查找字段声明。
    #[must_use]
    pub fn field(&self, id: i16) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.id == id)
    }

    fn locate(&self, from: usize, id: i16) -> Lookup {
        if let Some(offset) = self.fields[from..].iter().position(|f| f.id == id) {
            return Lookup::Ahead(from + offset);
        }
        match self.fields[..from].iter().position(|f| f.id == id) {
            Some(idx) => Lookup::Behind(idx),
            None => Lookup::Unknown,
        }
    }
}

/// 方法声明：参数结构体与结果结构体。
#[derive(Clone, Debug, PartialEq)]
pub struct MethodSchema {
    name: Arc<str>,
    args: Arc<StructSchema>,
    result: Arc<StructSchema>,
}

impl MethodSchema {
    /// 构造方法声明。
    ///
    /// 结果结构体中的字段（0 号成功值与各异常）至多设置一个，因此全部视为可选。
    #[must_use]
    pub fn new(name: &str, args: StructSchema, result: StructSchema) -> Self {
        let result = StructSchema {
            name: result.name,
            fields: result
                .fields
                .into_iter()
                .map(|field| FieldSchema {
                    optional: true,
                    ..field
                })
                .collect(),
        };
        Self {
            name: Arc::from(name),
            args: Arc::new(args),
            result: Arc::new(result),
        }
    }

    /// 方法名。
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 参数结构体。
    #[must_use]
    pub fn args(&self) -> &Arc<StructSchema> {
        &self.args
    }

    /// 结果结构体。
    #[must_use]
    pub fn result(&self) -> &Arc<StructSchema> {
        &self.result
    }
}

/// 方法名 → 方法声明的注册表；名称大小写敏感。
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    methods: HashMap<String, Arc<MethodSchema>>,
}

impl SchemaRegistry {
    /// 空注册表。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册方法；同名方法只能注册一次。
    pub fn register(&mut self, method: MethodSchema) -> Result<(), SchemaError> {
        let name = method.name().to_owned();
        if self.methods.contains_key(&name) {
            return Err(SchemaError::DuplicateDefinition { name });
        }
        self.methods.insert(name, Arc::new(method));
        Ok(())
    }

    /// 查找方法。
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&Arc<MethodSchema>> {
        self.methods.get(name)
    }

    /// 已注册的方法数。
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// 是否为空。
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// 按 Schema 解码一个结构体。
pub fn decode_struct(
    ctx: &mut DecodeContext<'_>,
    cursor: &mut DecodeCursor,
    schema: &StructSchema,
) -> DecodeResult<Value> {
    let start = cursor.position();
    decode_struct_labeled(ctx, cursor, Label::Body, start, schema)
}

pub(crate) fn decode_struct_labeled(
    ctx: &mut DecodeContext<'_>,
    cursor: &mut DecodeCursor,
    label: Label,
    record_start: usize,
    schema: &StructSchema,
) -> DecodeResult<Value> {
    let checkpoint = cursor.checkpoint();
    let mark = ctx.log.mark();
    match decode_with_schema(ctx, cursor, label.clone(), record_start, schema) {
        Err(err) if ctx.config().try_generic_if_schema_fails => {
            tracing::debug!(
                schema = schema.name(),
                error = %err,
                "schema decode failed, retrying generically"
            );
            cursor.restore(checkpoint);
            ctx.log.rollback(mark);
            ctx.log.diagnostic(Diagnostic::new(
                err.kind(),
                err.offset(),
                format!(
                    "`{}` did not match its schema ({}); decoded generically",
                    schema.name(),
                    err.detail()
                ),
            ));
            generic::decode_struct_generic(ctx, cursor, label, record_start)
        }
        other => other,
    }
}

fn decode_with_schema(
    ctx: &mut DecodeContext<'_>,
    cursor: &mut DecodeCursor,
    label: Label,
    record_start: usize,
    schema: &StructSchema,
) -> DecodeResult<Value> {
    let max_depth = ctx.config().nested_type_depth;
    cursor.nested(max_depth, record_start, |cursor| {
        let window = *ctx.window();
        let encoding = ctx.encoding();
        let idx = ctx.log.open(label, TypeTag::Struct, record_start);
        let mut seen: SmallVec<[bool; 16]> = SmallVec::from_elem(false, schema.fields.len());
        let mut next = 0usize;
        let mut fields = Vec::new();
        let stop_at = loop {
            let header_at = cursor.position();
            let Some(header) = ready!(header::read_field_header(&window, cursor, encoding)) else {
                break header_at;
            };
            let slot = match schema.locate(next, header.field_id) {
                Lookup::Ahead(slot) => {
                    next = slot + 1;
                    slot
                }
                Lookup::Behind(slot) => {
                    ctx.log.diagnostic(Diagnostic::new(
                        ErrorKind::WrongFieldId,
                        header_at,
                        format!(
                            "field {} of `{}` arrived out of declaration order",
                            header.field_id,
                            schema.name()
                        ),
                    ));
                    slot
                }
                Lookup::Unknown => {
                    tracing::trace!(
                        schema = schema.name(),
                        field_id = header.field_id,
                        "field not in schema, decoding generically"
                    );
                    let value = ready!(generic::decode_field(
                        ctx,
                        cursor,
                        &header,
                        None,
                        Shape::Tag(header.type_tag)
                    ));
                    cursor.commit_field(header.field_id);
                    fields.push(Field::new(header.field_id, value));
                    continue;
                }
            };
            let declared = &schema.fields[slot];
            if declared.ty.tag() != header.type_tag {
                return Err(ThriftError::new(
                    ErrorKind::WrongType,
                    header_at,
                    format!(
                        "field {} `{}` of `{}` is declared {} but encoded as {}",
                        declared.id,
                        declared.name,
                        schema.name(),
                        declared.ty.tag(),
                        header.type_tag
                    ),
                ));
            }
            seen[slot] = true;
            let value = ready!(generic::decode_field(
                ctx,
                cursor,
                &header,
                Some(declared.name.clone()),
                Shape::Schema(&declared.ty)
            ));
            cursor.commit_field(header.field_id);
            fields.push(Field {
                id: header.field_id,
                name: Some(declared.name.clone()),
                value,
            });
        };
        if let Some(missing) = schema
            .fields
            .iter()
            .zip(&seen)
            .find_map(|(field, &seen)| (!field.optional && !seen).then_some(field))
        {
            return Err(ThriftError::new(
                ErrorKind::StructFieldNotInSequence,
                stop_at,
                format!(
                    "required field {} `{}` of `{}` missing before stop",
                    missing.id,
                    missing.name,
                    schema.name()
                ),
            ));
        }
        ctx.log.close(idx, cursor.position(), fields.len());
        Ok(DecodeOutcome::Complete(Value::Struct(fields)))
    })
}

/// T_REPLY 结果结构体的含义。
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReplyOutcome<'a> {
    /// 没有设置任何字段：`void` 方法成功返回。
    Void,
    /// 0 号字段：成功返回值。
    Success(&'a Field),
    /// id > 0：抛出了声明的某个异常，字段名即异常名（若 Schema 提供）。
    Exception(&'a Field),
}

impl ReplyOutcome<'_> {
    /// 抛出异常时的字段 id。
    #[must_use]
    pub fn exception_id(&self) -> Option<i16> {
        match self {
            ReplyOutcome::Exception(field) => Some(field.id),
            ReplyOutcome::Void | ReplyOutcome::Success(_) => None,
        }
    }
}

/// 解释结果结构体；不是结构体时返回 `None`。
#[must_use]
pub fn reply_outcome(body: &Value) -> Option<ReplyOutcome<'_>> {
    let fields = body.fields()?;
    Some(match fields.first() {
        None => ReplyOutcome::Void,
        Some(field) if field.id == 0 => ReplyOutcome::Success(field),
        Some(field) => ReplyOutcome::Exception(field),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderConfig;
    use crate::reader::ByteWindow;
    use crate::types::WireEncoding;

    fn point() -> StructSchema {
        StructSchema::new(
            "Point",
            vec![
                FieldSchema::required(1, "x", SchemaType::I32),
                FieldSchema::optional(2, "label", SchemaType::String),
                FieldSchema::required(3, "y", SchemaType::I32),
            ],
        )
        .unwrap()
    }

    fn run(
        bytes: &[u8],
        config: &DecoderConfig,
        schema: &StructSchema,
    ) -> (DecodeResult<Value>, crate::sink::DecodeLog) {
        let mut ctx = DecodeContext::new(ByteWindow::new(bytes), WireEncoding::BinaryStrict, config);
        let result = decode_struct(&mut ctx, &mut DecodeCursor::new(0), schema);
        (result, ctx.into_log())
    }

    #[test]
    fn duplicate_field_ids_are_rejected() {
        let err = StructSchema::new(
            "Dup",
            vec![
                FieldSchema::required(1, "a", SchemaType::I8),
                FieldSchema::required(1, "b", SchemaType::I8),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateFieldId { id: 1, .. }));
    }

    #[test]
    fn names_come_from_schema_and_optional_fields_may_be_absent() {
        let bytes = [8, 0, 1, 0, 0, 0, 3, 8, 0, 3, 0, 0, 0, 4, 0];
        let (result, _) = run(&bytes, &DecoderConfig::default(), &point());
        let value = result.unwrap().complete().unwrap();
        let names: Vec<&str> = value
            .fields()
            .unwrap()
            .iter()
            .filter_map(|f| f.name.as_deref())
            .collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn out_of_order_field_is_only_a_warning() {
        let bytes = [8, 0, 3, 0, 0, 0, 4, 8, 0, 1, 0, 0, 0, 3, 0];
        let (result, log) = run(&bytes, &DecoderConfig::default(), &point());
        assert!(result.unwrap().is_complete());
        let kinds: Vec<ErrorKind> = log.diagnostics().map(|d| d.kind()).collect();
        assert_eq!(kinds, vec![ErrorKind::WrongFieldId]);
    }

    #[test]
    #[tracing_test::traced_test]
    fn out_of_order_warning_is_logged() {
        let bytes = [8, 0, 3, 0, 0, 0, 4, 8, 0, 1, 0, 0, 0, 3, 0];
        let _ = run(&bytes, &DecoderConfig::default(), &point());
        assert!(logs_contain("thrift.wrong_field_id"));
        assert!(logs_contain("field 1 of `Point` arrived out of declaration order"));
    }

    #[test]
    fn missing_required_field_fails_at_stop() {
        let bytes = [8, 0, 1, 0, 0, 0, 3, 0];
        let (result, _) = run(&bytes, &DecoderConfig::default(), &point());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructFieldNotInSequence);
        assert_eq!(err.offset(), 7);
    }

    #[test]
    fn unknown_field_falls_back_to_generic() {
        let bytes = [
            8, 0, 1, 0, 0, 0, 3, 3, 0, 9, 0x7f, 8, 0, 3, 0, 0, 0, 4, 0,
        ];
        let (result, _) = run(&bytes, &DecoderConfig::default(), &point());
        let value = result.unwrap().complete().unwrap();
        let unknown = value.field(9).unwrap();
        assert_eq!(unknown.name, None);
        assert_eq!(unknown.value, Value::I8(0x7f));
    }

    #[test]
    fn wrong_type_retries_generically_when_enabled() {
        // x 声明为 i32，线上却是 i64。
        let bytes = [10, 0, 1, 0, 0, 0, 0, 0, 0, 0, 3, 0];
        let (result, _) = run(&bytes, &DecoderConfig::default(), &point());
        assert_eq!(result.unwrap_err().kind(), ErrorKind::WrongType);

        let config = DecoderConfig {
            try_generic_if_schema_fails: true,
            ..DecoderConfig::default()
        };
        let (result, log) = run(&bytes, &config, &point());
        let value = result.unwrap().complete().unwrap();
        assert_eq!(value.field(1).map(|f| &f.value), Some(&Value::I64(3)));
        assert_eq!(value.field(1).and_then(|f| f.name.clone()), None);
        assert_eq!(log.diagnostics().count(), 1);
        assert_eq!(log.records().count(), 2, "rolled back records must not remain");
    }

    #[test]
    fn reply_outcomes() {
        let void = Value::Struct(vec![]);
        assert_eq!(reply_outcome(&void), Some(ReplyOutcome::Void));
        let raised = Value::Struct(vec![Field::named(2, "ouch", Value::Struct(vec![]))]);
        assert_eq!(reply_outcome(&raised).and_then(|o| o.exception_id()), Some(2));
        assert_eq!(reply_outcome(&Value::I32(1)), None);
    }
}
