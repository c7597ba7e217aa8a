//! Decoding of class file bytes into a [`ClassModel`] element stream.

use anyhow::{Context, Result};
use jclassfile::attributes::Attribute;
use jclassfile::class_file;
use jclassfile::constant_pool::ConstantPool;
use tracing::{debug, warn};

use crate::element::{
    Annotation, ClassElement, ClassEntry, ClassModel, ElementValue, InnerClassInfo, MethodElement,
    MethodModel,
};
use crate::flags::AccessFlags;

const CLASS_MAGIC: u32 = 0xCAFEBABE;

/// Decode one class file.
///
/// Falls back to a structural reader when the class file carries attributes the full parser
/// does not know. Annotation types always go through the structural reader, which also
/// decodes the `AnnotationDefault` attributes of their members.
pub fn read_class(data: &[u8]) -> Result<ClassModel> {
    let class_file = match class_file::parse(data) {
        Ok(parsed) => parsed,
        Err(err) => {
            let message = format!("{err}");
            if message.contains("unmatched attribute") {
                warn!(%message, "using structural class reader");
                return read_class_minimal(data).context("failed to read class file bytes");
            }
            return Err(err).context("failed to parse class file bytes");
        }
    };
    if AccessFlags::from_raw(class_file.access_flags().bits()).has(AccessFlags::ANNOTATION) {
        debug!("reading annotation type with structural class reader");
        return read_class_minimal(data).context("failed to read annotation type bytes");
    }
    let constant_pool: &[ConstantPool] = class_file.constant_pool();
    let this_class = ClassEntry::new(
        constant_pool
            .class_name(class_file.this_class())
            .context("resolve class name")?,
    );
    let mut model = ClassModel::new(this_class.clone());
    model.elements.push(ClassElement::AccessFlags(AccessFlags::from_raw(
        class_file.access_flags().bits(),
    )));
    if class_file.super_class() != 0 {
        let super_name = constant_pool
            .class_name(class_file.super_class())
            .context("resolve super class name")?;
        model
            .elements
            .push(ClassElement::Superclass(ClassEntry::new(super_name)));
    }
    let mut interfaces = Vec::new();
    for interface in class_file.interfaces() {
        interfaces.push(ClassEntry::new(
            constant_pool
                .class_name(*interface)
                .context("resolve interface name")?,
        ));
    }
    model.elements.push(ClassElement::Interfaces(interfaces));
    for _ in class_file.fields() {
        model.elements.push(ClassElement::Unknown("field".to_string()));
    }

    for method in class_file.methods() {
        let name = constant_pool
            .utf8(method.name_index())
            .context("resolve method name")?;
        let descriptor = constant_pool
            .utf8(method.descriptor_index())
            .with_context(|| format!("resolve descriptor of {name}"))?;
        let flags = AccessFlags::from_raw(method.access_flags().bits());
        let mut method_model =
            MethodModel::new(name, descriptor, flags).with_parent(this_class.clone());
        for attribute in method.attributes() {
            let element = match attribute {
                Attribute::RuntimeVisibleAnnotations { annotations, raw } => {
                    MethodElement::RuntimeVisibleAnnotations(
                        decode_annotations(constant_pool, annotations, raw).with_context(|| {
                            format!("decode annotations of {}", method_model.name)
                        })?,
                    )
                }
                _ => MethodElement::Unknown("attribute".to_string()),
            };
            method_model.elements.push(element);
        }
        model.elements.push(ClassElement::Method(method_model));
    }

    for attribute in class_file.attributes() {
        let element = match attribute {
            Attribute::NestHost { host_class_index } => ClassElement::NestHost(ClassEntry::new(
                constant_pool
                    .class_name(*host_class_index)
                    .context("resolve nest host")?,
            )),
            Attribute::InnerClasses { classes } => {
                let mut infos = Vec::with_capacity(classes.len());
                for record in classes {
                    infos.push(inner_class_info(
                        constant_pool,
                        record.inner_class_info_index(),
                        record.outer_class_info_index(),
                        record.inner_name_index(),
                        record.inner_class_access_flags().bits(),
                    )?);
                }
                ClassElement::InnerClasses(infos)
            }
            Attribute::RuntimeVisibleAnnotations { annotations, raw } => {
                ClassElement::RuntimeVisibleAnnotations(
                    decode_annotations(constant_pool, annotations, raw)
                        .context("decode class annotations")?,
                )
            }
            _ => ClassElement::Unknown("attribute".to_string()),
        };
        model.elements.push(element);
    }
    Ok(model)
}

/// Constant pool lookups needed to resolve class names and annotation values.
trait ConstantLookup {
    fn utf8(&self, index: u16) -> Result<String>;
    fn class_name(&self, index: u16) -> Result<String>;
    fn int(&self, index: u16) -> Result<i32>;
    fn long(&self, index: u16) -> Result<i64>;
    fn float(&self, index: u16) -> Result<f32>;
    fn double(&self, index: u16) -> Result<f64>;
}

impl ConstantLookup for [ConstantPool] {
    fn utf8(&self, index: u16) -> Result<String> {
        match self.get(index as usize).context("missing utf8 entry")? {
            ConstantPool::Utf8 { value } => Ok(value.clone()),
            _ => anyhow::bail!("unexpected utf8 entry"),
        }
    }

    fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index as usize).context("missing class entry")? {
            ConstantPool::Class { name_index } => self.utf8(*name_index),
            _ => anyhow::bail!("unexpected class entry"),
        }
    }

    fn int(&self, index: u16) -> Result<i32> {
        match self.get(index as usize).context("missing integer entry")? {
            ConstantPool::Integer { value } => Ok(*value),
            _ => anyhow::bail!("unexpected integer entry"),
        }
    }

    fn long(&self, index: u16) -> Result<i64> {
        match self.get(index as usize).context("missing long entry")? {
            ConstantPool::Long { value } => Ok(*value),
            _ => anyhow::bail!("unexpected long entry"),
        }
    }

    fn float(&self, index: u16) -> Result<f32> {
        match self.get(index as usize).context("missing float entry")? {
            ConstantPool::Float { value } => Ok(*value),
            _ => anyhow::bail!("unexpected float entry"),
        }
    }

    fn double(&self, index: u16) -> Result<f64> {
        match self.get(index as usize).context("missing double entry")? {
            ConstantPool::Double { value } => Ok(*value),
            _ => anyhow::bail!("unexpected double entry"),
        }
    }
}

fn inner_class_info<P: ConstantLookup + ?Sized>(
    pool: &P,
    inner_class_index: u16,
    outer_class_index: u16,
    inner_name_index: u16,
    flags: u16,
) -> Result<InnerClassInfo> {
    let inner_class = ClassEntry::new(
        pool.class_name(inner_class_index)
            .context("resolve inner class")?,
    );
    let outer_class = if outer_class_index == 0 {
        None
    } else {
        Some(ClassEntry::new(
            pool.class_name(outer_class_index)
                .context("resolve outer class")?,
        ))
    };
    let inner_name = if inner_name_index == 0 {
        None
    } else {
        Some(pool.utf8(inner_name_index).context("resolve inner name")?)
    };
    Ok(InnerClassInfo {
        inner_class,
        outer_class,
        inner_name,
        flags: AccessFlags::from_raw(flags),
    })
}

/// Decode annotations from the attribute body, keeping only their types if the body cannot
/// be decoded. The structural reader degrades the same way through [`structural_annotations`].
fn decode_annotations(
    constant_pool: &[ConstantPool],
    annotations: &[jclassfile::attributes::Annotation],
    raw: &[u8],
) -> Result<Vec<Annotation>> {
    if !raw.is_empty() {
        match decode_annotation_bytes(constant_pool, raw) {
            Ok(decoded) => return Ok(decoded),
            Err(err) => warn!(error = %err, "annotation values unavailable"),
        }
    }
    annotations
        .iter()
        .map(|annotation| {
            let descriptor = constant_pool
                .utf8(annotation.type_index())
                .context("resolve annotation type")?;
            Ok(Annotation::new(descriptor))
        })
        .collect()
}

/// Decode an attribute body read by the structural reader.
///
/// The structural reader has no separate list of annotation types to fall back on, so a body
/// that does not decode yields no annotations.
fn structural_annotations(pool: &[PoolEntry], body: &[u8], owner: &str) -> Vec<Annotation> {
    match decode_annotation_bytes(pool, body) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!(owner, error = %err, "annotations unavailable");
            Vec::new()
        }
    }
}

/// Decode an `AnnotationDefault` attribute body: exactly one element value.
fn decode_default_value<P: ConstantLookup + ?Sized>(pool: &P, data: &[u8]) -> Result<ElementValue> {
    let mut offset = 0usize;
    let value = read_element_value(pool, data, &mut offset)?;
    if offset != data.len() {
        anyhow::bail!(
            "annotation default has {} trailing bytes",
            data.len() - offset
        );
    }
    Ok(value)
}

/// Decode a `RuntimeVisibleAnnotations` attribute body.
fn decode_annotation_bytes<P: ConstantLookup + ?Sized>(
    pool: &P,
    data: &[u8],
) -> Result<Vec<Annotation>> {
    let mut offset = 0usize;
    let count = read_u16(data, &mut offset)?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(read_annotation(pool, data, &mut offset)?);
    }
    if offset != data.len() {
        anyhow::bail!(
            "annotation attribute has {} trailing bytes",
            data.len() - offset
        );
    }
    Ok(annotations)
}

fn read_annotation<P: ConstantLookup + ?Sized>(
    pool: &P,
    data: &[u8],
    offset: &mut usize,
) -> Result<Annotation> {
    let type_index = read_u16(data, offset)?;
    let mut annotation =
        Annotation::new(pool.utf8(type_index).context("resolve annotation type")?);
    let pairs = read_u16(data, offset)?;
    for _ in 0..pairs {
        let name_index = read_u16(data, offset)?;
        let name = pool.utf8(name_index).context("resolve element name")?;
        let value = read_element_value(pool, data, offset)
            .with_context(|| format!("read element value {name}"))?;
        annotation.elements.push((name, value));
    }
    Ok(annotation)
}

fn read_element_value<P: ConstantLookup + ?Sized>(
    pool: &P,
    data: &[u8],
    offset: &mut usize,
) -> Result<ElementValue> {
    let tag = read_u8(data, offset)?;
    let value = match tag {
        b'B' => ElementValue::Byte(pool.int(read_u16(data, offset)?)? as i8),
        b'C' => ElementValue::Char(pool.int(read_u16(data, offset)?)? as u16),
        b'D' => ElementValue::Double(pool.double(read_u16(data, offset)?)?),
        b'F' => ElementValue::Float(pool.float(read_u16(data, offset)?)?),
        b'I' => ElementValue::Int(pool.int(read_u16(data, offset)?)?),
        b'J' => ElementValue::Long(pool.long(read_u16(data, offset)?)?),
        b'S' => ElementValue::Short(pool.int(read_u16(data, offset)?)? as i16),
        b'Z' => ElementValue::Boolean(pool.int(read_u16(data, offset)?)? != 0),
        b's' => ElementValue::String(pool.utf8(read_u16(data, offset)?)?),
        b'e' => {
            let type_index = read_u16(data, offset)?;
            let const_index = read_u16(data, offset)?;
            ElementValue::Enum {
                type_descriptor: pool.utf8(type_index)?,
                const_name: pool.utf8(const_index)?,
            }
        }
        b'c' => ElementValue::Class(pool.utf8(read_u16(data, offset)?)?),
        b'@' => ElementValue::Annotation(read_annotation(pool, data, offset)?),
        b'[' => {
            let count = read_u16(data, offset)?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(read_element_value(pool, data, offset)?);
            }
            ElementValue::Array(values)
        }
        _ => anyhow::bail!("unsupported element value tag: {}", tag),
    };
    Ok(value)
}

/// Constant pool entry as kept by the structural reader.
#[derive(Clone)]
enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    Other,
}

impl ConstantLookup for [PoolEntry] {
    fn utf8(&self, index: u16) -> Result<String> {
        match self.get(index as usize) {
            Some(PoolEntry::Utf8(value)) => Ok(value.clone()),
            _ => anyhow::bail!("missing utf8 entry {index}"),
        }
    }

    fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index as usize) {
            Some(PoolEntry::Class(name_index)) => self.utf8(*name_index),
            _ => anyhow::bail!("missing class entry {index}"),
        }
    }

    fn int(&self, index: u16) -> Result<i32> {
        match self.get(index as usize) {
            Some(PoolEntry::Integer(value)) => Ok(*value),
            _ => anyhow::bail!("missing integer entry {index}"),
        }
    }

    fn long(&self, index: u16) -> Result<i64> {
        match self.get(index as usize) {
            Some(PoolEntry::Long(value)) => Ok(*value),
            _ => anyhow::bail!("missing long entry {index}"),
        }
    }

    fn float(&self, index: u16) -> Result<f32> {
        match self.get(index as usize) {
            Some(PoolEntry::Float(value)) => Ok(*value),
            _ => anyhow::bail!("missing float entry {index}"),
        }
    }

    fn double(&self, index: u16) -> Result<f64> {
        match self.get(index as usize) {
            Some(PoolEntry::Double(value)) => Ok(*value),
            _ => anyhow::bail!("missing double entry {index}"),
        }
    }
}

/// Structural reader: walks the class file layout directly and keeps only what the
/// metadata builders consume.
fn read_class_minimal(data: &[u8]) -> Result<ClassModel> {
    let mut offset = 0usize;
    let magic = read_u32(data, &mut offset)?;
    if magic != CLASS_MAGIC {
        anyhow::bail!("invalid class file magic");
    }
    let _minor = read_u16(data, &mut offset)?;
    let _major = read_u16(data, &mut offset)?;
    let pool = read_constant_pool(data, &mut offset)?;
    let access_flags = read_u16(data, &mut offset)?;
    let this_index = read_u16(data, &mut offset)?;
    let super_index = read_u16(data, &mut offset)?;

    let this_class = ClassEntry::new(
        pool.class_name(this_index)
            .context("resolve class name")?,
    );
    let mut model = ClassModel::new(this_class.clone());
    model
        .elements
        .push(ClassElement::AccessFlags(AccessFlags::from_raw(access_flags)));
    if super_index != 0 {
        model.elements.push(ClassElement::Superclass(ClassEntry::new(
            pool.class_name(super_index)
                .context("resolve super class name")?,
        )));
    }

    let interface_count = read_u16(data, &mut offset)?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let index = read_u16(data, &mut offset)?;
        interfaces.push(ClassEntry::new(
            pool.class_name(index).context("resolve interface name")?,
        ));
    }
    model.elements.push(ClassElement::Interfaces(interfaces));

    let field_count = read_u16(data, &mut offset)?;
    for _ in 0..field_count {
        skip_bytes(data, &mut offset, 6)?;
        read_attributes(&pool, data, &mut offset)?;
        model.elements.push(ClassElement::Unknown("field".to_string()));
    }

    let method_count = read_u16(data, &mut offset)?;
    for _ in 0..method_count {
        let flags = read_u16(data, &mut offset)?;
        let name = pool
            .utf8(read_u16(data, &mut offset)?)
            .context("resolve method name")?;
        let descriptor = pool
            .utf8(read_u16(data, &mut offset)?)
            .with_context(|| format!("resolve descriptor of {name}"))?;
        let mut method = MethodModel::new(name, descriptor, AccessFlags::from_raw(flags))
            .with_parent(this_class.clone());
        for (attribute_name, body) in read_attributes(&pool, data, &mut offset)? {
            let element = match attribute_name.as_str() {
                "RuntimeVisibleAnnotations" => MethodElement::RuntimeVisibleAnnotations(
                    structural_annotations(&pool, body, &method.name),
                ),
                "AnnotationDefault" => match decode_default_value(pool.as_slice(), body) {
                    Ok(value) => MethodElement::AnnotationDefault(value),
                    Err(err) => {
                        warn!(owner = %method.name, error = %err, "annotation default unavailable");
                        MethodElement::Unknown(attribute_name)
                    }
                },
                _ => MethodElement::Unknown(attribute_name),
            };
            method.elements.push(element);
        }
        model.elements.push(ClassElement::Method(method));
    }

    for (attribute_name, body) in read_attributes(&pool, data, &mut offset)? {
        let element = match attribute_name.as_str() {
            "NestHost" => {
                let mut body_offset = 0usize;
                let host = read_u16(body, &mut body_offset)?;
                ClassElement::NestHost(ClassEntry::new(
                    pool.class_name(host).context("resolve nest host")?,
                ))
            }
            "InnerClasses" => {
                let mut body_offset = 0usize;
                let count = read_u16(body, &mut body_offset)?;
                let mut infos = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let inner = read_u16(body, &mut body_offset)?;
                    let outer = read_u16(body, &mut body_offset)?;
                    let inner_name = read_u16(body, &mut body_offset)?;
                    let flags = read_u16(body, &mut body_offset)?;
                    infos.push(inner_class_info(
                        pool.as_slice(),
                        inner,
                        outer,
                        inner_name,
                        flags,
                    )?);
                }
                ClassElement::InnerClasses(infos)
            }
            "RuntimeVisibleAnnotations" => ClassElement::RuntimeVisibleAnnotations(
                structural_annotations(&pool, body, this_class.name()),
            ),
            _ => ClassElement::Unknown(attribute_name),
        };
        model.elements.push(element);
    }
    Ok(model)
}

/// Read an attribute table as `(name, body)` pairs.
fn read_attributes<'a>(
    pool: &[PoolEntry],
    data: &'a [u8],
    offset: &mut usize,
) -> Result<Vec<(String, &'a [u8])>> {
    let count = read_u16(data, offset)?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = pool
            .utf8(read_u16(data, offset)?)
            .context("resolve attribute name")?;
        let length = read_u32(data, offset)? as usize;
        let body = read_bytes(data, offset, length)?;
        attributes.push((name, body));
    }
    Ok(attributes)
}

fn read_constant_pool(data: &[u8], offset: &mut usize) -> Result<Vec<PoolEntry>> {
    let count = read_u16(data, offset)?;
    let mut entries = Vec::with_capacity(count as usize);
    entries.push(PoolEntry::Other);
    let mut index = 1u16;
    while index < count {
        let tag = read_u8(data, offset)?;
        match tag {
            1 => {
                let len = read_u16(data, offset)? as usize;
                let bytes = read_bytes(data, offset, len)?;
                entries.push(PoolEntry::Utf8(String::from_utf8_lossy(bytes).to_string()));
            }
            3 => entries.push(PoolEntry::Integer(read_u32(data, offset)? as i32)),
            4 => entries.push(PoolEntry::Float(f32::from_bits(read_u32(data, offset)?))),
            5 | 6 => {
                let high = read_u32(data, offset)? as u64;
                let low = read_u32(data, offset)? as u64;
                let bits = (high << 32) | low;
                if tag == 5 {
                    entries.push(PoolEntry::Long(bits as i64));
                } else {
                    entries.push(PoolEntry::Double(f64::from_bits(bits)));
                }
                entries.push(PoolEntry::Other);
                index += 1;
            }
            7 => entries.push(PoolEntry::Class(read_u16(data, offset)?)),
            8 | 16 | 19 | 20 => {
                skip_bytes(data, offset, 2)?;
                entries.push(PoolEntry::Other);
            }
            9 | 10 | 11 | 12 | 17 | 18 => {
                skip_bytes(data, offset, 4)?;
                entries.push(PoolEntry::Other);
            }
            15 => {
                skip_bytes(data, offset, 3)?;
                entries.push(PoolEntry::Other);
            }
            _ => anyhow::bail!("unsupported constant pool tag: {}", tag),
        }
        index += 1;
    }
    Ok(entries)
}

fn read_u8(data: &[u8], offset: &mut usize) -> Result<u8> {
    let byte = *data.get(*offset).context("class file out of bounds")?;
    *offset += 1;
    Ok(byte)
}

fn read_u16(data: &[u8], offset: &mut usize) -> Result<u16> {
    let bytes = read_bytes(data, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes = read_bytes(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_bytes<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let start = *offset;
    let end = start + len;
    let slice = data.get(start..end).context("class file out of bounds")?;
    *offset = end;
    Ok(slice)
}

fn skip_bytes(data: &[u8], offset: &mut usize, len: usize) -> Result<()> {
    read_bytes(data, offset, len)?;
    Ok(())
}
