use std::str::FromStr;

use anyhow::{Context, Result};
use jdescriptor::{MethodDescriptor, TypeDescriptor};

/// Convert an internal class path such as `a/b/C$D` into the dotted class name `a.b.C$D`.
///
/// Input that is not a class path is passed through with separators replaced.
pub fn resource_path_to_class_name(path: &str) -> String {
    path.replace('/', ".")
}

/// Parse a JVM method descriptor such as `(ILjava/lang/String;)V`.
pub(crate) fn parse_method_descriptor(descriptor: &str) -> Result<MethodDescriptor> {
    MethodDescriptor::from_str(descriptor)
        .with_context(|| format!("parse method descriptor {descriptor}"))
}

/// Display name of the return type of a method descriptor, e.g. `String` or `int[]`.
pub(crate) fn return_type_name(descriptor: &MethodDescriptor) -> String {
    display_name(descriptor.return_type())
}

/// Display names of the parameter types of a method descriptor.
pub(crate) fn parameter_display_names(descriptor: &MethodDescriptor) -> Vec<String> {
    descriptor
        .parameter_types()
        .iter()
        .map(display_name)
        .collect()
}

/// Fully-qualified name of a single field descriptor such as `[Ljava/lang/String;`.
///
/// Used for class-valued annotation attributes, which may also name primitives and `void`.
pub(crate) fn field_type_name(descriptor: &str) -> Result<String> {
    let wrapped = format!("(){descriptor}");
    let parsed = MethodDescriptor::from_str(&wrapped)
        .with_context(|| format!("parse field descriptor {descriptor}"))?;
    Ok(type_name(parsed.return_type()))
}

/// Class name of an object descriptor such as `Lorg/example/Marker;`.
pub(crate) fn object_type_name(descriptor: &str) -> Result<String> {
    let trimmed = descriptor
        .strip_prefix('L')
        .and_then(|value| value.strip_suffix(';'))
        .with_context(|| format!("invalid object descriptor {descriptor}"))?;
    Ok(resource_path_to_class_name(trimmed))
}

fn type_name(ty: &TypeDescriptor) -> String {
    match ty {
        TypeDescriptor::Object(name) => resource_path_to_class_name(name),
        TypeDescriptor::Array(component, dimensions) => {
            let mut name = type_name(component);
            for _ in 0..*dimensions {
                name.push_str("[]");
            }
            name
        }
        other => primitive_name(other).to_string(),
    }
}

/// Name without the package, e.g. `String` for `java.lang.String`.
///
/// Nested classes keep their binary name, so `a/b/Outer$Inner` displays as `Outer$Inner`.
fn display_name(ty: &TypeDescriptor) -> String {
    match ty {
        TypeDescriptor::Object(name) => match name.rsplit_once('/') {
            Some((_, simple)) => simple.to_string(),
            None => name.clone(),
        },
        TypeDescriptor::Array(component, dimensions) => {
            let mut name = display_name(component);
            for _ in 0..*dimensions {
                name.push_str("[]");
            }
            name
        }
        other => primitive_name(other).to_string(),
    }
}

fn primitive_name(ty: &TypeDescriptor) -> &'static str {
    match ty {
        TypeDescriptor::Byte => "byte",
        TypeDescriptor::Char => "char",
        TypeDescriptor::Double => "double",
        TypeDescriptor::Float => "float",
        TypeDescriptor::Integer => "int",
        TypeDescriptor::Long => "long",
        TypeDescriptor::Short => "short",
        TypeDescriptor::Boolean => "boolean",
        TypeDescriptor::Void => "void",
        TypeDescriptor::Object(_) | TypeDescriptor::Array(_, _) => "java.lang.Object",
    }
}
