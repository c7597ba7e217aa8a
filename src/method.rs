use std::fmt;

use anyhow::{Context, Result};

use crate::annotations::{
    AnnotationValue, MergedAnnotations, SharedResolver, annotation_value,
    create_merged_annotations,
};
use crate::descriptor::{
    parameter_display_names, parse_method_descriptor, resource_path_to_class_name,
    return_type_name,
};
use crate::element::{MethodElement, MethodModel};
use crate::flags::AccessFlags;

/// Identity of a method: declaring class, name, and descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct MethodSource {
    declaring_class_name: Option<String>,
    method_name: String,
    descriptor: String,
    parameter_names: Vec<String>,
}

impl MethodSource {
    pub fn declaring_class_name(&self) -> Option<&str> {
        self.declaring_class_name.as_deref()
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Bytecode descriptor, e.g. `(Ljava/lang/String;)V`.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }
}

/// Renders `a.b.C.method(String,int)`, or `method(String,int)` for detached methods.
impl fmt::Display for MethodSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(class_name) = &self.declaring_class_name {
            write!(f, "{class_name}.")?;
        }
        write!(f, "{}({})", self.method_name, self.parameter_names.join(","))
    }
}

/// Metadata of one compiled method.
///
/// Equality, ordering, and hashing only consider the [`MethodSource`].
#[derive(Clone, Debug)]
pub struct MethodMetadata {
    method_name: String,
    access_flags: AccessFlags,
    declaring_class_name: Option<String>,
    return_type_name: String,
    source: MethodSource,
    annotations: MergedAnnotations,
    default_value: Option<AnnotationValue>,
}

impl MethodMetadata {
    /// Build method metadata from a decoded method.
    ///
    /// The declaring class name is dotted, like [`ClassMetadata::class_name`]
    /// (`a.b.Outer$Inner`).
    ///
    /// [`ClassMetadata::class_name`]: crate::class::ClassMetadata::class_name
    pub fn parse(method: &MethodModel, resolver: &SharedResolver) -> Result<Self> {
        let declaring_class_name = method
            .parent
            .as_ref()
            .map(|parent| resource_path_to_class_name(parent.name()));
        let descriptor = parse_method_descriptor(&method.descriptor)
            .with_context(|| format!("parse method {}", method.name))?;
        let annotations_attribute = method.elements.iter().find_map(|element| match element {
            MethodElement::RuntimeVisibleAnnotations(annotations) => Some(annotations.as_slice()),
            MethodElement::AnnotationDefault(_) | MethodElement::Unknown(_) => None,
        });
        let annotations = create_merged_annotations(&method.name, annotations_attribute, resolver)?;
        let default_value = method
            .elements
            .iter()
            .find_map(|element| match element {
                MethodElement::AnnotationDefault(value) => Some(value),
                _ => None,
            })
            .map(annotation_value)
            .transpose()
            .with_context(|| format!("resolve default value of {}", method.name))?;
        let source = MethodSource {
            declaring_class_name: declaring_class_name.clone(),
            method_name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            parameter_names: parameter_display_names(&descriptor),
        };
        Ok(Self {
            method_name: method.name.clone(),
            access_flags: method.flags,
            declaring_class_name,
            return_type_name: return_type_name(&descriptor),
            source,
            annotations,
            default_value,
        })
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn declaring_class_name(&self) -> Option<&str> {
        self.declaring_class_name.as_deref()
    }

    /// Return type display name, e.g. `String`, `int[]`, or `void`.
    pub fn return_type_name(&self) -> &str {
        &self.return_type_name
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.has(AccessFlags::ABSTRACT)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.has(AccessFlags::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.has(AccessFlags::FINAL)
    }

    pub fn is_private(&self) -> bool {
        self.access_flags.has(AccessFlags::PRIVATE)
    }

    pub fn is_overridable(&self) -> bool {
        !self.is_static() && !self.is_final() && !self.is_private()
    }

    pub fn annotations(&self) -> &MergedAnnotations {
        &self.annotations
    }

    /// Whether the annotation is present directly or as a meta-annotation.
    pub fn is_annotated(&self, annotation_name: &str) -> bool {
        self.annotations.is_present(annotation_name)
    }

    pub fn annotation_attributes(
        &self,
        annotation_name: &str,
    ) -> Option<std::collections::BTreeMap<String, AnnotationValue>> {
        self.annotations
            .get(annotation_name)
            .map(|annotation| annotation.attributes().clone())
    }

    pub fn source(&self) -> &MethodSource {
        &self.source
    }

    /// Default value of an annotation type member, if it declares one.
    pub fn default_value(&self) -> Option<&AnnotationValue> {
        self.default_value.as_ref()
    }
}

impl PartialEq for MethodMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for MethodMetadata {}

impl std::hash::Hash for MethodMetadata {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl PartialOrd for MethodMetadata {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MethodMetadata {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.source.cmp(&other.source)
    }
}

impl fmt::Display for MethodMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.source.fmt(f)
    }
}
