//! Annotation views over bytecode annotations.
//!
//! A [`MergedAnnotations`] holds the annotations declared directly on a class or method.
//! Meta-annotations are resolved lazily through an [`AnnotationResolver`], so a view can be
//! created before the annotation types themselves have been read.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::debug;

use crate::class::ClassMetadata;
use crate::descriptor::{field_type_name, object_type_name};
use crate::element::{Annotation, ElementValue};

/// Annotation type used to declare attribute aliases on annotation attributes.
pub const ALIAS_FOR: &str = "org.springframework.core.annotation.AliasFor";

/// Marker meaning "the annotation that declares the alias" in `@AliasFor(annotation = ...)`.
const ANNOTATION_BASE: &str = "java.lang.annotation.Annotation";

/// Resolved annotation attribute value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnnotationValue {
    Boolean(bool),
    Byte(i8),
    /// UTF-16 code unit; lone surrogates are kept as they are.
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Enum { type_name: String, constant: String },
    Class(String),
    Annotation(DeclaredAnnotation),
    Array(Vec<AnnotationValue>),
}

impl AnnotationValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnnotationValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_class_name(&self) -> Option<&str> {
        match self {
            AnnotationValue::Class(value) => Some(value),
            _ => None,
        }
    }
}

/// Annotation as declared in bytecode, with type names in dotted form.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeclaredAnnotation {
    pub type_name: String,
    pub attributes: BTreeMap<String, AnnotationValue>,
}

impl DeclaredAnnotation {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AnnotationValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// Filter for annotation types that never take part in merged views.
#[derive(Clone, Copy, Debug)]
pub struct AnnotationFilter {
    packages: &'static [&'static str],
}

impl AnnotationFilter {
    /// Language-level annotations such as `@Deprecated`, `@Retention`, or `@Nullable` markers.
    pub const PLAIN: AnnotationFilter = AnnotationFilter {
        packages: &["java.lang.", "org.springframework.lang."],
    };

    pub fn matches(&self, type_name: &str) -> bool {
        self.packages
            .iter()
            .any(|package| type_name.starts_with(package))
    }
}

/// Alias declared on an annotation attribute.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeAlias {
    /// Attribute of the declaring annotation.
    pub attribute: String,
    /// Annotation that receives the value; the declaring annotation itself for mirrors.
    pub target_annotation: String,
    pub target_attribute: String,
}

/// What the merged views need to know about an annotation type.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationType {
    type_name: String,
    meta_annotations: Vec<DeclaredAnnotation>,
    aliases: Vec<AttributeAlias>,
    defaults: BTreeMap<String, AnnotationValue>,
}

impl AnnotationType {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            meta_annotations: Vec::new(),
            aliases: Vec::new(),
            defaults: BTreeMap::new(),
        }
    }

    pub fn with_meta_annotation(mut self, annotation: DeclaredAnnotation) -> Self {
        self.meta_annotations.push(annotation);
        self
    }

    pub fn with_alias(mut self, alias: AttributeAlias) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn with_default(mut self, attribute: impl Into<String>, value: AnnotationValue) -> Self {
        self.defaults.insert(attribute.into(), value);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn meta_annotations(&self) -> &[DeclaredAnnotation] {
        &self.meta_annotations
    }

    pub fn aliases(&self) -> &[AttributeAlias] {
        &self.aliases
    }

    /// Attribute defaults declared by the members of the annotation type.
    pub fn defaults(&self) -> &BTreeMap<String, AnnotationValue> {
        &self.defaults
    }

    /// Describe an annotation type from the metadata of its class file.
    ///
    /// Returns `None` unless the class is an annotation type. Attribute methods carrying
    /// `@AliasFor` become aliases; an omitted `attribute` targets the same attribute name.
    /// Members with a default value contribute it to [`AnnotationType::defaults`].
    pub fn from_class_metadata(class: &ClassMetadata) -> Option<Self> {
        if !class.is_annotation() {
            return None;
        }
        let mut annotation_type = AnnotationType::new(class.class_name());
        annotation_type.meta_annotations = class.annotations().direct().to_vec();
        for method in class.declared_methods() {
            if let Some(default) = method.default_value() {
                annotation_type
                    .defaults
                    .insert(method.method_name().to_string(), default.clone());
            }
            let Some(alias_for) = method.annotations().direct_annotation(ALIAS_FOR) else {
                continue;
            };
            let target_attribute = ["attribute", "value"]
                .iter()
                .filter_map(|name| alias_for.attributes.get(*name))
                .filter_map(AnnotationValue::as_str)
                .find(|value| !value.is_empty())
                .unwrap_or(method.method_name())
                .to_string();
            let target_annotation = alias_for
                .attributes
                .get("annotation")
                .and_then(AnnotationValue::as_class_name)
                .filter(|name| *name != ANNOTATION_BASE)
                .unwrap_or(class.class_name())
                .to_string();
            annotation_type.aliases.push(AttributeAlias {
                attribute: method.method_name().to_string(),
                target_annotation,
                target_attribute,
            });
        }
        Some(annotation_type)
    }

    fn apply_mirrors(&self, attributes: &mut BTreeMap<String, AnnotationValue>) {
        for alias in &self.aliases {
            if alias.target_annotation != self.type_name {
                continue;
            }
            if attributes.contains_key(&alias.target_attribute) {
                continue;
            }
            if let Some(value) = attributes.get(&alias.attribute).cloned() {
                attributes.insert(alias.target_attribute.clone(), value);
            }
        }
    }

    fn fill_defaults(&self, attributes: &mut BTreeMap<String, AnnotationValue>) {
        for (name, value) in &self.defaults {
            attributes
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Capability used to look up annotation types while merging.
///
/// Implementations must not load or execute anything; they only answer from already-read
/// metadata.
pub trait AnnotationResolver: Send + Sync {
    fn resolve(&self, type_name: &str) -> Option<Arc<AnnotationType>>;
}

/// Shared resolver handle stored inside every view.
pub type SharedResolver = Arc<dyn AnnotationResolver>;

/// Resolver that knows no annotation types; views only expose direct annotations.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAnnotationTypes;

impl AnnotationResolver for NoAnnotationTypes {
    fn resolve(&self, _type_name: &str) -> Option<Arc<AnnotationType>> {
        None
    }
}

/// Annotation types keyed by name, published once after a set of classes was read.
///
/// Views created before publication see only their direct annotations until then.
#[derive(Debug, Default)]
pub struct AnnotationIndex {
    types: OnceLock<BTreeMap<String, Arc<AnnotationType>>>,
}

impl AnnotationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_types(types: impl IntoIterator<Item = AnnotationType>) -> Self {
        let index = Self::new();
        let map = Self::collect(types);
        let _ = index.types.set(map);
        index
    }

    pub fn publish(&self, types: impl IntoIterator<Item = AnnotationType>) -> Result<()> {
        self.types
            .set(Self::collect(types))
            .map_err(|_| anyhow!("annotation index already published"))
    }

    pub fn len(&self) -> usize {
        self.types.get().map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first definition of a type name wins.
    fn collect(
        types: impl IntoIterator<Item = AnnotationType>,
    ) -> BTreeMap<String, Arc<AnnotationType>> {
        let mut map = BTreeMap::new();
        for annotation_type in types {
            map.entry(annotation_type.type_name.clone())
                .or_insert_with(|| Arc::new(annotation_type));
        }
        map
    }
}

impl AnnotationResolver for AnnotationIndex {
    fn resolve(&self, type_name: &str) -> Option<Arc<AnnotationType>> {
        self.types.get()?.get(type_name).cloned()
    }
}

/// One annotation visible through a [`MergedAnnotations`] view.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MergedAnnotation {
    type_name: String,
    /// Annotation types from the declared annotation down to this one.
    path: Vec<String>,
    attributes: BTreeMap<String, AnnotationValue>,
}

impl MergedAnnotation {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// 0 for a declared annotation, 1 for its meta-annotations, and so on.
    pub fn distance(&self) -> usize {
        self.path.len() - 1
    }

    pub fn is_directly_present(&self) -> bool {
        self.distance() == 0
    }

    pub fn is_meta_present(&self) -> bool {
        self.distance() > 0
    }

    /// Type of the declared annotation this one was reached from.
    pub fn root_type_name(&self) -> &str {
        &self.path[0]
    }

    pub fn attribute(&self, name: &str) -> Option<&AnnotationValue> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, AnnotationValue> {
        &self.attributes
    }
}

/// Queryable annotations of one class or method, including meta-annotations.
#[derive(Clone)]
pub struct MergedAnnotations {
    source: String,
    direct: Vec<DeclaredAnnotation>,
    resolver: SharedResolver,
}

impl MergedAnnotations {
    /// View without annotations.
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            direct: Vec::new(),
            resolver: Arc::new(NoAnnotationTypes),
        }
    }

    /// View over already resolved declared annotations. Plain annotations are dropped.
    pub fn of(
        source: impl Into<String>,
        annotations: Vec<DeclaredAnnotation>,
        resolver: SharedResolver,
    ) -> Self {
        let source = source.into();
        let direct = annotations
            .into_iter()
            .filter(|annotation| {
                let plain = AnnotationFilter::PLAIN.matches(&annotation.type_name);
                if plain {
                    debug!(
                        source = %source,
                        annotation = %annotation.type_name,
                        "skipping plain annotation"
                    );
                }
                !plain
            })
            .collect();
        Self {
            source,
            direct,
            resolver,
        }
    }

    /// Element (class or method name) the annotations were declared on.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty()
    }

    pub fn direct(&self) -> &[DeclaredAnnotation] {
        &self.direct
    }

    pub fn direct_annotation(&self, type_name: &str) -> Option<&DeclaredAnnotation> {
        self.direct
            .iter()
            .find(|annotation| annotation.type_name == type_name)
    }

    pub fn is_directly_present(&self, type_name: &str) -> bool {
        self.direct_annotation(type_name).is_some()
    }

    /// Whether the type is declared directly or reachable as a meta-annotation.
    pub fn is_present(&self, type_name: &str) -> bool {
        if self.is_directly_present(type_name) {
            return true;
        }
        self.merged()
            .iter()
            .any(|annotation| annotation.type_name == type_name)
    }

    /// Nearest occurrence of the type, with aliased attributes applied.
    pub fn get(&self, type_name: &str) -> Option<MergedAnnotation> {
        self.merged()
            .into_iter()
            .find(|annotation| annotation.type_name == type_name)
    }

    /// Every visible annotation, declared ones first, then by increasing meta distance.
    ///
    /// Aliases only forward explicitly set values; defaults fill the remaining attributes last.
    pub fn merged(&self) -> Vec<MergedAnnotation> {
        let mut result = Vec::new();
        let mut visited: HashSet<(usize, String)> = HashSet::new();
        let mut queue = VecDeque::new();
        for (root, annotation) in self.direct.iter().enumerate() {
            let mut attributes = annotation.attributes.clone();
            if let Some(annotation_type) = self.resolver.resolve(&annotation.type_name) {
                annotation_type.apply_mirrors(&mut attributes);
            }
            visited.insert((root, annotation.type_name.clone()));
            queue.push_back((
                root,
                MergedAnnotation {
                    type_name: annotation.type_name.clone(),
                    path: vec![annotation.type_name.clone()],
                    attributes,
                },
            ));
        }

        while let Some((root, mut current)) = queue.pop_front() {
            if let Some(annotation_type) = self.resolver.resolve(&current.type_name) {
                for meta in annotation_type.meta_annotations() {
                    if AnnotationFilter::PLAIN.matches(&meta.type_name) {
                        continue;
                    }
                    if !visited.insert((root, meta.type_name.clone())) {
                        continue;
                    }
                    let mut attributes = meta.attributes.clone();
                    for alias in annotation_type.aliases() {
                        if alias.target_annotation != meta.type_name {
                            continue;
                        }
                        if let Some(value) = current.attributes.get(&alias.attribute) {
                            attributes.insert(alias.target_attribute.clone(), value.clone());
                        }
                    }
                    if let Some(meta_type) = self.resolver.resolve(&meta.type_name) {
                        meta_type.apply_mirrors(&mut attributes);
                    }
                    let mut path = current.path.clone();
                    path.push(meta.type_name.clone());
                    queue.push_back((
                        root,
                        MergedAnnotation {
                            type_name: meta.type_name.clone(),
                            path,
                            attributes,
                        },
                    ));
                }
                annotation_type.fill_defaults(&mut current.attributes);
            }
            result.push(current);
        }
        result
    }

    /// Declared annotation types in declaration order, without duplicates.
    pub fn direct_annotation_types(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.direct
            .iter()
            .filter(|annotation| seen.insert(annotation.type_name.as_str()))
            .map(|annotation| annotation.type_name.clone())
            .collect()
    }

    /// Meta-annotation types reachable from the declared annotation `type_name`.
    pub fn meta_annotation_types(&self, type_name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.merged()
            .into_iter()
            .filter(|annotation| {
                annotation.is_meta_present() && annotation.root_type_name() == type_name
            })
            .filter(|annotation| seen.insert(annotation.type_name.clone()))
            .map(|annotation| annotation.type_name)
            .collect()
    }
}

impl fmt::Debug for MergedAnnotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedAnnotations")
            .field("source", &self.source)
            .field("direct", &self.direct)
            .finish_non_exhaustive()
    }
}

/// Build the annotation view for a `RuntimeVisibleAnnotations` attribute, or an empty view
/// when the element has none.
pub fn create_merged_annotations(
    source: &str,
    attribute: Option<&[Annotation]>,
    resolver: &SharedResolver,
) -> Result<MergedAnnotations> {
    let Some(annotations) = attribute else {
        return Ok(MergedAnnotations::empty(source));
    };
    let declared = annotations
        .iter()
        .map(declared_annotation)
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("resolve annotations of {source}"))?;
    Ok(MergedAnnotations::of(source, declared, Arc::clone(resolver)))
}

fn declared_annotation(annotation: &Annotation) -> Result<DeclaredAnnotation> {
    let type_name =
        object_type_name(&annotation.type_descriptor).context("resolve annotation type")?;
    let mut attributes = BTreeMap::new();
    for (name, value) in &annotation.elements {
        let value = annotation_value(value)
            .with_context(|| format!("resolve attribute {name} of {type_name}"))?;
        attributes.insert(name.clone(), value);
    }
    Ok(DeclaredAnnotation {
        type_name,
        attributes,
    })
}

pub(crate) fn annotation_value(value: &ElementValue) -> Result<AnnotationValue> {
    let converted = match value {
        ElementValue::Byte(value) => AnnotationValue::Byte(*value),
        ElementValue::Char(value) => AnnotationValue::Char(*value),
        ElementValue::Double(value) => AnnotationValue::Double(*value),
        ElementValue::Float(value) => AnnotationValue::Float(*value),
        ElementValue::Int(value) => AnnotationValue::Int(*value),
        ElementValue::Long(value) => AnnotationValue::Long(*value),
        ElementValue::Short(value) => AnnotationValue::Short(*value),
        ElementValue::Boolean(value) => AnnotationValue::Boolean(*value),
        ElementValue::String(value) => AnnotationValue::String(value.clone()),
        ElementValue::Enum {
            type_descriptor,
            const_name,
        } => AnnotationValue::Enum {
            type_name: object_type_name(type_descriptor).context("resolve enum type")?,
            constant: const_name.clone(),
        },
        ElementValue::Class(descriptor) => {
            AnnotationValue::Class(field_type_name(descriptor).context("resolve class value")?)
        }
        ElementValue::Annotation(annotation) => {
            AnnotationValue::Annotation(declared_annotation(annotation)?)
        }
        ElementValue::Array(values) => AnnotationValue::Array(
            values
                .iter()
                .map(annotation_value)
                .collect::<Result<Vec<_>>>()?,
        ),
    };
    Ok(converted)
}
