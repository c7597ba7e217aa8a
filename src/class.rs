use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use tracing::debug;

use crate::annotations::{
    AnnotationValue, MergedAnnotations, SharedResolver, create_merged_annotations,
};
use crate::descriptor::resource_path_to_class_name;
use crate::element::{ClassElement, ClassEntry, ClassModel, InnerClassInfo, MethodModel};
use crate::flags::AccessFlags;
use crate::method::MethodMetadata;

/// Metadata of one compiled class.
///
/// Equality and hashing only consider the class name.
pub struct ClassMetadata {
    class_name: String,
    access_flags: AccessFlags,
    enclosing_class_name: Option<String>,
    super_class_name: Option<String>,
    independent_inner_class: bool,
    interface_names: BTreeSet<String>,
    member_class_names: BTreeSet<String>,
    declared_methods: BTreeSet<MethodMetadata>,
    annotations: MergedAnnotations,
    annotation_types: OnceLock<BTreeSet<String>>,
}

impl ClassMetadata {
    /// Build class metadata from a decoded class, consuming its elements in stream order.
    pub fn parse(class: &ClassModel, resolver: &SharedResolver) -> Result<Self> {
        let mut builder = ClassMetadataBuilder::new(resolver.clone());
        builder.class_entry(&class.this_class);
        let current_class_name = class.this_class.name();
        for element in class.elements() {
            match element {
                ClassElement::AccessFlags(flags) => {
                    builder.access_flags(*flags);
                }
                ClassElement::NestHost(host) => {
                    builder.enclosing_class(host);
                }
                ClassElement::InnerClasses(classes) => {
                    builder.nest_members(current_class_name, classes);
                }
                ClassElement::RuntimeVisibleAnnotations(annotations) => {
                    let merged = create_merged_annotations(
                        &resource_path_to_class_name(current_class_name),
                        Some(annotations.as_slice()),
                        resolver,
                    )?;
                    builder.merged_annotations(merged);
                }
                ClassElement::Superclass(superclass) => {
                    builder.super_class(superclass);
                }
                ClassElement::Interfaces(interfaces) => {
                    builder.interfaces(interfaces);
                }
                ClassElement::Method(method) => {
                    builder.method(method)?;
                }
                ClassElement::Unknown(name) => {
                    debug!(class = current_class_name, element = %name, "ignoring class element");
                }
            }
        }
        builder
            .build()
            .with_context(|| format!("build metadata for {current_class_name}"))
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.access_flags
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.has(AccessFlags::INTERFACE)
    }

    pub fn is_annotation(&self) -> bool {
        self.access_flags.has(AccessFlags::ANNOTATION)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.has(AccessFlags::ABSTRACT)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.has(AccessFlags::FINAL)
    }

    /// Neither an interface nor an abstract class.
    pub fn is_concrete(&self) -> bool {
        !(self.is_interface() || self.is_abstract())
    }

    /// Top-level class or static nested class.
    pub fn is_independent(&self) -> bool {
        self.enclosing_class_name.is_none() || self.independent_inner_class
    }

    pub fn enclosing_class_name(&self) -> Option<&str> {
        self.enclosing_class_name.as_deref()
    }

    pub fn has_enclosing_class(&self) -> bool {
        self.enclosing_class_name.is_some()
    }

    pub fn super_class_name(&self) -> Option<&str> {
        self.super_class_name.as_deref()
    }

    pub fn has_super_class(&self) -> bool {
        self.super_class_name.is_some()
    }

    pub fn interface_names(&self) -> &BTreeSet<String> {
        &self.interface_names
    }

    pub fn member_class_names(&self) -> &BTreeSet<String> {
        &self.member_class_names
    }

    pub fn annotations(&self) -> &MergedAnnotations {
        &self.annotations
    }

    /// Types of the annotations declared directly on the class.
    ///
    /// Computed on first use and cached.
    pub fn annotation_types(&self) -> &BTreeSet<String> {
        self.annotation_types.get_or_init(|| {
            self.annotations
                .direct_annotation_types()
                .into_iter()
                .collect()
        })
    }

    pub fn meta_annotation_types(&self, annotation_name: &str) -> Vec<String> {
        self.annotations.meta_annotation_types(annotation_name)
    }

    pub fn has_annotation(&self, annotation_name: &str) -> bool {
        self.annotations.is_directly_present(annotation_name)
    }

    pub fn has_meta_annotation(&self, meta_annotation_name: &str) -> bool {
        self.annotations
            .merged()
            .iter()
            .any(|annotation| {
                annotation.is_meta_present() && annotation.type_name() == meta_annotation_name
            })
    }

    pub fn is_annotated(&self, annotation_name: &str) -> bool {
        self.annotations.is_present(annotation_name)
    }

    pub fn annotation_attributes(
        &self,
        annotation_name: &str,
    ) -> Option<BTreeMap<String, AnnotationValue>> {
        self.annotations
            .get(annotation_name)
            .map(|annotation| annotation.attributes().clone())
    }

    pub fn declared_methods(&self) -> &BTreeSet<MethodMetadata> {
        &self.declared_methods
    }

    /// Declared methods annotated, directly or through meta-annotations, with the type.
    pub fn annotated_methods(&self, annotation_name: &str) -> Vec<&MethodMetadata> {
        self.declared_methods
            .iter()
            .filter(|method| method.is_annotated(annotation_name))
            .collect()
    }

    pub fn has_annotated_methods(&self, annotation_name: &str) -> bool {
        self.declared_methods
            .iter()
            .any(|method| method.is_annotated(annotation_name))
    }
}

impl PartialEq for ClassMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.class_name == other.class_name
    }
}

impl Eq for ClassMetadata {}

impl Hash for ClassMetadata {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.class_name.hash(state);
    }
}

impl fmt::Display for ClassMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class_name)
    }
}

impl fmt::Debug for ClassMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMetadata")
            .field("class_name", &self.class_name)
            .field("access_flags", &self.access_flags)
            .field("enclosing_class_name", &self.enclosing_class_name)
            .field("super_class_name", &self.super_class_name)
            .field("interface_names", &self.interface_names)
            .field("declared_methods", &self.declared_methods.len())
            .finish_non_exhaustive()
    }
}

/// Accumulates class elements for a single [`ClassMetadata::parse`] pass.
pub struct ClassMetadataBuilder {
    resolver: SharedResolver,
    class_name: Option<String>,
    access_flags: Option<AccessFlags>,
    inner_access_flags: Option<AccessFlags>,
    enclosing_class_name: Option<String>,
    super_class_name: Option<String>,
    interface_names: BTreeSet<String>,
    member_class_names: BTreeSet<String>,
    declared_methods: BTreeSet<MethodMetadata>,
    annotations: Option<MergedAnnotations>,
}

impl ClassMetadataBuilder {
    pub fn new(resolver: SharedResolver) -> Self {
        Self {
            resolver,
            class_name: None,
            access_flags: None,
            inner_access_flags: None,
            enclosing_class_name: None,
            super_class_name: None,
            interface_names: BTreeSet::new(),
            member_class_names: BTreeSet::new(),
            declared_methods: BTreeSet::new(),
            annotations: None,
        }
    }

    pub fn class_entry(&mut self, entry: &ClassEntry) -> &mut Self {
        self.class_name = Some(resource_path_to_class_name(entry.name()));
        self
    }

    pub fn access_flags(&mut self, flags: AccessFlags) -> &mut Self {
        self.access_flags = Some(flags);
        self
    }

    pub fn inner_access_flags(&mut self, flags: AccessFlags) -> &mut Self {
        self.inner_access_flags = Some(flags);
        self
    }

    pub fn enclosing_class(&mut self, entry: &ClassEntry) -> &mut Self {
        self.enclosing_class_name = Some(resource_path_to_class_name(entry.name()));
        self
    }

    pub fn super_class(&mut self, entry: &ClassEntry) -> &mut Self {
        self.super_class_name = Some(resource_path_to_class_name(entry.name()));
        self
    }

    pub fn interfaces(&mut self, entries: &[ClassEntry]) -> &mut Self {
        for entry in entries {
            self.interface_names
                .insert(resource_path_to_class_name(entry.name()));
        }
        self
    }

    /// Record the inner-class table: the row naming this class describes its own flags,
    /// every other row names a member class.
    pub fn nest_members(
        &mut self,
        current_class_name: &str,
        classes: &[InnerClassInfo],
    ) -> &mut Self {
        for info in classes {
            let inner_class_name = info.inner_class.name();
            if inner_class_name == current_class_name {
                self.inner_access_flags(info.flags);
            } else {
                self.member_class_names
                    .insert(resource_path_to_class_name(inner_class_name));
            }
        }
        self
    }

    pub fn merged_annotations(&mut self, annotations: MergedAnnotations) -> &mut Self {
        self.annotations = Some(annotations);
        self
    }

    pub fn method(&mut self, method: &MethodModel) -> Result<&mut Self> {
        let metadata = MethodMetadata::parse(method, &self.resolver)?;
        self.declared_methods.insert(metadata);
        Ok(self)
    }

    pub fn build(self) -> Result<ClassMetadata> {
        let class_name = self.class_name.context("class name was never set")?;
        let access_flags = self
            .access_flags
            .with_context(|| format!("access flags of {class_name} were never set"))?;
        let independent_inner_class = self.enclosing_class_name.is_some()
            && self
                .inner_access_flags
                .is_some_and(|flags| flags.has(AccessFlags::STATIC));
        let annotations = self
            .annotations
            .unwrap_or_else(|| MergedAnnotations::empty(class_name.clone()));
        Ok(ClassMetadata {
            class_name,
            access_flags,
            enclosing_class_name: self.enclosing_class_name,
            super_class_name: self.super_class_name,
            independent_inner_class,
            interface_names: self.interface_names,
            member_class_names: self.member_class_names,
            declared_methods: self.declared_methods,
            annotations,
            annotation_types: OnceLock::new(),
        })
    }
}
