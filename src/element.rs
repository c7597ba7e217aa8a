//! Structural decoding of a compiled class, as handed to the metadata builders.
//!
//! Everything here is already resolved against the constant pool: class references carry
//! their internal names and annotation values carry their literal contents.

use crate::flags::AccessFlags;

/// Reference to a class by its internal (slash separated) name.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClassEntry {
    name: String,
}

impl ClassEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Internal name, e.g. `java/util/Map$Entry`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One row of an `InnerClasses` attribute.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InnerClassInfo {
    pub inner_class: ClassEntry,
    pub outer_class: Option<ClassEntry>,
    pub inner_name: Option<String>,
    pub flags: AccessFlags,
}

/// Annotation occurrence as stored in a `RuntimeVisibleAnnotations` attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation type, e.g. `Lorg/example/Marker;`.
    pub type_descriptor: String,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub fn new(type_descriptor: impl Into<String>) -> Self {
        Self {
            type_descriptor: type_descriptor.into(),
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, name: impl Into<String>, value: ElementValue) -> Self {
        self.elements.push((name.into(), value));
        self
    }
}

/// Annotation element value with constant pool references resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementValue {
    Byte(i8),
    /// UTF-16 code unit as stored in the constant pool; may be a lone surrogate.
    Char(u16),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    String(String),
    /// Enum constant; the type is a field descriptor.
    Enum {
        type_descriptor: String,
        const_name: String,
    },
    /// Class literal; the value is a return descriptor (`V` for `void.class`).
    Class(String),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

/// Structural elements of a compiled method.
#[derive(Clone, Debug, PartialEq)]
pub enum MethodElement {
    RuntimeVisibleAnnotations(Vec<Annotation>),
    /// Default value of an annotation type member.
    AnnotationDefault(ElementValue),
    /// Any other attribute, by attribute name.
    Unknown(String),
}

/// Compiled method as seen by the method metadata builder.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodModel {
    pub name: String,
    pub flags: AccessFlags,
    /// Declaring class, absent for detached method models.
    pub parent: Option<ClassEntry>,
    pub descriptor: String,
    pub elements: Vec<MethodElement>,
}

impl MethodModel {
    pub fn new(
        name: impl Into<String>,
        descriptor: impl Into<String>,
        flags: AccessFlags,
    ) -> Self {
        Self {
            name: name.into(),
            flags,
            parent: None,
            descriptor: descriptor.into(),
            elements: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: ClassEntry) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_element(mut self, element: MethodElement) -> Self {
        self.elements.push(element);
        self
    }
}

/// Structural elements of a compiled class.
///
/// Consumers must accept these in any order.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassElement {
    AccessFlags(AccessFlags),
    Superclass(ClassEntry),
    Interfaces(Vec<ClassEntry>),
    NestHost(ClassEntry),
    InnerClasses(Vec<InnerClassInfo>),
    RuntimeVisibleAnnotations(Vec<Annotation>),
    Method(MethodModel),
    /// Fields, version, and attributes without metadata relevance, by name.
    Unknown(String),
}

/// Decoded class: its own entry plus its element stream.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassModel {
    pub this_class: ClassEntry,
    pub elements: Vec<ClassElement>,
}

impl ClassModel {
    pub fn new(this_class: ClassEntry) -> Self {
        Self {
            this_class,
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, element: ClassElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn elements(&self) -> impl Iterator<Item = &ClassElement> {
        self.elements.iter()
    }
}
