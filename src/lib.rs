//! Class and method metadata read straight from JVM class files.
//!
//! Nothing is loaded or executed: class names, flags, nesting, declared methods, and
//! annotations (including meta-annotations) all come from the bytecode.

pub mod annotations;
pub mod class;
pub mod descriptor;
pub mod element;
pub mod flags;
pub mod logging;
pub mod method;
pub mod reader;
pub mod report;
pub mod scan;

#[cfg(test)]
mod test_harness;

pub use annotations::{
    AnnotationIndex, AnnotationResolver, AnnotationType, AnnotationValue, MergedAnnotations,
    SharedResolver,
};
pub use class::{ClassMetadata, ClassMetadataBuilder};
pub use method::{MethodMetadata, MethodSource};
pub use reader::read_class;
pub use scan::{ScanOutput, scan_inputs};
