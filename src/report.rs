use serde::Serialize;

use crate::annotations::{AnnotationValue, MergedAnnotation};
use crate::class::ClassMetadata;
use crate::method::MethodMetadata;
use crate::scan::ScanOutput;

/// JSON document written by the CLI.
#[derive(Debug, Serialize)]
pub struct Report {
    pub class_count: usize,
    pub classpath_class_count: usize,
    pub annotation_type_count: usize,
    pub classes: Vec<ClassReport>,
}

#[derive(Debug, Serialize)]
pub struct ClassReport {
    pub class_name: String,
    pub access_flags: u16,
    pub is_interface: bool,
    pub is_annotation: bool,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_independent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosing_class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_class_name: Option<String>,
    pub interface_names: Vec<String>,
    pub member_class_names: Vec<String>,
    pub annotation_types: Vec<String>,
    pub annotations: Vec<MergedAnnotation>,
    pub methods: Vec<MethodReport>,
}

#[derive(Debug, Serialize)]
pub struct MethodReport {
    pub method_name: String,
    /// Source token, e.g. `a.b.C.run(String,int)`.
    pub signature: String,
    pub descriptor: String,
    pub return_type_name: String,
    pub is_abstract: bool,
    pub is_static: bool,
    pub is_final: bool,
    pub is_overridable: bool,
    /// Default of an annotation type member.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<AnnotationValue>,
    pub annotations: Vec<MergedAnnotation>,
}

/// Summarize a scan. With `annotated_with`, only classes carrying that annotation (directly,
/// as a meta-annotation, or on one of their methods) are kept.
pub fn build_report(scan: &ScanOutput, annotated_with: Option<&str>) -> Report {
    let classes = scan
        .classes
        .iter()
        .filter(|class| match annotated_with {
            Some(name) => class.is_annotated(name) || class.has_annotated_methods(name),
            None => true,
        })
        .map(class_report)
        .collect();
    Report {
        class_count: scan.class_count,
        classpath_class_count: scan.classpath_class_count,
        annotation_type_count: scan.index.len(),
        classes,
    }
}

fn class_report(class: &ClassMetadata) -> ClassReport {
    ClassReport {
        class_name: class.class_name().to_string(),
        access_flags: class.access_flags().bits(),
        is_interface: class.is_interface(),
        is_annotation: class.is_annotation(),
        is_abstract: class.is_abstract(),
        is_final: class.is_final(),
        is_independent: class.is_independent(),
        enclosing_class_name: class.enclosing_class_name().map(str::to_string),
        super_class_name: class.super_class_name().map(str::to_string),
        interface_names: class.interface_names().iter().cloned().collect(),
        member_class_names: class.member_class_names().iter().cloned().collect(),
        annotation_types: class.annotation_types().iter().cloned().collect(),
        annotations: class.annotations().merged(),
        methods: class.declared_methods().iter().map(method_report).collect(),
    }
}

fn method_report(method: &MethodMetadata) -> MethodReport {
    MethodReport {
        method_name: method.method_name().to_string(),
        signature: method.to_string(),
        descriptor: method.source().descriptor().to_string(),
        return_type_name: method.return_type_name().to_string(),
        is_abstract: method.is_abstract(),
        is_static: method.is_static(),
        is_final: method.is_final(),
        is_overridable: method.is_overridable(),
        default_value: method.default_value().cloned(),
        annotations: method.annotations().merged(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::annotations::{AnnotationIndex, SharedResolver};
    use crate::element::{
        Annotation, ClassElement, ClassEntry, ClassModel, MethodElement, MethodModel,
    };
    use crate::flags::AccessFlags;

    fn scan_of(models: Vec<ClassModel>) -> ScanOutput {
        let index = Arc::new(AnnotationIndex::from_types(Vec::new()));
        let resolver: SharedResolver = index.clone();
        let classes: Vec<ClassMetadata> = models
            .iter()
            .map(|model| ClassMetadata::parse(model, &resolver).expect("parse class"))
            .collect();
        ScanOutput {
            class_count: classes.len(),
            classes,
            classpath_class_count: 0,
            index,
        }
    }

    fn plain_class(name: &str) -> ClassModel {
        let entry = ClassEntry::new(name);
        ClassModel::new(entry.clone())
            .with_element(ClassElement::AccessFlags(AccessFlags::PUBLIC | AccessFlags::SUPER))
            .with_element(ClassElement::Superclass(ClassEntry::new("java/lang/Object")))
            .with_element(ClassElement::Method(
                MethodModel::new("run", "()V", AccessFlags::PUBLIC).with_parent(entry),
            ))
    }

    fn handler_class(name: &str) -> ClassModel {
        let entry = ClassEntry::new(name);
        ClassModel::new(entry.clone())
            .with_element(ClassElement::AccessFlags(AccessFlags::PUBLIC))
            .with_element(ClassElement::Method(
                MethodModel::new(
                    "handle",
                    "(Ljava/lang/String;)Ljava/lang/String;",
                    AccessFlags::PUBLIC,
                )
                    .with_parent(entry)
                    .with_element(MethodElement::RuntimeVisibleAnnotations(vec![
                        Annotation::new("Lorg/example/Handler;"),
                    ])),
            ))
    }

    #[test]
    fn report_serializes_class_and_method_shape() {
        let scan = scan_of(vec![plain_class("org/example/Plain")]);

        let report = build_report(&scan, None);
        let value = serde_json::to_value(&report).expect("serialize report");

        assert_eq!(value["class_count"], 1);
        let class = &value["classes"][0];
        assert_eq!(class["class_name"], "org.example.Plain");
        assert_eq!(class["access_flags"], 0x0021);
        assert_eq!(class["super_class_name"], "java.lang.Object");
        assert!(class.get("enclosing_class_name").is_none());
        assert_eq!(class["is_independent"], true);
        assert_eq!(class["methods"][0]["signature"], "org.example.Plain.run()");
        assert_eq!(class["methods"][0]["return_type_name"], "void");
        assert_eq!(class["methods"][0]["is_overridable"], true);
        assert!(class["methods"][0].get("default_value").is_none());
    }

    #[test]
    fn annotated_with_keeps_classes_with_annotated_methods() {
        let scan = scan_of(vec![
            plain_class("org/example/Plain"),
            handler_class("org/example/Handlers"),
        ]);

        let report = build_report(&scan, Some("org.example.Handler"));

        assert_eq!(report.class_count, 2);
        assert_eq!(report.classes.len(), 1);
        assert_eq!(report.classes[0].class_name, "org.example.Handlers");
        assert_eq!(
            report.classes[0].methods[0].signature,
            "org.example.Handlers.handle(String)"
        );
        assert_eq!(report.classes[0].methods[0].return_type_name, "String");
    }
}
