use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::class::ClassMetadata;
use crate::scan::scan_inputs;

/// Source file definition for compilation.
pub(crate) struct SourceFile {
    pub(crate) path: String,
    pub(crate) contents: String,
}

/// Compiled output directory; removed when dropped.
pub(crate) struct CompileOutput {
    #[allow(dead_code)]
    temp_dir: TempDir,
    classes_dir: PathBuf,
}

impl CompileOutput {
    pub(crate) fn classes_dir(&self) -> &Path {
        &self.classes_dir
    }
}

/// Test harness that compiles Java sources and reads their metadata back.
pub(crate) struct JavaTestHarness {
    javac: PathBuf,
}

impl JavaTestHarness {
    pub(crate) fn new() -> Result<Self> {
        let javac = javac_path()?;
        Ok(Self { javac })
    }

    pub(crate) fn compile(&self, sources: &[SourceFile]) -> Result<CompileOutput> {
        let temp_dir = tempfile::tempdir().context("create temp dir")?;
        let src_dir = temp_dir.path().join("src");
        let classes_dir = temp_dir.path().join("classes");
        fs::create_dir_all(&src_dir).context("create src dir")?;
        fs::create_dir_all(&classes_dir).context("create classes dir")?;

        let mut source_paths = Vec::new();
        for source in sources {
            let path = src_dir.join(&source.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("create source parent dir")?;
            }
            fs::write(&path, source.contents.as_bytes()).context("write source file")?;
            source_paths.push(path);
        }

        let mut command = Command::new(&self.javac);
        command.arg("-d").arg(&classes_dir);
        command.args(&source_paths);
        run_command(command, "javac")?;

        Ok(CompileOutput {
            temp_dir,
            classes_dir,
        })
    }

    pub(crate) fn compile_and_read(&self, sources: &[SourceFile]) -> Result<Vec<ClassMetadata>> {
        let output = self.compile(sources)?;
        let scan = scan_inputs(output.classes_dir(), &[]).context("scan classes")?;
        Ok(scan.classes)
    }
}

fn javac_path() -> Result<PathBuf> {
    let java_home = std::env::var("JAVA_HOME").context("JAVA_HOME not set")?;
    let mut path = PathBuf::from(java_home);
    path.push("bin");
    path.push("javac");
    if cfg!(windows) {
        path.set_extension("exe");
    }
    if !path.exists() {
        anyhow::bail!("javac not found at {}", path.display());
    }
    Ok(path)
}

fn run_command(mut command: Command, label: &str) -> Result<()> {
    let output = command.output().with_context(|| format!("run {label}"))?;
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{label} failed: stdout={stdout} stderr={stderr}");
    }
    Ok(())
}

/// Annotation element value written by [`ClassFileWriter`].
pub(crate) enum ElementValueSpec {
    String(String),
    Int(i32),
    /// UTF-16 code unit.
    Char(u16),
    Boolean(bool),
    /// Class literal, as a descriptor.
    Class(String),
    Enum(String, String),
    Array(Vec<ElementValueSpec>),
}

type AnnotationSpec<'a> = (&'a str, Vec<(&'a str, ElementValueSpec)>);

/// Minimal class file writer for reader tests.
///
/// Writes version 61 class files without fields or code; only the structures the metadata
/// reader consumes.
pub(crate) struct ClassFileWriter {
    cp: Vec<CpEntry>,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    methods: Vec<Vec<u8>>,
    attributes: Vec<Vec<u8>>,
    inner_classes: Vec<[u16; 4]>,
}

impl ClassFileWriter {
    pub(crate) fn new(class_name: &str, super_name: Option<&str>, access_flags: u16) -> Self {
        let mut writer = Self {
            cp: Vec::new(),
            access_flags,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            inner_classes: Vec::new(),
        };
        writer.this_class = writer.add_class(class_name);
        if let Some(super_name) = super_name {
            writer.super_class = writer.add_class(super_name);
        }
        writer
    }

    pub(crate) fn add_interface(&mut self, name: &str) {
        let index = self.add_class(name);
        self.interfaces.push(index);
    }

    pub(crate) fn add_nest_host(&mut self, host: &str) {
        let host_index = self.add_class(host);
        let mut body = Vec::new();
        write_u16(&mut body, host_index);
        self.add_attribute("NestHost", body);
    }

    pub(crate) fn add_inner_class(
        &mut self,
        inner: &str,
        outer: Option<&str>,
        inner_name: Option<&str>,
        flags: u16,
    ) {
        let inner_index = self.add_class(inner);
        let outer_index = outer.map(|outer| self.add_class(outer)).unwrap_or(0);
        let name_index = inner_name.map(|name| self.add_utf8(name)).unwrap_or(0);
        self.inner_classes
            .push([inner_index, outer_index, name_index, flags]);
    }

    pub(crate) fn add_class_annotation(
        &mut self,
        descriptor: &str,
        elements: Vec<(&str, ElementValueSpec)>,
    ) {
        let body = self.annotations_body(vec![(descriptor, elements)]);
        self.add_attribute("RuntimeVisibleAnnotations", body);
    }

    pub(crate) fn add_method(
        &mut self,
        name: &str,
        descriptor: &str,
        access_flags: u16,
        annotations: Vec<AnnotationSpec<'_>>,
    ) {
        let body = if annotations.is_empty() {
            Vec::new()
        } else {
            self.annotations_body(annotations)
        };
        self.add_method_with_attribute(
            name,
            descriptor,
            access_flags,
            "RuntimeVisibleAnnotations",
            body,
        );
    }

    /// Abstract annotation type member, with an `AnnotationDefault` attribute when a default
    /// is given.
    pub(crate) fn add_annotation_member(
        &mut self,
        name: &str,
        descriptor: &str,
        default: Option<ElementValueSpec>,
    ) {
        let mut body = Vec::new();
        if let Some(value) = default {
            self.write_element_value(&mut body, value);
        }
        self.add_method_with_attribute(name, descriptor, 0x0401, "AnnotationDefault", body);
    }

    /// Method carrying one attribute with an arbitrary body; an empty body writes none.
    pub(crate) fn add_method_with_attribute(
        &mut self,
        name: &str,
        descriptor: &str,
        access_flags: u16,
        attribute_name: &str,
        body: Vec<u8>,
    ) {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        let mut bytes = Vec::new();
        write_u16(&mut bytes, access_flags);
        write_u16(&mut bytes, name_index);
        write_u16(&mut bytes, descriptor_index);
        if body.is_empty() {
            write_u16(&mut bytes, 0);
        } else {
            let attribute_name = self.add_utf8(attribute_name);
            write_u16(&mut bytes, 1);
            write_u16(&mut bytes, attribute_name);
            write_u32(&mut bytes, body.len() as u32);
            bytes.extend_from_slice(&body);
        }
        self.methods.push(bytes);
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        if !self.inner_classes.is_empty() {
            let mut body = Vec::new();
            write_u16(&mut body, self.inner_classes.len() as u16);
            for row in &self.inner_classes {
                for value in row {
                    write_u16(&mut body, *value);
                }
            }
            self.add_attribute("InnerClasses", body);
        }

        let mut bytes = Vec::new();
        write_u32(&mut bytes, 0xCAFEBABE);
        write_u16(&mut bytes, 0);
        write_u16(&mut bytes, 61);
        write_u16(&mut bytes, (self.cp.len() + 1) as u16);
        for entry in &self.cp {
            entry.write(&mut bytes);
        }
        write_u16(&mut bytes, self.access_flags);
        write_u16(&mut bytes, self.this_class);
        write_u16(&mut bytes, self.super_class);
        write_u16(&mut bytes, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            write_u16(&mut bytes, *interface);
        }
        write_u16(&mut bytes, 0);
        write_u16(&mut bytes, self.methods.len() as u16);
        for method in &self.methods {
            bytes.extend_from_slice(method);
        }
        write_u16(&mut bytes, self.attributes.len() as u16);
        for attribute in &self.attributes {
            bytes.extend_from_slice(attribute);
        }
        bytes
    }

    /// Class attribute with a raw body.
    pub(crate) fn add_attribute(&mut self, name: &str, body: Vec<u8>) {
        let name_index = self.add_utf8(name);
        let mut bytes = Vec::new();
        write_u16(&mut bytes, name_index);
        write_u32(&mut bytes, body.len() as u32);
        bytes.extend_from_slice(&body);
        self.attributes.push(bytes);
    }

    fn annotations_body(&mut self, annotations: Vec<AnnotationSpec<'_>>) -> Vec<u8> {
        let mut body = Vec::new();
        write_u16(&mut body, annotations.len() as u16);
        for (descriptor, elements) in annotations {
            let type_index = self.add_utf8(descriptor);
            write_u16(&mut body, type_index);
            write_u16(&mut body, elements.len() as u16);
            for (name, value) in elements {
                let name_index = self.add_utf8(name);
                write_u16(&mut body, name_index);
                self.write_element_value(&mut body, value);
            }
        }
        body
    }

    fn write_element_value(&mut self, body: &mut Vec<u8>, value: ElementValueSpec) {
        match value {
            ElementValueSpec::String(value) => {
                body.push(b's');
                let index = self.add_utf8(&value);
                write_u16(body, index);
            }
            ElementValueSpec::Int(value) => {
                body.push(b'I');
                let index = self.add_integer(value);
                write_u16(body, index);
            }
            ElementValueSpec::Char(value) => {
                body.push(b'C');
                let index = self.add_integer(i32::from(value));
                write_u16(body, index);
            }
            ElementValueSpec::Boolean(value) => {
                body.push(b'Z');
                let index = self.add_integer(i32::from(value));
                write_u16(body, index);
            }
            ElementValueSpec::Class(descriptor) => {
                body.push(b'c');
                let index = self.add_utf8(&descriptor);
                write_u16(body, index);
            }
            ElementValueSpec::Enum(descriptor, constant) => {
                body.push(b'e');
                let type_index = self.add_utf8(&descriptor);
                let const_index = self.add_utf8(&constant);
                write_u16(body, type_index);
                write_u16(body, const_index);
            }
            ElementValueSpec::Array(values) => {
                body.push(b'[');
                write_u16(body, values.len() as u16);
                for value in values {
                    self.write_element_value(body, value);
                }
            }
        }
    }

    fn add_utf8(&mut self, value: &str) -> u16 {
        if let Some(position) = self
            .cp
            .iter()
            .position(|entry| matches!(entry, CpEntry::Utf8(existing) if existing == value))
        {
            return (position + 1) as u16;
        }
        self.cp.push(CpEntry::Utf8(value.to_string()));
        self.cp.len() as u16
    }

    fn add_class(&mut self, name: &str) -> u16 {
        let name_index = self.add_utf8(name);
        if let Some(position) = self
            .cp
            .iter()
            .position(|entry| matches!(entry, CpEntry::Class(existing) if *existing == name_index))
        {
            return (position + 1) as u16;
        }
        self.cp.push(CpEntry::Class(name_index));
        self.cp.len() as u16
    }

    fn add_integer(&mut self, value: i32) -> u16 {
        self.cp.push(CpEntry::Integer(value));
        self.cp.len() as u16
    }
}

/// Constant pool entries needed by generated class files.
enum CpEntry {
    Utf8(String),
    Integer(i32),
    Class(u16),
}

impl CpEntry {
    fn write(&self, bytes: &mut Vec<u8>) {
        match self {
            CpEntry::Utf8(value) => {
                bytes.push(1);
                write_u16(bytes, value.len() as u16);
                bytes.extend_from_slice(value.as_bytes());
            }
            CpEntry::Integer(value) => {
                bytes.push(3);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            CpEntry::Class(name_index) => {
                bytes.push(7);
                write_u16(bytes, *name_index);
            }
        }
    }
}

fn write_u16(bytes: &mut Vec<u8>, value: u16) {
    bytes.extend_from_slice(&value.to_be_bytes());
}

fn write_u32(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_be_bytes());
}
