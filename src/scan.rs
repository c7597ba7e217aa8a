use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info, info_span};
use zip::ZipArchive;

use crate::annotations::{AnnotationIndex, AnnotationType, SharedResolver};
use crate::class::ClassMetadata;
use crate::reader::read_class;

/// Metadata read from the input, plus what the classpath contributed to the annotation index.
pub struct ScanOutput {
    /// Input classes, sorted by class name.
    pub classes: Vec<ClassMetadata>,
    pub class_count: usize,
    pub classpath_class_count: usize,
    pub index: Arc<AnnotationIndex>,
}

/// Raw class bytes and where they came from.
struct ClassSource {
    origin: String,
    data: Vec<u8>,
    is_input: bool,
}

/// Read class metadata from a class file, a JAR, or a directory tree.
///
/// Classpath entries (and `Class-Path` entries of JAR manifests) are read too, but only to
/// describe annotation types; their classes are not part of the output.
pub fn scan_inputs(input: &Path, classpath: &[PathBuf]) -> Result<ScanOutput> {
    let _span = info_span!("scan", input = %input.display()).entered();
    let mut sources = Vec::new();
    collect_path(input, true, true, &mut sources)?;

    // Keep deterministic ordering by sorting classpath entries and directory listings.
    let mut classpath_entries = classpath.to_vec();
    classpath_entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));
    if is_jar_path(input) {
        classpath_entries.extend(manifest_classpath(input)?);
    }
    for entry in expand_classpath(classpath_entries)? {
        if entry == input {
            continue;
        }
        collect_path(&entry, false, true, &mut sources)?;
    }

    let index = Arc::new(AnnotationIndex::new());
    let resolver: SharedResolver = index.clone();
    let parsed = sources
        .par_iter()
        .map(|source| {
            parse_source(source, &resolver).map(|metadata| (source.is_input, metadata))
        })
        .collect::<Result<Vec<_>>>()?;

    // Inputs come first, so their annotation types shadow classpath duplicates.
    index.publish(
        parsed
            .iter()
            .filter_map(|(_, metadata)| AnnotationType::from_class_metadata(metadata)),
    )?;

    let mut classes = Vec::new();
    let mut classpath_class_count = 0;
    for (is_input, metadata) in parsed {
        if is_input {
            classes.push(metadata);
        } else {
            classpath_class_count += 1;
        }
    }
    classes.sort_by(|a, b| a.class_name().cmp(b.class_name()));
    classes.dedup_by(|a, b| a.class_name() == b.class_name());

    info!(
        classes = classes.len(),
        classpath_classes = classpath_class_count,
        annotation_types = index.len(),
        "scan finished"
    );
    Ok(ScanOutput {
        class_count: classes.len(),
        classes,
        classpath_class_count,
        index,
    })
}

fn parse_source(source: &ClassSource, resolver: &SharedResolver) -> Result<ClassMetadata> {
    let model =
        read_class(&source.data).with_context(|| format!("failed to parse {}", source.origin))?;
    let metadata = ClassMetadata::parse(&model, resolver)
        .with_context(|| format!("failed to read metadata of {}", source.origin))?;
    debug!(class = metadata.class_name(), origin = %source.origin, "read class");
    Ok(metadata)
}

fn collect_path(
    path: &Path,
    is_input: bool,
    strict: bool,
    sources: &mut Vec<ClassSource>,
) -> Result<()> {
    if path.is_dir() {
        return collect_dir(path, is_input, sources);
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "class" => {
            if is_module_info(path.to_string_lossy().as_ref()) {
                return Ok(());
            }
            let data =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            sources.push(ClassSource {
                origin: path.display().to_string(),
                data,
                is_input,
            });
            Ok(())
        }
        "jar" => collect_jar(path, is_input, sources),
        _ => {
            if strict {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn collect_dir(path: &Path, is_input: bool, sources: &mut Vec<ClassSource>) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in entries {
        if entry.is_dir() {
            collect_dir(&entry, is_input, sources)?;
        } else {
            collect_path(&entry, is_input, false, sources)?;
        }
    }

    Ok(())
}

fn collect_jar(path: &Path, is_input: bool, sources: &mut Vec<ClassSource>) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class")
            && !is_module_info(&name)
            && !name.starts_with("META-INF/versions/")
        {
            entry_names.push(name);
        }
    }
    entry_names.sort();

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        sources.push(ClassSource {
            origin: format!("{}:{}", path.display(), name),
            data,
            is_input,
        });
    }

    Ok(())
}

fn is_module_info(name: &str) -> bool {
    name.ends_with("module-info.class")
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn expand_classpath(initial: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut queue: VecDeque<PathBuf> = initial.into_iter().collect();
    let mut seen = BTreeSet::new();
    let mut result = Vec::new();
    while let Some(entry) = queue.pop_front() {
        if !seen.insert(path_key(&entry)) {
            continue;
        }
        if !entry.exists() {
            anyhow::bail!("classpath entry not found: {}", entry.display());
        }
        if is_jar_path(&entry) {
            let mut referenced = manifest_classpath(&entry)?;
            referenced.sort_by(|a, b| path_key(a).cmp(&path_key(b)));
            queue.extend(referenced);
        }
        result.push(entry);
    }
    Ok(result)
}

fn manifest_classpath(path: &Path) -> Result<Vec<PathBuf>> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;
    let Ok(mut entry) = archive.by_name("META-INF/MANIFEST.MF") else {
        return Ok(Vec::new());
    };
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .with_context(|| format!("failed to read manifest of {}", path.display()))?;
    Ok(parse_manifest_classpath(path, &content))
}

/// Resolve the `Class-Path` attribute of a manifest against the JAR's directory.
fn parse_manifest_classpath(jar_path: &Path, content: &str) -> Vec<PathBuf> {
    // Continuation lines start with a single space.
    let mut unfolded: Vec<String> = Vec::new();
    for line in content.lines().map(|line| line.trim_end_matches('\r')) {
        match (line.strip_prefix(' '), unfolded.last_mut()) {
            (Some(rest), Some(previous)) => previous.push_str(rest),
            _ => unfolded.push(line.to_string()),
        }
    }

    let Some(class_path) = unfolded.iter().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "Class-Path").then(|| value.trim().to_string())
    }) else {
        return Vec::new();
    };

    let base_dir = jar_path.parent().unwrap_or_else(|| Path::new(""));
    class_path
        .split_whitespace()
        .map(|entry| {
            let entry_path = PathBuf::from(entry);
            if entry_path.is_absolute() {
                entry_path
            } else {
                base_dir.join(entry_path)
            }
        })
        .collect()
}

fn is_jar_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jar"))
        .unwrap_or(false)
}
