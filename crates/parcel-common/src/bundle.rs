//! Bundle content model and loader interface
//!
//! A bundle is a directory (baked into an image, or mounted locally for
//! self-bootstrap) of a `manifest.yaml` plus multi-document YAML files. The
//! operator only consumes the parsed form: ordered phases of opaque objects.
//! Image pulling itself is an external concern behind the [`BundleSource`]
//! trait; the folder loader here covers the fixed-path self-bootstrap case.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crd::ObjectSetTemplatePhase;
use crate::{Error, Result};

/// Annotation assigning an object to a named phase
pub const PHASE_ANNOTATION: &str = "parcel.dev/phase";

/// Filename of the bundle manifest
pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Raw bundle files, keyed by path relative to the bundle root
pub type BundleFiles = BTreeMap<String, Vec<u8>>;

/// Bundle metadata, parsed from `manifest.yaml`
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    /// Bundle name
    pub name: String,

    /// Phase names in rollout order
    #[serde(default)]
    pub phases: Vec<String>,
}

/// Parsed bundle: metadata plus ordered phases of objects
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PackageContents {
    /// Bundle metadata
    pub manifest: BundleManifest,

    /// Objects grouped into the manifest's phases, in order
    pub phases: Vec<ObjectSetTemplatePhase>,
}

/// Source of parsed bundle contents
///
/// Implemented by the folder loader below and by image pullers outside this
/// crate; controllers and the bootstrapper only see this trait.
#[async_trait]
pub trait BundleSource: Send + Sync {
    /// Load and parse the bundle at the given location (path or image ref)
    async fn load(&self, location: &str) -> Result<PackageContents>;
}

/// Loads a bundle from a local directory
///
/// Used for self-bootstrap, where the bundle is baked into the operator image
/// at a fixed path.
#[derive(Clone, Copy, Debug, Default)]
pub struct FolderBundleSource;

#[async_trait]
impl BundleSource for FolderBundleSource {
    async fn load(&self, location: &str) -> Result<PackageContents> {
        let files = load_files(Path::new(location))?;
        from_files(location, &files)
    }
}

/// Read all YAML files under `root` into memory, keyed by relative path
pub fn load_files(root: &Path) -> Result<BundleFiles> {
    let mut files = BundleFiles::new();
    collect_files(root, root, &mut files)?;
    if files.is_empty() {
        return Err(Error::bundle(
            root.display().to_string(),
            "bundle directory contains no YAML files",
        ));
    }
    Ok(files)
}

fn collect_files(root: &Path, dir: &Path, files: &mut BundleFiles) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::bundle(dir.display().to_string(), e.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::bundle(dir.display().to_string(), e.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
            continue;
        }
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if !is_yaml {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        let data = std::fs::read(&path)
            .map_err(|e| Error::bundle(path.display().to_string(), e.to_string()))?;
        files.insert(rel, data);
    }
    Ok(())
}

/// Parse raw bundle files into ordered phases of objects
///
/// Objects are assigned to phases by the `parcel.dev/phase` annotation; the
/// phase order comes from the manifest. An object referencing an undeclared
/// phase, or carrying no phase annotation at all, is a bundle error.
pub fn from_files(location: &str, files: &BundleFiles) -> Result<PackageContents> {
    let manifest_raw = files
        .get(MANIFEST_FILE)
        .ok_or_else(|| Error::bundle(location, format!("missing {MANIFEST_FILE}")))?;
    let manifest: BundleManifest = serde_yaml::from_slice(manifest_raw)
        .map_err(|e| Error::bundle(location, format!("invalid {MANIFEST_FILE}: {e}")))?;

    let mut phases: Vec<ObjectSetTemplatePhase> = manifest
        .phases
        .iter()
        .map(|name| ObjectSetTemplatePhase {
            name: name.clone(),
            objects: vec![],
        })
        .collect();

    for (file, raw) in files {
        if file == MANIFEST_FILE {
            continue;
        }
        let text = std::str::from_utf8(raw)
            .map_err(|e| Error::bundle(location, format!("{file}: invalid UTF-8: {e}")))?;
        for doc in serde_yaml::Deserializer::from_str(text) {
            let object = serde_json::Value::deserialize(doc)
                .map_err(|e| Error::bundle(location, format!("{file}: invalid YAML: {e}")))?;
            if object.is_null() {
                continue;
            }
            let phase_name = object["metadata"]["annotations"][PHASE_ANNOTATION]
                .as_str()
                .ok_or_else(|| {
                    Error::bundle(location, format!("{file}: object missing phase annotation"))
                })?;
            let phase = phases
                .iter_mut()
                .find(|p| p.name == phase_name)
                .ok_or_else(|| {
                    Error::bundle(
                        location,
                        format!("{file}: phase {phase_name} not declared in manifest"),
                    )
                })?;
            phase.objects.push(object);
        }
    }

    Ok(PackageContents { manifest, phases })
}

/// Extract all CustomResourceDefinition objects from a bundle's phases
///
/// The bootstrapper installs these before anything else; the manager cannot
/// start without its own schema.
pub fn crds_from_phases(phases: &[ObjectSetTemplatePhase]) -> Vec<serde_json::Value> {
    phases
        .iter()
        .flat_map(|phase| phase.objects.iter())
        .filter(|obj| {
            obj["kind"] == "CustomResourceDefinition"
                && obj["apiVersion"]
                    .as_str()
                    .is_some_and(|v| v.starts_with("apiextensions.k8s.io/"))
        })
        .cloned()
        .collect()
}
