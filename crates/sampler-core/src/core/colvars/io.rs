use super::contact::{ContactCv, ContactScheme};
use super::cv::{CollectiveVariable, CvKind, Normalization};
use super::error::CvIoError;
use super::rmsd::{DEFAULT_RMSD_QUERY, RmsdCv};
use crate::core::io::fs::make_parent_dirs;
use crate::core::io::gro::GroFile;
use crate::core::io::traits::TrajectoryFile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level layout of a CV definition file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvsDocument {
    pub cvs: Vec<Value>,
}

fn default_scale() -> f64 {
    1.0
}

fn default_periodic() -> bool {
    true
}

fn default_query() -> String {
    DEFAULT_RMSD_QUERY.to_string()
}

fn default_warn() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub importance: Option<f64>,
    pub res1: isize,
    pub res2: isize,
    #[serde(default)]
    pub scheme: ContactScheme,
    #[serde(default = "default_periodic")]
    pub periodic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmsdDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default = "default_query")]
    pub query: String,
    /// Reference structure, relative to the definition file.
    pub reference: PathBuf,
    #[serde(rename = "warn-missing-atoms", default = "default_warn")]
    pub warn_missing_atoms: bool,
}

/// One CV entry, discriminated by its `@class` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@class")]
pub enum CvDefinition {
    ContactCv(ContactDefinition),
    InverseContactCv(ContactDefinition),
    RmsdCv(RmsdDefinition),
}

impl CvDefinition {
    pub const CLASSES: [&'static str; 3] = ["ContactCv", "InverseContactCv", "RmsdCv"];
}

/// Reads and builds the CVs of a definition file.
///
/// Relative reference paths are resolved against the file's directory.
pub fn load_cvs(path: &Path) -> Result<Vec<CollectiveVariable>, CvIoError> {
    let document = load_cvs_document(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    create_cvs(&document, base_dir)
}

pub fn load_cvs_document(path: &Path) -> Result<CvsDocument, CvIoError> {
    let content = fs::read_to_string(path).map_err(|source| CvIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Builds CVs from parsed definitions. Entries with an unknown `@class` are
/// skipped with a warning.
pub fn create_cvs(
    document: &CvsDocument,
    base_dir: &Path,
) -> Result<Vec<CollectiveVariable>, CvIoError> {
    let mut cvs = Vec::with_capacity(document.cvs.len());
    for (index, entry) in document.cvs.iter().enumerate() {
        let class = entry
            .get("@class")
            .and_then(Value::as_str)
            .ok_or_else(|| CvIoError::InvalidDefinition {
                index,
                message: "missing '@class' discriminator".into(),
            })?;
        if !CvDefinition::CLASSES.contains(&class) {
            warn!("Class {class} cannot be parsed (index {index}), skipping it: {entry}");
            continue;
        }
        let definition: CvDefinition =
            serde_json::from_value(entry.clone()).map_err(|e| CvIoError::InvalidDefinition {
                index,
                message: e.to_string(),
            })?;
        cvs.push(build_cv(definition, base_dir)?);
    }
    debug!("Created {} collective variables", cvs.len());
    Ok(cvs)
}

fn build_cv(definition: CvDefinition, base_dir: &Path) -> Result<CollectiveVariable, CvIoError> {
    let cv = match definition {
        CvDefinition::ContactCv(d) => contact_cv(d, CvKind::Contact),
        CvDefinition::InverseContactCv(d) => contact_cv(d, CvKind::InverseContact),
        CvDefinition::RmsdCv(d) => {
            let path = base_dir.join(&d.reference);
            let (reference, _) =
                GroFile::read_from_path(&path).map_err(|source| CvIoError::Reference {
                    path: path.clone(),
                    source,
                })?;
            let rmsd = RmsdCv::new(reference)
                .with_query(d.query)
                .with_reference_path(d.reference)
                .with_warn_missing_atoms(d.warn_missing_atoms);
            CollectiveVariable::new(d.id.clone())
                .with_name(d.name.unwrap_or(d.id))
                .with_importance(d.importance)
                .with_generator(CvKind::Rmsd(rmsd))
                .with_normalization(Normalization::new(d.scale, d.offset))
        }
    };
    Ok(cv)
}

fn contact_cv(d: ContactDefinition, kind: fn(ContactCv) -> CvKind) -> CollectiveVariable {
    let contact = ContactCv::new(d.res1, d.res2)
        .with_scheme(d.scheme)
        .with_periodic(d.periodic);
    CollectiveVariable::new(d.id.clone())
        .with_name(d.name.unwrap_or(d.id))
        .with_importance(d.importance)
        .with_generator(kind(contact))
        .with_normalization(Normalization::new(d.scale, d.offset))
}

/// Converts CVs back to definitions. CVs without an evaluation function are
/// skipped with a warning.
pub fn create_cvs_definitions(cvs: &[CollectiveVariable]) -> Vec<CvDefinition> {
    cvs.iter()
        .filter_map(|cv| {
            let n = cv.normalization();
            let contact = |c: &ContactCv| ContactDefinition {
                id: cv.id().to_string(),
                name: Some(cv.name().to_string()),
                scale: n.scale,
                offset: n.offset,
                importance: cv.importance(),
                res1: c.res1,
                res2: c.res2,
                scheme: c.scheme,
                periodic: c.periodic,
            };
            match cv.generator() {
                Some(CvKind::Contact(c)) => Some(CvDefinition::ContactCv(contact(c))),
                Some(CvKind::InverseContact(c)) => Some(CvDefinition::InverseContactCv(contact(c))),
                Some(CvKind::Rmsd(r)) => match &r.reference_path {
                    Some(reference) => Some(CvDefinition::RmsdCv(RmsdDefinition {
                        id: cv.id().to_string(),
                        name: Some(cv.name().to_string()),
                        scale: n.scale,
                        offset: n.offset,
                        importance: cv.importance(),
                        query: r.query.clone(),
                        reference: reference.clone(),
                        warn_missing_atoms: r.warn_missing_atoms,
                    })),
                    None => {
                        warn!("CV {} has no reference path and cannot be saved", cv.id());
                        None
                    }
                },
                None => {
                    warn!("CV {} has no evaluation function and cannot be saved", cv.id());
                    None
                }
            }
        })
        .collect()
}

/// Serializes CVs as a pretty-printed definition document.
pub fn to_json(cvs: &[CollectiveVariable]) -> Result<String, CvIoError> {
    let document = CvsDocument {
        cvs: create_cvs_definitions(cvs)
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

pub fn save_cvs(path: &Path, cvs: &[CollectiveVariable]) -> Result<(), CvIoError> {
    let json = to_json(cvs)?;
    make_parent_dirs(path)?;
    fs::write(path, json).map_err(|source| CvIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Saved {} collective variables to {}", cvs.len(), path.display());
    Ok(())
}
