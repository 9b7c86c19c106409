// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for File Forge pipelines.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ForgeError, Result};

/// Unique identifier for a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document and image formats the forge knows how to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    Pdf,
    Docx,
    Jpeg,
    Png,
    WebP,
    Tiff,
    Bmp,
    Gif,
    /// HEIC/HEIF. Recognised so it can be reported, not decoded.
    Heic,
}

impl DocumentType {
    /// MIME type string.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Tiff => "image/tiff",
            Self::Bmp => "image/bmp",
            Self::Gif => "image/gif",
            Self::Heic => "image/heic",
        }
    }

    /// Canonical file extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
            Self::Gif => "gif",
            Self::Heic => "heic",
        }
    }

    /// Infer document type from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "tif" | "tiff" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            "gif" => Some(Self::Gif),
            "heic" | "heif" => Some(Self::Heic),
            _ => None,
        }
    }

    /// Infer document type from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, Self::Pdf | Self::Docx)
    }
}

/// Closed set of transformation kinds a pipeline step can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Decrypt,
    ReflowStandard,
    ReflowRecovery,
    TranscodeImage,
    ResizeImage,
    CropImage,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [
        StepKind::Decrypt,
        StepKind::ReflowStandard,
        StepKind::ReflowRecovery,
        StepKind::TranscodeImage,
        StepKind::ResizeImage,
        StepKind::CropImage,
    ];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decrypt => "decrypt",
            Self::ReflowStandard => "reflow-standard",
            Self::ReflowRecovery => "reflow-recovery",
            Self::TranscodeImage => "transcode-image",
            Self::ResizeImage => "resize-image",
            Self::CropImage => "crop-image",
        }
    }

    /// Parse a canonical name or one of the legacy workflow names.
    ///
    /// `pdf_to_word` is handled by [`StepDescriptor::resolve_kind`] because its
    /// meaning depends on the `use_ai` flag.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "decrypt" | "remove_password" => Some(Self::Decrypt),
            "reflow-standard" => Some(Self::ReflowStandard),
            "reflow-recovery" => Some(Self::ReflowRecovery),
            "transcode-image" | "heic_to_jpeg" => Some(Self::TranscodeImage),
            "resize-image" | "resize_image" => Some(Self::ResizeImage),
            "crop-image" | "crop_image" => Some(Self::CropImage),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Untyped key/value configuration attached to a step descriptor.
///
/// Accessors accept both JSON numbers and numeric strings, since form-encoded
/// hosts deliver everything as text. A present value of the wrong shape is a
/// [`ForgeError::Validation`], never silently ignored.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepConfig(Map<String, Value>);

impl StepConfig {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_owned(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn str(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ForgeError::Validation(format!(
                "config key `{key}` must be a string"
            ))),
        }
    }

    pub fn u32(&self, key: &str) -> Result<Option<u32>> {
        let invalid = || {
            ForgeError::Validation(format!(
                "config key `{key}` must be a non-negative integer"
            ))
        };
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Some)
                .ok_or_else(invalid),
            Some(Value::String(s)) => s.trim().parse::<u32>().map(Some).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" | "" => Ok(Some(false)),
                _ => Err(ForgeError::Validation(format!(
                    "config key `{key}` must be a boolean"
                ))),
            },
            Some(_) => Err(ForgeError::Validation(format!(
                "config key `{key}` must be a boolean"
            ))),
        }
    }

    pub fn require_str(&self, kind: StepKind, key: &str) -> Result<&str> {
        match self.str(key)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(missing_key(kind, key)),
        }
    }

    pub fn require_u32(&self, kind: StepKind, key: &str) -> Result<u32> {
        self.u32(key)?.ok_or_else(|| missing_key(kind, key))
    }
}

fn missing_key(kind: StepKind, key: &str) -> ForgeError {
    ForgeError::Validation(format!("missing required config key `{key}` for {kind}"))
}

// Credentials must never reach a log line.
impl std::fmt::Debug for StepConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.0 {
            if key == "password" {
                map.entry(key, &"***");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// One requested transformation: a kind name, an optional display label, and
/// its configuration bag.
///
/// The kind stays a raw string until execution so that an unknown kind can be
/// reported at its own position in the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub config: StepConfig,
}

impl StepDescriptor {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind: kind.as_str().to_owned(),
            label: None,
            config: StepConfig::new(),
        }
    }

    /// Descriptor with an arbitrary kind name (possibly unknown).
    pub fn named(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            label: None,
            config: StepConfig::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_config(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.config = self.config.with(key, value);
        self
    }

    /// Map the raw kind name onto a [`StepKind`].
    ///
    /// A malformed `use_ai` on `pdf_to_word` maps to reflow-standard here and
    /// is rejected when that step validates its configuration.
    pub fn resolve_kind(&self) -> Option<StepKind> {
        if self.kind == "pdf_to_word" {
            let use_ai = self.config.bool("use_ai").ok().flatten().unwrap_or(false);
            return Some(if use_ai {
                StepKind::ReflowRecovery
            } else {
                StepKind::ReflowStandard
            });
        }
        StepKind::parse(&self.kind)
    }

    /// Label shown in progress events.
    pub fn display_label(&self) -> String {
        if let Some(label) = self.label.as_deref().filter(|l| !l.trim().is_empty()) {
            return label.to_owned();
        }
        match self.resolve_kind() {
            Some(kind) => kind.as_str().to_owned(),
            None => self.kind.clone(),
        }
    }

    /// Parse a JSON array of descriptors.
    pub fn parse_list(json: &str) -> Result<Vec<Self>> {
        serde_json::from_str(json)
            .map_err(|err| ForgeError::Validation(format!("invalid steps JSON: {err}")))
    }
}

/// An immutable reference to one file on disk at a point in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    stem: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

impl Artifact {
    /// Reference an existing file, reading its size from disk.
    ///
    /// `stem` is the logical base name used to derive the next artifact's name.
    pub fn from_path(path: impl Into<PathBuf>, stem: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(ForgeError::Validation(
                "artifact must reference a regular file".into(),
            ));
        }
        Ok(Self {
            path,
            stem: stem.into(),
            size_bytes: metadata.len(),
            created_at: Utc::now(),
        })
    }

    /// Reference an existing file, using its file stem as the logical stem.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed_file".to_owned());
        Self::from_path(path, stem)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// File name with extension, the only part ever shown to callers.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Lower-cased extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    pub fn document_type(&self) -> Option<DocumentType> {
        DocumentType::from_path(&self.path)
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One unit of the ordered status stream of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StepStart {
        step: usize,
        total: usize,
        label: String,
    },
    StepComplete {
        step: usize,
        total: usize,
        label: String,
    },
    Error {
        detail: String,
    },
    Complete {
        message: String,
        filename: String,
    },
}

impl ProgressEvent {
    /// `error` and `complete` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Complete { .. })
    }

    /// Compact single-line JSON record.
    pub fn to_json_line(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Server-sent-events frame (`data: {...}` followed by a blank line).
    pub fn to_sse_frame(&self) -> std::result::Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", self.to_json_line()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_names_resolve() {
        assert_eq!(StepKind::parse("remove_password"), Some(StepKind::Decrypt));
        assert_eq!(StepKind::parse("heic_to_jpeg"), Some(StepKind::TranscodeImage));
        assert_eq!(StepKind::parse("sharpen"), None);

        let word = StepDescriptor::named("pdf_to_word");
        assert_eq!(word.resolve_kind(), Some(StepKind::ReflowStandard));
        let ai = StepDescriptor::named("pdf_to_word").with_config("use_ai", true);
        assert_eq!(ai.resolve_kind(), Some(StepKind::ReflowRecovery));
    }

    #[test]
    fn label_defaults_to_canonical_kind() {
        let step = StepDescriptor::named("remove_password");
        assert_eq!(step.display_label(), "decrypt");
        let labelled = StepDescriptor::new(StepKind::CropImage).with_label("Trim edges");
        assert_eq!(labelled.display_label(), "Trim edges");
        assert_eq!(StepDescriptor::named("sharpen").display_label(), "sharpen");
    }

    #[test]
    fn config_accepts_numeric_strings() {
        let config = StepConfig::new().with("width", "120").with("height", 80);
        assert_eq!(config.u32("width").unwrap(), Some(120));
        assert_eq!(config.u32("height").unwrap(), Some(80));
        assert_eq!(config.u32("depth").unwrap(), None);
    }

    #[test]
    fn config_rejects_wrong_shapes() {
        let config = StepConfig::new().with("width", -4).with("use_ai", "maybe");
        assert!(matches!(config.u32("width"), Err(ForgeError::Validation(_))));
        assert!(matches!(config.bool("use_ai"), Err(ForgeError::Validation(_))));
    }

    #[test]
    fn missing_required_key_names_the_key() {
        let err = StepConfig::new()
            .require_str(StepKind::Decrypt, "password")
            .unwrap_err();
        assert!(err.to_string().contains("`password`"));
    }

    #[test]
    fn debug_redacts_password() {
        let config = StepConfig::new().with("password", "hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn descriptors_parse_from_workflow_json() {
        let json = r#"[
            {"type": "remove_password", "config": {"password": "x"}},
            {"type": "resize-image", "label": "Shrink", "config": {"mode": "percentage", "percentage": 50}}
        ]"#;
        let steps = StepDescriptor::parse_list(json).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].resolve_kind(), Some(StepKind::Decrypt));
        assert_eq!(steps[1].display_label(), "Shrink");
        assert!(StepDescriptor::parse_list("{not json").is_err());
    }

    #[test]
    fn events_serialise_with_event_tag() {
        let event = ProgressEvent::StepStart {
            step: 0,
            total: 2,
            label: "decrypt".into(),
        };
        assert_eq!(
            event.to_json_line().unwrap(),
            r#"{"event":"step_start","step":0,"total":2,"label":"decrypt"}"#
        );
        let done = ProgressEvent::Complete {
            message: "Workflow completed (1 steps)".into(),
            filename: "doc.docx".into(),
        };
        let frame = done.to_sse_frame().unwrap();
        assert!(frame.starts_with("data: {\"event\":\"complete\""));
        assert!(frame.ends_with("\n\n"));
        assert!(done.is_terminal());
        assert!(!event.is_terminal());
    }

    #[test]
    fn artifact_reads_size_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.PDF");
        std::fs::write(&path, b"12345").unwrap();
        let artifact = Artifact::from_file(&path).unwrap();
        assert_eq!(artifact.stem(), "report");
        assert_eq!(artifact.name(), "report.PDF");
        assert_eq!(artifact.size_bytes(), 5);
        assert_eq!(artifact.document_type(), Some(DocumentType::Pdf));
        assert!(Artifact::from_file(dir.path().join("missing.pdf")).is_err());
    }
}
