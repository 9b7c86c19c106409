// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `reflow-standard` and `reflow-recovery` — PDF to Word conversion.

use std::sync::Arc;

use forge_core::error::{ForgeError, Result};
use forge_core::types::{Artifact, DocumentType, StepConfig, StepKind};
use forge_document::layout::standard_blocks;
use forge_document::{Block, DocxWriter, PdfReader, RecoveryEngine};
use forge_security::resolve;
use tracing::{info, instrument};

use super::{StepContext, StepImpl};
use crate::engine_cache::SharedEngine;

/// Line-for-line conversion of the PDF text layer.
///
/// Config: `password` (optional, for encrypted input). Output `<stem>.docx`.
pub struct StandardReflowStep;

/// Paragraph-recovering conversion through the shared recovery engine.
///
/// Config: `password` (optional). Output `<stem>_recovered.docx`.
pub struct RecoveryReflowStep {
    engine: Arc<SharedEngine<RecoveryEngine>>,
}

impl RecoveryReflowStep {
    pub fn new(engine: Arc<SharedEngine<RecoveryEngine>>) -> Self {
        Self { engine }
    }
}

impl StepImpl for StandardReflowStep {
    fn kind(&self) -> StepKind {
        StepKind::ReflowStandard
    }

    fn validate(&self, config: &StepConfig) -> Result<()> {
        validate_reflow(config)
    }

    #[instrument(skip_all, fields(input = %input.name()))]
    fn transform(&self, input: &Artifact, config: &StepConfig, ctx: &StepContext) -> Result<Artifact> {
        reflow(input, config, ctx, "", standard_blocks)
    }
}

impl StepImpl for RecoveryReflowStep {
    fn kind(&self) -> StepKind {
        StepKind::ReflowRecovery
    }

    fn validate(&self, config: &StepConfig) -> Result<()> {
        validate_reflow(config)
    }

    #[instrument(skip_all, fields(input = %input.name()))]
    fn transform(&self, input: &Artifact, config: &StepConfig, ctx: &StepContext) -> Result<Artifact> {
        let engine = self.engine.get()?;
        reflow(input, config, ctx, "_recovered", |reader| engine.recover(reader))
    }
}

fn reflow<F>(
    input: &Artifact,
    config: &StepConfig,
    ctx: &StepContext,
    suffix: &str,
    layout: F,
) -> Result<Artifact>
where
    F: FnOnce(&PdfReader) -> Result<Vec<Block>>,
{
    if input.document_type() != Some(DocumentType::Pdf) {
        let ext = input.extension().unwrap_or_else(|| "unknown".into());
        return Err(ForgeError::UnsupportedFormat(ext));
    }

    // The scratch copy, if any, is deleted when `readable` drops.
    let readable = resolve(input, config.str("password")?, ctx.scratch_dir())?;
    let reader = PdfReader::open(readable.path())?;
    let blocks = layout(&reader)?;
    drop(reader);
    drop(readable);

    let out = ctx.reserve_output(input.stem(), suffix, DocumentType::Docx.extension())?;
    DocxWriter::from_blocks(blocks).write_to_file(&out)?;
    ctx.keep(&out);

    info!(output = %out.file_name().unwrap_or_default().to_string_lossy(), "PDF reflowed");
    Artifact::from_path(out, input.stem())
}

/// `use_ai` only selects the variant of the legacy `pdf_to_word` alias, but a
/// value that isn't a boolean is still a malformed request.
fn validate_reflow(config: &StepConfig) -> Result<()> {
    config.str("password")?;
    config.bool("use_ai").map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Workspace, protected_pdf, text_pdf};
    use forge_core::config::RecoveryConfig;
    use forge_security::DocumentEnvelope;

    #[test]
    fn standard_reflow_names_output_after_stem() {
        let ws = Workspace::new();
        let input = ws.input("report.pdf", &text_pdf(&["Hello world"]));

        let ctx = ws.context();
        let out = StandardReflowStep
            .transform(&input, &StepConfig::new(), &ctx)
            .unwrap();
        drop(ctx);

        assert_eq!(out.name(), "report.docx");
        assert!(out.size_bytes() > 0);
    }

    #[test]
    fn encrypted_input_needs_password_and_leaves_no_scratch() {
        let ws = Workspace::new();
        let sealed = DocumentEnvelope::new("pw")
            .seal(&text_pdf(&["Sealed text"]))
            .unwrap();
        let input = ws.input("locked.pdf", &sealed);

        let ctx = ws.context();
        let err = StandardReflowStep
            .transform(&input, &StepConfig::new(), &ctx)
            .unwrap_err();
        assert!(matches!(err, ForgeError::CredentialRequired));

        let config = StepConfig::new().with("password", "pw");
        let out = StandardReflowStep.transform(&input, &config, &ctx).unwrap();
        drop(ctx);

        assert_eq!(out.name(), "locked.docx");
        assert_eq!(ws.scratch_count(), 0);
    }

    #[test]
    fn protected_pdf_reflows_with_its_password() {
        let ws = Workspace::new();
        let input = ws.input("locked.pdf", &protected_pdf(&["Board minutes"], "pw"));

        let ctx = ws.context();
        let err = StandardReflowStep
            .transform(&input, &StepConfig::new(), &ctx)
            .unwrap_err();
        assert!(matches!(err, ForgeError::CredentialRequired));

        let config = StepConfig::new().with("password", "pw");
        let out = StandardReflowStep.transform(&input, &config, &ctx).unwrap();
        drop(ctx);

        assert_eq!(out.name(), "locked.docx");
        assert_eq!(ws.scratch_count(), 0);
    }

    #[test]
    fn malformed_use_ai_is_a_validation_error() {
        let config = StepConfig::new().with("use_ai", "maybe");
        assert!(matches!(
            StandardReflowStep.validate(&config),
            Err(ForgeError::Validation(_))
        ));
        assert!(
            StandardReflowStep
                .validate(&StepConfig::new().with("use_ai", false))
                .is_ok()
        );
    }

    #[test]
    fn non_pdf_input_is_unsupported() {
        let ws = Workspace::new();
        let input = ws.input("photo.png", b"not really a png");
        let ctx = ws.context();
        let err = StandardReflowStep
            .transform(&input, &StepConfig::new(), &ctx)
            .unwrap_err();
        assert!(matches!(err, ForgeError::UnsupportedFormat(_)));
    }

    #[test]
    fn recovery_reflow_uses_shared_engine() {
        let ws = Workspace::new();
        let input = ws.input("paper.pdf", &text_pdf(&["INTRODUCTION", "Body text."]));
        let engine = Arc::new(SharedEngine::new(|| {
            RecoveryEngine::new(&RecoveryConfig::default())
        }));
        let step = RecoveryReflowStep::new(Arc::clone(&engine));

        let ctx = ws.context();
        let out = step.transform(&input, &StepConfig::new(), &ctx).unwrap();
        drop(ctx);

        assert_eq!(out.name(), "paper_recovered.docx");
        assert_eq!(engine.construction_attempts(), 1);
    }

    #[test]
    fn engine_failure_is_resource_init() {
        let ws = Workspace::new();
        let input = ws.input("paper.pdf", &text_pdf(&["x"]));
        let missing = ws.root().join("no-models");
        let engine = Arc::new(SharedEngine::new(move || {
            RecoveryEngine::new(&RecoveryConfig {
                model_dir: Some(missing.clone()),
            })
        }));
        let step = RecoveryReflowStep::new(engine);

        let ctx = ws.context();
        let err = step.transform(&input, &StepConfig::new(), &ctx).unwrap_err();
        drop(ctx);

        assert!(matches!(err, ForgeError::ResourceInit(_)));
        assert_eq!(ws.output_count(), 0);
    }
}
