pub mod check;
pub mod create;
pub mod plan;

use crate::Context;
use crate::document::Document;
use crate::ui;
use reconcile::PlanRequest;
use std::path::PathBuf;

/// Load every document, reporting the ones that cannot be read
///
/// Returns the loaded documents and how many failed.
fn load_all(ctx: &Context, paths: &[PathBuf]) -> (Vec<Document>, usize) {
    let mut documents = Vec::with_capacity(paths.len());
    let mut failed = 0;

    for path in paths {
        let path = crate::config::expand(path);
        match Document::load(&path, &ctx.settings.unresolved_marker) {
            Ok(document) => documents.push(document),
            Err(e) => {
                ui::error(&format!("{e:#}"));
                failed += 1;
            }
        }
    }

    (documents, failed)
}

fn requests(documents: &[Document]) -> Vec<PlanRequest<'_>> {
    documents
        .iter()
        .map(|doc| PlanRequest {
            label: &doc.label,
            schema: &doc.schema,
            declared: &doc.declared,
            observed: &doc.observed,
            origin: doc.origin,
        })
        .collect()
}
