//! `converge plan` - show the update each document needs

use anyhow::Result;
use reconcile::{Error, UpdateOperation, plan_batch_with};
use serde_json::json;

use crate::Context;
use crate::cli::{OutputFormat, PlanArgs};
use crate::progress::PlanProgress;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let format = args.format.unwrap_or(ctx.settings.format);
    let jobs = args.jobs.unwrap_or(ctx.settings.jobs).max(1);

    let (documents, load_failures) = super::load_all(ctx, &args.documents);
    let requests = super::requests(&documents);

    let progress = PlanProgress::new(requests.len(), !ctx.quiet && format == OutputFormat::Text);
    let results = plan_batch_with(&requests, jobs, &progress)?;

    let mut rejected = 0;
    match format {
        OutputFormat::Text => {
            for (doc, result) in documents.iter().zip(&results) {
                match result {
                    Ok(op) => ui::print_plan(&doc.label, op),
                    Err(Error::Rejected(diagnostics)) => {
                        rejected += 1;
                        ui::print_rejection(&doc.label, diagnostics);
                    }
                    Err(e) => {
                        rejected += 1;
                        ui::error(&format!("{}: {e}", doc.label));
                    }
                }
            }
        }
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = documents
                .iter()
                .zip(&results)
                .map(|(doc, result)| {
                    if result.is_err() {
                        rejected += 1;
                    }
                    to_json(&doc.label, result)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    let failed = rejected + load_failures;
    if failed > 0 {
        anyhow::bail!("{failed} of {} document(s) failed", args.documents.len());
    }
    Ok(())
}

/// JSON entry for one document: the operation plus its delete list, or the
/// diagnostics that rejected it
pub fn to_json(label: &str, result: &reconcile::Result<UpdateOperation>) -> serde_json::Value {
    match result {
        Ok(op) => json!({
            "name": label,
            "operation": op,
            "delete": op.delete_list(),
            "restart_required": op.restart_required(),
        }),
        Err(Error::Rejected(diagnostics)) => json!({
            "name": label,
            "diagnostics": diagnostics
                .iter()
                .map(|d| json!({ "path": d.path(), "message": d.to_string(), "defect": d.is_defect() }))
                .collect::<Vec<_>>(),
        }),
        Err(e) => json!({ "name": label, "error": e.to_string() }),
    }
}
