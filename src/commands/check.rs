//! `converge check` - validate documents, print only diagnostics

use anyhow::Result;
use reconcile::{Error, plan_batch_with};

use crate::Context;
use crate::cli::CheckArgs;
use crate::progress::PlanProgress;
use crate::ui;

pub fn run(ctx: &Context, args: CheckArgs) -> Result<()> {
    let jobs = args.jobs.unwrap_or(ctx.settings.jobs).max(1);

    let (documents, load_failures) = super::load_all(ctx, &args.documents);
    let requests = super::requests(&documents);

    let progress = PlanProgress::new(requests.len(), !ctx.quiet);
    let results = plan_batch_with(&requests, jobs, &progress)?;

    let mut failed = load_failures;
    for (doc, result) in documents.iter().zip(&results) {
        match result {
            Ok(op) => {
                if !ctx.quiet {
                    ui::success(&format!("{}: ok ({} pending change(s))", doc.label, op.change_count()));
                }
            }
            Err(Error::Rejected(diagnostics)) => {
                failed += 1;
                ui::print_rejection(&doc.label, diagnostics);
            }
            Err(e) => {
                failed += 1;
                ui::error(&format!("{}: {e}", doc.label));
            }
        }
    }

    if failed > 0 {
        if failed < args.documents.len() {
            ui::warn(&format!(
                "{} of {} document(s) passed",
                args.documents.len() - failed,
                args.documents.len()
            ));
        }
        anyhow::bail!("{failed} document(s) failed validation");
    }
    Ok(())
}
