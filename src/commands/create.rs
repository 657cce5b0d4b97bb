//! `converge create` - body for an object that does not exist yet

use anyhow::{Context as _, Result};
use reconcile::{Error, plan_create};

use crate::Context;
use crate::cli::{CreateArgs, OutputFormat};
use crate::document::Document;
use crate::ui;

pub fn run(ctx: &Context, args: CreateArgs) -> Result<()> {
    let format = args.format.unwrap_or(ctx.settings.format);
    let path = crate::config::expand(&args.document);
    let doc = Document::load(&path, &ctx.settings.unresolved_marker)?;

    if !doc.observed.is_empty() {
        log::info!("Ignoring observed state in {}", path.display());
    }

    let result = plan_create(&doc.schema, &doc.declared);

    match format {
        OutputFormat::Text => match &result {
            Ok(op) => {
                ui::info(&format!("Create body for {}", doc.label));
                ui::print_plan(&doc.label, op);
            }
            Err(Error::Rejected(diagnostics)) => ui::print_rejection(&doc.label, diagnostics),
            Err(e) => ui::error(&format!("{}: {e}", doc.label)),
        },
        OutputFormat::Json => {
            let entry = super::plan::to_json(&doc.label, &result);
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
    }

    result
        .map(|_| ())
        .with_context(|| format!("Cannot create {}", doc.label))
}
