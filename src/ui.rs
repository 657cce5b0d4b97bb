use colored::Colorize;
use reconcile::{Body, CollectionChanges, Diagnostics, FieldValue, SlotUpdate, UpdateOperation};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Plan Rendering
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Set,
    Remove,
    Change,
    /// Grouping line (collection name)
    Group,
}

/// One rendered line of a plan, uncolored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub depth: usize,
    pub sign: Sign,
    pub text: String,
}

impl Line {
    fn new(depth: usize, sign: Sign, text: String) -> Self {
        Self { depth, sign, text }
    }
}

/// Render a field value on one line
pub fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Scalar(scalar) => scalar.to_string(),
        FieldValue::Composite(fields) => {
            let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("{{{}}}", parts.join(", "))
        }
        FieldValue::Slots(slots) => {
            let parts: Vec<String> = slots
                .iter()
                .map(|(key, body)| format!("{key}: {}", format_body(body)))
                .collect();
            format!("[{}]", parts.join("; "))
        }
    }
}

fn format_body(body: &Body) -> String {
    let parts: Vec<String> = body
        .iter()
        .map(|(k, v)| format!("{k}={}", format_value(v)))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

/// Lines describing an update, most specific changes indented deepest
pub fn plan_lines(op: &UpdateOperation) -> Vec<Line> {
    let mut lines = Vec::new();
    push_operation(op, 0, &mut lines);
    lines
}

fn push_operation(op: &UpdateOperation, depth: usize, lines: &mut Vec<Line>) {
    for (field, value) in op.assignments() {
        lines.push(Line::new(depth, Sign::Set, format!("{field} = {}", format_value(value))));
    }
    for field in op.removals() {
        lines.push(Line::new(depth, Sign::Remove, field.clone()));
    }
    for (field, changes) in op.collections() {
        lines.push(Line::new(depth, Sign::Group, format!("{field}:")));
        push_collection(changes, depth + 1, lines);
    }
}

fn push_collection(changes: &CollectionChanges, depth: usize, lines: &mut Vec<Line>) {
    for (key, body) in changes.to_create() {
        lines.push(Line::new(depth, Sign::Set, format!("{key} {}", format_body(body))));
    }
    for (key, update) in changes.to_update() {
        match update {
            SlotUpdate::Replace(body) => {
                lines.push(Line::new(depth, Sign::Change, format!("{key} {}", format_body(body))));
            }
            SlotUpdate::Patch(patch) => {
                lines.push(Line::new(depth, Sign::Change, key.clone()));
                push_operation(patch, depth + 1, lines);
            }
        }
    }
    for key in changes.to_delete() {
        lines.push(Line::new(depth, Sign::Remove, key.clone()));
    }
}

/// Print the plan for one object
pub fn print_plan(label: &str, op: &UpdateOperation) {
    if op.is_empty() {
        success(&format!("{label}: up to date"));
        return;
    }

    let mut title = format!("{label} ({} change(s))", op.change_count());
    if op.restart_required() {
        title.push_str(" - restart required");
    }
    header(&title);

    for line in plan_lines(op) {
        let indent = "  ".repeat(line.depth + 1);
        let rendered = match line.sign {
            Sign::Set => format!("{} {}", "+".green().bold(), line.text.green()),
            Sign::Remove => format!("{} {}", "-".red().bold(), line.text.red()),
            Sign::Change => format!("{} {}", "~".yellow().bold(), line.text.yellow()),
            Sign::Group => line.text.cyan().bold().to_string(),
        };
        println!("{indent}{rendered}");
    }

    let deletes = op.delete_list();
    if !deletes.is_empty() {
        kv("delete", &deletes.join(","));
    }
}

/// Print every diagnostic that rejected an object
pub fn print_rejection(label: &str, diagnostics: &Diagnostics) {
    error(&format!("{label}: rejected with {} problem(s)", diagnostics.len()));
    for diagnostic in diagnostics {
        let tag = if diagnostic.is_defect() { "defect" } else { "config" };
        eprintln!("    {} {}", format!("[{tag}]").dimmed(), diagnostic);
    }
    if diagnostics.has_defects() {
        warn("Defects point at a bug in the engine, not in the document");
    }
}

// ============================================================================
// Tests
// ============================================================================
