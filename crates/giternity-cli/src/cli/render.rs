use super::*;

const PROGRESS_WIDTH: usize = 20;

pub(super) fn print_report<W: Write>(out: &mut W, report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        let payload = serde_json::to_string_pretty(report).context("serialize run report")?;
        writeln!(out, "{payload}")?;
        return Ok(());
    }
    if report.dry_run {
        print_plan(out, report)?;
    } else {
        print_summary(out, report)?;
    }
    print_failures(out, report)?;
    Ok(())
}

fn print_plan<W: Write>(out: &mut W, report: &RunReport) -> io::Result<()> {
    if report.plan.is_empty() {
        writeln!(out, "Nothing to do.")?;
        return Ok(());
    }
    writeln!(out, "Planned actions (dry run):")?;
    for action in &report.plan {
        let target = action.target_path.display();
        match action.clone_url.as_deref() {
            Some(url) => writeln!(out, "  {:<8} {} <- {url} ({target})", action.kind.as_str(), action.key)?,
            None => writeln!(out, "  {:<8} {} ({target})", action.kind.as_str(), action.key)?,
        }
    }
    Ok(())
}

fn print_summary<W: Write>(out: &mut W, report: &RunReport) -> io::Result<()> {
    let counts = report.counts();
    writeln!(
        out,
        "Summary: {} created, {} updated, {} orphaned, {} conflicts, {} failed",
        counts.create, counts.update, counts.orphan, counts.conflict, counts.failed
    )?;
    let orphans: Vec<_> = report
        .plan
        .iter()
        .filter(|action| action.kind == ActionKind::Orphan)
        .collect();
    if !orphans.is_empty() {
        writeln!(out, "Orphaned mirrors (left in place):")?;
        for action in orphans {
            writeln!(out, "  {} ({})", action.key, action.target_path.display())?;
        }
    }
    Ok(())
}

fn print_failures<W: Write>(out: &mut W, report: &RunReport) -> io::Result<()> {
    let failed: Vec<_> = report
        .results
        .iter()
        .filter(|result| !result.succeeded)
        .collect();
    if !failed.is_empty() {
        writeln!(out, "Failed mirrors:")?;
        for result in failed {
            let message = result.error.as_deref().unwrap_or("unknown error");
            writeln!(out, "  {} [{}]: {message}", result.key, result.kind)?;
        }
    }
    if !report.resolution_failures.is_empty() {
        writeln!(out, "Unresolved owners:")?;
        for failure in &report.resolution_failures {
            writeln!(out, "  {}: {}", failure.owner, failure.error)?;
        }
    }
    let checkout_errors: Vec<_> = report
        .checkouts
        .iter()
        .filter_map(|checkout| checkout.error.as_deref().map(|error| (checkout, error)))
        .collect();
    if !checkout_errors.is_empty() {
        writeln!(out, "Checkout errors:")?;
        for (checkout, error) in checkout_errors {
            writeln!(out, "  {} ({}): {error}", checkout.key, checkout.path.display())?;
        }
    }
    Ok(())
}

pub(super) fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    if total == 0 || width == 0 {
        return "[]".to_string();
    }
    let filled = ((step as f32 / total as f32) * width as f32).round() as usize;
    let filled = filled.min(width);
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(empty))
}

/// Single rewritten status line for `--progress`.
#[derive(Debug, Default)]
pub(super) struct ProgressLine {
    processed: usize,
    total: usize,
    last_len: usize,
}

impl ProgressLine {
    pub(super) fn render<W: Write>(&mut self, out: &mut W, event: &ExecutorEvent) {
        let line = match event {
            ExecutorEvent::Started { key, kind } => format!(
                "{}/{} {} {kind} {key}",
                self.processed,
                self.total.max(self.processed),
                render_progress_bar(self.processed, self.total, PROGRESS_WIDTH)
            ),
            ExecutorEvent::Finished {
                result,
                processed,
                total,
            } => {
                self.processed = *processed;
                self.total = *total;
                let status = if result.succeeded { "ok" } else { "failed" };
                format!(
                    "{processed}/{total} {} {} {} {status}",
                    render_progress_bar(*processed, *total, PROGRESS_WIDTH),
                    result.kind,
                    result.key
                )
            }
        };
        let padding = self.last_len.saturating_sub(line.len());
        let _ = write!(out, "\r{line}{}", " ".repeat(padding));
        self.last_len = line.len();
        if self.total > 0 && self.processed >= self.total {
            let _ = writeln!(out);
            self.last_len = 0;
        }
        let _ = out.flush();
    }
}
