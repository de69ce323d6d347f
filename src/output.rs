use std::io::{self, Write};

use serde::Serialize;

use crate::aligner::AlignmentSummary;
use crate::collator::CollationSummary;
use crate::report::StageReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_validation(report: &StageReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_collation(summary: &CollationSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_alignment(summary: &AlignmentSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_validation(report: &StageReport) -> io::Result<()> {
        let mut stdout = io::stdout();
        for warning in &report.warnings {
            writeln!(stdout, "warning: {warning}")?;
        }
        for error in &report.errors {
            writeln!(stdout, "error: {error}")?;
        }
        writeln!(
            stdout,
            "validation: {} errors, {} warnings",
            report.errors.len(),
            report.warnings.len()
        )
    }

    pub fn print_collation(summary: &CollationSummary) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(stdout, "target:          {}", summary.target_name)?;
        writeln!(stdout, "version:         {} ({})", summary.version, summary.version_dir)?;
        writeln!(stdout, "crystals:        {}", summary.crystals)?;
        writeln!(stdout, "all crystals:    {}", summary.total_crystals)?;
        writeln!(stdout, "new or updated:  {}", summary.new_or_updated)?;
        writeln!(
            stdout,
            "errors/warnings: {}/{}",
            summary.report.errors.len(),
            summary.report.warnings.len()
        )
    }

    pub fn print_alignment(summary: &AlignmentSummary) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(stdout, "version:           {}", summary.version)?;
        writeln!(stdout, "datasets:          {}", summary.datasets)?;
        writeln!(
            stdout,
            "new or updated:    {} ({} aligned)",
            summary.candidates, summary.aligned
        )?;
        writeln!(stdout, "linked:            {}", summary.linked)?;
        writeln!(
            stdout,
            "reused/recompute:  {}/{}",
            summary.reused, summary.recompute
        )?;
        writeln!(stdout, "invalidated:       {}", summary.invalidated)?;
        writeln!(stdout, "extraction errors: {}", summary.extraction_errors)?;
        writeln!(stdout, "output:            {}", summary.output)
    }
}
