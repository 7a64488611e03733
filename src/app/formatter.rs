use std::fmt::Write;

use serde::Serialize;

use crate::app::models::{ConnectionCheck, ProjectStatus, Report, ServerInfo, SetupOutcome};

const RULE_WIDTH: usize = 70;

pub struct OutputGenerator;

impl OutputGenerator {
    /// One `<name>: <count> rows` line per table, in report order.
    pub fn format_report(report: &Report) -> Result<String, std::fmt::Error> {
        let mut output = String::new();
        for table in &report.tables {
            writeln!(
                output,
                "{}: {} rows",
                table.name,
                group_thousands(table.row_count)
            )?;
        }
        Ok(output)
    }

    pub fn generate_tables(report: &Report) -> Result<String, std::fmt::Error> {
        let mut output = String::new();
        writeln!(output, "Database Tables ({}):", report.schema)?;
        write_table_section(&mut output, report)?;
        Ok(output)
    }

    pub fn generate_check(check: &ConnectionCheck) -> Result<String, std::fmt::Error> {
        let (info, report) = (&check.server, &check.report);
        let mut output = String::new();
        rule(&mut output, '=')?;
        writeln!(output, "PostgreSQL Connection Test")?;
        rule(&mut output, '=')?;

        writeln!(output, "\nConnection successful!")?;
        write_server(&mut output, info)?;

        writeln!(output, "\nTables in schema `{}`:", report.schema)?;
        write_table_section(&mut output, report)?;

        writeln!(output)?;
        rule(&mut output, '=')?;
        Ok(output)
    }

    pub fn generate_setup(outcome: &SetupOutcome) -> Result<String, std::fmt::Error> {
        let mut output = String::new();
        rule(&mut output, '=')?;
        writeln!(output, "PostgreSQL Database Setup")?;
        rule(&mut output, '=')?;

        if outcome.created {
            writeln!(output, "\nDatabase '{}' created successfully", outcome.database)?;
        } else {
            writeln!(output, "\nDatabase '{}' already exists", outcome.database)?;
        }
        writeln!(output, "Successfully connected to '{}'", outcome.database)?;
        write_server(&mut output, &outcome.server)?;

        writeln!(output)?;
        rule(&mut output, '=')?;
        writeln!(output, "DATABASE SETUP COMPLETE")?;
        rule(&mut output, '=')?;
        Ok(output)
    }

    pub fn generate_status(status: &ProjectStatus) -> Result<String, std::fmt::Error> {
        let mut output = String::new();
        rule(&mut output, '=')?;
        writeln!(output, "PROJECT COMPLETION STATUS: {}", status.directory.display())?;
        rule(&mut output, '=')?;

        writeln!(output, "\nNOTEBOOKS:")?;
        for nb in &status.notebooks {
            let mark = if nb.ready { "ready  " } else { "pending" };
            writeln!(
                output,
                "  [{}] {} ({} bytes)",
                mark,
                nb.name,
                group_thousands(nb.size_bytes)
            )?;
        }

        writeln!(output, "\nVISUALIZATIONS:")?;
        if status.visualizations.is_empty() {
            writeln!(output, "  (none)")?;
        }
        for viz in &status.visualizations {
            writeln!(output, "  - {viz}")?;
        }

        writeln!(output, "\nDATABASE TABLES ({}):", status.report.schema)?;
        write_table_section(&mut output, &status.report)?;

        let ready = status.notebooks.iter().filter(|nb| nb.ready).count();
        writeln!(output)?;
        rule(&mut output, '=')?;
        writeln!(
            output,
            "STATUS: {ready} of {} notebooks ready, {} visualizations, {} tables ({} rows)",
            status.notebooks.len(),
            status.visualizations.len(),
            status.report.tables.len(),
            group_thousands(status.report.total_rows())
        )?;
        rule(&mut output, '=')?;
        Ok(output)
    }

    pub fn generate_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
        let mut output = serde_json::to_string_pretty(value)?;
        output.push('\n');
        Ok(output)
    }
}

fn rule(output: &mut String, ch: char) -> std::fmt::Result {
    writeln!(output, "{}", ch.to_string().repeat(RULE_WIDTH))
}

fn write_server(output: &mut String, info: &ServerInfo) -> std::fmt::Result {
    writeln!(output, "Database: {}", info.database)?;
    writeln!(output, "Host: {}:{}", info.host, info.port)?;
    writeln!(output, "User: {}", info.user)?;
    writeln!(output, "\nPostgreSQL Version:\n{}", info.version)
}

fn write_table_section(output: &mut String, report: &Report) -> std::fmt::Result {
    if report.tables.is_empty() && report.skipped.is_empty() {
        writeln!(output, "  No tables found in schema `{}`", report.schema)?;
    }

    for line in OutputGenerator::format_report(report)?.lines() {
        writeln!(output, "  - {line}")?;
    }

    if report.is_partial() {
        writeln!(
            output,
            "\n  Partial data: {} table(s) could not be counted:",
            report.skipped.len()
        )?;
        for skipped in &report.skipped {
            writeln!(output, "  ! {}: {}", skipped.name, skipped.reason.describe())?;
        }
    }
    Ok(())
}

/// Formats `n` with `,` between groups of three digits.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
