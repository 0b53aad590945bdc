//! Output formatting for promise diagnostics.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::detect::{
    DependentGroup, Diagnostics, FindingRule, OverusedGroup, SuppressionReason, UnusedGroup,
};
use crate::observation::AsyncId;

// =============================================================================
// JSON Format
// =============================================================================

/// Top-level JSON report.
#[derive(Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub source: String,
    pub ticks: u64,
    pub tracked: usize,
    pub findings: usize,
    pub unused: Vec<JsonFinding>,
    pub overused: Vec<JsonFinding>,
    pub suppressed: BTreeMap<SuppressionReason, usize>,
    pub suppressed_count: usize,
}

/// One allocation site and its reported promises.
#[derive(Serialize, Deserialize)]
pub struct JsonFinding {
    pub rule: String,
    pub stack: String,
    pub count: usize,
    pub ids: Vec<AsyncId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unwrapped_at: Vec<DependentGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub continued_at: Vec<DependentGroup>,
}

impl JsonReport {
    pub fn new(source: &str, result: &Diagnostics) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            source: source.to_string(),
            ticks: result.ticks,
            tracked: result.tracked,
            findings: result.finding_count(),
            unused: result.unused.iter().map(unused_to_json).collect(),
            overused: result.overused.iter().map(overused_to_json).collect(),
            suppressed: result.suppressed.clone(),
            suppressed_count: result.suppressed_count(),
        }
    }
}

fn unused_to_json(group: &UnusedGroup) -> JsonFinding {
    JsonFinding {
        rule: FindingRule::UnusedAllocation.as_str().to_string(),
        stack: group.stack.clone(),
        count: group.count(),
        ids: group.ids.clone(),
        unwrapped_at: Vec::new(),
        continued_at: Vec::new(),
    }
}

fn overused_to_json(group: &OverusedGroup) -> JsonFinding {
    JsonFinding {
        rule: FindingRule::OverusedAllocation.as_str().to_string(),
        stack: group.stack.clone(),
        count: group.count(),
        ids: group.ids.clone(),
        unwrapped_at: group.unwrapped_at.clone(),
        continued_at: group.continued_at.clone(),
    }
}

/// Write results in JSON format.
pub fn write_json(source: &str, result: &Diagnostics) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&JsonReport::new(source, result))?;
    println!("{}", json);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results in pretty (human-readable) format to stdout.
pub fn write_pretty(source: &str, result: &Diagnostics, show_suppressed: bool) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_pretty_to(&mut out, source, result, show_suppressed)
}

/// Write results in pretty format to any writer.
pub fn write_pretty_to<W: Write>(
    out: &mut W,
    source: &str,
    result: &Diagnostics,
    show_suppressed: bool,
) -> io::Result<()> {
    // Header
    writeln!(out)?;
    writeln!(
        out,
        "  {} v{}",
        "promise-misuse".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out)?;
    writeln!(out, "  {}{}", "Trace:   ".dimmed(), source)?;
    writeln!(
        out,
        "  {}{} promises over {} ticks",
        "Tracked: ".dimmed(),
        result.tracked,
        result.ticks
    )?;
    writeln!(out)?;

    if !result.unused.is_empty() {
        write_unused(out, &result.unused)?;
    }
    if !result.overused.is_empty() {
        write_overused(out, &result.overused)?;
    }

    if result.suppressed_count() > 0 {
        write_suppressed_summary(out, result, show_suppressed)?;
        writeln!(out)?;
    }

    write_final_status(out, result)?;
    writeln!(out)
}

fn write_unused<W: Write>(out: &mut W, groups: &[UnusedGroup]) -> io::Result<()> {
    writeln!(out, "  {} ({}):", "Unused allocations".bold(), groups.len())?;
    writeln!(out)?;

    for group in groups {
        writeln!(
            out,
            "    {} {} allocated and never unwrapped {}",
            "UNUSED  ".yellow(),
            promises(group.count()),
            format!("(via {})", join_ids(&group.ids)).dimmed()
        )?;
        writeln!(
            out,
            "            the handler was never reached (abort?) or the promise is not needed"
        )?;
        writeln!(out, "            {}", "ALLOCATED AT:".dimmed())?;
        write_stack(out, &group.stack)?;
        writeln!(out)?;
    }
    Ok(())
}

fn write_overused<W: Write>(out: &mut W, groups: &[OverusedGroup]) -> io::Result<()> {
    writeln!(out, "  {} ({}):", "Overused allocations".bold(), groups.len())?;
    writeln!(out)?;

    for group in groups {
        writeln!(
            out,
            "    {} {} unwrapped {} times {}",
            "OVERUSED".red(),
            promises(group.count()),
            group.unwrap_count(),
            format!("(via {})", join_ids(&group.ids)).dimmed()
        )?;
        writeln!(
            out,
            "            consider caching the result instead of allocating extra ticks"
        )?;
        writeln!(out, "            {}", "ALLOCATED AT:".dimmed())?;
        write_stack(out, &group.stack)?;
        for site in &group.unwrapped_at {
            writeln!(
                out,
                "            {} {}",
                "UNWRAP AT".dimmed(),
                format!("(via {}):", join_ids(&site.ids)).dimmed()
            )?;
            write_stack(out, &site.stack)?;
        }
        for site in &group.continued_at {
            writeln!(
                out,
                "            {} {}",
                "CONTINUE AT".dimmed(),
                format!("(via {}):", join_ids(&site.ids)).dimmed()
            )?;
            write_stack(out, &site.stack)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_stack<W: Write>(out: &mut W, stack: &str) -> io::Result<()> {
    if stack.is_empty() {
        return writeln!(out, "              {}", "<no stack>".dimmed());
    }
    for line in stack.lines() {
        writeln!(out, "              {}", line.blue())?;
    }
    Ok(())
}

fn write_suppressed_summary<W: Write>(
    out: &mut W,
    result: &Diagnostics,
    show_details: bool,
) -> io::Result<()> {
    writeln!(
        out,
        "  {} ({}):",
        "Suppressed".dimmed(),
        result.suppressed_count()
    )?;

    if !show_details {
        return writeln!(out, "    {}", "(use --show-suppressed to see details)".dimmed());
    }

    for (reason, count) in &result.suppressed {
        writeln!(out, "    {:<24}{}", reason.as_str().dimmed(), count)?;
    }
    Ok(())
}

fn write_final_status<W: Write>(out: &mut W, result: &Diagnostics) -> io::Result<()> {
    if result.has_findings() {
        let plural = if result.finding_count() != 1 { "s" } else { "" };
        writeln!(
            out,
            "  {}  {} promise{} reported",
            "✗ MISUSE".red(),
            result.finding_count(),
            plural
        )
    } else {
        writeln!(out, "  {}  no promise misuse found", "✓ CLEAN".green())
    }
}

fn promises(count: usize) -> String {
    if count == 1 {
        "1 promise".to_string()
    } else {
        format!("{} promises", count)
    }
}

fn join_ids(ids: &[AsyncId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Diagnostics {
        let mut result = Diagnostics::new();
        result.ticks = 4;
        result.tracked = 6;
        result.unused.push(UnusedGroup {
            stack: "file:///srv/a.js:3:5".to_string(),
            ids: vec![2, 5],
        });
        result.overused.push(OverusedGroup {
            stack: "file:///srv/cache.js:4:10".to_string(),
            ids: vec![10],
            unwrapped_at: vec![DependentGroup {
                stack: "file:///srv/b.js:8:3".to_string(),
                ids: vec![11, 12],
            }],
            continued_at: vec![DependentGroup {
                stack: "file:///srv/c.js:3:1".to_string(),
                ids: vec![14, 15],
            }],
        });
        result.record_suppressed(SuppressionReason::Awaited);
        result
    }

    #[test]
    fn test_pretty_output() {
        colored::control::set_override(false);
        let mut out = Vec::new();
        write_pretty_to(&mut out, "trace.ndjson", &sample(), true).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Tracked: 6 promises over 4 ticks"));
        assert!(text.contains("2 promises allocated and never unwrapped (via 2, 5)"));
        assert!(text.contains("1 promise unwrapped 2 times (via 10)"));
        assert!(text.contains("UNWRAP AT (via 11, 12):"));
        assert!(text.contains("CONTINUE AT (via 14, 15):"));
        assert!(text.contains("file:///srv/c.js:3:1"));
        assert!(text.contains("file:///srv/cache.js:4:10"));
        assert!(text.contains("awaited"));
        assert!(text.contains("3 promises reported"));
    }

    #[test]
    fn test_pretty_clean_output() {
        colored::control::set_override(false);
        let mut out = Vec::new();
        write_pretty_to(&mut out, "-", &Diagnostics::new(), false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("no promise misuse found"));
        assert!(!text.contains("Suppressed"));
    }

    #[test]
    fn test_json_report() {
        let report = JsonReport::new("trace.ndjson", &sample());
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["findings"], 3);
        assert_eq!(value["unused"][0]["rule"], "unused_allocation");
        assert_eq!(value["unused"][0]["count"], 2);
        assert!(value["unused"][0].get("unwrapped_at").is_none());
        assert_eq!(value["overused"][0]["rule"], "overused_allocation");
        assert_eq!(value["overused"][0]["unwrapped_at"][0]["ids"][1], 12);
        assert_eq!(value["overused"][0]["continued_at"][0]["ids"][0], 14);
        assert_eq!(value["suppressed"]["awaited"], 1);
        assert_eq!(value["suppressed_count"], 1);
    }
}
