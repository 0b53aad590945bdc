//! Tests for the JSON report structure.
//!
//! Consumers parse this output, so field names and nesting are checked
//! against a replayed fixture.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use promise_misuse::analysis::SuspensionClassifier;
use promise_misuse::config::Config;
use promise_misuse::detect::Runner;
use promise_misuse::report::{write_pretty_to, JsonReport};
use promise_misuse::session::Session;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join("traces")
        .join(name)
}

fn run(name: &str) -> promise_misuse::Diagnostics {
    let file = File::open(fixture(name)).expect("should open fixture");
    let mut session = Session::new();
    session.feed_reader(BufReader::new(file)).unwrap();
    let snapshot = session.finish(&SuspensionClassifier::default());
    Runner::from_config(&Config::default()).unwrap().run(&snapshot)
}

#[test]
fn test_json_report_structure() {
    let result = run("overused.ndjson");
    let report = JsonReport::new("overused.ndjson", &result);
    let json = serde_json::to_string_pretty(&report).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(value["source"], "overused.ndjson");
    assert_eq!(value["tracked"], 3);
    assert_eq!(value["findings"], 3);

    let overused = value["overused"].as_array().unwrap();
    assert_eq!(overused.len(), 1);
    assert_eq!(overused[0]["rule"], "overused_allocation");
    assert_eq!(overused[0]["ids"], serde_json::json!([10]));
    let sites = overused[0]["unwrapped_at"].as_array().unwrap();
    assert_eq!(sites.len(), 2);
    assert_eq!(sites[0]["stack"], "file:///srv/app/a.js:2:3");

    let unused = value["unused"].as_array().unwrap();
    assert_eq!(unused.len(), 2);
    assert!(unused.iter().all(|u| u["rule"] == "unused_allocation"));
}

#[test]
fn test_json_report_round_trips() {
    let result = run("combinator.ndjson");
    let json = serde_json::to_string(&JsonReport::new("combinator.ndjson", &result)).unwrap();
    let parsed: JsonReport = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.findings, 0);
    assert!(parsed.unused.is_empty());
    assert_eq!(parsed.suppressed_count, 3);
}

#[test]
fn test_pretty_report_lists_sites() {
    colored::control::set_override(false);
    let result = run("overused.ndjson");
    let mut out = Vec::new();
    write_pretty_to(&mut out, "overused.ndjson", &result, false).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("Overused allocations (1):"));
    assert!(text.contains("Unused allocations (2):"));
    assert!(text.contains("file:///srv/app/main.js:12:3"));
    assert!(text.contains("UNWRAP AT (via 13):"));
    assert!(text.contains("3 promises reported"));
}

#[test]
fn test_pretty_report_lists_continuations() {
    colored::control::set_override(false);
    let result = run("continued.ndjson");
    assert_eq!(result.overused.len(), 1);
    assert_eq!(result.overused[0].continued_at.len(), 1);
    assert_eq!(result.overused[0].continued_at[0].ids, vec![14, 15]);

    let mut out = Vec::new();
    write_pretty_to(&mut out, "continued.ndjson", &result, false).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("CONTINUE AT (via 14, 15):"));
    assert!(text.contains("file:///srv/app/warm.js:3:1"));
}
