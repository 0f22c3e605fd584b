//! Terminal rendering for the CLI.
//!
//! Everything here returns a `String`; the caller decides between stdout and
//! stderr. `color` switches ANSI styling off for pipes and tests.

use crate::history::HistoryRecord;
use crate::pipeline::types::{JobResult, ProcessingStatus};
use owo_colors::OwoColorize;

/// Largest LCS table the review diff will build. Longer texts are shown
/// without change markers.
const MAX_DIFF_CELLS: usize = 4_000_000;

/// One step of a word-level diff.
#[derive(Debug, PartialEq)]
enum DiffOp<'a> {
    /// Word kept by the review.
    Keep(&'a str),
    /// Word removed by the review.
    Removed(&'a str),
    /// Word added by the review.
    Added(&'a str),
}

/// Matched `(old, new)` index pairs of the longest common word subsequence.
///
/// Words compare case-sensitively: a capitalization fix is a correction.
/// Returns `None` when the table would exceed [`MAX_DIFF_CELLS`].
fn common_words(old: &[&str], new: &[&str]) -> Option<Vec<(usize, usize)>> {
    let width = new.len() + 1;
    let cells = (old.len() + 1).checked_mul(width)?;
    if cells > MAX_DIFF_CELLS {
        return None;
    }

    // lengths[i * width + j] = LCS length of old[i..] and new[j..]
    let mut lengths = vec![0u32; cells];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lengths[i * width + j] = if old[i] == new[j] {
                lengths[(i + 1) * width + j + 1] + 1
            } else {
                lengths[(i + 1) * width + j].max(lengths[i * width + j + 1])
            };
        }
    }

    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if lengths[(i + 1) * width + j] >= lengths[i * width + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    Some(pairs)
}

/// Word-level diff from `old` to `new`. Removals come before additions
/// within each changed run.
fn word_diff<'a>(old: &[&'a str], new: &[&'a str]) -> Option<Vec<DiffOp<'a>>> {
    let pairs = common_words(old, new)?;
    let mut ops = Vec::with_capacity(old.len().max(new.len()));
    let (mut oi, mut ni) = (0, 0);

    for (om, nm) in pairs.into_iter().chain(std::iter::once((old.len(), new.len()))) {
        ops.extend(old[oi..om].iter().map(|w| DiffOp::Removed(w)));
        ops.extend(new[ni..nm].iter().map(|w| DiffOp::Added(w)));
        if om < old.len() {
            ops.push(DiffOp::Keep(old[om]));
        }
        oi = om + 1;
        ni = nm + 1;
    }
    Some(ops)
}

/// Corrected text with the review's changes marked.
///
/// Removed words are struck through and added words highlighted. Without
/// color the markers are `[-word-]` and `{+word+}`.
pub fn render_review_diff(raw: &str, corrected: &str, color: bool) -> String {
    let old: Vec<&str> = raw.split_whitespace().collect();
    let new: Vec<&str> = corrected.split_whitespace().collect();
    let Some(ops) = word_diff(&old, &new) else {
        return corrected.to_string();
    };

    let words: Vec<String> = ops
        .iter()
        .map(|op| match (op, color) {
            (DiffOp::Keep(w), _) => w.to_string(),
            (DiffOp::Removed(w), true) => w.strikethrough().dimmed().to_string(),
            (DiffOp::Removed(w), false) => format!("[-{w}-]"),
            (DiffOp::Added(w), true) => w.green().to_string(),
            (DiffOp::Added(w), false) => format!("{{+{w}+}}"),
        })
        .collect();
    words.join(" ")
}

/// Number of words the review changed (removed plus added).
pub fn changed_words(raw: &str, corrected: &str) -> Option<usize> {
    let old: Vec<&str> = raw.split_whitespace().collect();
    let new: Vec<&str> = corrected.split_whitespace().collect();
    let ops = word_diff(&old, &new)?;
    Some(ops.iter().filter(|op| !matches!(op, DiffOp::Keep(_))).count())
}

/// Progress bar message for a status update.
pub fn status_message(status: ProcessingStatus) -> String {
    format!("{status}...")
}

pub fn warning_line(message: &str, color: bool) -> String {
    if color {
        format!("{} {message}", "warning:".yellow().bold())
    } else {
        format!("warning: {message}")
    }
}

pub fn error_line(message: &str, color: bool) -> String {
    if color {
        format!("{} {message}", "error:".red().bold())
    } else {
        format!("error: {message}")
    }
}

fn heading(title: &str, color: bool) -> String {
    if color {
        format!("{}", title.bold())
    } else {
        title.to_string()
    }
}

/// Post-stream report of a finished job: review diff, changelog, summary.
pub fn render_job_result(result: &JobResult, color: bool) -> String {
    let mut lines = Vec::new();

    if let Some(corrected) = &result.corrected_transcription {
        let title = match changed_words(&result.transcription, corrected) {
            Some(0) => "Review (no changes)".to_string(),
            Some(n) => format!("Review ({n} words changed)"),
            None => "Review".to_string(),
        };
        lines.push(String::new());
        lines.push(heading(&title, color));
        lines.push(render_review_diff(&result.transcription, corrected, color));
    }
    if let Some(changelog) = result.changelog.as_deref().filter(|c| !c.trim().is_empty()) {
        lines.push(String::new());
        lines.push(heading("Changelog", color));
        lines.push(changelog.trim_end().to_string());
    }
    if let Some(summary) = &result.summary {
        lines.push(String::new());
        lines.push(heading("Summary", color));
        lines.push(summary.trim_end().to_string());
    }
    lines.extend(result.warnings.iter().map(|w| warning_line(w, color)));
    lines.push(String::new());
    lines.push(match &result.record_id {
        Some(id) => format!("Saved to history as {id}"),
        None => "Not saved to history".to_string(),
    });

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn timestamp(record: &HistoryRecord) -> String {
    record.created_at.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// One line of `scribe history list`.
pub fn history_row(record: &HistoryRecord, color: bool) -> String {
    let mut flags = Vec::new();
    if record.corrected_transcription.is_some() {
        flags.push("reviewed");
    }
    if record.summary.is_some() {
        flags.push("summary");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };

    if color {
        format!(
            "{}  {}  {}  {}{}",
            record.id.cyan(),
            timestamp(record).dimmed(),
            record.file_name,
            record.options.subject.dimmed(),
            flags
        )
    } else {
        format!(
            "{}  {}  {}  {}{}",
            record.id,
            timestamp(record),
            record.file_name,
            record.options.subject,
            flags
        )
    }
}

/// Full view of one record for `scribe history show`.
pub fn render_record(record: &HistoryRecord, color: bool) -> String {
    let options = &record.options;
    let field = |name: &str, value: &str| {
        if color {
            format!("{} {value}", format!("{name}:").dimmed())
        } else {
            format!("{name}: {value}")
        }
    };
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    let mut lines = vec![
        field("Id", &record.id),
        field("Created", &timestamp(record)),
        field("File", &record.file_name),
        field("Storage", &record.file_storage_path),
        field("Subject", &options.subject),
        field("Model", &options.model),
    ];
    if !options.transcription_instructions.is_empty() {
        lines.push(field("Instructions", &options.transcription_instructions));
    }
    lines.push(field(
        "Options",
        &format!(
            "speakers {}, timestamps {}, review {}, summary {}",
            yes_no(options.speaker_labels),
            yes_no(options.add_timestamps),
            yes_no(options.review),
            yes_no(options.generate_summary)
        ),
    ));
    if !options.reference_files.is_empty() {
        let names: Vec<String> = options
            .reference_files
            .iter()
            .map(|f| format!("{} ({} bytes)", f.name, f.size))
            .collect();
        lines.push(field("References", &names.join(", ")));
    }

    let sections = [
        ("Transcription", Some(&record.transcription)),
        ("Corrected transcription", record.corrected_transcription.as_ref()),
        ("Changelog", record.changelog.as_ref()),
        ("Summary", record.summary.as_ref()),
    ];
    for (title, body) in sections {
        if let Some(body) = body {
            lines.push(String::new());
            lines.push(heading(title, color));
            lines.push(body.trim_end().to_string());
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryRecord, test_support::sample};
    use chrono::{TimeZone, Utc};

    fn record() -> HistoryRecord {
        let created = Utc.with_ymd_and_hms(2026, 3, 4, 9, 30, 0).unwrap();
        HistoryRecord::from_new("rec-1".to_string(), created, sample("sync.mp3"))
    }

    // ── word diff ──────────────────────────────────────────────────────

    #[test]
    fn word_diff_identical_text() {
        let ops = word_diff(&["hello", "world"], &["hello", "world"]).unwrap();
        assert_eq!(ops, vec![DiffOp::Keep("hello"), DiffOp::Keep("world")]);
    }

    #[test]
    fn word_diff_single_correction() {
        let ops = word_diff(&["the", "quik", "fox"], &["the", "quick", "fox"]).unwrap();
        assert_eq!(
            ops,
            vec![
                DiffOp::Keep("the"),
                DiffOp::Removed("quik"),
                DiffOp::Added("quick"),
                DiffOp::Keep("fox"),
            ]
        );
    }

    #[test]
    fn word_diff_insertion_and_deletion() {
        let ops = word_diff(&["a", "b", "c"], &["a", "c", "d"]).unwrap();
        assert_eq!(
            ops,
            vec![
                DiffOp::Keep("a"),
                DiffOp::Removed("b"),
                DiffOp::Keep("c"),
                DiffOp::Added("d"),
            ]
        );
    }

    #[test]
    fn word_diff_capitalization_is_a_change() {
        let ops = word_diff(&["hello"], &["Hello"]).unwrap();
        assert_eq!(ops, vec![DiffOp::Removed("hello"), DiffOp::Added("Hello")]);
    }

    #[test]
    fn word_diff_empty_sides() {
        assert_eq!(word_diff(&[], &["x"]).unwrap(), vec![DiffOp::Added("x")]);
        assert_eq!(word_diff(&["x"], &[]).unwrap(), vec![DiffOp::Removed("x")]);
        assert!(word_diff(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn word_diff_gives_up_on_huge_input() {
        let old = vec!["w"; 3000];
        let new = vec!["v"; 3000];
        assert!(word_diff(&old, &new).is_none());
    }

    // ── rendering ──────────────────────────────────────────────────────

    #[test]
    fn review_diff_plain_markers() {
        let out = render_review_diff("Speaker 1: helo world", "Speaker 1: Hello world.", false);
        assert_eq!(out, "Speaker 1: [-helo-] [-world-] {+Hello+} {+world.+}");
    }

    #[test]
    fn review_diff_falls_back_to_corrected_text() {
        let raw = "a ".repeat(2500);
        let corrected = "b ".repeat(2500);
        assert_eq!(render_review_diff(&raw, &corrected, false), corrected);
    }

    #[test]
    fn review_diff_with_color_contains_escape_codes() {
        let out = render_review_diff("teh cat", "the cat", true);
        assert!(out.contains("\x1b["));
        assert!(out.contains("cat"));
    }

    #[test]
    fn changed_words_counts_both_sides() {
        assert_eq!(changed_words("a b c", "a b c"), Some(0));
        assert_eq!(changed_words("teh cat", "the cat"), Some(2));
    }

    #[test]
    fn job_result_report_lists_sections_and_warnings() {
        let result = JobResult {
            storage_path: "uploads/u1/1-a.mp3".into(),
            transcription: "Hello world.".into(),
            corrected_transcription: Some("Hello, world.".into()),
            changelog: Some("Added a comma.".into()),
            summary: Some("A greeting.".into()),
            record_id: None,
            warnings: vec!["Transcription finished but could not be saved to history: disk full".into()],
        };
        let out = render_job_result(&result, false);
        assert!(out.contains("Review (2 words changed)"));
        assert!(out.contains("{+Hello,+}"));
        assert!(out.contains("Changelog\nAdded a comma."));
        assert!(out.contains("Summary\nA greeting."));
        assert!(out.contains("warning: Transcription finished but could not be saved"));
        assert!(out.contains("Not saved to history"));
    }

    #[test]
    fn job_result_without_review_has_no_review_section() {
        let result = JobResult {
            transcription: "Hi.".into(),
            record_id: Some("abc".into()),
            ..JobResult::default()
        };
        let out = render_job_result(&result, false);
        assert!(!out.contains("Review"));
        assert!(out.contains("Saved to history as abc"));
    }

    #[test]
    fn history_row_plain() {
        let mut rec = record();
        rec.summary = Some("s".into());
        let row = history_row(&rec, false);
        assert_eq!(
            row,
            "rec-1  2026-03-04 09:30 UTC  sync.mp3  Weekly sync [summary]"
        );
    }

    #[test]
    fn record_view_includes_options_and_text() {
        let mut rec = record();
        rec.corrected_transcription = Some("Hello, world.".into());
        let out = render_record(&rec, false);
        assert!(out.contains("Id: rec-1"));
        assert!(out.contains("Subject: Weekly sync"));
        assert!(out.contains("References: agenda.pdf (2048 bytes)"));
        assert!(out.contains("speakers yes, timestamps no, review yes, summary yes"));
        assert!(out.contains("Transcription\nHello world."));
        assert!(out.contains("Corrected transcription\nHello, world."));
        assert!(!out.contains("Summary\n"));
    }

    #[test]
    fn status_and_error_lines() {
        assert_eq!(status_message(ProcessingStatus::Uploading), "Uploading audio...");
        assert_eq!(error_line("boom", false), "error: boom");
        assert_eq!(warning_line("late", false), "warning: late");
    }
}
