//! Terminal output for training reports, predictions, and stored templates.

use std::fmt::Write as _;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use scriptbayes_core::InferenceTemplate;
use scriptbayes_search::{Classified, LabelCount, Prediction};

use crate::train::RunReport;

const MAX_TERMS: usize = 10;

// ── Public API ──

pub fn print_report(report: &RunReport) {
    print!("{}", report_card(report));
}

/// Print up to `limit` predictions followed by the per-class counts.
pub fn print_classified(classified: &Classified, limit: usize) -> anyhow::Result<()> {
    let shown = &classified.predictions[..limit.min(classified.predictions.len())];
    println!("{}", predictions_table(shown)?);
    if shown.len() < classified.predictions.len() {
        println!(
            "({} of {} documents shown)",
            shown.len(),
            classified.predictions.len()
        );
    }
    if !classified.counts.is_empty() {
        println!("{}", counts_table(&classified.counts)?);
    }
    Ok(())
}

pub fn print_template(template: &InferenceTemplate) -> anyhow::Result<()> {
    print!("{}", template_card(template)?);
    Ok(())
}

// ── Cards ──

fn report_card(r: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Training run: {} ===", r.index);
    let _ = writeln!(out);
    let _ = writeln!(out, "Vocabulary");
    let _ = writeln!(out, "  {:<26} {}", "terms", r.vocabulary.len());
    let _ = writeln!(out, "  {:<26} {}", "first terms", first_terms(&r.vocabulary));
    let _ = writeln!(out);
    let _ = writeln!(out, "Documents");
    let _ = writeln!(out, "  {:<26} {}", "scanned", r.scanned);
    let _ = writeln!(out, "  {:<26} {}", "skipped", r.skipped);
    let _ = writeln!(out, "  {:<26} {}", "train", r.train_count);
    let _ = writeln!(out, "  {:<26} {}", "test", r.test_count);
    let _ = writeln!(out);
    let _ = writeln!(out, "Model");
    let _ = writeln!(
        out,
        "  {:<26} {:.4} ({}/{})",
        "accuracy", r.accuracy, r.correct, r.test_count
    );
    let _ = writeln!(out, "  {:<26} {}", "labels", join_numbers(&r.labels));
    let _ = writeln!(out, "  {:<26} {}", "log priors", join_numbers(&r.pi));
    let _ = writeln!(out);
    let _ = writeln!(out, "Template");
    let _ = writeln!(out, "  {:<26} {}", "id", r.template_id);
    let _ = writeln!(
        out,
        "  {:<26} {}",
        "published",
        if r.published { "yes" } else { "no (dry run)" }
    );
    let _ = writeln!(
        out,
        "  {:<26} {}",
        "finished",
        r.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "  {:<26} {:.2}s", "elapsed", r.elapsed_secs);
    out
}

fn template_card(template: &InferenceTemplate) -> anyhow::Result<String> {
    let params = template.params()?;
    let mut out = String::new();
    let _ = writeln!(out, "=== Template: {} ===", template.id());
    let _ = writeln!(out);
    let _ = writeln!(out, "  {:<26} {}", "features", params.features.len());
    let _ = writeln!(out, "  {:<26} {}", "first terms", first_terms(&params.features));
    let _ = writeln!(out, "  {:<26} {}", "labels", join_numbers(&params.labels));
    let _ = writeln!(out, "  {:<26} {}", "log priors", join_numbers(&params.pi));
    let _ = writeln!(out, "  {:<26} {}", "field", params.field);
    if let Some(fields) = template.body().get("fields") {
        let _ = writeln!(out, "  {:<26} {}", "returns", fields);
    }
    Ok(out)
}

// ── Tables ──

fn predictions_table(predictions: &[Prediction]) -> Result<String, ArrowError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("predicted_label", DataType::Float64, true),
    ]));
    let ids: ArrayRef = Arc::new(StringArray::from_iter_values(
        predictions.iter().map(|p| p.id.as_str()),
    ));
    let labels: ArrayRef = Arc::new(Float64Array::from_iter(
        predictions.iter().map(|p| p.label),
    ));
    let batch = RecordBatch::try_new(schema, vec![ids, labels])?;
    Ok(pretty_format_batches(&[batch])?.to_string())
}

fn counts_table(counts: &[LabelCount]) -> Result<String, ArrowError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("predicted_label", DataType::Float64, false),
        Field::new("doc_count", DataType::UInt64, false),
    ]));
    let keys: ArrayRef = Arc::new(Float64Array::from_iter_values(counts.iter().map(|c| c.key)));
    let docs: ArrayRef = Arc::new(UInt64Array::from_iter_values(
        counts.iter().map(|c| c.doc_count),
    ));
    let batch = RecordBatch::try_new(schema, vec![keys, docs])?;
    Ok(pretty_format_batches(&[batch])?.to_string())
}

// ── Formatting helpers ──

fn first_terms(terms: &[String]) -> String {
    let mut shown = terms
        .iter()
        .take(MAX_TERMS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if terms.len() > MAX_TERMS {
        shown.push_str(&format!(", … (+{} more)", terms.len() - MAX_TERMS));
    }
    shown
}

fn join_numbers(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:.4}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report() -> RunReport {
        RunReport {
            index: "movie-reviews".into(),
            vocabulary: (0..12).map(|i| format!("t{i}")).collect(),
            scanned: 100,
            skipped: 2,
            train_count: 33,
            test_count: 65,
            correct: 60,
            accuracy: 60.0 / 65.0,
            labels: vec![0.0, 1.0],
            pi: vec![-0.7, -0.69],
            template_id: "model_script".into(),
            published: false,
            finished_at: Utc::now(),
            elapsed_secs: 1.5,
        }
    }

    #[test]
    fn report_card_lists_key_figures() {
        let card = report_card(&report());
        assert!(card.starts_with("=== Training run: movie-reviews ==="));
        assert!(card.contains("(60/65)"));
        assert!(card.contains("no (dry run)"));
        assert!(card.contains("(+2 more)"));
        assert!(card.contains("0.0000, 1.0000"));
    }

    #[test]
    fn prediction_table_shows_missing_labels_blank() {
        let table = predictions_table(&[
            Prediction {
                id: "a".into(),
                label: Some(1.0),
                source: None,
            },
            Prediction {
                id: "b".into(),
                label: None,
                source: None,
            },
        ])
        .unwrap();
        assert!(table.contains("predicted_label"));
        assert!(table.contains("| a "));
        assert!(table.contains("| b "));
    }

    #[test]
    fn first_terms_without_overflow() {
        assert_eq!(first_terms(&["a".into(), "b".into()]), "a, b");
    }
}
