//! Training pipeline: select vocabulary → vectorize → split/fit/evaluate →
//! compile template → publish.

use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use scriptbayes_core::{InferenceTemplate, TrainConfig, dataset};
use scriptbayes_search::{SearchBackend, publish, select_vocabulary, vectorize};
use scriptbayes_train::Trainer;
use tracing::info;

/// Summary of one training run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub index: String,
    pub vocabulary: Vec<String>,
    pub scanned: usize,
    pub skipped: usize,
    pub train_count: usize,
    pub test_count: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub labels: Vec<f64>,
    pub pi: Vec<f64>,
    pub template_id: String,
    pub published: bool,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
}

/// Run every stage against `backend`. With `dry_run` the compiled template is
/// returned but not stored.
///
/// Nothing is published unless every earlier stage succeeded.
pub async fn run_train<B: SearchBackend + ?Sized>(
    backend: &B,
    config: &TrainConfig,
    dry_run: bool,
) -> anyhow::Result<(RunReport, InferenceTemplate)> {
    let start = Instant::now();
    config.validate().context("invalid training configuration")?;

    // 1. Per-class significant terms, merged.
    let vocab = select_vocabulary(backend, config)
        .await
        .context("selecting feature vocabulary")?;

    // 2. One fixed-length vector per document.
    let vectorized = vectorize(backend, &vocab, config)
        .await
        .context("vectorizing documents")?;

    // 3. Split, fit on train, score on test.
    let batch = dataset::to_batch(&vectorized.examples, vocab.len())
        .context("building training dataset")?;
    let trained = Trainer::from_config(config)
        .run(&batch)
        .context("training classifier")?;

    // 4. Embed the parameters in a template.
    let template = InferenceTemplate::compile(
        config.template_id.as_str(),
        &vocab,
        &trained.model,
        &config.model_script,
        &config.label_field,
    )
    .context("compiling inference template")?;

    // 5. Store it.
    if dry_run {
        info!(id = template.id(), "dry run, template not published");
    } else {
        publish(backend, &template)
            .await
            .context("publishing inference template")?;
    }

    let eval = trained.evaluation;
    let report = RunReport {
        index: config.index.clone(),
        vocabulary: vocab.terms().to_vec(),
        scanned: vectorized.scanned,
        skipped: vectorized.skipped,
        train_count: eval.train_count,
        test_count: eval.test_count,
        correct: eval.correct,
        accuracy: eval.accuracy,
        labels: trained.model.labels().to_vec(),
        pi: trained.model.pi().to_vec(),
        template_id: template.id().to_string(),
        published: !dry_run,
        finished_at: Utc::now(),
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    info!(
        template_id = %report.template_id,
        accuracy = report.accuracy,
        elapsed_secs = report.elapsed_secs,
        "training run complete"
    );
    Ok((report, template))
}
