mod display;
mod session;
mod train;

use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use scriptbayes_core::{ScriptRef, SignificanceHeuristic, TEMPLATE_ID, TrainConfig};
use scriptbayes_search::{ClientConfig, classify, fetch_template};
use tracing_subscriber::EnvFilter;

use crate::session::Session;

#[derive(Parser)]
#[command(name = "scriptbayes", version, about = "Train naive Bayes classifiers that run inside the search engine")]
struct Cli {
    #[command(flatten)]
    conn: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Search engine base URL.
    #[arg(long, global = true, env = "SCRIPTBAYES_ES_URL", default_value = "http://localhost:9200")]
    es_url: String,

    #[arg(long, global = true, env = "SCRIPTBAYES_ES_USERNAME")]
    username: Option<String>,

    #[arg(long, global = true, env = "SCRIPTBAYES_ES_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Per-request timeout.
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    /// How long to wait for open scrolls to be released at exit.
    #[arg(long, global = true, default_value_t = 2)]
    shutdown_grace_secs: u64,
}

impl ConnectionArgs {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.es_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Train on an index and publish the model as a search template.
    Train(TrainArgs),
    /// Classify documents with a published template.
    Classify {
        #[arg(long, default_value = "movie-reviews")]
        index: String,
        /// Text field the template reads.
        #[arg(long, default_value = "text")]
        field: String,
        #[arg(long, default_value = TEMPLATE_ID)]
        template_id: String,
        /// Maximum number of predictions printed.
        #[arg(long, default_value_t = 20)]
        size: usize,
    },
    /// Validate and summarise a published template.
    Show {
        #[arg(long, default_value = TEMPLATE_ID)]
        template_id: String,
    },
}

#[derive(Args)]
struct TrainArgs {
    #[arg(long, default_value = "movie-reviews")]
    index: String,
    #[arg(long, default_value = "label")]
    label_field: String,
    #[arg(long, default_value = "text")]
    text_field: String,
    /// Vocabulary size; each class contributes half.
    #[arg(long, default_value_t = 200)]
    features: usize,
    /// Label value mapped to 1.0; everything else is 0.0.
    #[arg(long, default_value = "positive")]
    positive_label: String,
    #[arg(long, default_value_t = 1.0)]
    smoothing: f64,
    /// Train and test weights.
    #[arg(long, value_delimiter = ',', default_value = "1,2")]
    split: Vec<f64>,
    /// Seed for the train/test split. Random when absent.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 0.05)]
    max_malformed_ratio: f64,
    #[arg(long, default_value_t = 500)]
    page_size: usize,
    /// jlh, chi-square, gnd, or mutual-information.
    #[arg(long, default_value = "jlh")]
    heuristic: SignificanceHeuristic,
    #[arg(long, default_value = TEMPLATE_ID)]
    template_id: String,
    #[arg(long, default_value = "vector")]
    vector_script: String,
    #[arg(long, default_value = "nb_model")]
    model_script: String,
    /// Language the vector and model scripts are registered under.
    #[arg(long, default_value = "native")]
    script_lang: String,
    /// Compile and print the template without publishing it.
    #[arg(long)]
    dry_run: bool,
}

impl TrainArgs {
    fn config(&self) -> TrainConfig {
        TrainConfig {
            index: self.index.clone(),
            label_field: self.label_field.clone(),
            text_field: self.text_field.clone(),
            num_features: self.features,
            positive_label: self.positive_label.clone(),
            smoothing: self.smoothing,
            split_weights: self.split.clone(),
            seed: self.seed,
            max_malformed_ratio: self.max_malformed_ratio,
            page_size: self.page_size,
            heuristic: self.heuristic,
            template_id: self.template_id.clone(),
            vector_script: ScriptRef::new(&self.script_lang, &self.vector_script),
            model_script: ScriptRef::new(&self.script_lang, &self.model_script),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("scriptbayes v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let session = Session::open(
        &cli.conn.client_config(),
        Duration::from_secs(cli.conn.shutdown_grace_secs),
    )
    .context("opening search session")?;

    let result = run(&session, cli.command).await;
    session.close().await;
    result
}

async fn run(session: &Session, command: Command) -> anyhow::Result<()> {
    let backend = session.backend();
    match command {
        Command::Train(args) => {
            let (report, template) = train::run_train(backend, &args.config(), args.dry_run).await?;
            if args.dry_run {
                println!("{:#}", template.body());
                println!();
            }
            display::print_report(&report);
        }
        Command::Classify {
            index,
            field,
            template_id,
            size,
        } => {
            let classified = classify(backend, &index, &template_id, &field)
                .await
                .context("invoking inference template")?;
            display::print_classified(&classified, size)?;
        }
        Command::Show { template_id } => {
            let template = fetch_template(backend, &template_id)
                .await
                .context("reading inference template")?;
            display::print_template(&template)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["scriptbayes", "train"]).unwrap();
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(args.config(), TrainConfig::default());
        assert!(!args.dry_run);
    }

    #[test]
    fn split_and_heuristic_parse() {
        let cli = Cli::try_parse_from([
            "scriptbayes",
            "train",
            "--split",
            "3,1",
            "--heuristic",
            "chi-square",
            "--seed",
            "11",
        ])
        .unwrap();
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        let config = args.config();
        assert_eq!(config.split_weights, vec![3.0, 1.0]);
        assert_eq!(config.heuristic, SignificanceHeuristic::ChiSquare);
        assert_eq!(config.seed, Some(11));
    }

    #[test]
    fn global_connection_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "scriptbayes",
            "show",
            "--es-url",
            "http://search:9200/",
            "--timeout-secs",
            "5",
        ])
        .unwrap();
        let config = cli.conn.client_config();
        assert_eq!(config.base_url, "http://search:9200/");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
