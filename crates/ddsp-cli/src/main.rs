//! ddsp_run - train, evaluate, or sample from a DDSP model.
//!
//! ```text
//! ddsp_run --mode=train --model_dir=~/tmp/violin \
//!   --gin_file=models/ae.gin --gin_file=datasets/solo_instrument.gin \
//!   --gin_param="SoloInstrument.file_pattern='/data/violin/*.tfrecord'"
//! ```

mod run;

use clap::builder::BoolishValueParser;
use clap::Parser;

use ddsp_trainer::PipelineRoutines;
use run::{Mode, RunOptions};

#[derive(Parser)]
#[command(name = "ddsp_run")]
#[command(author, version, about = "Train, evaluate, or sample from a DDSP model", long_about = None)]
struct Cli {
    /// Whether to train, evaluate, or sample from the model.
    #[arg(long, value_enum, default_value = "train")]
    mode: Mode,

    /// Path where checkpoints and summary events will be located.
    #[arg(long = "model_dir", default_value = "~/tmp/ddsp")]
    model_dir: String,

    /// Address of the execution master.
    #[arg(long, default_value = "")]
    master: String,

    /// Whether running on TPU or not.
    #[arg(
        long = "use_tpu",
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        overrides_with = "nouse_tpu"
    )]
    use_tpu: bool,

    /// Negated form of `--use_tpu`.
    #[arg(long = "nouse_tpu", hide = true, overrides_with = "use_tpu")]
    nouse_tpu: bool,

    /// Extra directories searched for gin files.
    #[arg(long = "gin_search_path")]
    gin_search_path: Vec<String>,

    /// Gin files to parse, in order. Later files override earlier ones.
    #[arg(long = "gin_file")]
    gin_file: Vec<String>,

    /// Newline-separated gin bindings, parsed after the gin files.
    #[arg(long = "gin_param")]
    gin_param: Vec<String>,

    /// Number of training steps.
    #[arg(long = "num_train_steps", default_value = "1000000")]
    num_train_steps: u64,

    /// Evaluate or sample only the latest checkpoint, then exit.
    #[arg(
        long = "eval_once",
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        overrides_with = "noeval_once"
    )]
    eval_once: bool,

    /// Negated form of `--eval_once`.
    #[arg(long = "noeval_once", hide = true, overrides_with = "eval_once")]
    noeval_once: bool,

    /// Seconds to wait before evaluating or sampling.
    #[arg(long = "initial_delay_secs")]
    initial_delay_secs: Option<u64>,

    /// Accepted for compatibility; logs always go to stderr.
    #[arg(
        long = "alsologtostderr",
        hide = true,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    #[allow(dead_code)]
    alsologtostderr: bool,
}

impl From<Cli> for RunOptions {
    fn from(cli: Cli) -> Self {
        Self {
            mode: cli.mode,
            model_dir: cli.model_dir,
            master: cli.master,
            use_tpu: cli.use_tpu && !cli.nouse_tpu,
            gin_search_path: cli.gin_search_path,
            gin_file: cli.gin_file,
            gin_param: cli.gin_param,
            num_train_steps: cli.num_train_steps,
            eval_once: cli.eval_once && !cli.noeval_once,
            initial_delay_secs: cli.initial_delay_secs,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = RunOptions::from(cli);
    run::run(&options, &PipelineRoutines::new())
}
