#![deny(warnings)]

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use emotionix_core::augment::Augmenter;
use emotionix_core::capture::CaptureError;
use emotionix_core::classifier::{self, ModelHandle, TrainOptions};
use emotionix_core::config::{
    resolve_path_with_default, validate_n_mfcc, DetectConfig, Env, RecordDuration, SampleRate,
    StdEnv, TestFraction, TrainConfig, DEFAULT_DATASET_PATH, DEFAULT_MODEL_PATH, DEFAULT_N_MFCC,
    DEFAULT_RECORD_SECS, DEFAULT_SAMPLE_RATE, DEFAULT_SPLIT_SEED, DEFAULT_TEST_FRACTION,
    ENV_DATASET_PATH, ENV_MODEL_PATH,
};
use emotionix_core::corpus::DatasetWalker;
use emotionix_core::decode::{AudioDecoder, AudioSample, WavDecoder};
use emotionix_core::emotion::Emotion;
use emotionix_core::features::{ExtractorConfig, FeatureExtractor};
use emotionix_core::pipeline::{PipelineError, VoiceEmotionPipeline};
use emotionix_core::recommend::{BasicAdviceGenerator, NoMusicSearch, Recommender};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emotionix")]
#[command(about = "Voice emotion recognition: MFCC descriptors + linear SVM")]
struct Cli {
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract a labeled corpus, fit a model and save it.
    Train(TrainArgs),
    /// Classify a recording and print suggestions.
    Detect(DetectArgs),
    /// Print the descriptor vector of one file.
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Corpus root holding one directory per session.
    #[arg(long)]
    dataset: Option<PathBuf>,

    #[arg(long)]
    model: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    #[arg(long, default_value_t = DEFAULT_N_MFCC)]
    n_mfcc: usize,

    #[arg(long, default_value_t = DEFAULT_TEST_FRACTION)]
    test_fraction: f64,

    #[arg(long, default_value_t = DEFAULT_SPLIT_SEED)]
    seed: u64,

    /// Add pitch-shifted and time-stretched copies of every clip.
    #[arg(long, default_value_t = false)]
    augment: bool,
}

#[derive(Args, Debug)]
struct DetectArgs {
    #[arg(long)]
    model: Option<PathBuf>,

    /// WAV file to classify. Without it the default microphone is recorded.
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_RECORD_SECS)]
    duration: u64,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    input: PathBuf,

    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    #[arg(long, default_value_t = DEFAULT_N_MFCC)]
    n_mfcc: usize,

    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let env = StdEnv;
    match cli.command {
        Command::Train(args) => run_train(build_train_config(args, &env)?).await,
        Command::Detect(args) => {
            let input = args.input.clone();
            run_detect(build_detect_config(args, &env)?, input).await
        }
        Command::Extract(args) => run_extract(args).await,
    }
}

async fn run_train(cfg: TrainConfig) -> anyhow::Result<()> {
    tracing::info!(
        dataset = %cfg.dataset.display(),
        model = %cfg.model_path.display(),
        sample_rate = cfg.sample_rate.hz(),
        n_mfcc = cfg.n_mfcc,
        augment = cfg.augment,
        "config loaded"
    );

    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let extractor_cfg = ExtractorConfig::default()
            .with_sample_rate(cfg.sample_rate.hz())
            .with_n_mfcc(cfg.n_mfcc);
        let extractor = FeatureExtractor::new(extractor_cfg.clone())?;
        let mut walker = DatasetWalker::new(WavDecoder::new(), extractor);
        if cfg.augment {
            walker = walker.with_augmentation(Augmenter::default());
        }
        let corpus = walker
            .walk(&cfg.dataset)
            .with_context(|| format!("failed to read corpus {}", cfg.dataset.display()))?;

        let options = TrainOptions {
            test_fraction: cfg.test_fraction,
            seed: cfg.seed,
            ..TrainOptions::default()
        };
        let (model, report) = classifier::train(&corpus, extractor_cfg, &options)?;
        model
            .save(&cfg.model_path)
            .with_context(|| format!("failed to save model to {}", cfg.model_path.display()))?;
        Ok((corpus.skips.len(), report))
    })
    .await
    .context("training task panicked")??;

    let (skipped, report) = report;
    println!("Skipped files: {skipped}");
    println!("Training samples: {}", report.train_size);
    println!("Held-out samples: {}", report.eval_size());
    match report.accuracy() {
        Some(acc) => println!("Held-out accuracy: {:.2}%", acc * 100.0),
        None => println!("Held-out accuracy: n/a"),
    }
    Ok(())
}

async fn run_detect(cfg: DetectConfig, input: Option<PathBuf>) -> anyhow::Result<()> {
    let handle = ModelHandle::load(&cfg.model_path)
        .with_context(|| format!("cannot load model {}", cfg.model_path.display()))?;
    let target_hz = handle.snapshot().extractor_config().sample_rate;
    let pipeline = VoiceEmotionPipeline::new(handle);

    let outcome = match input {
        Some(path) => classify_path(&pipeline, path).await?,
        None => match record(cfg.record, target_hz).await? {
            Ok(sample) => {
                let pipeline = pipeline.clone();
                tokio::task::spawn_blocking(move || pipeline.classify(sample))
                    .await
                    .context("classification task panicked")?
            }
            Err(e) => Err(e.into()),
        },
    };

    let recommender = Recommender::new(BasicAdviceGenerator::new(), NoMusicSearch);
    let report = VoiceEmotionPipeline::report(outcome, &recommender).await;
    print!("{report}");
    Ok(())
}

/// Decodes and classifies off the runtime. Only a panicked task is an error
/// here; a bad file comes back as a failed classification.
async fn classify_path(
    pipeline: &VoiceEmotionPipeline,
    path: PathBuf,
) -> anyhow::Result<Result<Emotion, PipelineError>> {
    let pipeline = pipeline.clone();
    tokio::task::spawn_blocking(move || pipeline.classify_file(&WavDecoder::new(), &path))
        .await
        .context("classification task panicked")
}

#[cfg(feature = "capture")]
async fn record(
    duration: RecordDuration,
    target_hz: u32,
) -> anyhow::Result<Result<AudioSample, CaptureError>> {
    use emotionix_core::capture::{CancelToken, MicrophoneRecorder};

    let token = CancelToken::new();
    let recorder = MicrophoneRecorder::new(SampleRate::new(target_hz)?);
    println!("Recording for {} seconds... (Ctrl-C to cancel)", duration.secs);

    let task = {
        let token = token.clone();
        tokio::task::spawn_blocking(move || recorder.record(duration, &token))
    };
    let watcher = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        })
    };

    let result = task.await.context("recording task panicked")?;
    watcher.abort();
    Ok(result)
}

#[cfg(not(feature = "capture"))]
async fn record(
    _duration: RecordDuration,
    _target_hz: u32,
) -> anyhow::Result<Result<AudioSample, CaptureError>> {
    anyhow::bail!("no --input given and microphone capture is not built in (enable the `capture` feature)")
}

async fn run_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let sample_rate = SampleRate::new(args.sample_rate)?;
    let n_mfcc = validate_n_mfcc(args.n_mfcc)?;
    let input = args.input;

    let descriptor = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let extractor = FeatureExtractor::new(
            ExtractorConfig::default()
                .with_sample_rate(sample_rate.hz())
                .with_n_mfcc(n_mfcc),
        )?;
        let sample = WavDecoder::new()
            .decode(&input)
            .with_context(|| format!("failed to decode {}", input.display()))?
            .resampled(sample_rate.hz())?;
        Ok(extractor.extract(&sample)?)
    })
    .await
    .context("extraction task panicked")??;

    if args.json {
        println!("{}", serde_json::to_string(&descriptor)?);
    } else {
        let parts: Vec<String> = descriptor.as_slice().iter().map(|v| format!("{v:.4}")).collect();
        println!("{}", parts.join(" "));
    }
    Ok(())
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_train_config(args: TrainArgs, env: &impl Env) -> anyhow::Result<TrainConfig> {
    Ok(TrainConfig {
        dataset: resolve_path_with_default(args.dataset, ENV_DATASET_PATH, env, DEFAULT_DATASET_PATH),
        model_path: resolve_path_with_default(args.model, ENV_MODEL_PATH, env, DEFAULT_MODEL_PATH),
        sample_rate: SampleRate::new(args.sample_rate)?,
        n_mfcc: validate_n_mfcc(args.n_mfcc)?,
        test_fraction: TestFraction::new(args.test_fraction)?,
        seed: args.seed,
        augment: args.augment,
    })
}

fn build_detect_config(args: DetectArgs, env: &impl Env) -> anyhow::Result<DetectConfig> {
    Ok(DetectConfig {
        model_path: resolve_path_with_default(args.model, ENV_MODEL_PATH, env, DEFAULT_MODEL_PATH),
        record: RecordDuration::new(args.duration)?,
    })
}
