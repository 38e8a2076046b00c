use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;
pub const DEFAULT_N_MFCC: usize = 13;
pub const DEFAULT_RECORD_SECS: u64 = 15;
pub const DEFAULT_MODEL_PATH: &str = "emotion_model.json";
pub const DEFAULT_DATASET_PATH: &str = "RAVDESS";
pub const DEFAULT_SPLIT_SEED: u64 = 42;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const ENV_MODEL_PATH: &str = "EMOTIONIX_MODEL_PATH";
pub const ENV_DATASET_PATH: &str = "EMOTIONIX_DATASET";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleRate(u32);

impl SampleRate {
    pub fn new(hz: u32) -> Result<Self, ConfigError> {
        if hz == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        Ok(Self(hz))
    }

    pub fn hz(&self) -> u32 {
        self.0
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self(DEFAULT_SAMPLE_RATE)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordDuration {
    pub secs: u64,
}

impl RecordDuration {
    pub fn new(secs: u64) -> Result<Self, ConfigError> {
        if secs == 0 {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(Self { secs })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }

    pub fn frames_for_sample_rate(&self, sample_rate_hz: u32) -> u64 {
        self.secs.saturating_mul(u64::from(sample_rate_hz))
    }
}

impl Default for RecordDuration {
    fn default() -> Self {
        Self {
            secs: DEFAULT_RECORD_SECS,
        }
    }
}

/// Share of the corpus held out for evaluation, strictly between 0 and 1.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TestFraction(f64);

impl TestFraction {
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if !(value > 0.0 && value < 1.0) {
            return Err(ConfigError::TestFractionOutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for TestFraction {
    fn default() -> Self {
        Self(DEFAULT_TEST_FRACTION)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainConfig {
    pub dataset: PathBuf,
    pub model_path: PathBuf,
    pub sample_rate: SampleRate,
    pub n_mfcc: usize,
    pub test_fraction: TestFraction,
    pub seed: u64,
    pub augment: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from(DEFAULT_DATASET_PATH),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            sample_rate: SampleRate::default(),
            n_mfcc: DEFAULT_N_MFCC,
            test_fraction: TestFraction::default(),
            seed: DEFAULT_SPLIT_SEED,
            augment: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DetectConfig {
    pub model_path: PathBuf,
    pub record: RecordDuration,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            record: RecordDuration::default(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be > 0 Hz")]
    ZeroSampleRate,
    #[error("recording duration must be > 0 s")]
    ZeroDuration,
    #[error("test fraction must be in (0, 1), got {0}")]
    TestFractionOutOfRange(f64),
    #[error("coefficient count must be > 0")]
    ZeroCoefficients,
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_path_with_default(
    cli_value: Option<PathBuf>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> PathBuf {
    PathBuf::from(resolve_string_with_default(
        cli_value.map(|p| p.to_string_lossy().into_owned()),
        env_key,
        env,
        default,
    ))
}

pub fn validate_n_mfcc(n: usize) -> Result<usize, ConfigError> {
    if n == 0 {
        return Err(ConfigError::ZeroCoefficients);
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_path_cli_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_MODEL_PATH, "/env/model.json");
        let p = resolve_path_with_default(
            Some(PathBuf::from("/cli/model.json")),
            ENV_MODEL_PATH,
            &env,
            DEFAULT_MODEL_PATH,
        );
        assert_eq!(p, PathBuf::from("/cli/model.json"));
    }

    #[test]
    fn model_path_env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_MODEL_PATH, "/env/model.json");
        let p = resolve_path_with_default(None, ENV_MODEL_PATH, &env, DEFAULT_MODEL_PATH);
        assert_eq!(p, PathBuf::from("/env/model.json"));
    }

    #[test]
    fn default_used_when_both_missing() {
        let env = MapEnv::default();
        let v = resolve_string_with_default(None, ENV_DATASET_PATH, &env, DEFAULT_DATASET_PATH);
        assert_eq!(v, DEFAULT_DATASET_PATH);
    }

    #[test]
    fn record_duration_frames() {
        let d = RecordDuration::new(15).expect("nonzero");
        assert_eq!(d.frames_for_sample_rate(22_050), 330_750);
        assert_eq!(d.duration(), Duration::from_secs(15));
        assert_eq!(RecordDuration::new(0), Err(ConfigError::ZeroDuration));
    }

    #[test]
    fn test_fraction_must_be_open_unit_interval() {
        assert!(TestFraction::new(0.2).is_ok());
        assert!(TestFraction::new(0.0).is_err());
        assert!(TestFraction::new(1.0).is_err());
        assert!(TestFraction::new(f64::NAN).is_err());
    }

    #[test]
    fn sample_rate_rejects_zero() {
        assert_eq!(SampleRate::new(0), Err(ConfigError::ZeroSampleRate));
        assert_eq!(SampleRate::default().hz(), DEFAULT_SAMPLE_RATE);
    }
}
