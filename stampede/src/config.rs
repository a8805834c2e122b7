//! YAML run configuration. Resolution order: CLI flag, then config file, then built-in
//! defaults.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use stampede_core::{
    NoDataPolicy, RunConfig, Stage, StagePlan, ThresholdSpec, TrendMode,
};

use crate::cli::{RunArgs, parse_duration};
use crate::mesh::Fixtures;

pub(crate) const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub(crate) const DEFAULT_THINK_TIME: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(rename = "startVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_vus: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<StageYaml>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<BTreeMap<String, ThresholdExprYaml>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub think_time: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub graceful_stop: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_timeout: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub control_interval: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// `fail` or `skip`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_data: Option<String>,

    /// `exact` or `hdr`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_mode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixtures: Option<Fixtures>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StageYaml {
    pub duration: YamlDuration,
    pub target: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for YamlDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for YamlDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|secs| YamlDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|_| E::custom("duration must be a non-negative, finite number"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                parse_duration(v).map(YamlDuration).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// A metric key maps to one expression, a list, or expressions with `abortOnFail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdExprYaml {
    One(String),
    Full(ThresholdItemYaml),
    Many(Vec<ThresholdEntryYaml>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdEntryYaml {
    Expr(String),
    Full(ThresholdItemYaml),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ThresholdItemYaml {
    pub threshold: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub abort_on_fail: bool,
}

impl ThresholdEntryYaml {
    fn into_spec(self, metric: &str) -> ThresholdSpec {
        match self {
            Self::Expr(expr) => ThresholdSpec::new(metric, expr),
            Self::Full(item) => {
                ThresholdSpec::new(metric, item.threshold).with_abort_on_fail(item.abort_on_fail)
            }
        }
    }
}

fn default_stages() -> Vec<Stage> {
    let min = |m: u64| Duration::from_secs(m * 60);
    vec![
        Stage::new(min(2), 10),
        Stage::new(min(5), 10),
        Stage::new(min(2), 50),
        Stage::new(min(5), 50),
        Stage::new(min(2), 100),
        Stage::new(min(5), 100),
        Stage::new(min(2), 0),
    ]
}

fn default_thresholds() -> Vec<ThresholdSpec> {
    vec![
        ThresholdSpec::new("http_req_duration", "p(95)<500"),
        ThresholdSpec::new("http_req_failed", "rate<0.1"),
        ThresholdSpec::new(crate::mesh::ERRORS, "rate<0.1"),
        ThresholdSpec::new(crate::mesh::SUCCESS, "rate>0.9"),
    ]
}

impl ConfigFile {
    /// The built-in defaults written out as a config document.
    pub fn defaults() -> Self {
        let mut thresholds = BTreeMap::new();
        for spec in default_thresholds() {
            thresholds.insert(spec.metric, ThresholdExprYaml::One(spec.expression));
        }

        Self {
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            start_vus: Some(0),
            stages: Some(
                default_stages()
                    .into_iter()
                    .map(|s| StageYaml {
                        duration: s.duration.into(),
                        target: s.target,
                    })
                    .collect(),
            ),
            thresholds: Some(thresholds),
            think_time: Some(DEFAULT_THINK_TIME.into()),
            graceful_stop: Some(stampede_core::runner::DEFAULT_GRACEFUL_STOP.into()),
            request_timeout: None,
            control_interval: None,
            seed: None,
            no_data: Some(NoDataPolicy::default().to_string()),
            trend_mode: Some(TrendMode::default().to_string()),
            fixtures: Some(Fixtures::default()),
        }
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::parse(&bytes).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        // An empty document is a valid "all defaults" config.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_yaml::from_slice(bytes).context("failed to parse YAML")
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(self).context("failed to serialize YAML")
    }
}

fn thresholds_from_map(
    raw: BTreeMap<String, ThresholdExprYaml>,
) -> anyhow::Result<Vec<ThresholdSpec>> {
    let mut out = Vec::new();

    for (metric_key, v) in raw {
        let entries = match v {
            ThresholdExprYaml::One(s) => vec![ThresholdEntryYaml::Expr(s)],
            ThresholdExprYaml::Full(item) => vec![ThresholdEntryYaml::Full(item)],
            ThresholdExprYaml::Many(v) => v,
        };

        if entries.is_empty() {
            anyhow::bail!("invalid thresholds for `{metric_key}`: empty list");
        }

        out.extend(entries.into_iter().map(|e| e.into_spec(&metric_key)));
    }

    Ok(out)
}

/// Fully resolved settings for one `stampede run`.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub base_url: String,
    pub run: RunConfig,
    pub fixtures: Fixtures,
}

impl Settings {
    pub fn resolve(file: ConfigFile, args: &RunArgs) -> anyhow::Result<Self> {
        let base_url = args
            .base_url
            .clone()
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!("invalid base URL `{base_url}` (expected http:// or https://)");
        }

        let stages = if !args.stages.is_empty() {
            args.stages.clone()
        } else if let Some(stages) = file.stages {
            stages
                .into_iter()
                .map(|s| Stage::new(s.duration.into_inner(), s.target))
                .collect()
        } else {
            default_stages()
        };
        let plan = StagePlan::with_start(file.start_vus.unwrap_or(0), stages)?;

        let thresholds = match file.thresholds {
            Some(map) => thresholds_from_map(map)?,
            None => default_thresholds(),
        };

        let mut run = RunConfig::new(plan)
            .with_thresholds(thresholds)
            .with_think_time(
                args.think_time
                    .or(file.think_time.map(YamlDuration::into_inner))
                    .unwrap_or(DEFAULT_THINK_TIME),
            );

        if let Some(d) = args
            .graceful_stop
            .or(file.graceful_stop.map(YamlDuration::into_inner))
        {
            run = run.with_graceful_stop(d);
        }
        if let Some(d) = args
            .request_timeout
            .or(file.request_timeout.map(YamlDuration::into_inner))
        {
            run = run.with_request_timeout(d);
        }
        if let Some(d) = file.control_interval {
            run = run.with_control_interval(d.into_inner());
        }
        if let Some(seed) = args.seed.or(file.seed) {
            run = run.with_seed(seed);
        }
        if let Some(raw) = file.no_data {
            let policy = raw
                .parse::<NoDataPolicy>()
                .map_err(|_| anyhow::anyhow!("invalid noData `{raw}` (expected fail or skip)"))?;
            run = run.with_no_data(policy);
        }
        if let Some(raw) = file.trend_mode {
            let mode = raw
                .parse::<TrendMode>()
                .map_err(|_| anyhow::anyhow!("invalid trendMode `{raw}` (expected exact or hdr)"))?;
            run = run.with_trend_mode(mode);
        }
        run.validate()?;

        let fixtures = file.fixtures.unwrap_or_default();
        fixtures.validate()?;

        Ok(Self {
            base_url,
            run,
            fixtures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser as _;

    fn run_args(extra: &[&str]) -> RunArgs {
        let argv = ["stampede", "run", "--base-url", "http://cli.test:1/"]
            .iter()
            .chain(extra)
            .copied();
        match Cli::try_parse_from(argv) {
            Ok(Cli {
                command: Command::Run(args),
            }) => args,
            Ok(_) => panic!("expected run command"),
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    #[test]
    fn empty_config_resolves_to_builtin_load_profile() {
        let file = ConfigFile::parse(b"").unwrap_or_else(|e| panic!("{e:#}"));
        let settings =
            Settings::resolve(file, &run_args(&[])).unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(settings.base_url, "http://cli.test:1");
        assert_eq!(settings.run.plan.stages().len(), 7);
        assert_eq!(settings.run.plan.max_target(), 100);
        assert_eq!(
            settings.run.plan.total_duration(),
            Duration::from_secs(23 * 60)
        );
        assert_eq!(settings.run.think_time, DEFAULT_THINK_TIME);
        assert_eq!(settings.run.thresholds.len(), 4);
        assert_eq!(settings.run.no_data, NoDataPolicy::Fail);
        assert_eq!(settings.fixtures, Fixtures::default());
    }

    #[test]
    fn file_values_apply_and_cli_flags_win() {
        let file = ConfigFile::parse(
            br#"
baseUrl: http://file.test:2
startVUs: 3
stages:
  - duration: 10s
    target: 5
  - duration: 2.5
    target: 0
thinkTime: 250ms
gracefulStop: 5
seed: 9
noData: skip
trendMode: hdr
thresholds:
  http_req_duration{name=create_order}: p(99)<1000
  http_req_failed:
    - rate<0.05
    - threshold: rate<0.5
      abortOnFail: true
  checks:
    threshold: rate>0.8
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        let settings = Settings::resolve(file, &run_args(&["--think-time", "1s", "--seed", "1"]))
            .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(settings.base_url, "http://cli.test:1");
        assert_eq!(settings.run.plan.start_target(), 3);
        assert_eq!(
            settings.run.plan.stages(),
            &[
                Stage::new(Duration::from_secs(10), 5),
                Stage::new(Duration::from_millis(2500), 0)
            ]
        );
        assert_eq!(settings.run.think_time, Duration::from_secs(1));
        assert_eq!(settings.run.graceful_stop, Duration::from_secs(5));
        assert_eq!(settings.run.seed, Some(1));
        assert_eq!(settings.run.no_data, NoDataPolicy::Skip);
        assert_eq!(settings.run.trend_mode, TrendMode::Hdr);

        let thresholds = &settings.run.thresholds;
        assert_eq!(thresholds.len(), 4);
        assert!(thresholds.iter().any(|t| t.metric == "http_req_duration{name=create_order}"
            && t.expression == "p(99)<1000"));
        assert_eq!(thresholds.iter().filter(|t| t.abort_on_fail).count(), 1);
        assert!(thresholds.iter().any(|t| t.metric == "checks" && !t.abort_on_fail));
    }

    #[test]
    fn cli_stages_replace_configured_stages() {
        let file = ConfigFile::defaults();
        let settings = Settings::resolve(file, &run_args(&["--stage", "1s:2"]))
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(
            settings.run.plan.stages(),
            &[Stage::new(Duration::from_secs(1), 2)]
        );
    }

    #[test]
    fn yaml_and_flags_share_one_duration_grammar() {
        let file = ConfigFile::parse(b"thinkTime: 1m30s\ngracefulStop: \"1.5\"\n")
            .unwrap_or_else(|e| panic!("{e:#}"));
        let from_file =
            Settings::resolve(file, &run_args(&[])).unwrap_or_else(|e| panic!("{e:#}"));

        let from_flags = Settings::resolve(
            ConfigFile::default(),
            &run_args(&["--think-time", "1m30s", "--graceful-stop", "1.5"]),
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(from_file.run.think_time, Duration::from_secs(90));
        assert_eq!(from_file.run.think_time, from_flags.run.think_time);
        assert_eq!(from_file.run.graceful_stop, Duration::from_millis(1500));
        assert_eq!(from_file.run.graceful_stop, from_flags.run.graceful_stop);
    }

    #[test]
    fn invalid_documents_are_rejected() {
        for doc in [
            "stages: []\n",
            "thinkTime: -1\n",
            "noData: maybe\n",
            "unknownKey: 1\n",
            "thresholds:\n  http_reqs: []\n",
            "fixtures:\n  users: []\n  products: []\n",
        ] {
            let resolved = ConfigFile::parse(doc.as_bytes())
                .and_then(|file| Settings::resolve(file, &run_args(&[])));
            assert!(resolved.is_err(), "expected error for {doc:?}");
        }
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let file = ConfigFile {
            base_url: Some("ftp://example.com".to_string()),
            ..ConfigFile::default()
        };
        let mut args = run_args(&[]);
        args.base_url = None;
        assert!(Settings::resolve(file, &args).is_err());
    }

    #[test]
    fn defaults_document_parses_back() {
        let yaml = ConfigFile::defaults()
            .to_yaml()
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert!(yaml.contains("baseUrl: http://localhost:8080"));
        assert!(yaml.contains("startVUs: 0"));

        let parsed = ConfigFile::parse(yaml.as_bytes()).unwrap_or_else(|e| panic!("{e:#}"));
        let mut args = run_args(&[]);
        args.base_url = None;
        let settings = Settings::resolve(parsed, &args).unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.run.plan.stages(), default_stages().as_slice());
        assert_eq!(settings.fixtures.products.len(), 4);
    }
}
