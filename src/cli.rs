use crate::contract::{ContractFixtures, ContractReport, ContractSuite};
use crate::error::AppError;
use crate::http::{BankingApi, ClientConfig, TransferApi};
use crate::metrics::ThresholdSet;
use crate::output::{
    CsvFormatter, Formatter, JsonFormatter, MarkdownFormatter, PrometheusFormatter,
    ReportFormatter, TextFormatter,
};
use crate::scenarios::{
    BuiltinScenario, CreateTransferScenario, FullApiScenario, GetTransfersScenario,
    GetUsersScenario, UserLoginScenario, UserRegisterScenario,
};
use crate::simulator::{
    parse_duration, RunFile, RunResult, Scenario, Simulator, SimulatorConfig, Stage,
};
/// CLI argument parsing and command execution.
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

/// Rampa - staged load tests and contract checks for the transfers API.
#[derive(Parser, Debug)]
#[command(name = "rampa")]
#[command(about = "Staged load tests and contract checks for a users/transfers REST API")]
#[command(
    long_about = r#"Rampa - Staged load tests and contract checks for a users/transfers REST API

LOAD TESTS:
  • Stages: ramp virtual users linearly between target levels over time
  • Checks: named assertions on every response, tallied per run
  • Thresholds: pass/fail conditions such as p(95)<2000 or rate<0.01
  • Output: text summary, JSON, CSV, Markdown or Prometheus exposition

CONTRACT CHECKS:
  • Status codes, body shapes and business-rule errors of every endpoint

EXAMPLES:
  # Run the full workflow with its default stages
  rampa run full

  # Override the load profile and a threshold
  rampa run get-users --stage 10s:5 --stage 20s:5 --stage 10s:0 \
      --threshold 'http_req_duration=p(95)<300'

  # Verify the API contract
  rampa verify --base-url http://localhost:3000

Exit codes: 0 success, 99 thresholds failed, 98 contract checks failed, 1 error."#
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a built-in scenario through a staged load profile
    Run(RunArgs),

    /// List the built-in scenarios and their default profiles
    List,

    /// Check status codes and response shapes of every endpoint
    Verify(VerifyArgs),
}

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario to run (see `rampa list`)
    #[arg(value_parser = parse_scenario)]
    pub scenario: BuiltinScenario,

    /// API base URL
    #[arg(long, env = "BASE_URL_REST")]
    pub base_url: Option<String>,

    /// Load stage as DURATION:TARGET; repeat to build a profile
    #[arg(long = "stage", value_name = "DURATION:TARGET", value_parser = Stage::parse_cli)]
    pub stages: Vec<Stage>,

    /// Threshold as METRIC=EXPR; replaces the thresholds of METRIC
    #[arg(long = "threshold", value_name = "METRIC=EXPR", value_parser = ThresholdSet::parse_cli)]
    pub thresholds: Vec<ThresholdSet>,

    /// TOML run file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Virtual users live before the first stage
    #[arg(long)]
    pub start_vus: Option<usize>,

    /// Pause after each iteration (e.g. "1s", "250-750ms")
    #[arg(long)]
    pub think_time: Option<String>,

    /// HTTP request timeout (e.g. "60s")
    #[arg(long)]
    pub timeout: Option<String>,

    /// How often the target VU count is re-evaluated (e.g. "100ms")
    #[arg(long)]
    pub tick: Option<String>,

    /// Time in-flight iterations get to finish after the last stage
    #[arg(long)]
    pub graceful_stop: Option<String>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Arguments for `verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// API base URL
    #[arg(long, env = "BASE_URL_REST")]
    pub base_url: Option<String>,

    /// TOML file overriding the request fixtures
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output_format: ReportFormat,

    /// HTTP request timeout (e.g. "60s")
    #[arg(long)]
    pub timeout: Option<String>,
}

/// Run report formats.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
    Markdown,
    Prometheus,
}

/// Contract report formats.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}

/// How a successful command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    ThresholdsFailed,
    ContractFailed,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Passed => 0,
            Outcome::ThresholdsFailed => 99,
            Outcome::ContractFailed => 98,
        }
    }
}

fn parse_scenario(name: &str) -> Result<BuiltinScenario, String> {
    BuiltinScenario::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = BuiltinScenario::all().iter().map(|s| s.name()).collect();
        format!("unknown scenario '{}' (expected one of: {})", name, known.join(", "))
    })
}

fn client_config(base_url: String, timeout: Option<&str>) -> Result<ClientConfig, AppError> {
    let mut config = ClientConfig::new(base_url);
    if let Some(timeout) = timeout {
        config.timeout = parse_duration(timeout)?;
    }
    Ok(config)
}

fn runtime() -> Result<tokio::runtime::Runtime, AppError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AppError::Config(format!("Failed to create async runtime: {}", e)))
}

impl Cli {
    /// Execute the CLI command.
    pub fn run(self) -> Result<Outcome, AppError> {
        match self.command {
            Command::Run(args) => Self::run_load_test(args),
            Command::List => {
                Self::run_list();
                Ok(Outcome::Passed)
            }
            Command::Verify(args) => Self::run_verify(args),
        }
    }

    /// Resolve the simulator config: CLI flags over run file over scenario defaults.
    fn resolve_config(
        args: &RunArgs,
        file: Option<&RunFile>,
    ) -> Result<SimulatorConfig, AppError> {
        let mut config = args.scenario.default_config();
        if let Some(file) = file {
            config.apply_run_file(file)?;
        }

        if !args.stages.is_empty() {
            config.stages = args.stages.clone();
        }
        for set in &args.thresholds {
            config.set_thresholds(set.clone());
        }
        if let Some(start_vus) = args.start_vus {
            config.start_vus = start_vus;
        }
        if let Some(ref think_time) = args.think_time {
            config.think_time = Some(SimulatorConfig::parse_think_time(think_time)?);
        }
        if let Some(ref tick) = args.tick {
            config.tick = parse_duration(tick)?;
            if config.tick.is_zero() {
                return Err(AppError::Config("--tick must be greater than zero".to_string()));
            }
        }
        if let Some(ref graceful_stop) = args.graceful_stop {
            config.graceful_stop = parse_duration(graceful_stop)?;
        }
        Ok(config)
    }

    /// Run load test command.
    fn run_load_test(args: RunArgs) -> Result<Outcome, AppError> {
        let file = args.config.as_ref().map(RunFile::from_file).transpose()?;
        let sim_config = Self::resolve_config(&args, file.as_ref())?;

        let base_url = args
            .base_url
            .clone()
            .or_else(|| file.as_ref().and_then(|f| f.base_url.clone()))
            .unwrap_or_else(|| ClientConfig::default().base_url);
        let timeout = args
            .timeout
            .as_deref()
            .or_else(|| file.as_ref().and_then(|f| f.timeout.as_deref()));

        let simulator = Simulator::new(sim_config);
        let api: Arc<dyn TransferApi> = Arc::new(
            BankingApi::new(client_config(base_url, timeout)?)?.with_metrics(simulator.metrics()),
        );

        let total = simulator.config().plan().total_duration();
        eprintln!(
            "Starting scenario '{}' against {} ({} stages, {}s, peak {} VUs)",
            args.scenario.name(),
            api.base_url(),
            simulator.config().stages.len(),
            total.as_secs(),
            simulator.config().plan().peak()
        );

        let rt = runtime()?;

        // Create progress bar
        let progress_bar = if !args.no_progress && !total.is_zero() {
            let pb = indicatif::ProgressBar::new(total.as_secs());
            pb.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len}s {msg}")
                    .map_err(|e| AppError::Config(format!("Invalid progress template: {}", e)))?
                    .progress_chars("#>-"),
            );
            pb.set_message("Starting load test...");
            Some(Arc::new(pb))
        } else {
            None
        };

        let result = rt.block_on(Self::execute(
            &simulator,
            args.scenario,
            api,
            progress_bar,
        ))?;

        Self::display_load_test_results(&result, args.output_format)?;

        if result.passed() {
            Ok(Outcome::Passed)
        } else {
            for outcome in result.failed_thresholds() {
                eprintln!(
                    "Threshold crossed: {} {}",
                    outcome.metric, outcome.expression
                );
            }
            Ok(Outcome::ThresholdsFailed)
        }
    }

    async fn execute(
        simulator: &Simulator,
        scenario: BuiltinScenario,
        api: Arc<dyn TransferApi>,
        progress_bar: Option<Arc<indicatif::ProgressBar>>,
    ) -> Result<RunResult, AppError> {
        match scenario {
            BuiltinScenario::Full => {
                Self::drive(simulator, FullApiScenario::new(api), progress_bar).await
            }
            BuiltinScenario::UserRegister => {
                Self::drive(simulator, UserRegisterScenario::new(api), progress_bar).await
            }
            BuiltinScenario::UserLogin => {
                Self::drive(simulator, UserLoginScenario::new(api), progress_bar).await
            }
            BuiltinScenario::GetUsers => {
                Self::drive(simulator, GetUsersScenario::new(api), progress_bar).await
            }
            BuiltinScenario::CreateTransfer => {
                Self::drive(simulator, CreateTransferScenario::new(api), progress_bar).await
            }
            BuiltinScenario::GetTransfers => {
                Self::drive(simulator, GetTransfersScenario::new(api), progress_bar).await
            }
        }
    }

    async fn drive<S: Scenario + 'static>(
        simulator: &Simulator,
        scenario: S,
        progress_bar: Option<Arc<indicatif::ProgressBar>>,
    ) -> Result<RunResult, AppError> {
        simulator
            .run_with_progress(Arc::new(scenario), progress_bar)
            .await
    }

    fn display_load_test_results(
        result: &RunResult,
        format: OutputFormat,
    ) -> Result<(), AppError> {
        let formatter: Box<dyn Formatter> = match format {
            OutputFormat::Text => Box::new(TextFormatter::new()),
            OutputFormat::Json => Box::new(JsonFormatter::new()),
            OutputFormat::Csv => Box::new(CsvFormatter::new()),
            OutputFormat::Markdown => Box::new(MarkdownFormatter::new()),
            OutputFormat::Prometheus => Box::new(PrometheusFormatter::new()),
        };
        println!("{}", formatter.format_run(result)?);
        Ok(())
    }

    fn run_list() {
        println!("{:<18} {:<10} DESCRIPTION", "SCENARIO", "PROFILE");
        for scenario in BuiltinScenario::all() {
            let plan = scenario.default_config().plan();
            println!(
                "{:<18} {:<10} {}",
                scenario.name(),
                format!("{}s/{}vu", plan.total_duration().as_secs(), plan.peak()),
                scenario.description()
            );
        }
    }

    /// Run contract checks command.
    fn run_verify(args: VerifyArgs) -> Result<Outcome, AppError> {
        let fixtures = match args.config {
            Some(ref path) => ContractFixtures::from_file(path)?,
            None => ContractFixtures::default(),
        };
        let base_url = args
            .base_url
            .clone()
            .unwrap_or_else(|| ClientConfig::default().base_url);
        let api = BankingApi::new(client_config(base_url, args.timeout.as_deref())?)?;

        eprintln!("Running contract checks against {}", api.base_url());

        let suite = ContractSuite::new(Arc::new(api), fixtures);
        let report = runtime()?.block_on(suite.run());

        Self::display_contract_report(&report, args.output_format)?;

        if report.passed() {
            Ok(Outcome::Passed)
        } else {
            Ok(Outcome::ContractFailed)
        }
    }

    fn display_contract_report(
        report: &ContractReport,
        format: ReportFormat,
    ) -> Result<(), AppError> {
        let formatter: Box<dyn ReportFormatter> = match format {
            ReportFormat::Text => Box::new(TextFormatter::new()),
            ReportFormat::Json => Box::new(JsonFormatter::new()),
            ReportFormat::Markdown => Box::new(MarkdownFormatter::new()),
        };
        println!("{}", formatter.format_report(report)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::time::Duration;

    fn run_args(cli: Cli) -> RunArgs {
        match cli.command {
            Command::Run(args) => args,
            other => panic!("expected run command, got {:?}", other),
        }
    }

    #[test]
    fn parse_run_with_stages_and_thresholds() {
        let cli = Cli::try_parse_from([
            "rampa",
            "run",
            "get-users",
            "--stage",
            "10s:5",
            "--stage",
            "1m:0",
            "--threshold",
            "http_req_duration=p(95)<300",
            "--output-format",
            "json",
            "-vv",
        ])
        .expect("CLI args should parse");

        assert_eq!(cli.verbose, 2);
        let args = run_args(cli);
        assert_eq!(args.scenario, BuiltinScenario::GetUsers);
        assert_eq!(
            args.stages,
            vec![
                Stage::new(Duration::from_secs(10), 5),
                Stage::new(Duration::from_secs(60), 0)
            ]
        );
        assert_eq!(args.thresholds[0].metric, "http_req_duration");
        assert_eq!(args.output_format, OutputFormat::Json);
    }

    #[test]
    fn unknown_scenario_is_rejected() {
        let err = Cli::try_parse_from(["rampa", "run", "soak"]).expect_err("should fail");
        assert!(err.to_string().contains("unknown scenario 'soak'"));
    }

    #[test]
    fn malformed_stage_is_rejected() {
        assert!(Cli::try_parse_from(["rampa", "run", "full", "--stage", "30s"]).is_err());
    }

    #[test]
    fn verify_accepts_report_formats_only() {
        let cli = Cli::try_parse_from(["rampa", "verify", "--output-format", "markdown"])
            .expect("markdown contract report");
        match cli.command {
            Command::Verify(args) => assert_eq!(args.output_format, ReportFormat::Markdown),
            other => panic!("expected verify command, got {:?}", other),
        }
        assert!(Cli::try_parse_from(["rampa", "verify", "--output-format", "csv"]).is_err());
    }

    #[test]
    fn cli_flags_override_run_file_and_defaults() {
        let file = RunFile::parse(
            r#"
            start_vus = 2
            graceful_stop = "5s"

            [[stages]]
            duration = "20s"
            target = 4

            [thresholds]
            http_req_duration = ["p(95)<800"]
            "#,
        )
        .expect("run file");
        let cli = Cli::try_parse_from([
            "rampa",
            "run",
            "full",
            "--graceful-stop",
            "1s",
            "--threshold",
            "http_req_failed=rate<0.5",
        ])
        .expect("CLI args should parse");
        let args = run_args(cli);

        let config = Cli::resolve_config(&args, Some(&file)).expect("config");

        // File wins over scenario defaults.
        assert_eq!(config.stages, vec![Stage::new(Duration::from_secs(20), 4)]);
        assert_eq!(config.start_vus, 2);
        // Flags win over the file.
        assert_eq!(config.graceful_stop, Duration::from_secs(1));
        let failed = config
            .thresholds
            .iter()
            .find(|t| t.metric == "http_req_failed")
            .expect("http_req_failed thresholds");
        assert_eq!(failed.expressions, vec!["rate<0.5".to_string()]);
        let duration = config
            .thresholds
            .iter()
            .find(|t| t.metric == "http_req_duration")
            .expect("http_req_duration thresholds");
        assert_eq!(duration.expressions, vec!["p(95)<800".to_string()]);
    }

    #[test]
    fn zero_tick_is_a_config_error() {
        let cli = Cli::try_parse_from(["rampa", "run", "full", "--tick", "0s"])
            .expect("CLI args should parse");
        let args = run_args(cli);
        assert!(matches!(
            Cli::resolve_config(&args, None),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn outcomes_map_to_exit_codes() {
        assert_eq!(Outcome::Passed.exit_code(), 0);
        assert_eq!(Outcome::ThresholdsFailed.exit_code(), 99);
        assert_eq!(Outcome::ContractFailed.exit_code(), 98);
    }
}
