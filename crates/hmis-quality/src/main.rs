//! CLI entry point for the HMIS data quality checker.

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use hmis_quality::config::{DEFAULT_GROUP_COLUMN, DEFAULT_HIGH_QUANTILE, DEFAULT_LOW_QUANTILE, DEFAULT_PERIOD_COLUMN};
use hmis_quality::{
    AnalysisConfig, AnalysisOutcome, AnalysisReport, AnalysisStage, DatasetSchema, FacilityDataset,
    FacilityRegistry, LogicalRuleChecker, OutlierPipeline, QualitySection, RecordOrder, Relationship,
    ReportGenerator, ReportParams, RuleCheck,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// CLI-compatible record ordering
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliRecordOrder {
    /// Sort by facility, then by period
    Group,
    /// Sort by period, then by facility
    Time,
}

impl From<CliRecordOrder> for RecordOrder {
    fn from(cli: CliRecordOrder) -> Self {
        match cli {
            CliRecordOrder::Group => RecordOrder::GroupThenTime,
            CliRecordOrder::Time => RecordOrder::TimeThenGroup,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "HMIS Dataset Quality Checker",
    long_about = "Flags possible outliers per facility in HMIS exports using empirical \
                  quantile bounds, and reports missing values and completeness.\n\n\
                  EXAMPLES:\n  \
                  # Outliers in one indicator\n  \
                  hmis-quality -i data.csv -m \"ANC 1st visit\"\n\n  \
                  # Restrict counts to 2023 and join the facility master list\n  \
                  hmis-quality -i data.csv -m \"ANC 1st visit\" --year 2023 --facility-list mfl.csv\n\n  \
                  # Check that first visits are never below fourth visits\n  \
                  hmis-quality -i data.csv -m \"ANC 1st visit\" --rule \"ANC 1st visit:higher:ANC 4th visit\""
)]
struct Args {
    /// Path to the CSV file to analyze
    #[arg(short, long)]
    input: String,

    /// Metric column to check for outliers
    #[arg(short, long)]
    metric: String,

    /// Column holding the facility name
    #[arg(long, default_value = DEFAULT_GROUP_COLUMN)]
    group_column: String,

    /// Column holding the period label
    #[arg(long, default_value = DEFAULT_PERIOD_COLUMN)]
    period_column: String,

    /// Lower quantile (0 < low < high)
    #[arg(long, default_value_t = DEFAULT_LOW_QUANTILE)]
    low: f64,

    /// Upper quantile (low < high < 1)
    #[arg(long, default_value_t = DEFAULT_HIGH_QUANTILE)]
    high: f64,

    /// Restrict outlier counts to one calendar year
    #[arg(long)]
    year: Option<i32>,

    /// Ordering of the exported anomaly table
    #[arg(long, value_enum, default_value = "group")]
    order: CliRecordOrder,

    /// Output directory for results
    #[arg(short, long, default_value = "./outputs")]
    output: String,

    /// Facility master list CSV (facility and district columns)
    #[arg(long)]
    facility_list: Option<String>,

    /// Facility column in the master list
    #[arg(long, default_value = "facility")]
    facility_column: String,

    /// District column in the master list
    #[arg(long, default_value = "district")]
    district_column: String,

    /// Logical rule "<column1>:<higher|lower|equal>:<column2>" (repeatable)
    #[arg(long = "rule")]
    rules: Vec<String>,

    /// Process facilities on one thread
    #[arg(long)]
    sequential: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON report.
    #[arg(long)]
    json: bool,

    /// Write a detailed JSON report to the output directory
    ///
    /// The report will be saved as <input_name>_report.json
    #[arg(short = 'r', long)]
    emit_report: bool,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    dotenv().ok();

    if !Path::new(&args.input).exists() {
        return Err(anyhow!("Input file not found: {}", args.input));
    }

    // Rule syntax is checked before any data is read
    let rules = args
        .rules
        .iter()
        .map(|rule| parse_rule(rule))
        .collect::<Result<Vec<_>>>()?;

    let mut config_builder = AnalysisConfig::builder()
        .group_column(&args.group_column)
        .period_column(&args.period_column)
        .low_quantile(args.low)
        .high_quantile(args.high)
        .record_order(args.order.into())
        .parallel(!args.sequential);
    if let Some(year) = args.year {
        config_builder = config_builder.year(year);
    }
    let config = config_builder.build()?;

    info!("Loading dataset from: {}", args.input);
    let data = load_csv_with_fallbacks(&args.input)?;
    info!("Dataset loaded successfully: {:?}", data.shape());

    let dataset = FacilityDataset::from_dataframe(&data, &DatasetSchema::from(&config))
        .map_err(|e| anyhow!("Invalid dataset: {}", e))?;
    check_rule_columns(&dataset, &rules)?;

    let registry = args
        .facility_list
        .as_deref()
        .map(|path| load_registry(path, &args))
        .transpose()?;

    let pipeline = build_pipeline(&args, config)?;
    let outcome = match pipeline.run(&dataset, &args.metric) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Analysis failed: {}", e);
            return Err(anyhow!("Analysis failed: {}", e));
        }
    };

    let rule_checks = rules
        .iter()
        .map(|(left, relationship, right)| {
            LogicalRuleChecker::check(&dataset, left, right, *relationship)
        })
        .collect::<hmis_quality::QualityResult<Vec<_>>>()?;

    handle_output(&args, pipeline.config(), &dataset, &outcome, registry.as_ref(), &rule_checks)
}

/// Parse `"<column1>:<relationship>:<column2>"`.
///
/// Column names may contain `:`; the relationship is the last segment that
/// parses as one.
fn parse_rule(rule: &str) -> Result<(String, Relationship, String)> {
    let parts: Vec<&str> = rule.split(':').collect();
    for idx in (1..parts.len().saturating_sub(1)).rev() {
        if let Ok(relationship) = parts[idx].parse::<Relationship>() {
            let left = parts[..idx].join(":");
            let right = parts[idx + 1..].join(":");
            return Ok((left.trim().to_string(), relationship, right.trim().to_string()));
        }
    }
    Err(anyhow!(
        "Invalid rule '{}': expected <column1>:<higher|lower|equal>:<column2>",
        rule
    ))
}

/// Resolve every rule column against `dataset` before detection starts.
fn check_rule_columns(dataset: &FacilityDataset, rules: &[(String, Relationship, String)]) -> Result<()> {
    for (left, _, right) in rules {
        LogicalRuleChecker::resolve_columns(dataset, left, right)
            .map_err(|e| anyhow!("Invalid rule '{}' / '{}': {}", left, right, e))?;
    }
    Ok(())
}

fn build_pipeline(args: &Args, config: AnalysisConfig) -> Result<OutlierPipeline> {
    let mut builder = OutlierPipeline::builder().config(config);

    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            if update.stage == AnalysisStage::Detecting && update.items_total.is_some() {
                debug!("[{:.0}%] {}", update.progress * 100.0, update.message);
            } else {
                info!(
                    "[{:.0}%] {}: {}",
                    update.progress * 100.0,
                    update.stage.display_name(),
                    update.message
                );
            }
        });
    }

    Ok(builder.build()?)
}

fn load_registry(path: &str, args: &Args) -> Result<FacilityRegistry> {
    info!("Loading facility master list from: {}", path);
    let df = load_csv_with_fallbacks(path)?;
    let registry = FacilityRegistry::from_dataframe(&df, &args.facility_column, &args.district_column)?;
    info!("Facility master list has {} entries", registry.len());
    Ok(registry)
}

/// Write exports and print results based on CLI flags.
///
/// Output behavior:
/// - Default: Print human-readable summary to stdout
/// - `--json`: Print JSON to stdout only (no logs)
/// - `--emit-report`: Write JSON report to file
fn handle_output(
    args: &Args,
    config: &AnalysisConfig,
    dataset: &FacilityDataset,
    outcome: &AnalysisOutcome,
    registry: Option<&FacilityRegistry>,
    rule_checks: &[RuleCheck],
) -> Result<()> {
    let generator = ReportGenerator::new(PathBuf::from(&args.output));

    let mut output_files: Vec<String> = generator
        .write_outcome(outcome, &config.group_column, registry)?
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    if let Some(path) = generator.write_rule_violations(rule_checks, &config.group_column)? {
        output_files.push(path.display().to_string());
    }

    let report = ReportGenerator::build_report(ReportParams {
        input_file: &args.input,
        outcome,
        quality: QualitySection::collect(dataset, config),
        rule_checks,
        output_files,
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if args.emit_report {
        let input_stem = extract_file_stem(&args.input);
        let report_path = generator.write_report_to_file(&report, &input_stem)?;
        info!("Report written to: {}", report_path.display());
    }

    print_human_readable_summary(&report, registry.map(|r| outcome.outlier_summary.annotate(r).len()));
    Ok(())
}

/// Extract the file stem (name without extension) from a path.
fn extract_file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Print a human-readable summary of the analysis.
fn print_human_readable_summary(report: &AnalysisReport, registered: Option<usize>) {
    let summary = &report.dataset_summary;

    println!();
    println!("{}", "=".repeat(80));
    println!("OUTLIER ANALYSIS COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!(
        "Input:  {} ({} rows x {} metric columns)",
        report.input_file, report.quality.shape.0, report.quality.shape.1
    );
    println!("Metric: {}", report.metric);
    println!(
        "Quantiles: low={} high={}",
        report.thresholds.low, report.thresholds.high
    );
    if let Some(year) = report.year {
        println!("Year:   {}", year);
    }
    println!();

    println!("Facilities:");
    println!("  Total facilities: {}", summary.total_groups);
    println!("  Facilities with potential outliers: {}", summary.groups_with_outliers);
    match report.percentage_with_outliers {
        Some(pct) => println!("  % potential outliers: {:.2}%", pct),
        None => println!("  % potential outliers: undefined (no facilities)"),
    }
    println!("  Possible outliers: {}", summary.total_outliers);
    println!("  Missing values imputed: {}", summary.total_missing);
    if let Some(registered) = registered {
        println!("  On facility master list: {}", registered);
    }
    println!("  Duration: {}ms", report.duration_ms);
    println!();

    if !report.top_facilities.is_empty() {
        println!("Possible Outlier Counts by Facility:");
        println!("  {:<40} {:>8} {:>8}", "Facility", "Outliers", "Missing");
        for row in &report.top_facilities {
            println!(
                "  {:<40} {:>8} {:>8}",
                truncate_str(&row.group, 39),
                row.outlier_count,
                row.missing_count
            );
        }
        println!();
    }

    if !report.skipped_groups.is_empty() {
        println!("Skipped Facilities:");
        for skipped in &report.skipped_groups {
            println!("  ! {}: {}", skipped.group, skipped.reason);
        }
        println!();
    }

    println!("Data Quality:");
    match &report.quality.missing_values {
        Some(missing) => println!(
            "  Missing values: {:.0}% ({}, {} rows flagged)",
            missing.total_missing_percent,
            if missing.verdict.is_good() { "looks good" } else { "poor" },
            missing.flagged_rows.len()
        ),
        None => println!("  Missing values: undefined (empty dataset)"),
    }
    match &report.quality.completeness {
        Some(completeness) => println!(
            "  Completeness ratio: {:.2} ({})",
            completeness.ratio,
            if completeness.verdict.is_good() { "looks good" } else { "poor" }
        ),
        None => println!("  Completeness ratio: undefined (empty dataset)"),
    }
    println!();

    if !report.rule_checks.is_empty() {
        println!("Logical Rules:");
        for rule in &report.rule_checks {
            println!(
                "  {} {} {}: {} violations ({} rows checked, {} skipped)",
                rule.left_column,
                rule.relationship,
                rule.right_column,
                rule.violations,
                rule.evaluated_rows,
                rule.skipped_rows
            );
        }
        println!();
    }

    println!("Files:");
    for file in &report.output_files {
        println!("  {}", file);
    }
    println!();

    println!("Use --json for machine-readable output");
    println!("Use --emit-report to save detailed JSON report");
    println!("{}", "=".repeat(80));
}

/// Truncate a string to max length with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

/// Load CSV with multiple fallback strategies
fn load_csv_with_fallbacks(path: &str) -> Result<DataFrame> {
    // Strategy 1: Standard loading with quote handling
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("Standard loading failed: {}", e);
        }
    }

    // Strategy 2: Tolerate ragged rows
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_truncate_ragged_lines(true))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("Loading with ragged lines failed: {}", e);
        }
    }

    // Strategy 3: Decode as Latin-1 and pre-clean content
    match std::fs::read(path) {
        Ok(bytes) => {
            warn!("Falling back to Latin-1 decoding for {}", path);
            let content: String = bytes.iter().map(|&b| b as char).collect();
            let cleaned = clean_csv_content(&content);
            let cursor = std::io::Cursor::new(cleaned);

            CsvReadOptions::default()
                .with_infer_schema_length(Some(100))
                .with_has_header(true)
                .into_reader_with_file_handle(cursor)
                .finish()
                .map_err(|e| e.into())
        }
        Err(e) => {
            error!("Could not read file: {}", e);
            Err(e.into())
        }
    }
}

/// Drop blank lines; quoting is left to the CSV reader.
fn clean_csv_content(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
