use std::io::Write;

use clap::{Parser as CommandLineParser, ValueEnum};
use race_lib::{
    AnalysisConfig, Session,
    ir::{Program, print_cfg},
    races::Confidence,
};
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum CLIConfidence {
    Low,
    High,
}

impl From<CLIConfidence> for Confidence {
    fn from(value: CLIConfidence) -> Self {
        match value {
            CLIConfidence::Low => Confidence::Low,
            CLIConfidence::High => Confidence::High,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, CommandLineParser, Default)]
#[command(
    name = "race-driver",
    version,
    about = "Find data races in programs exported by a front-end."
)]
pub struct Opt {
    /// Only code known to run in the background counts as concurrent.
    #[arg(long)]
    pub strict_thread_context: bool,

    /// Block visits the lock tracker may spend on a single method.
    #[arg(long, value_name = "N")]
    pub per_method_budget: Option<usize>,

    /// Rounds a set of mutually recursive methods may take to stabilize.
    #[arg(long, value_name = "N")]
    pub max_fixpoint_rounds: Option<usize>,

    /// Hide findings below this confidence.
    #[arg(long, value_name = "LEVEL")]
    pub min_confidence: Option<CLIConfidence>,

    /// JSON file with analysis settings. Flags take precedence.
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,

    /// Dump the control flow graph of every method in graphviz format.
    #[arg(long)]
    pub dump_cfg: bool,

    /// Dump the condensed call graph in graphviz format.
    #[arg(long)]
    pub dump_call_graph: bool,

    /// File containing the program exported by the front-end.
    pub filename: String,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("cannot read `{path}`: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed program: {0}")]
    Program(#[source] serde_json::Error),
    #[error("malformed configuration: {0}")]
    Config(#[source] serde_json::Error),
    #[error("cannot write output: {0}")]
    Output(#[from] std::io::Error),
}

impl Opt {
    /// Settings from the command line on top of the given ones.
    pub fn apply(&self, mut config: AnalysisConfig) -> AnalysisConfig {
        if self.strict_thread_context {
            config.strict_thread_context = true;
        }
        if let Some(budget) = self.per_method_budget {
            config.per_method_budget = Some(budget);
        }
        if let Some(rounds) = self.max_fixpoint_rounds {
            config.max_fixpoint_rounds = Some(rounds);
        }
        if let Some(confidence) = self.min_confidence {
            config.min_confidence = confidence.into();
        }
        config
    }
}

pub fn parse_config(src: &str) -> Result<AnalysisConfig, DriverError> {
    serde_json::from_str(src).map_err(DriverError::Config)
}

/// The configuration file named on the command line, if any, with the flags
/// applied.
pub fn load_config(opts: &Opt) -> Result<AnalysisConfig, DriverError> {
    let base = match &opts.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path).map_err(|source| DriverError::Read {
                path: path.clone(),
                source,
            })?;
            parse_config(&contents)?
        }
        None => AnalysisConfig::default(),
    };
    Ok(opts.apply(base))
}

pub fn process_source(
    src: &str,
    config: &AnalysisConfig,
    out: &mut impl Write,
    opts: &Opt,
) -> Result<(), DriverError> {
    let program: Program = serde_json::from_str(src).map_err(DriverError::Program)?;
    tracing::debug!(
        classes = program.classes.len(),
        methods = program.methods.len(),
        "program loaded"
    );

    if opts.dump_cfg {
        for method in &program.methods {
            writeln!(out, "{}", print_cfg(method))?;
        }
    }

    let session = Session::new(&program, config);
    if opts.dump_call_graph {
        writeln!(out, "{}", session.print_call_graph())?;
    }

    let report = session.run();
    match opts.format {
        OutputFormat::Text => {
            for finding in &report.findings {
                writeln!(out, "{finding}")?;
            }
            for note in &report.notes {
                writeln!(out, "{note}")?;
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?;
            writeln!(out, "{json}")?;
        }
    }
    Ok(())
}
