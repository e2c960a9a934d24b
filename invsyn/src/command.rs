// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The invsyn binary's command-line interface.

use std::{borrow::Cow, fs, ops::Range, path::Path, process};

use codespan_reporting::{
    diagnostic::{Diagnostic, Label},
    files::SimpleFile,
    term::{
        self as terminal,
        termcolor::{ColorChoice, StandardStream},
    },
};
use path_slash::PathExt;
use serde::Serialize;

use oracle::{
    basics::Oracle,
    bounded::BoundedOracle,
    smt::{OracleConf, SmtOracle, SolverType},
    timing,
};
use smtlib::path::{query_dir, solver_path};
use sygus::{
    logic::Logic,
    parser::{parse_problem, Command, Spanned},
};
use synth::{
    context::{Options, SynthContext, SynthResult, SynthStatus},
    synthesizer::SynthConfig,
};

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum SolverChoice {
    Z3,
    Cvc5,
    /// Exhaustive evaluation over a window of integers
    Bounded,
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum ColorOutput {
    Never,
    Auto,
    Always,
}

#[derive(clap::Args, Clone, Debug, PartialEq, Eq)]
struct SolverArgs {
    #[arg(value_enum, long, default_value_t = SolverChoice::Z3)]
    /// Oracle to decide verification conditions with
    solver: SolverChoice,

    #[arg(long)]
    /// Save SMT queries in a directory alongside the input file
    smt: bool,

    #[arg(long, default_value = "10m")]
    /// Timeout for each oracle call (for example 30s or 2m)
    timeout: humantime::Duration,

    #[arg(long, default_value_t = 0)]
    /// SMT solver random seed
    solver_seed: usize,

    #[arg(long, default_value_t = 32)]
    /// Integers range over [-window, window] for the bounded oracle
    window: u32,
}

impl SolverArgs {
    fn oracle(&self, logic: Logic, file: &Path) -> Result<Box<dyn Oracle>, String> {
        let (solver_type, bin) = match self.solver {
            SolverChoice::Z3 => (SolverType::Z3, "z3"),
            SolverChoice::Cvc5 => (SolverType::Cvc5, "cvc5"),
            SolverChoice::Bounded => return Ok(Box::new(BoundedOracle::new(self.window))),
        };
        let mut conf = OracleConf::new(solver_type, &solver_path(bin), logic);
        conf.timeout(Some(*self.timeout)).seed(self.solver_seed);
        if self.smt {
            conf.tee(Some(query_dir(file)));
        }
        let oracle = SmtOracle::new(conf).map_err(|err| format!("could not start {bin}: {err}"))?;
        Ok(Box::new(oracle))
    }
}

#[derive(clap::Parser, Debug)]
#[command(about, long_about=None)]
/// Entrypoint for the invsyn binary.
pub struct App {
    #[arg(value_enum, long, default_value_t = ColorOutput::Auto)]
    /// Control color output. Auto disables colors with TERM=dumb or
    /// NO_COLOR=true.
    color: ColorOutput,

    #[command(flatten)]
    solver: SolverArgs,

    #[arg(long)]
    /// Give up after this much time in total
    budget_time: Option<humantime::Duration>,

    #[arg(long)]
    /// Give up after drawing this many candidates
    max_iterations: Option<usize>,

    #[arg(long)]
    /// Only consider candidates up to this size
    max_size: Option<usize>,

    #[arg(long)]
    /// Check the three conditions of each candidate in parallel
    parallel: bool,

    #[arg(long)]
    /// Print the result as JSON
    json: bool,

    #[arg(long)]
    /// Print timing statistics
    time: bool,

    /// File name for a SyGuS .sl file
    file: String,
}

/// Writes diagnostics against the input file.
struct Reporter<'a> {
    files: SimpleFile<Cow<'a, str>, &'a str>,
    writer: StandardStream,
    config: terminal::Config,
}

impl Reporter<'_> {
    fn error(&self, message: String, span: Range<usize>) -> ! {
        let diagnostic = Diagnostic::error()
            .with_message(message)
            .with_labels(vec![Label::primary((), span)]);
        if let Err(err) = terminal::emit(
            &mut self.writer.lock(),
            &self.config,
            &self.files,
            &diagnostic,
        ) {
            eprintln!("could not report error: {err}");
        }
        process::exit(1);
    }
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    result: &'a SynthResult,
    solutions: Vec<String>,
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("expected true or false, found {value}")),
    }
}

impl App {
    fn synth_config(&self) -> SynthConfig {
        SynthConfig {
            max_iterations: self.max_iterations,
            timeout: self.budget_time.as_deref().copied(),
            max_candidate_size: self.max_size,
            parallel_vcs: self.parallel,
        }
    }

    fn print_result(&self, ctx: &SynthContext, result: &SynthResult) {
        let solutions = match ctx.synth_solutions() {
            Ok(defs) => defs.iter().map(|def| def.to_string()).collect(),
            Err(_) => vec![],
        };
        if self.json {
            let report = Report { result, solutions };
            match serde_json::to_string_pretty(&report) {
                Ok(s) => println!("{s}"),
                Err(err) => eprintln!("could not serialize result: {err}"),
            }
            return;
        }
        if result.status == SynthStatus::HasSolution {
            for def in solutions {
                println!("{def}");
            }
        } else {
            println!("{}", result.status);
            if let Some(reason) = &result.reason {
                eprintln!("{reason}");
            }
        }
    }

    /// Run the application.
    pub fn exec(self) {
        let file = match fs::read_to_string(&self.file) {
            Ok(file) => file,
            Err(err) => {
                eprintln!("could not read {}: {err}", self.file);
                process::exit(1);
            }
        };
        // We make sure paths look like Unix paths on all platforms, otherwise test snapshots don't match.
        let standardized_filename = Path::new(&self.file).to_slash_lossy();
        let reporter = Reporter {
            files: SimpleFile::new(standardized_filename, &file),
            writer: StandardStream::stderr(match &self.color {
                ColorOutput::Never => ColorChoice::Never,
                ColorOutput::Always => ColorChoice::Always,
                ColorOutput::Auto => ColorChoice::Auto,
            }),
            config: terminal::Config {
                start_context_lines: 3,
                end_context_lines: 3,
                ..Default::default()
            },
        };

        let commands = match parse_problem(&file) {
            Ok(commands) => commands,
            Err(err) => reporter.error(err.to_string(), err.span()),
        };

        // options are only allowed before anything else
        let split = commands
            .iter()
            .position(|c| !matches!(c.node, Command::SetLogic(_) | Command::SetOption { .. }))
            .unwrap_or(commands.len());
        let mut options = Options::default();
        let mut options_span = 0..0;
        for Spanned { span, node } in &commands[..split] {
            match node {
                Command::SetLogic(logic) => options.logic = *logic,
                Command::SetOption { name, value } => {
                    let flag = match name.as_str() {
                        "sygus" => &mut options.sygus,
                        "incremental" => &mut options.incremental,
                        _ => {
                            log::warn!("ignoring unsupported option :{name}");
                            continue;
                        }
                    };
                    *flag = parse_bool(value).unwrap_or_else(|msg| reporter.error(msg, span.clone()));
                    options_span = span.clone();
                }
                _ => {}
            }
        }
        let mut ctx = match SynthContext::new(options) {
            Ok(ctx) => ctx,
            Err(err) => reporter.error(err.to_string(), options_span),
        };

        let config = self.synth_config();
        let mut oracle: Option<Box<dyn Oracle>> = None;
        let mut failed = false;
        for Spanned { span, node } in commands.into_iter().skip(split) {
            let r = match node {
                Command::SetLogic(_) | Command::SetOption { .. } => {
                    Err("options must be set before any other command".to_string())
                }
                Command::DeclareVar(b) => {
                    log::debug!("ignoring declaration of {}", b.name);
                    Ok(())
                }
                Command::DefineFun(def) => ctx
                    .define_fun(&def.name, &def.params, def.ret, def.body)
                    .map_err(|err| err.to_string()),
                Command::SynthFun {
                    name,
                    params,
                    ret,
                    grammar,
                } => {
                    let r = match grammar {
                        None => ctx.synth_fun(&name, &params, ret),
                        Some(g) => ctx.synth_fun_with_grammar(&name, &params, ret, &g),
                    };
                    r.map_err(|err| err.to_string())
                }
                Command::InvConstraint {
                    inv,
                    pre,
                    trans,
                    post,
                } => ctx
                    .add_inv_constraint(&inv, &pre, &trans, &post)
                    .map_err(|err| err.to_string()),
                Command::CheckSynth => {
                    if oracle.is_none() {
                        match self.solver.oracle(ctx.logic(), Path::new(&self.file)) {
                            Ok(o) => oracle = Some(o),
                            Err(msg) => reporter.error(msg, span.clone()),
                        }
                    }
                    match &oracle {
                        Some(o) => match ctx.check_synth(o, &config) {
                            Ok(result) => {
                                self.print_result(&ctx, &result);
                                failed |= result.status != SynthStatus::HasSolution;
                                Ok(())
                            }
                            Err(err) => Err(err.to_string()),
                        },
                        None => Ok(()),
                    }
                }
            };
            if let Err(msg) = r {
                reporter.error(msg, span);
            }
        }

        if self.time {
            timing::report();
        }
        if failed {
            process::exit(1);
        }
    }
}
