// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Construct launch and option configurations for Z3 and CVC5.

/// The full invocation of a solver binary.
#[derive(Debug, Clone)]
pub struct SolverCmd {
    /// Binary to launch
    pub cmd: String,
    /// Arguments to pass
    pub args: Vec<String>,
    /// SMT options to send on startup
    pub options: Vec<(String, String)>,
    /// The SMT-LIB logic to declare on startup
    pub logic: String,
}

impl SolverCmd {
    fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            args: vec![],
            options: vec![],
            logic: "ALL".to_string(),
        }
    }

    fn args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
    }

    /// Set an option.
    pub fn option<S: AsRef<str>>(&mut self, name: &str, val: S) {
        self.options
            .push((name.to_string(), val.as_ref().to_string()));
    }

    /// Set the logic sent with `(set-logic ...)`.
    pub fn logic<S: AsRef<str>>(&mut self, logic: S) {
        self.logic = logic.as_ref().to_string();
    }

    /// Build the command line string, for printing purposes.
    pub fn cmdline(&self) -> String {
        let args: Vec<_> = self
            .args
            .iter()
            .map(|a| {
                if a.contains(' ') {
                    format!("\"{a}\"")
                } else {
                    a.clone()
                }
            })
            .collect();
        format!("{} {}", &self.cmd, args.join(" "))
    }
}

/// Builder for creating a Z3 [`SolverCmd`].
#[derive(Debug, Clone)]
pub struct Z3Conf(SolverCmd);

impl Z3Conf {
    /// Create a Z3Conf with some default options. Uses `cmd` as the path to Z3.
    pub fn new(cmd: &str) -> Self {
        let mut cmd = SolverCmd::new(cmd);
        cmd.args(["-in", "-smt2"]);
        cmd.option("model.completion", "true");
        let mut conf = Self(cmd);
        conf.timeout_ms(None);
        conf
    }

    /// Set the SMT timeout option
    pub fn timeout_ms(&mut self, ms: Option<usize>) {
        // this is the default Z3 timeout
        let ms = ms.unwrap_or(4294967295);
        self.0.option("timeout", format!("{ms}"));
    }

    /// Set the random seeds used by Z3.
    pub fn seed(&mut self, seed: usize) {
        self.0.option("smt.random_seed", format!("{seed}"));
        self.0.option("sat.random_seed", format!("{seed}"));
    }

    /// Get access to the raw options of the solver.
    pub fn options(&mut self) -> &mut SolverCmd {
        &mut self.0
    }

    /// Get the final command to run the solver.
    pub fn done(self) -> SolverCmd {
        self.0
    }
}

/// Builder for a CVC5 [`SolverCmd`].
#[derive(Debug, Clone)]
pub struct CvcConf(SolverCmd);

impl CvcConf {
    /// Create a new CVC5 builder with some default options.
    pub fn new_cvc5(cmd: &str) -> Self {
        let mut cmd = SolverCmd::new(cmd);
        // --lang smt2 is needed when using stdin
        cmd.args(["-q", "--lang", "smt2"]);
        cmd.option("interactive", "false");
        cmd.option("incremental", "true");
        cmd.option("seed", "1");
        Self(cmd)
    }

    /// Set a per-query time limit. None sets no time limit.
    pub fn timeout_ms(&mut self, ms: Option<usize>) {
        let ms = ms.unwrap_or(0);
        self.0.option("tlimit-per", format!("{ms}"));
    }

    /// Set the random seed.
    pub fn seed(&mut self, seed: usize) {
        self.0.option("seed", format!("{seed}"));
    }

    /// Get access to the raw options of the solver.
    pub fn options(&mut self) -> &mut SolverCmd {
        &mut self.0
    }

    /// Get the final command to run the solver.
    pub fn done(self) -> SolverCmd {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::{CvcConf, Z3Conf};

    #[test]
    fn test_z3_cmdline() {
        let mut conf = Z3Conf::new("z3");
        conf.timeout_ms(Some(1500));
        conf.options().logic("QF_LIA");
        let cmd = conf.done();
        assert_eq!(cmd.cmdline(), "z3 -in -smt2");
        assert_eq!(cmd.logic, "QF_LIA");
        // the explicit timeout is sent after the default one and wins
        assert_eq!(
            cmd.options.last(),
            Some(&("timeout".to_string(), "1500".to_string()))
        );
    }

    #[test]
    fn test_cvc5_options() {
        let mut conf = CvcConf::new_cvc5("/opt/cvc5 dir/cvc5");
        conf.seed(7);
        let cmd = conf.done();
        assert_eq!(cmd.cmdline(), "/opt/cvc5 dir/cvc5 -q --lang smt2");
        assert!(cmd
            .options
            .contains(&("seed".to_string(), "7".to_string())));
    }
}
