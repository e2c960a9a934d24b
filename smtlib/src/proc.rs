// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Manage a running SMT process.
//!
//! This is a low-level generic API for SMT-LIB solvers; the solver-specific
//! parts are captured by the [`SolverCmd`] passed to launch the solver. The
//! only queries the rest of the system needs are `check-sat` and `get-value`,
//! so no solver-specific model parsing is required.

use crate::conf::SolverCmd;
use crate::sexp::{self, app, atom_s, sexp_l, Sexp};
use crate::tee::Tee;
use nix::{errno::Errno, sys::signal, unistd::Pid};
use std::{
    ffi::{OsStr, OsString},
    io::{self, BufRead, BufReader, ErrorKind, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    sync::{Arc, Mutex},
};
use thiserror::Error;

/// The states that the process can be in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Status {
    /// Solver is running normally. If `in_call` is true, it is currently
    /// processing a `check-sat` call.
    Running { in_call: bool },
    /// A cancellation has been requested but has not been acted upon because
    /// the solver isn't at a stopping point. Any solver operations after this
    /// point will cause the solver to be killed; calls that return nothing like
    /// `assert` will silently succeed, while calls that require a response
    /// will return `SolverError::Killed`.
    Stopping,
    /// The solver has been killed but needs a `.wait()` call to reap the process.
    NeedsWait,
    /// The solver has exited and the process has been reaped with `.wait()`.
    Terminated,
}

/// SmtProc wraps an instance of a solver process.
#[derive(Debug)]
pub struct SmtProc {
    child: Child,
    pid: Pid,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    tee: Option<Tee>,
    // signal to SmtPids that this process has terminated (so we don't try to
    // kill the process long afterward when the pid might have been reused)
    terminated: Arc<Mutex<Status>>,
}

/// A handle to the SMT process for cancelling an in-progress check.
#[derive(Clone, Debug)]
pub struct SmtPid {
    pid: Pid,
    terminated: Arc<Mutex<Status>>,
}

/// SatResp is a solver's response to a `(check-sat)` command.
///
/// For unknown it also returns the reason the solver provides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResp {
    /// The query is satisfiable.
    Sat,
    /// The query is unsatisfiable (and thus negated assertions are valid).
    Unsat,
    /// Unknown whether the query is sat or unsat. The reason is the one given
    /// by (get-info :reason-unknown).
    Unknown(String),
}

/// An error from trying to call the solver
#[derive(Error, Debug)]
pub enum SolverError {
    /// I/O went wrong
    #[error("some I/O went wrong: {0}")]
    Io(#[from] io::Error),
    /// Solver returned an `(error ...)` response or closed its output
    #[error("solver returned an error:\n{0}")]
    UnexpectedClose(String),
    /// Solver replied with something we could not make sense of
    #[error("could not parse solver response:\n{0}")]
    BadResponse(String),
    /// The operating system gave the solver a pid that does not fit a signed pid
    #[error("solver pid {0} is out of range")]
    BadPid(u32),
    /// Solver killed specifically by SIGKILL signal
    #[error("solver was killed")]
    Killed,
}

type Result<T> = std::result::Result<T, SolverError>;

// =============================
// State-machine related code
// =============================

impl Drop for SmtProc {
    fn drop(&mut self) {
        self.kill();
    }
}

impl SmtPid {
    /// Kill the SMT process by pid.
    pub fn kill(&self) {
        let mut terminated = self.terminated.lock().unwrap();
        match *terminated {
            Status::NeedsWait | Status::Terminated | Status::Stopping => {}
            Status::Running { in_call } => {
                // Only try to kill the solver if it's in the middle of an
                // expensive call.
                if in_call {
                    let r = signal::kill(self.pid, signal::Signal::SIGKILL);
                    if let Err(errno) = r {
                        if errno != Errno::ESRCH {
                            log::warn!("killing SMT process {} failed with {errno}", self.pid);
                        }
                    }
                    *terminated = Status::NeedsWait;
                } else {
                    // Otherwise, we mark the solver as stopping, which causes
                    // most commands to exit early and the next check-sat to
                    // kill the solver without running.
                    *terminated = Status::Stopping;
                }
            }
        }
    }

    /// Whether the process has been killed (or asked to stop).
    pub fn is_killed(&self) -> bool {
        !matches!(*self.terminated.lock().unwrap(), Status::Running { .. })
    }
}

impl SmtProc {
    /// Create a new SMT process by running a solver.
    ///
    /// The optional `tee` argument is a directory where queries sent to the
    /// solver are saved, for debugging purposes.
    pub fn new(mut cmd: SolverCmd, tee: Option<&Path>) -> Result<Self> {
        cmd.option("produce-models", "true");
        let mut child = Command::new(OsStr::new(&cmd.cmd))
            .args(cmd.args.iter().map(OsString::from))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let tee = tee.map(|path| {
            let mut f = Tee::new(path);
            f.append(Sexp::Comment(cmd.cmdline()));
            f
        });
        let pid = match i32::try_from(child.id()) {
            Ok(pid) => Pid::from_raw(pid),
            Err(_) => {
                _ = child.kill();
                return Err(SolverError::BadPid(child.id()));
            }
        };
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            _ = child.kill();
            return Err(SolverError::UnexpectedClose(
                "solver pipes were not available".to_string(),
            ));
        };
        let mut proc = Self {
            child,
            pid,
            stdin,
            stdout: BufReader::new(stdout),
            tee,
            terminated: Arc::new(Mutex::new(Status::Running { in_call: false })),
        };
        for (option, val) in &cmd.options {
            proc.send(&app(
                "set-option",
                [atom_s(format!(":{option}")), atom_s(val)],
            ));
        }
        proc.send(&app("set-logic", [atom_s(&cmd.logic)]));
        Ok(proc)
    }

    /// Get a handle to the process for cancellation.
    pub fn pid(&self) -> SmtPid {
        SmtPid {
            pid: self.pid,
            terminated: self.terminated.clone(),
        }
    }

    fn send_raw(&mut self, data: &Sexp) {
        if let Err(err) = writeln!(self.stdin, "{data}") {
            // the error resurfaces when reading the response
            log::debug!("failed to send to solver: {err}");
        }
        if let Some(f) = &mut self.tee {
            f.append(data.clone());
        }
    }

    /// Low-level API to send the solver a command that expects a response,
    /// which is parsed as a single s-expression.
    fn send_with_reply(&mut self, data: &Sexp) -> Result<Sexp> {
        self.send(data);
        let resp = self.get_response(|s| s.to_string())?;
        sexp::parse(&resp).map_err(|_| SolverError::BadResponse(resp))
    }

    /// Check the status because the solver is currently idle, to see if we
    /// should kill or wait and return early.
    fn handle_termination_status(&mut self, status: &mut Status) -> Result<()> {
        match *status {
            Status::Running { .. } => return Ok(()),
            Status::Stopping => {
                _ = self.child.kill();
                _ = self.child.wait();
            }
            Status::NeedsWait => {
                _ = self.child.wait();
            }
            Status::Terminated => {}
        }
        // if not currently running, we'll leave the solver terminated and `wait`'d for
        *status = Status::Terminated;
        Err(SolverError::Killed)
    }

    /// Mark the solver as being inside an expensive call (so killing it will
    /// actually send a signal).
    fn start_call(&mut self) -> Result<()> {
        let status_m = self.terminated.clone();
        let mut status = status_m.lock().unwrap();
        self.handle_termination_status(&mut status)?;
        *status = Status::Running { in_call: true };
        Ok(())
    }

    /// Mark the solver as being done with an expensive call.
    fn end_call(&mut self) -> Result<()> {
        let status_m = self.terminated.clone();
        let mut status = status_m.lock().unwrap();
        self.handle_termination_status(&mut status)?;
        *status = Status::Running { in_call: false };
        Ok(())
    }

    fn check_killed(&mut self) -> Result<()> {
        let status_m = self.terminated.clone();
        let mut status = status_m.lock().unwrap();
        self.handle_termination_status(&mut status)
    }

    /// A marker for determining end of solver response.
    const DONE: &'static str = "<<DONE>>";

    fn write_stdin(&mut self, line: &str) -> std::result::Result<(), io::Error> {
        writeln!(self.stdin, "{line}")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Low-level mechanism to get a response. Note that this needs to be issued
    /// after each query that returns a response, since it sends a marker and
    /// waits for the solver to reach that marker.
    fn get_response<F, T>(&mut self, cb: F) -> Result<T>
    where
        F: FnOnce(&str) -> T,
    {
        if let Err(err) = self.write_stdin(&format!(r#"(echo "{}")"#, Self::DONE)) {
            if err.kind() == ErrorKind::BrokenPipe {
                self.check_killed()?
            }
            return Err(SolverError::from(err));
        }
        // buf accumulates the entire response, which is read line-by-line
        // looking for the DONE marker.
        let mut buf = String::new();
        loop {
            let last_end = buf.len();
            // n is the number of bytes read (that is, the length of this line
            // including the newline)
            let n = self.stdout.read_line(&mut buf)?;
            if n == 0 {
                self.check_killed()?;
                return Err(SolverError::UnexpectedClose(Self::parse_error(&buf)));
            }
            // last line, without the newline
            let last_line = buf[last_end..last_end + n].trim_end();
            // Z3 doesn't put quotes and CVC does (quotes do follow SMT-LIB)
            if last_line == Self::DONE || last_line == format!("\"{}\"", Self::DONE) {
                let response = buf[..last_end].trim_end();
                return Ok(cb(response));
            }
        }
    }

    fn kill(&mut self) {
        _ = writeln!(self.stdin, "(exit)");
        _ = self.stdin.flush();
        _ = self.child.kill();
        _ = self.child.wait();
        *self.terminated.lock().unwrap() = Status::Terminated;
    }

    // ========================
    // Non state machine APIs
    // ========================

    /// Low-level API to send the solver a command as an s-expression. This
    /// should only be used for commands that do not require a response.
    pub fn send(&mut self, data: &Sexp) {
        let status_m = self.terminated.clone();
        let mut status = status_m.lock().unwrap();
        if self.handle_termination_status(&mut status).is_err() {
            // solver has been cancelled, pretend like the command succeeded
            return;
        }
        drop(status);
        self.send_raw(data)
    }

    /// Get some attribute using the SMT get-info command.
    pub fn get_info(&mut self, attribute: &str) -> Result<Sexp> {
        let resp = self.send_with_reply(&app("get-info", [atom_s(attribute)]))?;
        match resp.list() {
            Some([key, val]) if key == &atom_s(attribute) => Ok(val.clone()),
            _ => Err(SolverError::BadResponse(resp.to_string())),
        }
    }

    /// Parse an error message returned as an s-expression.
    fn parse_error(resp: &str) -> String {
        // Z3 returns check-sat errors as:
        // (error "error msg")
        // sat
        //
        // Thus we parse the result as a sequence of sexps and look for the
        // error sexp.
        let Ok(sexps) = sexp::parse_many(resp) else {
            return resp.to_string();
        };
        sexps
            .iter()
            .find_map(|s| {
                s.app().and_then(|(head, args)| match args {
                    [msg] if head == "error" => msg.atom_s(),
                    _ => None,
                })
            })
            .unwrap_or(resp)
            .to_string()
    }

    fn parse_sat(&mut self, resp: &str) -> Result<SatResp> {
        match resp {
            "unsat" => Ok(SatResp::Unsat),
            "sat" => Ok(SatResp::Sat),
            "unknown" => {
                let reason = self.get_info(":reason-unknown")?;
                Ok(SatResp::Unknown(reason.to_string()))
            }
            _ => {
                self.check_killed()?;
                Err(SolverError::UnexpectedClose(Self::parse_error(resp)))
            }
        }
    }

    /// Send the solver `(check-sat)`. For unknown gets a reason.
    pub fn check_sat(&mut self) -> Result<SatResp> {
        self.send(&app("check-sat", []));
        self.start_call()?;
        let resp = self.get_response(|s| s.to_string())?;
        let resp = self.parse_sat(&resp)?;
        self.end_call()?;
        if matches!(resp, SatResp::Unknown(_)) {
            if let Some(name) = self.save_tee() {
                log::info!("unknown response to {}", name.display());
            }
        }
        Ok(resp)
    }

    /// Following a sat reply, get the values of the given terms in the model
    /// as `(term, value)` pairs, in the order they were requested.
    pub fn get_values(&mut self, terms: &[Sexp]) -> Result<Vec<(Sexp, Sexp)>> {
        if terms.is_empty() {
            return Ok(vec![]);
        }
        self.start_call()?;
        let resp = self.send_with_reply(&app("get-value", [sexp_l(terms.to_vec())]))?;
        self.end_call()?;
        let bad = || SolverError::BadResponse(resp.to_string());
        let pairs = resp.list().ok_or_else(bad)?;
        pairs
            .iter()
            .map(|pair| match pair.list() {
                Some([t, v]) => Ok((t.clone(), v.clone())),
                _ => Err(bad()),
            })
            .collect()
    }

    // =============
    // Tee support
    // =============

    /// Save the current tee file, if there is one. Returns the name of the
    /// created file (or None if there is no tee'd output setup).
    ///
    /// Errors are purely the result of I/O trying to save the file.
    pub fn save_tee(&self) -> Option<PathBuf> {
        self.tee.as_ref().and_then(|tee| match tee.save() {
            Ok(name) => Some(name),
            Err(err) => {
                // report this error but this isn't fatal
                log::warn!("failed to save tee: {err}");
                None
            }
        })
    }

    /// Add a comment to the tee'd file.
    ///
    /// The comment is passed as a closure, which is not evaluated if there is
    /// no tee'd smt2 file.
    pub fn comment_with<F>(&mut self, comment: F)
    where
        F: FnOnce() -> String,
    {
        if let Some(f) = &mut self.tee {
            let comment = comment();
            f.append(Sexp::Comment("".to_string()));
            f.append(Sexp::Comment(comment));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        conf::{SolverCmd, Z3Conf},
        path::solver_path,
        proc::{SatResp, SmtProc, SolverError},
        sexp::{atom_s, parse},
    };
    use eyre::Context;
    use std::{sync::mpsc, thread, time::Duration};

    fn z3_with_logic(logic: &str) -> Option<SmtProc> {
        let mut conf = Z3Conf::new(&solver_path("z3"));
        conf.options().logic(logic);
        match SmtProc::new(conf.done(), None) {
            Ok(proc) => Some(proc),
            Err(_) => {
                eprintln!("could not find z3, skipping test");
                None
            }
        }
    }

    fn z3() -> Option<SmtProc> {
        z3_with_logic("QF_LIA")
    }

    #[test]
    fn test_check_sat_z3() {
        let Some(mut solver) = z3() else { return };
        let response = solver.check_sat().wrap_err("could not check-sat").unwrap();
        assert_eq!(response, SatResp::Sat);
    }

    #[test]
    fn test_unsat_z3() {
        let Some(mut solver) = z3() else { return };
        solver.send(&parse("(declare-const x Int)").unwrap());
        solver.send(&parse("(assert (and (> x 2) (< x 1)))").unwrap());
        let response = solver.check_sat().wrap_err("could not check-sat").unwrap();
        insta::assert_debug_snapshot!(response, @"Unsat");
    }

    #[test]
    fn test_get_values_z3() {
        let Some(mut solver) = z3() else { return };
        solver.send(&parse("(declare-const |x'| Int)").unwrap());
        solver.send(&parse("(assert (= |x'| (- 3)))").unwrap());
        assert_eq!(solver.check_sat().unwrap(), SatResp::Sat);
        let values = solver.get_values(&[atom_s("x'")]).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].0.atom_s(), Some("x'"));
        assert_eq!(values[0].1.int(), Some(-3));
    }

    #[test]
    fn test_z3_ill_formed() {
        let Some(mut proc) = z3() else { return };
        // unbound symbol
        proc.send(&parse("(assert p)").unwrap());
        let r = proc.check_sat();
        assert!(matches!(r, Err(SolverError::UnexpectedClose(_))), "{r:?}");
    }

    #[test]
    fn test_z3_kill() {
        let Some(mut proc) = z3_with_logic("QF_NIA") else { return };
        let pid = proc.pid();
        // a hard non-linear query that z3 does not finish quickly
        let smt2_file = "
(declare-const a Int)
(declare-const b Int)
(declare-const c Int)
(assert (> a 2))
(assert (> b 2))
(assert (> c 2))
(assert (= (+ (* a a a a a) (* b b b b b)) (* c c c c c)))
"
        .trim();
        for line in smt2_file.lines().filter(|line| !line.is_empty()) {
            proc.send(&parse(line).unwrap());
        }
        let (send, recv) = mpsc::channel();
        thread::spawn(move || {
            let r = proc.check_sat();
            send.send(r).unwrap();
        });
        // wait for check-sat to start
        thread::sleep(Duration::from_millis(50));
        pid.kill();
        match recv.recv().unwrap() {
            Ok(resp) => panic!("check-sat should not succeed, got {resp:?}"),
            Err(err) => assert!(matches!(err, SolverError::Killed), "wrong error {err}"),
        }
    }

    #[test]
    fn test_kill_unresponsive_process() {
        // a process that never answers, so check-sat only returns once killed
        let cmd = SolverCmd {
            cmd: "sleep".to_string(),
            args: vec!["600".to_string()],
            options: vec![],
            logic: "QF_LIA".to_string(),
        };
        let mut proc = SmtProc::new(cmd, None).unwrap();
        let pid = proc.pid();
        let (send, recv) = mpsc::channel();
        thread::spawn(move || {
            let r = proc.check_sat();
            send.send(r).unwrap();
        });
        thread::sleep(Duration::from_millis(50));
        pid.kill();
        assert!(pid.is_killed());
        match recv.recv_timeout(Duration::from_secs(60)).unwrap() {
            Ok(resp) => panic!("check-sat should not succeed, got {resp:?}"),
            Err(err) => assert!(matches!(err, SolverError::Killed), "wrong error {err}"),
        }
    }

    #[test]
    fn test_kill_before_send() {
        let Some(mut proc) = z3() else { return };
        let pid = proc.pid();
        // this kill will just tell the solver to ignore commands until check_sat().
        pid.kill();
        assert!(pid.is_killed());
        proc.send(&parse("(declare-const a Int)").unwrap());
        match proc.check_sat() {
            Ok(_) => panic!("check-sat should not succeed"),
            Err(err) => assert!(matches!(err, SolverError::Killed), "wrong error {err}"),
        }
    }
}
