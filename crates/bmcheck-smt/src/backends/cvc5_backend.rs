use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};

use thiserror::Error;
use tracing::debug;

use crate::backends::smtlib_printer::{quote_symbol, sort_to_smtlib, to_smtlib};
use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

const LOGIC: &str = "(set-logic QF_ABV)";

#[derive(Debug, Error)]
pub enum Cvc5Error {
    #[error("cvc5 I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cvc5 not found: {0}")]
    NotFound(String),
    #[error("cvc5 error: {0}")]
    SolverError(String),
    #[error("Failed to parse cvc5 output: {0}")]
    ParseError(String),
}

/// cvc5 driven over SMT-LIB2 on stdin/stdout.
pub struct Cvc5Solver {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: BufReader<ChildStderr>,
    vars: HashMap<String, SmtSort>,
    has_model: bool,
}

impl Cvc5Solver {
    pub fn new() -> Result<Self, Cvc5Error> {
        Self::with_command_and_timeout("cvc5", None)
    }

    /// A timeout of 0 means no limit.
    pub fn with_timeout_secs(timeout_secs: u64) -> Result<Self, Cvc5Error> {
        let limit = (timeout_secs > 0).then(|| timeout_secs.saturating_mul(1000));
        Self::with_command_and_timeout("cvc5", limit)
    }

    pub fn with_command_and_timeout(cmd: &str, timeout_ms: Option<u64>) -> Result<Self, Cvc5Error> {
        let mut args = vec![
            "--lang".to_string(),
            "smt2".to_string(),
            "--incremental".to_string(),
            "--produce-models".to_string(),
        ];
        if let Some(ms) = timeout_ms {
            args.push(format!("--tlimit-per={ms}"));
        }

        let mut child = Command::new(cmd)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Cvc5Error::NotFound(format!("{cmd}: {e}")))?;

        let stdin = take_pipe(child.stdin.take(), "stdin")?;
        let stdout = take_pipe(child.stdout.take(), "stdout")?;
        let stderr = take_pipe(child.stderr.take(), "stderr")?;

        let mut solver = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr: BufReader::new(stderr),
            vars: HashMap::new(),
            has_model: false,
        };

        solver.send_command_no_response(LOGIC)?;
        Ok(solver)
    }

    fn send_command(&mut self, cmd: &str) -> Result<String, Cvc5Error> {
        debug!(command = cmd, "cvc5 <-");
        writeln!(self.stdin, "{cmd}")?;
        self.stdin.flush()?;

        // A response may span several lines; read until parentheses balance.
        let mut response = String::new();
        loop {
            let mut line = String::new();
            let read = self.stdout.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            response.push_str(&line);
            if paren_balance(&response) <= 0 {
                break;
            }
        }
        if response.trim().is_empty() {
            let mut stderr = String::new();
            let _ = self.stderr.read_line(&mut stderr);
            return Err(Cvc5Error::SolverError(format!(
                "No response from cvc5 for command `{cmd}`. stderr: {}",
                stderr.trim()
            )));
        }
        if response.trim_start().starts_with("(error") {
            return Err(Cvc5Error::SolverError(response.trim().to_string()));
        }
        Ok(response.trim().to_string())
    }

    fn send_command_no_response(&mut self, cmd: &str) -> Result<(), Cvc5Error> {
        debug!(command = cmd, "cvc5 <-");
        writeln!(self.stdin, "{cmd}")?;
        self.stdin.flush()?;
        Ok(())
    }
}

impl Drop for Cvc5Solver {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "(exit)");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

impl SmtSolver for Cvc5Solver {
    type Error = Cvc5Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Cvc5Error> {
        let sort_str = sort_to_smtlib(sort);
        let symbol = quote_symbol(name);
        self.send_command_no_response(&format!("(declare-const {symbol} {sort_str})"))?;
        self.vars.insert(name.to_string(), sort.clone());
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Cvc5Error> {
        self.has_model = false;
        let smt_str = to_smtlib(term);
        self.send_command_no_response(&format!("(assert {smt_str})"))
    }

    fn push(&mut self) -> Result<(), Cvc5Error> {
        self.has_model = false;
        self.send_command_no_response("(push 1)")
    }

    fn pop(&mut self) -> Result<(), Cvc5Error> {
        self.has_model = false;
        self.send_command_no_response("(pop 1)")
    }

    fn check_sat(&mut self) -> Result<SatResult, Cvc5Error> {
        let response = self.send_command("(check-sat)")?;
        self.has_model = response == "sat";
        match response.as_str() {
            "sat" => Ok(SatResult::Sat),
            "unsat" => Ok(SatResult::Unsat),
            "unknown" => Ok(SatResult::Unknown("cvc5 returned unknown".into())),
            other => Err(Cvc5Error::SolverError(other.to_string())),
        }
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Cvc5Error> {
        let result = self.check_sat()?;
        if result != SatResult::Sat {
            return Ok((result, None));
        }

        let mut values = HashMap::new();
        for &(name, _) in var_names {
            if let Some(value) = self.get_value(&SmtTerm::var(name))? {
                values.insert(name.to_string(), value);
            }
        }
        Ok((SatResult::Sat, Some(Model { values })))
    }

    fn get_value(&mut self, term: &SmtTerm) -> Result<Option<ModelValue>, Cvc5Error> {
        if !self.has_model {
            return Ok(None);
        }
        if let SmtTerm::Var(name) = term {
            if matches!(self.vars.get(name), Some(SmtSort::Array(..))) {
                return Ok(None);
            }
        }
        let response = self.send_command(&format!("(get-value ({}))", to_smtlib(term)))?;
        parse_cvc5_value(&response)
            .map(Some)
            .ok_or(Cvc5Error::ParseError(response))
    }

    fn reset(&mut self) -> Result<(), Cvc5Error> {
        self.send_command_no_response("(reset)")?;
        self.send_command_no_response(LOGIC)?;
        self.vars.clear();
        self.has_model = false;
        Ok(())
    }
}

fn take_pipe<T>(pipe: Option<T>, name: &str) -> Result<T, Cvc5Error> {
    pipe.ok_or_else(|| Cvc5Error::SolverError(format!("cvc5 {name} is not piped")))
}

fn paren_balance(text: &str) -> i64 {
    let mut depth = 0i64;
    let mut quoted = false;
    for ch in text.chars() {
        match ch {
            '|' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Parse the value from a `((term value))` response. The value is the last
/// element of the inner pair: `true`, `false`, `#b...`, `#x...` or
/// `(_ bvN W)`.
fn parse_cvc5_value(response: &str) -> Option<ModelValue> {
    let body = response.trim().strip_suffix("))")?.trim_end();
    if let Some(stripped) = body.strip_suffix(')') {
        let start = stripped.rfind("(_ bv")?;
        let mut parts = stripped[start + 5..].split_whitespace();
        let value = parts.next()?.parse::<u64>().ok()?;
        let width = parts.next()?.parse::<u32>().ok()?;
        return Some(ModelValue::BitVec { value, width });
    }
    let token = body.rsplit(|c: char| c.is_whitespace() || c == '(').next()?;
    match token {
        "true" => Some(ModelValue::Bool(true)),
        "false" => Some(ModelValue::Bool(false)),
        t if t.starts_with("#b") => {
            let digits = &t[2..];
            let value = u64::from_str_radix(digits, 2).ok()?;
            Some(ModelValue::BitVec {
                value,
                width: digits.len() as u32,
            })
        }
        t if t.starts_with("#x") => {
            let digits = &t[2..];
            let value = u64::from_str_radix(digits, 16).ok()?;
            Some(ModelValue::BitVec {
                value,
                width: digits.len() as u32 * 4,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cvc5_binary_value() {
        assert_eq!(
            parse_cvc5_value("((x #b00000101))"),
            Some(ModelValue::BitVec { value: 5, width: 8 })
        );
    }

    #[test]
    fn parse_cvc5_hex_and_indexed_values() {
        assert_eq!(
            parse_cvc5_value("((|f#return_value!1| #xff))"),
            Some(ModelValue::BitVec {
                value: 255,
                width: 8
            })
        );
        assert_eq!(
            parse_cvc5_value("(((bvadd x (_ bv1 8)) (_ bv7 8)))"),
            Some(ModelValue::BitVec { value: 7, width: 8 })
        );
    }

    #[test]
    fn parse_cvc5_bool_value() {
        assert_eq!(
            parse_cvc5_value("((b true))"),
            Some(ModelValue::Bool(true))
        );
        assert_eq!(
            parse_cvc5_value("(((and p q) false))"),
            Some(ModelValue::Bool(false))
        );
    }

    #[test]
    fn balance_ignores_quoted_parens() {
        assert_eq!(paren_balance("((|a(| b)"), 1);
        assert_eq!(paren_balance("((x #b1))"), 0);
    }
}
