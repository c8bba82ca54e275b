//! Run results, GraphML violation witnesses and coverage reports.

use std::fmt;
use std::fs;
use std::path::Path;

use bmcheck_ir::program::{Program, SourceLocation};
use indexmap::IndexMap;
use serde::Serialize;

use crate::equation::{Equation, StepKind};
use crate::error::CheckerError;
use crate::postprocess::PostprocessStats;
use crate::properties::{PropertyRegistry, PropertyStatus};
use crate::symex::ExecutionReport;
use crate::trace::{ConcreteValue, Trace, TraceEventKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyVerdict {
    pub id: String,
    pub description: String,
    pub location: SourceLocation,
    pub status: PropertyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "VERIFICATION SUCCESSFUL"),
            Verdict::Fail => write!(f, "VERIFICATION FAILED"),
            Verdict::Error => write!(f, "VERIFICATION ERROR"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub verdicts: Vec<PropertyVerdict>,
    pub traces: Vec<Trace>,
    pub solver_seconds: f64,
    pub rounds: usize,
    pub equation_steps: usize,
    /// Loop bound the PASS verdicts are relative to, when one applies.
    pub bound: Option<u32>,
    pub postprocess: PostprocessStats,
    pub execution: ExecutionReport,
}

impl CheckReport {
    pub(crate) fn verdicts_from(registry: &PropertyRegistry) -> Vec<PropertyVerdict> {
        registry
            .iter()
            .map(|(id, info)| PropertyVerdict {
                id: id.to_string(),
                description: info.description.clone(),
                location: info.location.clone(),
                status: info.status,
                reason: info.reason.clone(),
            })
            .collect()
    }

    pub fn status_of(&self, id: &str) -> Option<PropertyStatus> {
        self.verdicts.iter().find(|v| v.id == id).map(|v| v.status)
    }

    pub fn trace_for(&self, id: &str) -> Option<&Trace> {
        self.traces.iter().find(|t| t.property == id)
    }

    pub fn count(&self, status: PropertyStatus) -> usize {
        self.verdicts.iter().filter(|v| v.status == status).count()
    }

    /// FAIL wins over ERROR; anything not PASS at the end counts as ERROR.
    pub fn verdict(&self) -> Verdict {
        if self.count(PropertyStatus::Fail) > 0 {
            Verdict::Fail
        } else if self.verdicts.iter().all(|v| v.status == PropertyStatus::Pass) {
            Verdict::Pass
        } else {
            Verdict::Error
        }
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str("** Results:\n");
        for v in &self.verdicts {
            out.push_str(&format!("[{}] {}: {}", v.id, v.description, v.status));
            if let Some(reason) = &v.reason {
                out.push_str(&format!(" ({reason})"));
            }
            out.push('\n');
        }
        out.push_str(&format!(
            "\n** {} of {} failed ({} rounds, {} steps, {:.3}s in solver)\n",
            self.count(PropertyStatus::Fail),
            self.verdicts.len(),
            self.rounds,
            self.equation_steps,
            self.solver_seconds
        ));
        if !self.execution.abandoned_paths.is_empty() {
            out.push_str(&format!(
                "** {} paths abandoned by the complexity limit\n",
                self.execution.abandoned_paths.len()
            ));
        }
        if let Some(bound) = self.bound {
            if self.verdict() == Verdict::Pass {
                out.push_str(&format!("** results hold up to unwinding bound {bound}\n"));
            }
        }
        out.push_str(&format!("{}\n", self.verdict()));
        out
    }
}

fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn is_scalar(value: &ConcreteValue) -> bool {
    !matches!(value, ConcreteValue::Struct(_) | ConcreteValue::Array(_))
}

/// Render `trace` as a GraphML violation witness: one node per event after
/// the entry node, edges annotated with line, thread and assumption.
pub fn graphml_witness(trace: &Trace) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");
    out.push_str("<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n");
    for (id, target, ty) in [
        ("witness-type", "graph", "string"),
        ("entry", "node", "boolean"),
        ("violation", "node", "boolean"),
        ("startline", "edge", "int"),
        ("threadId", "edge", "string"),
        ("assumption", "edge", "string"),
    ] {
        out.push_str(&format!(
            "  <key attr.name=\"{id}\" attr.type=\"{ty}\" for=\"{target}\" id=\"{id}\"/>\n"
        ));
    }
    out.push_str("  <graph edgedefault=\"directed\">\n");
    out.push_str("    <data key=\"witness-type\">violation_witness</data>\n");
    out.push_str("    <node id=\"N0\">\n      <data key=\"entry\">true</data>\n    </node>\n");

    let last = trace.events.len();
    for (n, event) in trace.events.iter().enumerate() {
        let node = n + 1;
        if node == last && event.kind == TraceEventKind::FailedAssertion {
            out.push_str(&format!(
                "    <node id=\"N{node}\">\n      <data key=\"violation\">true</data>\n    </node>\n"
            ));
        } else {
            out.push_str(&format!("    <node id=\"N{node}\"/>\n"));
        }
        out.push_str(&format!(
            "    <edge source=\"N{}\" target=\"N{node}\">\n",
            node - 1
        ));
        out.push_str(&format!(
            "      <data key=\"startline\">{}</data>\n",
            event.location.line
        ));
        out.push_str(&format!(
            "      <data key=\"threadId\">{}</data>\n",
            event.thread
        ));
        if let Some((name, value)) = event.value.as_ref().filter(|(_, v)| is_scalar(v)) {
            out.push_str(&format!(
                "      <data key=\"assumption\">{}</data>\n",
                xml_escape(&format!("{name} == {value};"))
            ));
        }
        out.push_str("    </edge>\n");
    }
    out.push_str("  </graph>\n</graphml>\n");
    out
}

pub fn write_graphml(path: &Path, trace: &Trace) -> Result<(), CheckerError> {
    fs::write(path, graphml_witness(trace))?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageEntry {
    pub location: SourceLocation,
    /// Steps generated at this location.
    pub steps: usize,
    /// Of those, steps removed by slicing.
    pub sliced: usize,
    pub abandoned_paths: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnreachedInstruction {
    pub function: String,
    pub pc: usize,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    pub entries: Vec<CoverageEntry>,
    pub unreached: Vec<UnreachedInstruction>,
}

pub fn coverage_report(
    program: &Program,
    equation: &Equation,
    execution: &ExecutionReport,
) -> CoverageReport {
    let mut entries: IndexMap<SourceLocation, CoverageEntry> = IndexMap::new();
    for step in equation.steps() {
        if matches!(step.kind, StepKind::Constraint { .. }) {
            continue;
        }
        let entry = entries
            .entry(step.location.clone())
            .or_insert_with(|| CoverageEntry {
                location: step.location.clone(),
                ..CoverageEntry::default()
            });
        entry.steps += 1;
        if step.ignored {
            entry.sliced += 1;
        }
    }
    for path in &execution.abandoned_paths {
        entries
            .entry(path.location.clone())
            .or_insert_with(|| CoverageEntry {
                location: path.location.clone(),
                ..CoverageEntry::default()
            })
            .abandoned_paths += 1;
    }

    let mut unreached = Vec::new();
    for function in program.functions.values() {
        for (pc, instruction) in function.instructions().iter().enumerate() {
            if !execution.reached.contains(&(function.name.clone(), pc)) {
                unreached.push(UnreachedInstruction {
                    function: function.name.clone(),
                    pc,
                    location: instruction.location.clone(),
                });
            }
        }
    }
    CoverageReport {
        entries: entries.into_values().collect(),
        unreached,
    }
}

pub fn write_coverage(path: &Path, report: &CoverageReport) -> Result<(), CheckerError> {
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
