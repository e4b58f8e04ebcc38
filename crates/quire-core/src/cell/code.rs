//! Code cells: a closure body run against the prior snapshot.

use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;

use super::CellId;
use super::context::{CellOutput, CellRun, ExecutionContext};
use super::script::{self, Operand, ParseError, Script, Statement, Tail, Target, Value};
use crate::error::{Error, Result};
use crate::project::ProjectSnapshot;

/// A cell whose source is the body of `|project, cell, env| { .. }`.
#[derive(Debug, Clone)]
pub struct CodeCell {
    id: CellId,
    source: String,
    script: OnceLock<std::result::Result<Arc<Script>, ParseError>>,
}

impl CodeCell {
    pub fn new(id: CellId, source: impl Into<String>) -> Self {
        Self {
            id,
            source: source.into(),
            script: OnceLock::new(),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Replace the source. The parsed body is dropped and re-parsed on next use.
    pub fn set_source(&mut self, source: String) {
        self.source = source;
        self.script = OnceLock::new();
    }

    /// The parsed body, cached until the source changes.
    pub fn script(&self) -> Result<Arc<Script>> {
        self.script
            .get_or_init(|| script::parse(&self.source).map(Arc::new))
            .clone()
            .map_err(|e| Error::Parse {
                cell: self.id,
                line: e.line,
                message: e.message,
            })
    }

    /// Run the body against `ctx.project`.
    ///
    /// The input snapshot is never touched: mutations go to a fork that is
    /// only created on the first write. A body that changes nothing hands
    /// back the input `Arc` itself.
    pub fn execute(&self, ctx: &ExecutionContext<'_>) -> CellRun {
        let script = match self.script() {
            Ok(script) => script,
            Err(e) => {
                return CellRun {
                    outputs: Vec::new(),
                    result: Err(e),
                };
            }
        };

        let mut interpreter = Interpreter::new(self.id, ctx);
        let result = interpreter.run(&script);
        interpreter.finish(result)
    }
}

struct Interpreter<'a> {
    cell: CellId,
    ctx: &'a ExecutionContext<'a>,
    bindings: FxHashMap<String, Value>,
    draft: Option<ProjectSnapshot>,
    outputs: Vec<CellOutput>,
}

impl<'a> Interpreter<'a> {
    fn new(cell: CellId, ctx: &'a ExecutionContext<'a>) -> Self {
        Self {
            cell,
            ctx,
            bindings: FxHashMap::default(),
            draft: None,
            outputs: Vec::new(),
        }
    }

    fn run(&mut self, script: &Script) -> Result<()> {
        for statement in &script.statements {
            match statement {
                Statement::Let { name, value, line } => {
                    let value = self.resolve(value, *line)?;
                    self.bindings.insert(name.clone(), value);
                }
                Statement::Call {
                    target,
                    method,
                    args,
                    line,
                } => {
                    let args = args
                        .iter()
                        .map(|arg| self.resolve(arg, *line))
                        .collect::<Result<Vec<_>>>()?;
                    self.call(*target, method, &args, *line)?;
                }
                Statement::Panic { message, line } => {
                    return Err(self.runtime(*line, message.clone()));
                }
            }
        }

        match &script.tail {
            Tail::Project => Ok(()),
            Tail::Missing => Err(Error::MalformedResult {
                cell: self.cell,
                message: "the body must end with `project`".to_string(),
            }),
            Tail::Other { description, line } => Err(Error::MalformedResult {
                cell: self.cell,
                message: format!(
                    "line {}: expected `project`, found {}",
                    line, description
                ),
            }),
        }
    }

    /// Publish the draft, or discard it after a failure.
    ///
    /// Only resources created by this run are stopped; the input keeps its own.
    fn finish(self, result: Result<()>) -> CellRun {
        let Interpreter {
            cell,
            ctx,
            draft,
            outputs,
            ..
        } = self;

        let mut keep = ctx.project.resource_ids();
        let result = match (result, draft) {
            (Ok(()), Some(mut draft)) => {
                keep.extend(draft.resource_ids());
                let stopped = draft.stop_retired(&keep);
                if stopped > 0 {
                    tracing::debug!("Stopped {} resources dropped by {}", stopped, cell);
                }
                Ok(Arc::new(draft))
            }
            (Ok(()), None) => Ok(Arc::clone(ctx.project)),
            (Err(e), draft) => {
                if let Some(mut draft) = draft {
                    let stopped = draft.stop_retired(&keep) + draft.stop(&keep);
                    if stopped > 0 {
                        tracing::debug!("Stopped {} resources created by failed {}", stopped, cell);
                    }
                }
                Err(e)
            }
        };

        CellRun { outputs, result }
    }

    fn resolve(&self, operand: &Operand, line: usize) -> Result<Value> {
        match operand {
            Operand::Value(value) => Ok(value.clone()),
            Operand::Binding(name) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| self.runtime(line, format!("unknown binding `{}`", name))),
            Operand::List(items) => items
                .iter()
                .map(|item| self.resolve(item, line))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
        }
    }

    fn call(&mut self, target: Target, method: &str, args: &[Value], line: usize) -> Result<()> {
        let call = Call {
            interpreter_cell: self.cell,
            target,
            method,
            args,
            line,
        };

        match (target, method) {
            (Target::Cell, "emit") => {
                call.arity(1)?;
                self.emit(CellOutput::Value {
                    value: args[0].to_json(),
                });
                Ok(())
            }
            (Target::Env, "install") => {
                call.arity(1)?;
                let toolbox = call.string(0)?;
                if !self.ctx.env.allows(toolbox) {
                    return Err(self.runtime(line, format!("unknown toolbox '{}'", toolbox)));
                }
                if !self.ctx.project.has_toolbox(toolbox) {
                    self.draft().install_toolbox(toolbox);
                }
                Ok(())
            }
            (Target::Project, "add_module") => {
                call.arity(2)?;
                let (id, kind) = (call.string(0)?, call.string(1)?);
                self.mutate(line, |p| p.add_module(id, kind))
            }
            (Target::Project, "remove_module") => {
                call.arity(1)?;
                let id = call.string(0)?;
                self.mutate(line, |p| p.remove_module(id))
            }
            (Target::Project, "connect") => {
                call.arity(2)?;
                let (from, to) = (call.string(0)?, call.string(1)?);
                self.mutate(line, |p| p.connect(from, to))
            }
            (Target::Project, "define_macro") => {
                call.arity(2)?;
                let (id, modules) = (call.string(0)?, call.strings(1)?);
                self.mutate(line, |p| p.define_macro(id, modules))
            }
            (Target::Project, "add_view") => {
                call.arity(2)?;
                let (name, module) = (call.string(0)?, call.string(1)?);
                self.mutate(line, |p| p.add_view(name, module))
            }
            (Target::Project, "spawn_workers") => {
                call.arity(2)?;
                let pool = call.string(0)?;
                let count = call.count(1)?;
                let max = self.ctx.env.max_workers_per_pool();
                self.mutate(line, |p| p.spawn_workers(pool, count, max))
            }
            (Target::Project, "run_worksheet") => {
                call.arity(2)?;
                let (name, modules) = (call.string(0)?, call.strings(1)?);
                self.mutate(line, |p| p.run_worksheet(name, modules))
            }
            _ => Err(self.runtime(
                line,
                format!("`{}` has no method `{}`", target.as_str(), method),
            )),
        }
    }

    /// The snapshot being built, forked from the input on first write.
    fn draft(&mut self) -> &mut ProjectSnapshot {
        let project = self.ctx.project;
        self.draft.get_or_insert_with(|| project.fork())
    }

    fn mutate(
        &mut self,
        line: usize,
        f: impl FnOnce(&mut ProjectSnapshot) -> std::result::Result<(), String>,
    ) -> Result<()> {
        let cell = self.cell;
        f(self.draft()).map_err(|message| Error::Runtime {
            cell,
            line,
            message,
        })
    }

    fn emit(&mut self, output: CellOutput) {
        let max = self.ctx.env.max_outputs();
        if max == 0 {
            return;
        }
        if self.outputs.len() >= max {
            self.outputs.remove(0);
        }
        self.outputs.push(output);
    }

    fn runtime(&self, line: usize, message: impl Into<String>) -> Error {
        Error::Runtime {
            cell: self.cell,
            line,
            message: message.into(),
        }
    }
}

/// Argument checking for a single call.
struct Call<'a> {
    interpreter_cell: CellId,
    target: Target,
    method: &'a str,
    args: &'a [Value],
    line: usize,
}

impl<'a> Call<'a> {
    fn error(&self, message: String) -> Error {
        Error::Runtime {
            cell: self.interpreter_cell,
            line: self.line,
            message: format!("{}.{}: {}", self.target.as_str(), self.method, message),
        }
    }

    fn arity(&self, expected: usize) -> Result<()> {
        if self.args.len() != expected {
            return Err(self.error(format!(
                "expected {} argument(s), got {}",
                expected,
                self.args.len()
            )));
        }
        Ok(())
    }

    fn string(&self, index: usize) -> Result<&'a str> {
        let args: &'a [Value] = self.args;
        match &args[index] {
            Value::Str(s) => Ok(s),
            other => Err(self.error(format!(
                "argument {} must be a string, got {}",
                index + 1,
                other.type_name()
            ))),
        }
    }

    fn count(&self, index: usize) -> Result<usize> {
        match &self.args[index] {
            Value::Int(n) if *n > 0 => Ok(*n as usize),
            Value::Int(n) => Err(self.error(format!("count must be positive, got {}", n))),
            other => Err(self.error(format!(
                "argument {} must be an integer, got {}",
                index + 1,
                other.type_name()
            ))),
        }
    }

    fn strings(&self, index: usize) -> Result<Vec<String>> {
        let Value::List(items) = &self.args[index] else {
            return Err(self.error(format!(
                "argument {} must be a list of strings, got {}",
                index + 1,
                self.args[index].type_name()
            )));
        };
        items
            .iter()
            .map(|item| match item {
                Value::Str(s) => Ok(s.clone()),
                other => Err(self.error(format!(
                    "argument {} must be a list of strings, found {}",
                    index + 1,
                    other
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellEnv;

    fn run(source: &str, project: &Arc<ProjectSnapshot>) -> CellRun {
        let env = CellEnv::default();
        let ctx = ExecutionContext::new(project, &env);
        CodeCell::new(CellId::new(0), source).execute(&ctx)
    }

    #[test]
    fn test_placeholder_returns_input() {
        let empty = Arc::new(ProjectSnapshot::empty());
        let run = run(crate::config::PLACEHOLDER_BODY, &empty);
        assert!(Arc::ptr_eq(&run.result.unwrap(), &empty));
    }

    #[test]
    fn test_builds_new_snapshot() {
        let empty = Arc::new(ProjectSnapshot::empty());
        let source = r#"env.install("std");
let kind = "std/source";
project.add_module("a", kind);
cell.emit(["a"]);
project"#;
        let run = run(source, &empty);

        let snapshot = run.result.unwrap();
        assert!(snapshot.module("a").is_some());
        assert!(empty.module("a").is_none());
        assert_eq!(
            run.outputs,
            vec![CellOutput::Value {
                value: serde_json::json!(["a"])
            }]
        );
    }

    #[test]
    fn test_runtime_error_has_line() {
        let empty = Arc::new(ProjectSnapshot::empty());
        let run = run("cell.emit(1);\nproject.connect(\"a\", \"b\");\nproject", &empty);

        match run.result.unwrap_err() {
            Error::Runtime { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("unknown module"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // Output emitted before the failure is kept
        assert_eq!(run.outputs.len(), 1);
    }

    #[test]
    fn test_failure_stops_created_resources_only() {
        let mut base = ProjectSnapshot::empty();
        base.install_toolbox("std");
        base.add_module("a", "std/source").unwrap();
        let base = Arc::new(base);

        let run = run(
            "project.add_module(\"b\", \"std/sink\");\npanic!(\"boom\");\nproject",
            &base,
        );

        assert!(matches!(run.result, Err(Error::Runtime { .. })));
        assert_eq!(base.pool.running_count(), 1);
    }

    #[test]
    fn test_success_keeps_input_resources_it_dropped() {
        let mut base = ProjectSnapshot::empty();
        base.install_toolbox("std");
        base.add_module("a", "std/source").unwrap();
        base.run_worksheet("ws", vec!["a".into()]).unwrap();
        let base = Arc::new(base);

        let run = run(
            "project.run_worksheet(\"ws\", [\"a\"]);\nproject.remove_module(\"a\");\nproject",
            &base,
        );

        let snapshot = run.result.unwrap();
        assert!(snapshot.module("a").is_none());
        assert!(snapshot.worksheet("ws").unwrap().is_running());
        // The input is still cached; its teardown happens later.
        assert_eq!(base.pool.running_count(), 1);
        assert!(base.worksheet("ws").unwrap().is_running());
    }

    fn base_with_module() -> Arc<ProjectSnapshot> {
        let mut base = ProjectSnapshot::empty();
        base.install_toolbox("std");
        base.add_module("a", "std/source").unwrap();
        Arc::new(base)
    }

    /// Run `first`, hand the draft to `inspect`, then run `rest` and finish.
    fn run_in_two_steps<T>(
        first: &str,
        rest: &str,
        base: &Arc<ProjectSnapshot>,
        inspect: impl FnOnce(&ProjectSnapshot) -> T,
    ) -> (T, CellRun) {
        let env = CellEnv::default();
        let ctx = ExecutionContext::new(base, &env);
        let mut interpreter = Interpreter::new(CellId::new(0), &ctx);

        let first = script::parse(first).unwrap();
        interpreter.run(&first).unwrap();
        let seen = inspect(interpreter.draft.as_ref().unwrap());

        let rest = script::parse(rest).unwrap();
        let result = interpreter.run(&rest);
        (seen, interpreter.finish(result))
    }

    #[test]
    fn test_rerun_worksheet_within_run_stops_first_run() {
        let base = base_with_module();
        let (first, run) = run_in_two_steps(
            "project.run_worksheet(\"ws\", [\"a\"]);\nproject",
            "project.run_worksheet(\"ws\", [\"a\"]);\nproject",
            &base,
            |draft| draft.worksheet("ws").unwrap().pool.resources().to_vec(),
        );

        let snapshot = run.result.unwrap();
        assert!(first.iter().all(|r| !r.is_running()));
        assert!(snapshot.worksheet("ws").unwrap().is_running());
        assert_eq!(base.pool.running_count(), 1);
    }

    #[test]
    fn test_module_added_and_removed_within_run_is_stopped() {
        let base = base_with_module();
        let (module, run) = run_in_two_steps(
            "project.add_module(\"x\", \"std/sink\");\nproject.connect(\"a\", \"x\");\nproject",
            "project.remove_module(\"x\");\nproject",
            &base,
            |draft| draft.pool.resources().to_vec(),
        );

        assert!(run.result.unwrap().module("x").is_none());
        let created: Vec<_> = module.iter().filter(|r| !base.pool.contains(r.id())).collect();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|r| !r.is_running()));
        assert_eq!(base.pool.running_count(), 1);
    }

    #[test]
    fn test_failure_stops_resources_dropped_within_run() {
        let base = base_with_module();
        let (first, run) = run_in_two_steps(
            "project.run_worksheet(\"ws\", [\"a\"]);\nproject",
            "project.run_worksheet(\"ws\", [\"a\"]);\npanic!(\"boom\");\nproject",
            &base,
            |draft| draft.worksheet("ws").unwrap().pool.resources().to_vec(),
        );

        assert!(matches!(run.result, Err(Error::Runtime { .. })));
        assert!(first.iter().all(|r| !r.is_running()));
        assert_eq!(base.pool.running_count(), 1);
    }

    #[test]
    fn test_malformed_result() {
        let empty = Arc::new(ProjectSnapshot::empty());
        let run = run("cell.emit(true);", &empty);
        assert!(matches!(run.result, Err(Error::MalformedResult { .. })));
    }

    #[test]
    fn test_parse_error_is_cached_until_edit() {
        let mut cell = CodeCell::new(CellId::new(3), "project.add_module(");
        assert!(matches!(cell.script(), Err(Error::Parse { .. })));
        assert!(matches!(cell.script(), Err(Error::Parse { .. })));

        cell.set_source("project".to_string());
        assert!(cell.script().is_ok());
    }

    #[test]
    fn test_env_install_respects_catalog() {
        let empty = Arc::new(ProjectSnapshot::empty());
        let env = CellEnv::new(vec!["std".to_string()], 2);
        let ctx = ExecutionContext::new(&empty, &env);

        let run = CodeCell::new(CellId::new(0), "env.install(\"gpu\");\nproject").execute(&ctx);
        assert!(matches!(run.result, Err(Error::Runtime { .. })));
    }

    #[test]
    fn test_output_log_is_bounded() {
        let empty = Arc::new(ProjectSnapshot::empty());
        let env = CellEnv::default().with_max_outputs(2);
        let ctx = ExecutionContext::new(&empty, &env);

        let run = CodeCell::new(
            CellId::new(0),
            "cell.emit(1);\ncell.emit(2);\ncell.emit(3);\nproject",
        )
        .execute(&ctx);

        assert_eq!(
            run.outputs,
            vec![
                CellOutput::Value { value: serde_json::json!(2) },
                CellOutput::Value { value: serde_json::json!(3) },
            ]
        );
    }
}
