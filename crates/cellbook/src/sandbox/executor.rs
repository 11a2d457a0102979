//! One-shot JavaScript realm.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::object::builtins::JsFunction;
use boa_engine::{Context, JsResult, JsValue, NativeFunction, Source, js_string};
use boa_gc::{Finalize, Gc, GcRefCell, Trace};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{Bindings, ConsoleEntry, Element, ExecutionResult, ExecutionStats};
use crate::engine::ErrorKind;
use crate::limits::ResourceLimits;

/// Runs the compiled body with the bindings and serializes the outcome.
const DRIVER: &str = include_str!("driver.js");

/// What the driver reports back, as JSON.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Outcome {
    success: bool,
    error: Option<OutcomeError>,
    element: Option<Element>,
    return_value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OutcomeError {
    kind: OutcomeErrorKind,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutcomeErrorKind {
    Execution,
    Mount,
}

/// Console entries as JSON, recorded on the host side while the body runs.
///
/// Nothing in the realm can read or rewrite the sink, and it survives a body
/// stopped by a runtime limit.
#[derive(Debug, Default, Trace, Finalize)]
struct ConsoleSink {
    entries: Vec<String>,
    truncated: bool,
}

type SharedSink = Gc<GcRefCell<ConsoleSink>>;

fn record_console(
    _this: &JsValue,
    args: &[JsValue],
    sink: &SharedSink,
    _context: &mut Context,
) -> JsResult<JsValue> {
    let mut sink = sink.borrow_mut();
    match args.first().and_then(JsValue::as_string) {
        Some(entry) => sink.entries.push(entry.to_std_string_escaped()),
        None => sink.truncated = true,
    }
    Ok(JsValue::undefined())
}

/// A fresh realm holding the allow-listed bindings for exactly one run.
///
/// Nothing survives [`run`](Self::run): the realm is dropped with the
/// context, so consecutive executions cannot observe each other.
pub struct SandboxContext {
    context: Context,
    bindings: Bindings,
    max_console_entries: usize,
}

impl fmt::Debug for SandboxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxContext")
            .field("bindings", &self.bindings)
            .field("max_console_entries", &self.max_console_entries)
            .finish_non_exhaustive()
    }
}

impl SandboxContext {
    /// Create a realm with `limits` applied.
    pub fn new(bindings: Bindings, limits: &ResourceLimits) -> Self {
        let mut context = Context::default();
        let runtime = context.runtime_limits_mut();
        runtime.set_loop_iteration_limit(limits.max_loop_iterations);
        runtime.set_recursion_limit(limits.max_recursion_depth);
        runtime.set_stack_size_limit(limits.max_stack_size);
        Self {
            context,
            bindings,
            max_console_entries: limits.max_console_entries,
        }
    }

    /// The bindings the body will receive.
    pub fn bindings(&self) -> Bindings {
        self.bindings
    }

    /// Run `code` as the body of a function taking the bindings as
    /// parameters, and collect everything it did.
    pub fn run(mut self, code: &str) -> ExecutionResult {
        let started = Instant::now();
        let sink: SharedSink = Gc::new(GcRefCell::new(ConsoleSink::default()));
        let outcome = self.evaluate(code, &sink);

        let (console_entries, truncated) = {
            let sink = sink.borrow();
            let entries = sink
                .entries
                .iter()
                .filter_map(|entry| match decode::<ConsoleEntry>(entry) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping undecodable console entry");
                        None
                    }
                })
                .collect();
            (entries, sink.truncated)
        };

        let mut result = match outcome {
            Ok(outcome) => outcome.into_result(console_entries, truncated),
            Err(message) => {
                tracing::debug!(error = %message, "execution stopped by the engine");
                ExecutionResult {
                    success: false,
                    console_entries,
                    error_message: Some(message),
                    error_kind: Some(ErrorKind::Execution),
                    produced_element: None,
                    return_value: None,
                    truncated,
                    stats: ExecutionStats::default(),
                }
            }
        };
        result.stats.wall_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        result
    }

    fn evaluate(&mut self, code: &str, sink: &SharedSink) -> Result<Outcome, String> {
        let driver = self.function(DRIVER)?;
        // A script-level function expression, so the body gets the same
        // scoping as any top-level script.
        let params = self.bindings.names().join(", ");
        let body = self.function(&format!("(function ({params}) {{\n{code}\n}})"))?;

        let record = FunctionObjectBuilder::new(
            self.context.realm(),
            NativeFunction::from_copy_closure_with_captures(record_console, sink.clone()),
        )
        .name(js_string!("record"))
        .length(1)
        .build();
        let options = json!({
            "react": self.bindings == Bindings::Ui,
            "maxEntries": self.max_console_entries,
        });
        let options = JsValue::from_json(&options, &mut self.context).map_err(|e| e.to_string())?;

        let context = &mut self.context;
        let value = guard(|| {
            driver.call(
                &JsValue::undefined(),
                &[body.into(), options, record.into()],
                context,
            )
        })?;
        let json = as_json_string(&value).ok_or("sandbox driver produced no outcome")?;
        decode(&json).map_err(|e| format!("invalid sandbox outcome: {e}"))
    }

    /// Evaluate a script whose completion value is a function.
    fn function(&mut self, script: &str) -> Result<JsFunction, String> {
        let context = &mut self.context;
        let value = guard(|| context.eval(Source::from_bytes(script)))?;
        value
            .as_callable()
            .and_then(|object| JsFunction::from_object(object.clone()))
            .ok_or_else(|| "script did not evaluate to a function".to_string())
    }
}

/// Run `f` against the engine, turning a thrown value or an engine panic into
/// an error message.
fn guard(f: impl FnOnce() -> JsResult<JsValue>) -> Result<JsValue, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            tracing::error!(%detail, "JavaScript engine panicked");
            Err(format!("internal engine error: {detail}"))
        }
    }
}

/// Decode JSON produced in the realm. Nesting is bounded by the driver, not
/// by the parser.
fn decode<T: DeserializeOwned>(json: &str) -> serde_json::Result<T> {
    let mut deserializer = serde_json::Deserializer::from_str(json);
    deserializer.disable_recursion_limit();
    let value = T::deserialize(&mut deserializer)?;
    deserializer.end()?;
    Ok(value)
}

fn as_json_string(value: &JsValue) -> Option<String> {
    value.as_string().map(|s| s.to_std_string_escaped())
}

impl Outcome {
    fn into_result(self, console_entries: Vec<ConsoleEntry>, truncated: bool) -> ExecutionResult {
        let (error_message, error_kind) = match self.error {
            Some(error) => {
                let kind = match error.kind {
                    OutcomeErrorKind::Execution => ErrorKind::Execution,
                    OutcomeErrorKind::Mount => ErrorKind::Mount,
                };
                (Some(error.message), Some(kind))
            }
            None => (None, None),
        };
        ExecutionResult {
            success: self.success,
            console_entries,
            error_message,
            error_kind,
            produced_element: self.element,
            return_value: self.return_value,
            truncated,
            stats: ExecutionStats::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sandbox::{LogLevel, Node};

    fn run(code: &str) -> ExecutionResult {
        SandboxContext::new(Bindings::Console, &ResourceLimits::default()).run(code)
    }

    fn run_ui(code: &str) -> ExecutionResult {
        SandboxContext::new(Bindings::Ui, &ResourceLimits::default()).run(code)
    }

    // ==== Console Tests ====

    #[test]
    fn test_console_calls_are_recorded_in_order() {
        let result = run("console.log('a', 1); console.warn(true); console.error(null);");

        assert!(result.success);
        let levels: Vec<_> = result.console_entries.iter().map(|e| e.level).collect();
        assert_eq!(levels, [LogLevel::Log, LogLevel::Warn, LogLevel::Error]);
        assert_eq!(result.console_entries[0].args, [json!("a"), json!(1)]);
    }

    #[test]
    fn test_arguments_are_snapshotted() {
        let result = run(
            "const o = { n: 1, f() {}, u: undefined }; o.self = o;\n\
             console.log(o, [NaN, Infinity], undefined); o.n = 2;",
        );

        let args = &result.console_entries[0].args;
        assert_eq!(
            args[0],
            json!({"n": 1, "f": "[Function: f]", "u": null, "self": "[Circular]"})
        );
        assert_eq!(args[1], json!(["NaN", "Infinity"]));
        assert_eq!(args[2], json!(null));
    }

    #[test]
    fn test_deeply_nested_arguments_are_cut() {
        let result = run(
            "console.log('before');\n\
             let v = 0; for (let i = 0; i < 200; i++) v = [v];\n\
             console.log(v);",
        );

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.console_entries.len(), 2);
        assert_eq!(result.console_entries[0].message(), "before");
        let mut depth = 0;
        let mut value = &result.console_entries[1].args[0];
        while let Some(inner) = value.as_array() {
            depth += 1;
            value = &inner[0];
        }
        assert_eq!(depth, 32);
        assert_eq!(value, &json!("[Array]"));
    }

    #[test]
    fn test_console_state_is_not_reachable() {
        let result = run("console.log(typeof __cellbook);\nreturn typeof console.log;");

        assert_eq!(result.console_entries[0].args, [json!("undefined")]);
        assert_eq!(result.return_value, Some(json!("function")));
    }

    #[test]
    fn test_console_entry_cap() {
        let limits = ResourceLimits {
            max_console_entries: 2,
            ..ResourceLimits::default()
        };
        let result = SandboxContext::new(Bindings::Console, &limits)
            .run("for (let i = 0; i < 5; i++) console.log(i);");

        assert!(result.success);
        assert_eq!(result.console_entries.len(), 2);
        assert!(result.truncated);
    }

    // ==== Error Tests ====

    #[test]
    fn test_thrown_error_keeps_earlier_entries() {
        let result = run("console.log('before'); throw new Error('boom'); console.log('after');");

        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("boom"));
        assert_eq!(result.error_kind, Some(ErrorKind::Execution));
        assert_eq!(result.console_entries.len(), 1);
    }

    #[test]
    fn test_syntax_error_in_body() {
        let result = run("console.log('x';");
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Execution));
        assert!(result.console_entries.is_empty());
    }

    #[test]
    fn test_engine_panic_becomes_execution_error() {
        let result = guard(|| panic!("engine bug"));
        assert_eq!(result.unwrap_err(), "internal engine error: engine bug");
    }

    #[test]
    fn test_thrown_non_error_values() {
        assert_eq!(run("throw 'plain';").error_message.as_deref(), Some("plain"));
        assert_eq!(
            run("throw { message: 'shaped' };").error_message.as_deref(),
            Some("shaped")
        );
    }

    #[test]
    fn test_runaway_loop_is_stopped() {
        let limits = ResourceLimits {
            max_loop_iterations: 1000,
            ..ResourceLimits::default()
        };
        let result = SandboxContext::new(Bindings::Console, &limits)
            .run("console.log('start'); while (true) {}");

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Execution));
        assert_eq!(result.console_entries.len(), 1);
    }

    // ==== Binding Tests ====

    #[test]
    fn test_only_console_is_bound_for_plain_code() {
        let result = run("return [typeof console, typeof React, typeof render];");
        assert_eq!(
            result.return_value,
            Some(json!(["object", "undefined", "undefined"]))
        );
    }

    #[test]
    fn test_class_fields() {
        let result = run(
            "class C { x = 1; static y = 2; #z = 3; get z() { return this.#z; } }\n\
             console.log(new C().x, C.y, new C().z);",
        );

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.console_entries[0].args, [json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_realms_are_not_shared() {
        assert!(run("globalThis.leak = 1;").success);
        assert_eq!(run("return typeof leak;").return_value, Some(json!("undefined")));
    }

    // ==== UI Tests ====

    #[test]
    fn test_render_call_produces_element() {
        let result = run_ui(
            "function Title(props) { return React.createElement('h1', { className: 'big' }, props.text); }\n\
             render(React.createElement(Title, { text: 'Hi' }));",
        );

        assert!(result.success, "{:?}", result.error_message);
        let element = result.produced_element.unwrap();
        assert_eq!(element.tag, "h1");
        assert_eq!(element.props.get("className"), Some(&json!("big")));
        assert_eq!(element.children, [Node::Text("Hi".into())]);
    }

    #[test]
    fn test_returned_component_is_instantiated() {
        let result = run_ui(
            "class App extends React.Component {\n\
               render() { const [n] = React.useState(3); return React.createElement(React.Fragment, null, 'n=', n); }\n\
             }\n\
             return App;",
        );

        let element = result.produced_element.unwrap();
        assert!(element.is_fragment());
        assert_eq!(element.text_content(), "n=3");
        assert_eq!(result.return_value, None);
    }

    #[test]
    fn test_deep_element_chain_resolves() {
        let result = run_ui(
            "console.log('start');\n\
             let e = 'leaf';\n\
             for (let i = 0; i < 100; i++) e = React.createElement('div', null, e);\n\
             render(e);",
        );

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.console_entries.len(), 1);
        let mut depth = 0;
        let mut element = result.produced_element.as_ref().unwrap();
        while let Some(Node::Element(child)) = element.children.first() {
            depth += 1;
            element = child;
        }
        assert_eq!(depth, 99);
        assert_eq!(element.text_content(), "leaf");
    }

    #[test]
    fn test_too_deep_element_chain_is_a_mount_error() {
        let result = run_ui(
            "let e = null;\n\
             for (let i = 0; i < 500; i++) e = React.createElement('div', null, e);\n\
             render(e);",
        );

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Mount));
        assert!(result.error_message.unwrap().contains("element depth"));
    }

    #[test]
    fn test_class_component_with_state_field() {
        let result = run_ui(
            "class Counter extends React.Component {\n\
               state = { n: this.props.start * 2 };\n\
               render() { return React.createElement('b', null, this.state.n); }\n\
             }\n\
             render(React.createElement(Counter, { start: 21 }));",
        );

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.produced_element.unwrap().text_content(), "42");
    }

    #[test]
    fn test_invalid_child_is_a_mount_error() {
        let result = run_ui("render(React.createElement('div', null, { a: 1 }));");

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Mount));
        assert!(result.error_message.unwrap().contains("keys {a}"));
    }
}
