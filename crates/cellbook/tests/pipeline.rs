//! End-to-end tests of compile, execute and mount through the public API.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde_json::json;

use cellbook::{
    CompilationRequest, Element, Engine, ErrorKind, HtmlRenderer, Language, LogLevel, Node,
    ResourceLimits,
};

fn request(source: &str, language: Language) -> CompilationRequest {
    CompilationRequest::new(source, language)
}

// ==== Console Capture ====

#[tokio::test]
async fn console_entries_keep_order_level_and_arity() {
    let engine = Engine::new();
    let output = engine
        .run(&request(
            "console.log('a', 1, true);\nconsole.warn();\nconsole.error({ x: [1, null] });\nconsole.debug(undefined);",
            Language::JavaScript,
        ))
        .await;

    let execution = output.execution.unwrap();
    assert!(execution.success);
    let levels: Vec<_> = execution.console_entries.iter().map(|e| e.level).collect();
    assert_eq!(
        levels,
        [LogLevel::Log, LogLevel::Warn, LogLevel::Error, LogLevel::Debug]
    );
    assert_eq!(
        execution.console_entries[0].args,
        [json!("a"), json!(1), json!(true)]
    );
    assert!(execution.console_entries[1].args.is_empty());
    assert_eq!(execution.console_entries[2].args, [json!({"x": [1, null]})]);
    assert_eq!(execution.console_entries[3].args, [json!(null)]);
}

#[tokio::test]
async fn thrown_error_keeps_earlier_output() {
    let engine = Engine::new();
    let output = engine
        .run(&request(
            "console.log('before');\nthrow new TypeError('bad input');\nconsole.log('after');",
            Language::TypeScript,
        ))
        .await;

    assert!(output.compilation.success());
    let execution = output.execution.unwrap();
    assert!(!execution.success);
    assert_eq!(execution.error_kind, Some(ErrorKind::Execution));
    assert_eq!(execution.error_message.as_deref(), Some("bad input"));
    assert_eq!(execution.console_entries.len(), 1);
    assert_eq!(execution.console_entries[0].message(), "before");
}

#[tokio::test]
async fn runaway_loop_is_stopped() {
    let limits = ResourceLimits {
        max_loop_iterations: 10_000,
        ..ResourceLimits::default()
    };
    let engine = Engine::builder().limits(limits).build();
    let output = engine
        .run(&request("console.log('start');\nwhile (true) {}", Language::JavaScript))
        .await;

    let execution = output.execution.unwrap();
    assert!(!execution.success);
    assert_eq!(execution.error_kind, Some(ErrorKind::Execution));
    assert_eq!(execution.console_entries.len(), 1);
}

#[tokio::test]
async fn class_fields_run() {
    let engine = Engine::new();
    let output = engine
        .run(&request(
            "class C { x = 1 }\nconsole.log(new C().x);",
            Language::JavaScript,
        ))
        .await;

    assert!(output.success(), "{:?}", output.error_message());
    let execution = output.execution.unwrap();
    assert_eq!(execution.console_entries[0].args, [json!(1)]);
}

#[tokio::test]
async fn deep_console_values_keep_earlier_entries() {
    let engine = Engine::new();
    let output = engine
        .run(&request(
            "console.log('before');\n\
             let v: unknown = 0;\n\
             for (let i = 0; i < 200; i++) v = [v];\n\
             console.log(v);",
            Language::TypeScript,
        ))
        .await;

    let execution = output.execution.unwrap();
    assert!(execution.success, "{:?}", execution.error_message);
    assert_eq!(execution.console_entries.len(), 2);
    assert_eq!(execution.console_entries[0].message(), "before");
}

// ==== Compilation ====

#[tokio::test]
async fn unbalanced_braces_fail_for_every_language() {
    let engine = Engine::new();
    for language in Language::ALL {
        let output = engine
            .run(&request("function f() {\n  return 1;\n", language))
            .await;

        assert!(!output.success(), "{language}");
        assert!(output.execution.is_none(), "{language}");
        assert_eq!(output.error_kind(), Some(ErrorKind::Compilation), "{language}");
        assert!(output.compilation.compiled_code().is_empty());
    }
}

#[tokio::test]
async fn compilation_is_idempotent() {
    let engine = Engine::new();
    let source = "type N = number;\nconst double = (n: N): N => n * 2;\nconsole.log(double(21));";
    let first = engine.compile(&request(source, Language::TypeScript)).await;
    let second = engine.compile(&request(source, Language::TypeScript)).await;

    assert_eq!(first, second);
    assert!(!first.compiled_code().contains(": N"));
}

#[tokio::test]
async fn deeply_nested_source_is_a_compilation_error() {
    let engine = Engine::new();
    let source = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
    let output = engine.run(&request(&source, Language::TypeScript)).await;

    assert!(!output.success());
    assert!(output.execution.is_none());
    assert_eq!(output.error_kind(), Some(ErrorKind::Compilation));
}

#[tokio::test]
async fn jsx_is_rejected_in_plain_javascript() {
    let engine = Engine::new();
    let output = engine.run(&request("render(<div />)", Language::JavaScript)).await;

    assert_eq!(output.error_kind(), Some(ErrorKind::Compilation));
}

// ==== UI Cells ====

#[tokio::test]
async fn react_typescript_component_round_trip() {
    let engine = Engine::new();
    let output = engine
        .run(&request(
            "interface Props { title: string }\n\
             function App({ title }: Props) {\n  return <h1>{title}</h1>;\n}\n\
             render(<App title=\"Hello\" />);",
            Language::ReactTypeScript,
        ))
        .await;

    assert!(output.success(), "{:?}", output.error_message());
    let element = output.execution.unwrap().produced_element.unwrap();
    assert_eq!(element, Element::new("h1").with_child("Hello"));
    assert_eq!(element.children, [Node::Text("Hello".into())]);
}

#[tokio::test]
async fn default_export_component_is_instantiated() {
    let engine = Engine::new();
    let output = engine
        .run(&request(
            "const Greeting = ({ name = 'world' }) => <p className=\"greet\">Hi, {name}!</p>;\nexport default Greeting;",
            Language::React,
        ))
        .await;

    let execution = output.execution.unwrap();
    assert!(execution.success, "{:?}", execution.error_message);
    assert!(execution.return_value.is_none());
    let element = execution.produced_element.unwrap();
    assert_eq!(element.tag, "p");
    assert_eq!(element.props["className"], json!("greet"));
    assert_eq!(element.text_content(), "Hi, world!");
}

#[tokio::test]
async fn typescript_class_component_with_state() {
    let engine = Engine::new();
    let output = engine
        .run(&request(
            "type Props = { start: number };\n\
             class Counter extends React.Component<Props> {\n  \
               state = { count: this.props.start };\n  \
               private label: string = 'count';\n  \
               render() {\n    \
                 return <p>{this.label}: {this.state.count}</p>;\n  \
               }\n\
             }\n\
             render(<Counter start={7} />);",
            Language::ReactTypeScript,
        ))
        .await;

    assert!(output.success(), "{:?}", output.error_message());
    let element = output.execution.unwrap().produced_element.unwrap();
    assert_eq!(element.tag, "p");
    assert_eq!(element.text_content(), "count: 7");
}

#[tokio::test]
async fn deep_element_tree_is_produced() {
    let engine = Engine::new();
    let output = engine
        .run(&request(
            "let e = React.createElement('span', null, 'x');\n\
             for (let i = 0; i < 100; i++) e = React.createElement('div', null, e);\n\
             render(e);",
            Language::React,
        ))
        .await;

    assert!(output.success(), "{:?}", output.error_message());
    let element = output.execution.unwrap().produced_element.unwrap();
    assert_eq!(element.text_content(), "x");
}

#[tokio::test]
async fn invalid_child_is_a_mount_error() {
    let engine = Engine::new();
    let output = engine
        .run(&request("render(<div>{{ a: 1 }}</div>)", Language::React))
        .await;

    let execution = output.execution.unwrap();
    assert!(!execution.success);
    assert_eq!(execution.error_kind, Some(ErrorKind::Mount));
    assert!(execution.produced_element.is_none());
}

#[tokio::test]
async fn mount_renders_into_the_named_container() {
    let renderer = Arc::new(HtmlRenderer::with_containers(["out"]));
    let engine = Engine::builder().renderer(renderer.clone()).build();
    let output = engine
        .run(&request(
            "const items: string[] = ['x', 'y'];\n\
             render(<>\n  <h2>List</h2>\n  <ul>{items.map(i => <li key={i}>{i}</li>)}</ul>\n</>);",
            Language::ReactTypeScript,
        ))
        .await;
    let execution = output.execution.unwrap();

    let mounted = engine.mount(&execution, "out");
    assert!(mounted.success, "{:?}", mounted.error_message);
    assert_eq!(
        renderer.html("out").as_deref(),
        Some("<h2>List</h2><ul><li>x</li><li>y</li></ul>")
    );

    let elsewhere = engine.mount(&execution, "missing");
    assert!(!elsewhere.success);
    assert_eq!(elsewhere.error_kind, Some(ErrorKind::Mount));
}
