//! End-to-end tests for `{{#with}}` through the template host
//!
//! Each test renders a template against a live store, then checks output,
//! diagnostics and watcher bookkeeping.

use std::sync::Arc;

use scopebind::{
    DeprecationPolicy, DiagnosticKind, DiagnosticLog, Env, RenderConfig, RenderedTemplate, ScopeError, Store,
};
use serde_json::{json, Map, Value};

fn env_with_log() -> (Env, DiagnosticLog) {
    let log = DiagnosticLog::new();
    let env = Env::default().with_diagnostics(Arc::new(log.clone()));
    (env, log)
}

fn render(env: &Env, source: &str, store: &Store) -> RenderedTemplate {
    env.render_str(source, store).unwrap()
}

// ============================================================================
// Keyword form
// ============================================================================

#[test]
fn test_alias_renders_source() {
    let (env, log) = env_with_log();
    let store = Store::new(json!({"post": {"title": "Hi"}}));
    let rendered = render(&env, "{{#with post as p}}{{p.title}}{{/with}}", &store);

    assert_eq!(rendered.html().unwrap(), "Hi");
    assert!(log.is_empty());
}

#[test]
fn test_alias_keeps_outer_context() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"title": "Root", "post": {"title": "Hi"}}));
    let rendered = render(&env, "{{#with post as p}}{{title}}/{{p.title}}{{/with}}", &store);

    assert_eq!(rendered.html().unwrap(), "Root/Hi");
}

#[test]
fn test_alias_not_visible_outside_block() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"post": {"title": "Hi"}}));
    let rendered = render(&env, "{{#with post as p}}{{p.title}}{{/with}}[{{p.title}}]", &store);

    assert_eq!(rendered.html().unwrap(), "Hi[]");
}

#[test]
fn test_empty_list_exists() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"emptyList": []}));
    let rendered = render(
        &env,
        "{{#with emptyList as items}}has items{{else}}none{{/with}}",
        &store,
    );

    assert_eq!(rendered.html().unwrap(), "has items");
}

#[test]
fn test_null_without_else_renders_nothing() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"maybeNone": null}));
    let rendered = render(&env, "{{#with maybeNone as x}}A{{/with}}", &store);

    assert_eq!(rendered.html().unwrap(), "");
}

#[test]
fn test_null_with_else_renders_inverse() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"name": "Ada"}));
    let rendered = render(
        &env,
        "{{#with missing as x}}A{{else}}no {{name}}{{/with}}",
        &store,
    );

    assert_eq!(rendered.html().unwrap(), "no Ada");
}

#[test]
fn test_literal_alias() {
    let (env, _log) = env_with_log();
    let store = Store::default();
    let rendered = render(&env, "{{#with \"hello\" as greeting}}{{greeting}}{{/with}}", &store);

    assert_eq!(rendered.html().unwrap(), "hello");
}

#[test]
fn test_literal_alias_containing_close_delimiter() {
    let (env, _log) = env_with_log();
    let store = Store::default();
    let rendered = render(&env, "{{#with \"a}}b\" as x}}[{{x}}]{{/with}}", &store);

    assert_eq!(rendered.html().unwrap(), "[a}}b]");
}

#[test]
fn test_nested_aliases() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"a": "A", "b": "B"}));
    let rendered = render(
        &env,
        "{{#with a as x}}{{#with b as y}}{{x}}{{y}}{{/with}}{{/with}}",
        &store,
    );

    assert_eq!(rendered.html().unwrap(), "AB");
}

#[test]
fn test_shadowed_alias_is_reported_as_info() {
    let (env, log) = env_with_log();
    let store = Store::new(json!({"a": "A", "b": "B"}));
    let rendered = render(
        &env,
        "{{#with a as x}}{{#with b as x}}{{x}}{{/with}}{{x}}{{/with}}",
        &store,
    );

    assert_eq!(rendered.html().unwrap(), "BA");
    assert_eq!(log.len(), 1);
    assert!(log.warnings().is_empty());
    assert!(matches!(
        &log.diagnostics()[0].kind,
        DiagnosticKind::KeywordShadowed { alias, .. } if alias == "x"
    ));
}

#[test]
fn test_self_named_alias_resolves_source_first() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"foo": {"bar": "deep"}}));
    let rendered = render(&env, "{{#with foo.bar as foo}}{{foo}}{{/with}}", &store);

    assert_eq!(rendered.html().unwrap(), "deep");
}

// ============================================================================
// Legacy context switch
// ============================================================================

#[test]
fn test_legacy_form_switches_context_and_warns_once() {
    let (env, log) = env_with_log();
    let store = Store::new(json!({"user": {"name": "Ada"}, "name": "Root"}));
    let rendered = render(&env, "{{#with user}}{{name}}{{/with}}", &store);

    assert_eq!(rendered.html().unwrap(), "Ada");
    let deprecations = log.deprecations();
    assert_eq!(deprecations.len(), 1);
    assert!(deprecations[0].kind.message().contains("context switching form"));
    assert_eq!(deprecations[0].kind.helper(), "with");

    // body re-render does not re-invoke the helper
    store.set("user.name", json!("Grace")).unwrap();
    assert!(rendered.flush().unwrap() >= 1);
    assert_eq!(rendered.html().unwrap(), "Grace");
    assert_eq!(log.deprecations().len(), 1);
}

#[test]
fn test_legacy_form_this_refers_to_new_context() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"user": {"name": "Ada"}}));
    let rendered = render(&env, "{{#with user}}{{this.name}}{{/with}}", &store);

    assert_eq!(rendered.html().unwrap(), "Ada");
}

#[test]
fn test_legacy_form_inherits_outer_aliases() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"post": {"title": "Hi"}, "user": {"name": "Ada"}}));
    let rendered = render(
        &env,
        "{{#with post as p}}{{#with user}}{{name}}: {{p.title}}{{/with}}{{/with}}",
        &store,
    );

    assert_eq!(rendered.html().unwrap(), "Ada: Hi");
}

#[test]
fn test_raise_policy_turns_deprecation_into_error() {
    let store = Store::new(json!({"user": {"name": "Ada"}}));
    let env = Env::new(RenderConfig {
        deprecations: DeprecationPolicy::Raise,
        ..RenderConfig::default()
    });

    let err = env.render_str("{{#with user}}{{name}}{{/with}}", &store).unwrap_err();
    assert!(matches!(err, ScopeError::Deprecated { .. }));
    assert_eq!(err.code(), Some("SB-005"));

    // keyword form is unaffected
    let rendered = render(&env, "{{#with user as u}}{{u.name}}{{/with}}", &store);
    assert_eq!(rendered.html().unwrap(), "Ada");
}

#[test]
fn test_silence_policy_emits_nothing() {
    let log = DiagnosticLog::new();
    let env = Env::new(RenderConfig {
        deprecations: DeprecationPolicy::Silence,
        ..RenderConfig::default()
    })
    .with_diagnostics(Arc::new(log.clone()));
    let store = Store::new(json!({"user": {"name": "Ada"}}));
    let rendered = render(&env, "{{#with user}}{{name}}{{/with}}", &store);

    assert_eq!(rendered.html().unwrap(), "Ada");
    assert!(log.is_empty());
}

// ============================================================================
// Reactivity and teardown
// ============================================================================

#[test]
fn test_rerenders_when_source_changes() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"post": {"title": "Hi"}}));
    let rendered = render(&env, "<h1>{{#with post as p}}{{p.title}}{{/with}}</h1>", &store);
    assert_eq!(rendered.html().unwrap(), "<h1>Hi</h1>");

    store.set("post.title", json!("Bye")).unwrap();
    assert!(rendered.is_dirty());
    assert!(rendered.flush().unwrap() >= 1);
    assert_eq!(rendered.html().unwrap(), "<h1>Bye</h1>");
}

#[test]
fn test_switches_branch_when_value_appears() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"maybe": null}));
    let rendered = render(&env, "{{#with maybe as m}}got {{m.v}}{{else}}waiting{{/with}}", &store);
    assert_eq!(rendered.html().unwrap(), "waiting");

    store.set("maybe", json!({"v": 1})).unwrap();
    assert_eq!(rendered.html().unwrap(), "got 1");

    store.set("maybe", Value::Null).unwrap();
    assert_eq!(rendered.html().unwrap(), "waiting");
}

#[test]
fn test_rerender_replaces_child_subscriptions() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"post": {"title": "Hi"}}));
    let rendered = render(&env, "{{#with post as p}}{{p.title}}{{/with}}", &store);
    assert_eq!(store.watcher_count(), 2);
    assert_eq!(rendered.block_count(), 2);

    store.set("post", json!({"title": "New"})).unwrap();
    assert_eq!(rendered.html().unwrap(), "New");
    assert_eq!(store.watcher_count(), 2);
}

#[test]
fn test_failed_rerender_stays_dirty() {
    let store = Store::new(json!({"x": 1, "user": {"name": "Ada"}}));
    let env = Env::new(RenderConfig {
        deprecations: DeprecationPolicy::Raise,
        ..RenderConfig::default()
    });
    let rendered = render(
        &env,
        "{{#with x as y}}present{{else}}{{#with user}}{{name}}{{/with}}{{/with}}",
        &store,
    );
    assert_eq!(rendered.html().unwrap(), "present");

    store.set("x", Value::Null).unwrap();
    let err = rendered.flush().unwrap_err();
    assert_eq!(err.code(), Some("SB-005"));

    // the block still owes a re-render
    assert!(rendered.is_dirty());
    assert!(rendered.flush().is_err());
    assert!(rendered.html().is_err());

    store.set("x", json!(2)).unwrap();
    assert_eq!(rendered.flush().unwrap(), 1);
    assert!(!rendered.is_dirty());
    assert_eq!(rendered.html().unwrap(), "present");
}

#[test]
fn test_unrelated_change_does_not_rerender() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"post": {"title": "Hi"}, "other": 1}));
    let rendered = render(&env, "{{#with post as p}}{{p.title}}{{/with}}", &store);
    rendered.html().unwrap();

    store.set("other", json!(2)).unwrap();
    assert!(!rendered.is_dirty());
    assert_eq!(rendered.flush().unwrap(), 0);
}

#[test]
fn test_teardown_releases_all_watchers() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"post": {"title": "Hi"}, "user": {"name": "Ada"}}));
    let rendered = render(
        &env,
        "{{#with post as p}}{{p.title}}{{#with user}}{{name}}{{/with}}{{/with}}",
        &store,
    );
    assert!(store.watcher_count() > 0);

    drop(rendered);
    assert_eq!(store.watcher_count(), 0);
}

// ============================================================================
// Controllers
// ============================================================================

fn shout_controller(model: &Value) -> Map<String, Value> {
    let mut props = Map::new();
    let title = model["title"].as_str().unwrap_or_default().to_uppercase();
    props.insert("shout".to_string(), json!(title));
    props
}

#[test]
fn test_controller_wraps_alias() {
    let env = Env::default().with_controller("postCtrl", shout_controller);
    let store = Store::new(json!({"post": {"title": "hi"}}));
    let rendered = render(
        &env,
        "{{#with post as p controller='postCtrl'}}{{p.shout}} {{p.title}} {{p.model.title}}{{/with}}",
        &store,
    );
    assert_eq!(rendered.html().unwrap(), "HI hi hi");

    store.set("post.title", json!("bye")).unwrap();
    assert_eq!(rendered.html().unwrap(), "BYE bye bye");
}

#[test]
fn test_controller_wraps_legacy_context() {
    let env = Env::new(RenderConfig {
        deprecations: DeprecationPolicy::Silence,
        ..RenderConfig::default()
    })
    .with_controller("postCtrl", shout_controller);
    let store = Store::new(json!({"post": {"title": "hi"}}));
    let rendered = render(&env, "{{#with post controller=\"postCtrl\"}}{{shout}}{{/with}}", &store);

    assert_eq!(rendered.html().unwrap(), "HI");
}

#[test]
fn test_unknown_controller_is_an_error() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"post": {}}));
    let err = env
        .render_str("{{#with post as p controller='nope'}}x{{/with}}", &store)
        .unwrap_err();

    assert_eq!(err.to_string(), "SB-020: Unknown controller 'nope'");
    assert_eq!(store.watcher_count(), 0);
}

// ============================================================================
// Argument errors
// ============================================================================

#[test]
fn test_wrong_arity() {
    let (env, _log) = env_with_log();
    let store = Store::default();

    for source in [
        "{{#with}}x{{/with}}",
        "{{#with a b}}x{{/with}}",
        "{{#with a as b c}}x{{/with}}",
        "{{#with a to b}}x{{/with}}",
    ] {
        let err = env.render_str(source, &store).unwrap_err();
        assert!(matches!(err, ScopeError::WrongArity { .. }), "{source}: {err}");
        assert!(err
            .to_string()
            .contains("must be called with a single argument or use the `as` syntax"));
    }
}

#[test]
fn test_missing_block_regardless_of_arguments() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"post": {}}));

    for source in ["{{with post}}", "{{with post as p}}", "{{with a b}}"] {
        let err = env.render_str(source, &store).unwrap_err();
        assert_eq!(
            err.to_string(),
            "SB-002: The {{#with}} helper must be called with a block",
            "{source}"
        );
    }
}

#[test]
fn test_dotted_alias_rejected() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"post": {}}));
    let err = env
        .render_str("{{#with post as p.q}}x{{/with}}", &store)
        .unwrap_err();

    assert!(matches!(err, ScopeError::InvalidAlias { alias } if alias == "p.q"));
}

#[test]
fn test_literal_context_switch_unsupported() {
    let (env, _log) = env_with_log();
    let store = Store::default();
    let err = env.render_str("{{#with 42}}x{{/with}}", &store).unwrap_err();

    assert_eq!(err.code(), Some("SB-003"));
}

// ============================================================================
// with vs if
// ============================================================================

#[test]
fn test_existence_differs_from_truthiness() {
    let (env, _log) = env_with_log();
    let store = Store::new(json!({"n": 0, "list": []}));
    let rendered = render(
        &env,
        "{{#if n}}y{{else}}n{{/if}}{{#with n as v}}y{{else}}n{{/with}}|{{#if list}}y{{else}}n{{/if}}{{#with list as l}}y{{else}}n{{/with}}",
        &store,
    );

    assert_eq!(rendered.html().unwrap(), "ny|ny");
}
