mod common;

use std::path::Path;
use std::time::Duration;

use common::Fixture;
use rapide::{ChangeEvent, ChangeKind, HmrPayload, UpdateKind};
use tokio::sync::broadcast;
use tokio::time::timeout;

async fn next_payload(rx: &mut broadcast::Receiver<HmrPayload>) -> HmrPayload {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("expected an hmr payload")
        .expect("broadcast channel closed")
}

fn changed(root: &Path, rel: &str) -> ChangeEvent {
    ChangeEvent {
        path: root.join(rel),
        kind: ChangeKind::Changed,
    }
}

#[tokio::test]
async fn entry_document_gets_the_client_bootstrap() {
    let fixture = Fixture::new().await;
    let app = fixture.server().await;

    let output = app.server().transform_request("/").await.unwrap();
    let html = String::from_utf8(output.body).unwrap();
    assert_eq!(output.content_type, "text/html");
    assert!(html.contains("/@rapide/client"));
    assert!(html.contains("/src/main.js"));
}

#[tokio::test]
async fn script_modules_are_rewritten_and_registered() {
    let fixture = Fixture::new().await;
    let app = fixture.server().await;

    let output = app.server().transform_request("/src/main.js").await.unwrap();
    let code = String::from_utf8(output.body).unwrap();
    assert_eq!(output.content_type, "application/javascript");
    assert!(code.contains("createHotContext(\"/src/main.js\")"));
    assert!(code.contains("\"/src/app.js\""));
    assert!(code.contains("\"/src/style.css?import\""));

    let graph = app.server().graph();
    let graph = graph.lock().await;
    let main = graph.module_by_url("/src/main.js").expect("main registered");
    assert!(main
        .imported_modules
        .iter()
        .any(|file| file.ends_with("src/app.js")));
}

#[tokio::test]
async fn stylesheets_serve_raw_or_as_module_wrapper() {
    let fixture = Fixture::new().await;
    let app = fixture.server().await;

    let raw = app
        .server()
        .transform_request("/src/style.css")
        .await
        .unwrap();
    assert_eq!(raw.content_type, "text/css");
    assert!(String::from_utf8(raw.body).unwrap().contains("margin"));

    let wrapped = app
        .server()
        .transform_request("/src/style.css?import")
        .await
        .unwrap();
    assert_eq!(wrapped.content_type, "application/javascript");
    let code = String::from_utf8(wrapped.body).unwrap();
    assert!(code.contains("updateStyle"));
    assert!(code.contains("import.meta.hot.accept()"));
}

#[tokio::test]
async fn unresolved_requests_are_not_found() {
    let fixture = Fixture::new().await;
    let app = fixture.server().await;
    assert!(app.server().transform_request("/nope.js").await.is_err());
}

#[tokio::test]
async fn bare_imports_resolve_through_the_prebundle_cache() {
    let fixture = Fixture::new().await;
    fixture
        .write_file("src/main.js", "import React from \"react\";")
        .await;
    let app = fixture.server().await;

    let output = app.server().transform_request("/src/main.js").await.unwrap();
    let code = String::from_utf8(output.body).unwrap();
    assert!(code.contains("\"/node_modules/.rapide/react.js\""));

    let manifest = tokio::fs::read_to_string(
        fixture.root().join("node_modules/.rapide/metadata.json"),
    )
    .await
    .unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(
        manifest["dependencies"]["react"],
        "/node_modules/.rapide/react.js"
    );
}

#[tokio::test]
async fn change_in_self_accepting_module_updates_in_place() {
    let fixture = Fixture::new().await;
    let app = fixture.server().await;
    app.server().transform_request("/src/main.js").await.unwrap();
    app.server().transform_request("/src/app.js").await.unwrap();

    let mut rx = app.server().subscribe();
    fixture
        .write_file(
            "src/app.js",
            "export function render() { return 1; }\nimport.meta.hot.accept();",
        )
        .await;
    app.server()
        .on_file_change(&changed(fixture.root(), "src/app.js"))
        .await;

    match next_payload(&mut rx).await {
        HmrPayload::Update { updates } => {
            assert_eq!(updates.len(), 1);
            assert_eq!(updates[0].kind, UpdateKind::ScriptUpdate);
            assert_eq!(updates[0].boundary_path, "/src/app.js");
            assert_eq!(updates[0].changed_path, "/src/app.js");
        }
        other => panic!("expected update, got {:?}", other),
    }
}

#[tokio::test]
async fn change_without_any_boundary_reloads_the_page() {
    let fixture = Fixture::new().await;
    let app = fixture.server().await;
    app.server().transform_request("/src/main.js").await.unwrap();

    let mut rx = app.server().subscribe();
    fixture
        .write_file("src/main.js", "import { render } from \"./app.js\";")
        .await;
    app.server()
        .on_file_change(&changed(fixture.root(), "src/main.js"))
        .await;

    assert_eq!(next_payload(&mut rx).await, HmrPayload::FullReload);
}

#[tokio::test]
async fn stylesheet_changes_never_force_a_reload() {
    let fixture = Fixture::new().await;
    let app = fixture.server().await;
    app.server().transform_request("/src/main.js").await.unwrap();

    let mut rx = app.server().subscribe();
    fixture
        .write_file("src/style.css", "body { margin: 8px; }")
        .await;
    app.server()
        .on_file_change(&changed(fixture.root(), "src/style.css"))
        .await;

    match next_payload(&mut rx).await {
        HmrPayload::Update { updates } => {
            assert_eq!(updates[0].kind, UpdateKind::StyleUpdate);
            assert_eq!(updates[0].boundary_path, "/src/style.css");
        }
        other => panic!("expected style update, got {:?}", other),
    }
}

#[tokio::test]
async fn markup_changes_always_reload() {
    let fixture = Fixture::new().await;
    let app = fixture.server().await;

    let mut rx = app.server().subscribe();
    fixture
        .write_file("index.html", "<html><body>v2</body></html>")
        .await;
    app.server()
        .on_file_change(&changed(fixture.root(), "index.html"))
        .await;

    assert_eq!(next_payload(&mut rx).await, HmrPayload::FullReload);
}

#[tokio::test]
async fn removed_modules_are_pruned_from_graph_and_client() {
    let fixture = Fixture::new().await;
    let app = fixture.server().await;
    app.server().transform_request("/src/main.js").await.unwrap();
    app.server().transform_request("/src/app.js").await.unwrap();

    let mut rx = app.server().subscribe();
    fixture.remove_file("src/app.js").await;
    app.server()
        .on_file_change(&ChangeEvent {
            path: fixture.root().join("src/app.js"),
            kind: ChangeKind::Removed,
        })
        .await;

    match next_payload(&mut rx).await {
        HmrPayload::Prune { paths } => assert_eq!(paths, vec!["/src/app.js".to_string()]),
        other => panic!("expected prune, got {:?}", other),
    }

    let graph = app.server().graph();
    let graph = graph.lock().await;
    assert!(graph.module_by_url("/src/app.js").is_none());
    let main = graph.module_by_url("/src/main.js").unwrap();
    assert!(!main
        .imported_modules
        .iter()
        .any(|file| file.ends_with("src/app.js")));
}

#[tokio::test]
async fn vanished_file_is_treated_as_a_deletion() {
    let fixture = Fixture::new().await;
    let app = fixture.server().await;
    app.server().transform_request("/src/main.js").await.unwrap();
    app.server().transform_request("/src/app.js").await.unwrap();

    let mut rx = app.server().subscribe();
    fixture.remove_file("src/app.js").await;
    // The watcher reported a change, but the file is already gone.
    app.server()
        .on_file_change(&changed(fixture.root(), "src/app.js"))
        .await;

    match next_payload(&mut rx).await {
        HmrPayload::Prune { paths } => assert_eq!(paths, vec!["/src/app.js".to_string()]),
        other => panic!("expected prune, got {:?}", other),
    }
}
