//! Hot-update propagation and the wire protocol it feeds.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use crate::module_graph::ModuleGraph;
use crate::utils::{epoch_millis, ext_of, is_script_ext, normalize_file_key, root_relative_url};

/// What the file-watcher collaborator reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Changed,
    Removed,
}

/// Outcome of walking the importer chain from a changed module.
#[derive(Debug, Default)]
pub struct HmrResult {
    pub affected_modules: HashSet<String>,
    pub boundaries: HashSet<String>,
    pub need_full_reload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrPayload {
    Connected,
    Update { updates: Vec<HmrUpdate> },
    FullReload,
    Prune { paths: Vec<String> },
    Error { err: ErrorPayload },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HmrUpdate {
    pub kind: UpdateKind,
    pub changed_path: String,
    pub boundary_path: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    ScriptUpdate,
    StyleUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
    pub stack: String,
}

/// Breadth-first walk up the importer edges from the changed module.
///
/// A self-accepting ancestor absorbs the update and stops its branch; an
/// importer-less ancestor dead-ends it. The update can be applied hot only
/// if every branch found an absorbing boundary, which is exactly the case
/// where the search produced at least one boundary: with zero boundaries
/// the change reached an entry nothing accepts, so the page must reload.
pub fn propagate_update(graph: &mut ModuleGraph, file: &str) -> HmrResult {
    let file_key = normalize_file_key(Path::new(file));

    if graph.module_by_file(&file_key).is_none() {
        let url = root_relative_url(graph.root(), Path::new(&file_key));
        graph.ensure_node(&url, &file_key);
    }

    let mut affected_modules = HashSet::new();
    affected_modules.insert(file_key.clone());
    let mut boundaries = HashSet::new();

    let Some(start) = graph.module_by_file(&file_key) else {
        // Opaque (dependency-directory) path; nothing to absorb it.
        return HmrResult {
            affected_modules,
            boundaries,
            need_full_reload: true,
        };
    };
    if start.is_self_accepting {
        boundaries.insert(file_key.clone());
    }

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(file_key.clone());
    let mut queue = VecDeque::from([file_key.clone()]);

    while let Some(current_key) = queue.pop_front() {
        let Some(current) = graph.module_by_file(&current_key) else {
            continue;
        };

        if current_key != file_key && current.is_self_accepting {
            tracing::debug!("boundary found at {}", current_key);
            boundaries.insert(current_key);
            continue;
        }

        if current.importers.is_empty() {
            tracing::trace!("{} is an entry, branch dead-ends", current_key);
            continue;
        }

        for importer in &current.importers {
            if visited.insert(importer.clone()) {
                queue.push_back(importer.clone());
                affected_modules.insert(importer.clone());
            }
        }
    }

    let need_full_reload = boundaries.is_empty();
    tracing::debug!(
        "propagation from {}: {} affected, {} boundaries, full reload: {}",
        file_key,
        affected_modules.len(),
        boundaries.len(),
        need_full_reload
    );
    HmrResult {
        affected_modules,
        boundaries,
        need_full_reload,
    }
}

/// Classifies a change event and broadcasts the resulting payload.
///
/// Stylesheets and markup are classified before the graph algorithm runs:
/// a stylesheet always maps to a scoped style replacement, a markup entry
/// always forces a full reload. Everything else goes through
/// [`propagate_update`]. A file that vanished between the event and the
/// read is routed to the prune path rather than reported as an error.
pub async fn handle_file_change(
    graph: &Mutex<ModuleGraph>,
    sender: &broadcast::Sender<HmrPayload>,
    event: &ChangeEvent,
) {
    let file_key = normalize_file_key(&event.path);
    let ext = ext_of(&event.path);

    match event.kind {
        ChangeKind::Removed => {
            prune_module(graph, sender, &file_key, &ext).await;
        }
        ChangeKind::Changed => {
            if ext == "html" {
                let _ = sender.send(HmrPayload::FullReload);
                return;
            }

            let code = match tokio::fs::read_to_string(&event.path).await {
                Ok(code) => code,
                Err(err) => {
                    tracing::debug!("{} vanished before read ({}), pruning", file_key, err);
                    prune_module(graph, sender, &file_key, &ext).await;
                    return;
                }
            };

            if ext == "css" {
                let mut g = graph.lock().await;
                let url = g
                    .update_code(&file_key, &code)
                    .map(|node| node.url.clone())
                    .unwrap_or_else(|| root_relative_url(g.root(), Path::new(&file_key)));
                drop(g);
                let _ = sender.send(HmrPayload::Update {
                    updates: vec![HmrUpdate {
                        kind: UpdateKind::StyleUpdate,
                        changed_path: url.clone(),
                        boundary_path: url,
                        timestamp: epoch_millis(),
                    }],
                });
                return;
            }

            if !is_script_ext(&ext) && ext != "vue" {
                // Asset the graph does not model; the page has to re-fetch it.
                let _ = sender.send(HmrPayload::FullReload);
                return;
            }

            let mut g = graph.lock().await;
            if g.update_code(&file_key, &code).is_none() {
                return;
            }
            let result = propagate_update(&mut g, &file_key);
            g.invalidate(result.affected_modules.iter().map(String::as_str));

            let changed_url = g
                .module_by_file(&file_key)
                .map(|node| node.url.clone())
                .unwrap_or_else(|| root_relative_url(g.root(), Path::new(&file_key)));
            let boundary_urls: Vec<String> = result
                .boundaries
                .iter()
                .filter_map(|file| g.module_by_file(file).map(|node| node.url.clone()))
                .collect();
            drop(g);

            if result.need_full_reload {
                let _ = sender.send(HmrPayload::FullReload);
                return;
            }
            let timestamp = epoch_millis();
            let updates = boundary_urls
                .into_iter()
                .map(|boundary_path| HmrUpdate {
                    kind: UpdateKind::ScriptUpdate,
                    changed_path: changed_url.clone(),
                    boundary_path,
                    timestamp,
                })
                .collect();
            let _ = sender.send(HmrPayload::Update { updates });
        }
    }
}

async fn prune_module(
    graph: &Mutex<ModuleGraph>,
    sender: &broadcast::Sender<HmrPayload>,
    file_key: &str,
    ext: &str,
) {
    let mut g = graph.lock().await;
    let url = g
        .module_by_file(file_key)
        .map(|node| node.url.clone())
        .unwrap_or_else(|| root_relative_url(g.root(), Path::new(file_key)));
    g.delete_node(file_key);
    drop(g);

    if ext == "html" {
        let _ = sender.send(HmrPayload::FullReload);
    } else {
        let _ = sender.send(HmrPayload::Prune { paths: vec![url] });
    }
}
