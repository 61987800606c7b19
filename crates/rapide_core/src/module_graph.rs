use std::path::{Path, PathBuf};

use hashbrown::{HashMap, HashSet};

use crate::analyze;
use crate::utils::{
    is_bare_specifier, is_dep_path, normalize_file_key, resolve_specifier, root_relative_url,
    POSSIBLE_EXTENSIONS,
};

/// One served source module. Edges hold file keys; the graph owns every
/// node, so edges never dangle as long as they are severed through the
/// graph's own operations.
#[derive(Debug, Default, Clone)]
pub struct ModuleNode {
    pub url: String,
    pub file: String,
    pub code: Option<String>,
    pub last_updated: u64,
    pub importers: HashSet<String>,
    pub imported_modules: HashSet<String>,
    pub is_self_accepting: bool,
    pub accepted_hmr_deps: HashSet<String>,
    pub accepted_hmr_exports: HashSet<String>,
}

#[derive(Debug)]
pub struct ModuleGraph {
    root: PathBuf,
    /// File key -> node. The authoritative index.
    modules: HashMap<String, ModuleNode>,
    /// Request path -> file key.
    url_to_file: HashMap<String, String>,
    /// Monotonic tick, bumped on every content or invalidation event.
    tick: u64,
}

impl ModuleGraph {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            modules: HashMap::new(),
            url_to_file: HashMap::new(),
            tick: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_by_file(&self, file: &str) -> Option<&ModuleNode> {
        self.modules.get(&normalize_file_key(Path::new(file)))
    }

    pub fn module_by_url(&self, url: &str) -> Option<&ModuleNode> {
        let file = self.url_to_file.get(url)?;
        self.modules.get(file)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.modules.values()
    }

    /// Idempotent lookup-or-create by either key. Dependency-directory files
    /// are never inserted; callers get `None` and must treat them as opaque.
    pub fn ensure_node(&mut self, url: &str, file: &str) -> Option<&ModuleNode> {
        let file_key = normalize_file_key(Path::new(file));
        if is_dep_path(&file_key) {
            tracing::debug!("refusing graph node for dependency file {}", file_key);
            return None;
        }

        if self.modules.contains_key(&file_key) {
            // Same file requested under a new url: the file-keyed node is
            // authoritative, repoint the stale url index entry.
            let node = self.modules.get_mut(&file_key).unwrap();
            if node.url != url {
                tracing::debug!("repointing url index {} -> {}", node.url, url);
                self.url_to_file.remove(&node.url);
                node.url = url.to_string();
                self.url_to_file.insert(url.to_string(), file_key.clone());
            }
            return self.modules.get(&file_key);
        }

        if let Some(old_file) = self.url_to_file.get(url).cloned() {
            if old_file != file_key {
                tracing::debug!("repointing file index {} -> {}", old_file, file_key);
                self.repoint_file_key(&old_file, &file_key);
            }
            return self.modules.get(&file_key);
        }

        self.modules.insert(
            file_key.clone(),
            ModuleNode {
                url: url.to_string(),
                file: file_key.clone(),
                last_updated: self.tick,
                ..Default::default()
            },
        );
        self.url_to_file.insert(url.to_string(), file_key.clone());
        tracing::debug!("new module {} -> {}", url, file_key);
        self.modules.get(&file_key)
    }

    /// Records new source text, clears the previous forward edges (and their
    /// paired back-edges), then re-analyzes imports. The whole operation is
    /// synchronous so it stays atomic with respect to concurrent requests.
    pub fn update_code(&mut self, file: &str, code: &str) -> Option<&ModuleNode> {
        let file_key = normalize_file_key(Path::new(file));
        if !self.modules.contains_key(&file_key) {
            let url = root_relative_url(&self.root, Path::new(&file_key));
            self.ensure_node(&url, &file_key)?;
        }

        self.tick += 1;
        let node = self.modules.get_mut(&file_key)?;
        node.code = Some(code.to_string());
        node.last_updated = self.tick;

        let old_imports = std::mem::take(&mut node.imported_modules);
        for dep in &old_imports {
            if let Some(dep_node) = self.modules.get_mut(dep) {
                dep_node.importers.remove(&file_key);
            }
        }

        self.analyze_imports(&file_key);
        self.modules.get(&file_key)
    }

    /// Removes the node and severs every edge referencing it, symmetrically.
    pub fn delete_node(&mut self, file: &str) {
        let file_key = normalize_file_key(Path::new(file));
        let Some(node) = self.modules.remove(&file_key) else {
            return;
        };
        self.url_to_file.remove(&node.url);
        for dep in &node.imported_modules {
            if let Some(dep_node) = self.modules.get_mut(dep) {
                dep_node.importers.remove(&file_key);
            }
        }
        for importer in &node.importers {
            if let Some(imp_node) = self.modules.get_mut(importer) {
                imp_node.imported_modules.remove(&file_key);
            }
        }
        tracing::debug!("deleted module {}", file_key);
    }

    /// Pure bookkeeping: bumps `last_updated` for the given nodes.
    pub fn invalidate<'a>(&mut self, files: impl IntoIterator<Item = &'a str>) {
        self.tick += 1;
        for file in files {
            let key = normalize_file_key(Path::new(file));
            if let Some(node) = self.modules.get_mut(&key) {
                node.last_updated = self.tick;
            }
        }
    }

    /// Re-parses the node's stored code and links an edge for every
    /// relative/absolute specifier. Bare specifiers resolve through the
    /// pre-bundle cache at serve time and are left out of the graph; so is
    /// anything inside the dependency directory. Resolution here is pure:
    /// extension probing consults the graph's own file index, and unknown
    /// targets become lazy placeholder nodes.
    pub fn analyze_imports(&mut self, file: &str) {
        let file_key = normalize_file_key(Path::new(file));
        let Some(node) = self.modules.get(&file_key) else {
            return;
        };
        let Some(code) = node.code.clone() else {
            return;
        };

        let analysis = match analyze::analyze_module(&code, &file_key) {
            Ok(analysis) => analysis,
            Err(err) => {
                tracing::warn!("import analysis failed for {}: {}", file_key, err);
                let node = self.modules.get_mut(&file_key).unwrap();
                node.is_self_accepting = analyze::has_accept_marker(&code);
                return;
            }
        };

        {
            let node = self.modules.get_mut(&file_key).unwrap();
            node.is_self_accepting = analysis.is_self_accepting;
            node.accepted_hmr_deps = analysis.accepted_deps.clone();
            node.accepted_hmr_exports.clear();
        }

        for import in &analysis.imports {
            if is_bare_specifier(&import.specifier) {
                continue;
            }
            let resolved = resolve_specifier(&self.root, Path::new(&file_key), &import.specifier);
            let resolved_key = normalize_file_key(&resolved);
            if is_dep_path(&resolved_key) {
                continue;
            }

            let dep_key = self.probe_existing(&resolved_key);
            let dep_key = match dep_key {
                Some(existing) => existing,
                None => {
                    let url = root_relative_url(&self.root, Path::new(&resolved_key));
                    match self.ensure_node(&url, &resolved_key) {
                        Some(node) => node.file.clone(),
                        None => continue,
                    }
                }
            };
            if dep_key == file_key {
                continue;
            }

            self.modules
                .get_mut(&file_key)
                .unwrap()
                .imported_modules
                .insert(dep_key.clone());
            self.modules
                .get_mut(&dep_key)
                .unwrap()
                .importers
                .insert(file_key.clone());
            tracing::trace!("linked {} -> {}", file_key, dep_key);
        }
    }

    /// An extension-less resolved path may match an already-known module
    /// under one of the candidate extensions.
    fn probe_existing(&self, resolved_key: &str) -> Option<String> {
        if self.modules.contains_key(resolved_key) {
            return Some(resolved_key.to_string());
        }
        if Path::new(resolved_key).extension().is_some() {
            return None;
        }
        POSSIBLE_EXTENSIONS
            .iter()
            .chain(["vue"].iter())
            .map(|ext| format!("{}.{}", resolved_key, ext))
            .find(|candidate| self.modules.contains_key(candidate))
    }

    /// Moves a node to a new file key, rewriting every edge that referenced
    /// the old key so symmetry survives the move.
    fn repoint_file_key(&mut self, old_key: &str, new_key: &str) {
        let Some(mut node) = self.modules.remove(old_key) else {
            return;
        };
        node.file = new_key.to_string();
        self.url_to_file.insert(node.url.clone(), new_key.to_string());

        let importers = node.importers.clone();
        let imported = node.imported_modules.clone();
        self.modules.insert(new_key.to_string(), node);

        for importer in &importers {
            if let Some(imp_node) = self.modules.get_mut(importer) {
                imp_node.imported_modules.remove(old_key);
                imp_node.imported_modules.insert(new_key.to_string());
            }
        }
        for dep in &imported {
            if let Some(dep_node) = self.modules.get_mut(dep) {
                dep_node.importers.remove(old_key);
                dep_node.importers.insert(new_key.to_string());
            }
        }
    }

    /// Debug-only consistency sweep used by the test-suite: both indices
    /// agree and every edge has its mirror.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (url, file) in &self.url_to_file {
            let node = self.modules.get(file).expect("url index points at a live node");
            assert_eq!(&node.url, url);
            assert_eq!(&node.file, file);
        }
        for (file, node) in &self.modules {
            assert_eq!(self.url_to_file.get(&node.url), Some(file));
            for dep in &node.imported_modules {
                let dep_node = self.modules.get(dep).expect("forward edge target exists");
                assert!(dep_node.importers.contains(file), "back-edge missing");
            }
            for importer in &node.importers {
                let imp_node = self.modules.get(importer).expect("back-edge target exists");
                assert!(
                    imp_node.imported_modules.contains(file),
                    "forward edge missing"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph() -> ModuleGraph {
        ModuleGraph::new("/proj")
    }

    #[test]
    fn ensure_node_is_idempotent() {
        let mut g = graph();
        g.ensure_node("/src/main.js", "/proj/src/main.js").unwrap();
        g.ensure_node("/src/main.js", "/proj/src/main.js").unwrap();
        assert_eq!(g.len(), 1);
        g.assert_consistent();
    }

    #[test]
    fn lookup_by_either_key_yields_the_same_node() {
        let mut g = graph();
        g.ensure_node("/src/main.js", "/proj/src/main.js").unwrap();
        let by_url = g.module_by_url("/src/main.js").unwrap().file.clone();
        let by_file = g.module_by_file("/proj/src/main.js").unwrap().file.clone();
        assert_eq!(by_url, by_file);
    }

    #[test]
    fn dependency_files_are_never_inserted() {
        let mut g = graph();
        assert!(g
            .ensure_node("/node_modules/react/index.js", "/proj/node_modules/react/index.js")
            .is_none());
        assert!(g.is_empty());
    }

    #[test]
    fn url_repoint_keeps_indices_consistent() {
        let mut g = graph();
        g.ensure_node("/src/main.js", "/proj/src/main.js").unwrap();
        g.ensure_node("/src/main.js?t=123", "/proj/src/main.js").unwrap();
        assert_eq!(g.len(), 1);
        assert!(g.module_by_url("/src/main.js").is_none());
        assert!(g.module_by_url("/src/main.js?t=123").is_some());
        g.assert_consistent();
    }

    #[test]
    fn update_code_links_symmetric_edges() {
        let mut g = graph();
        g.update_code("/proj/src/main.js", "import { a } from \"./a.js\";")
            .unwrap();
        let main = g.module_by_file("/proj/src/main.js").unwrap();
        assert!(main.imported_modules.contains("/proj/src/a.js"));
        let a = g.module_by_file("/proj/src/a.js").unwrap();
        assert!(a.importers.contains("/proj/src/main.js"));
        g.assert_consistent();
    }

    #[test]
    fn stale_edges_are_cleared_on_update() {
        let mut g = graph();
        g.update_code("/proj/src/main.js", "import \"./a.js\";").unwrap();
        g.update_code("/proj/src/main.js", "import \"./b.js\";").unwrap();
        let main = g.module_by_file("/proj/src/main.js").unwrap();
        assert!(!main.imported_modules.contains("/proj/src/a.js"));
        assert!(main.imported_modules.contains("/proj/src/b.js"));
        let a = g.module_by_file("/proj/src/a.js").unwrap();
        assert!(a.importers.is_empty());
        g.assert_consistent();
    }

    #[test]
    fn repeated_update_does_not_duplicate_edges() {
        let mut g = graph();
        let code = "import { a } from \"./a.js\";";
        g.update_code("/proj/src/main.js", code).unwrap();
        g.update_code("/proj/src/main.js", code).unwrap();
        let main = g.module_by_file("/proj/src/main.js").unwrap();
        assert_eq!(main.imported_modules.len(), 1);
        g.assert_consistent();
    }

    #[test]
    fn bare_specifiers_stay_out_of_the_graph() {
        let mut g = graph();
        g.update_code(
            "/proj/src/main.js",
            "import React from \"react\";\nimport { a } from \"./a.js\";",
        )
        .unwrap();
        assert_eq!(g.len(), 2); // main + ./a.js, no node for react
        g.assert_consistent();
    }

    #[test]
    fn extension_probing_matches_known_modules() {
        let mut g = graph();
        g.ensure_node("/src/a.ts", "/proj/src/a.ts").unwrap();
        g.update_code("/proj/src/main.js", "import { a } from \"./a\";")
            .unwrap();
        let main = g.module_by_file("/proj/src/main.js").unwrap();
        assert!(main.imported_modules.contains("/proj/src/a.ts"));
        g.assert_consistent();
    }

    #[test]
    fn delete_node_leaves_no_dangling_edges() {
        let mut g = graph();
        g.update_code("/proj/src/main.js", "import \"./a.js\";").unwrap();
        g.update_code("/proj/src/a.js", "import \"./leaf.js\";").unwrap();
        g.delete_node("/proj/src/a.js");
        assert!(g.module_by_file("/proj/src/a.js").is_none());
        let main = g.module_by_file("/proj/src/main.js").unwrap();
        assert!(main.imported_modules.is_empty());
        let leaf = g.module_by_file("/proj/src/leaf.js").unwrap();
        assert!(leaf.importers.is_empty());
        g.assert_consistent();
    }

    #[test]
    fn invalidate_bumps_without_touching_edges() {
        let mut g = graph();
        g.update_code("/proj/src/main.js", "import \"./a.js\";").unwrap();
        let before = g.module_by_file("/proj/src/main.js").unwrap().last_updated;
        g.invalidate(["/proj/src/main.js"]);
        let main = g.module_by_file("/proj/src/main.js").unwrap();
        assert!(main.last_updated > before);
        assert_eq!(main.imported_modules.len(), 1);
        g.assert_consistent();
    }

    #[test]
    fn self_accepting_state_follows_the_latest_code() {
        let mut g = graph();
        g.update_code("/proj/src/w.js", "import.meta.hot.accept();").unwrap();
        assert!(g.module_by_file("/proj/src/w.js").unwrap().is_self_accepting);
        g.update_code("/proj/src/w.js", "export const n = 1;").unwrap();
        assert!(!g.module_by_file("/proj/src/w.js").unwrap().is_self_accepting);
    }
}
