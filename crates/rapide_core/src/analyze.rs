//! Syntax-aware extraction of import specifiers and hot-acceptance state.

use std::path::Path;

use hashbrown::HashSet;
use swc_core::common::{sync::Lrc, BytePos, FileName, SourceMap};
use swc_core::ecma::ast::{
    ArrayLit, CallExpr, Callee, EsVersion, Expr, ExprOrSpread, Lit, MemberExpr, MemberProp,
    MetaPropKind, Str,
};
use swc_core::ecma::parser::{parse_file_as_module, EsSyntax, Syntax, TsSyntax};
use swc_core::ecma::visit::{Visit, VisitWith};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Static,
    Dynamic,
    ReExport,
}

/// One import specifier with the byte range of its quoted string literal.
#[derive(Debug, Clone)]
pub struct ImportSpan {
    pub start: usize,
    pub end: usize,
    pub specifier: String,
    pub kind: ImportKind,
}

#[derive(Debug, Default)]
pub struct ModuleAnalysis {
    pub imports: Vec<ImportSpan>,
    pub is_self_accepting: bool,
    pub accepted_deps: HashSet<String>,
}

pub fn syntax_by_ext(ext: &str) -> Syntax {
    match ext {
        "ts" | "tsx" => Syntax::Typescript(TsSyntax {
            tsx: ext == "tsx",
            decorators: true,
            ..Default::default()
        }),
        _ => Syntax::Es(EsSyntax {
            jsx: ext == "jsx",
            export_default_from: true,
            import_attributes: true,
            ..Default::default()
        }),
    }
}

/// Parses `code` and collects every static import, re-export source and
/// dynamic `import()` string literal, together with the module's
/// `import.meta.hot.accept` registrations.
pub fn analyze_module(code: &str, file: &str) -> anyhow::Result<ModuleAnalysis> {
    let ext = Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("js");
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(
        Lrc::new(FileName::Custom(file.to_string())),
        code.to_string(),
    );

    let mut errors = vec![];
    let module = parse_file_as_module(
        &fm,
        syntax_by_ext(ext),
        EsVersion::latest(),
        None,
        &mut errors,
    )
    .map_err(|err| anyhow::format_err!("failed to parse {}: {:?}", file, err))?;
    if !errors.is_empty() {
        tracing::debug!("recovered parse errors in {}: {:?}", file, errors);
    }

    let mut collector = ImportCollector {
        file_start: fm.start_pos,
        analysis: ModuleAnalysis::default(),
    };
    module.visit_with(&mut collector);
    Ok(collector.analysis)
}

struct ImportCollector {
    file_start: BytePos,
    analysis: ModuleAnalysis,
}

impl ImportCollector {
    fn push(&mut self, src: &Str, kind: ImportKind) {
        self.analysis.imports.push(ImportSpan {
            start: (src.span.lo - self.file_start).0 as usize,
            end: (src.span.hi - self.file_start).0 as usize,
            specifier: src.value.to_string_lossy().into_owned(),
            kind,
        });
    }

    fn record_accept(&mut self, args: &[ExprOrSpread]) {
        match args.first().map(|arg| &*arg.expr) {
            // `accept()` / `accept(cb)` register the module for its own updates
            None | Some(Expr::Fn(_)) | Some(Expr::Arrow(_)) => {
                self.analysis.is_self_accepting = true;
            }
            Some(Expr::Lit(Lit::Str(dep))) => {
                self.analysis.accepted_deps.insert(dep.value.to_string_lossy().into_owned());
            }
            Some(Expr::Array(ArrayLit { elems, .. })) => {
                for elem in elems.iter().flatten() {
                    if let Expr::Lit(Lit::Str(dep)) = &*elem.expr {
                        self.analysis.accepted_deps.insert(dep.value.to_string_lossy().into_owned());
                    }
                }
            }
            _ => {}
        }
    }
}

fn is_hot_accept(expr: &Expr) -> bool {
    let Expr::Member(MemberExpr { obj, prop, .. }) = expr else {
        return false;
    };
    let MemberProp::Ident(prop) = prop else {
        return false;
    };
    if prop.sym.as_ref() != "accept" {
        return false;
    }
    let Expr::Member(MemberExpr { obj: meta, prop: hot, .. }) = &**obj else {
        return false;
    };
    let MemberProp::Ident(hot) = hot else {
        return false;
    };
    matches!(&**meta, Expr::MetaProp(mp) if mp.kind == MetaPropKind::ImportMeta)
        && hot.sym.as_ref() == "hot"
}

impl Visit for ImportCollector {
    fn visit_import_decl(&mut self, n: &swc_core::ecma::ast::ImportDecl) {
        self.push(&n.src, ImportKind::Static);
        n.visit_children_with(self);
    }

    fn visit_named_export(&mut self, n: &swc_core::ecma::ast::NamedExport) {
        if let Some(src) = &n.src {
            self.push(src, ImportKind::ReExport);
        }
        n.visit_children_with(self);
    }

    fn visit_export_all(&mut self, n: &swc_core::ecma::ast::ExportAll) {
        self.push(&n.src, ImportKind::ReExport);
        n.visit_children_with(self);
    }

    fn visit_call_expr(&mut self, n: &CallExpr) {
        match &n.callee {
            Callee::Import(_) => {
                if let Some(ExprOrSpread { expr, .. }) = n.args.first() {
                    if let Expr::Lit(Lit::Str(src)) = &**expr {
                        self.push(src, ImportKind::Dynamic);
                    }
                }
            }
            Callee::Expr(expr) if is_hot_accept(expr) => {
                self.record_accept(&n.args);
            }
            _ => {}
        }
        n.visit_children_with(self);
    }
}

/// Fallback used when a source cannot be parsed (e.g. component-template
/// syntaxes handled by an out-of-tree transpiler): the acceptance marker is
/// still honored so hot updates keep working for those modules.
pub fn has_accept_marker(code: &str) -> bool {
    code.contains("import.meta.hot.accept")
}
