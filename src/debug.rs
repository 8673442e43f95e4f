//! Debug sidecar: since this lowering strategy never emits
//! textual Rust source, "open the generated code" becomes "open a rendered
//! IR dump" — a tree-shaped text form of the `Expr` that produced a
//! converter, written next to a bounded in-process cache so repeatedly
//! building the same pipeline during development doesn't pile up files.

use crate::expr::{CollectionItem, Expr};
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Mutex;

const CACHE_CAPACITY: usize = 100;

struct SidecarCache {
    order: VecDeque<String>,
    entries: std::collections::HashMap<String, String>,
}

impl SidecarCache {
    fn new() -> Self {
        SidecarCache {
            order: VecDeque::new(),
            entries: std::collections::HashMap::new(),
        }
    }

    fn insert(&mut self, key: String, rendering: String) {
        if !self.entries.contains_key(&key) {
            if self.order.len() >= CACHE_CAPACITY {
                if let Some(evicted) = self.order.pop_front() {
                    self.entries.remove(&evicted);
                }
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, rendering);
    }

    fn get(&mut self, key: &str) -> Option<String> {
        let rendering = self.entries.get(key).cloned();
        if rendering.is_some() {
            if let Some(pos) = self.order.iter().position(|k| k == key) {
                let k = self.order.remove(pos).unwrap();
                self.order.push_back(k);
            }
        }
        rendering
    }
}

static CACHE: Lazy<Mutex<SidecarCache>> = Lazy::new(|| Mutex::new(SidecarCache::new()));

/// Render an `Expr` tree as indented text. This is what `{:?}` on an `Expr`
/// produces, and what gets written to a converter's debug sidecar file.
pub fn render(expr: &Expr) -> String {
    let mut out = String::new();
    render_node(expr, 0, &mut out);
    out
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn render_node(expr: &Expr, depth: usize, out: &mut String) {
    indent(depth, out);
    match expr {
        Expr::This => { let _ = writeln!(out, "this"); }
        Expr::Left => { let _ = writeln!(out, "left"); }
        Expr::Right => { let _ = writeln!(out, "right"); }
        Expr::Chunk => { let _ = writeln!(out, "chunk"); }
        Expr::Prev => { let _ = writeln!(out, "prev"); }
        Expr::Const(v) => { let _ = writeln!(out, "const {v}"); }
        Expr::InputArg(name) => { let _ = writeln!(out, "input_arg {name}"); }
        Expr::Item { base, keys, default } => {
            let _ = writeln!(out, "item (default={})", default.is_some());
            render_node(base, depth + 1, out);
            for k in keys {
                render_node(k, depth + 1, out);
            }
        }
        Expr::Attr { base, names, default } => {
            let _ = writeln!(out, "attr {} (default={})", names.join("."), default.is_some());
            render_node(base, depth + 1, out);
        }
        Expr::BinOp(op, l, r) => {
            let _ = writeln!(out, "binop {op:?}");
            render_node(l, depth + 1, out);
            render_node(r, depth + 1, out);
        }
        Expr::Not(e) => {
            let _ = writeln!(out, "not");
            render_node(e, depth + 1, out);
        }
        Expr::And(items) => {
            let _ = writeln!(out, "and");
            for e in items {
                render_node(e, depth + 1, out);
            }
        }
        Expr::Or(items) => {
            let _ = writeln!(out, "or");
            for e in items {
                render_node(e, depth + 1, out);
            }
        }
        Expr::Call(f, args) => {
            let _ = writeln!(out, "call {}", f.name);
            for a in args {
                render_node(a, depth + 1, out);
            }
        }
        Expr::CallMethod(base, name, args) => {
            let _ = writeln!(out, "call_method .{name}");
            render_node(base, depth + 1, out);
            for a in args {
                render_node(a, depth + 1, out);
            }
        }
        Expr::AsType(e, t) => {
            let _ = writeln!(out, "as_type {t:?}");
            render_node(e, depth + 1, out);
        }
        Expr::If(c, t, e) => {
            let _ = writeln!(out, "if");
            render_node(c, depth + 1, out);
            render_node(t, depth + 1, out);
            render_node(e, depth + 1, out);
        }
        Expr::IfMultiple(branches, default) => {
            let _ = writeln!(out, "if_multiple ({} branches)", branches.len());
            for (c, t) in branches {
                render_node(c, depth + 1, out);
                render_node(t, depth + 1, out);
            }
            render_node(default, depth + 1, out);
        }
        Expr::Dispatch { key, table, default } => {
            let _ = writeln!(out, "dispatch ({} cases)", table.len());
            render_node(key, depth + 1, out);
            render_node(default, depth + 1, out);
        }
        Expr::AndThen(e, cond) => {
            let _ = writeln!(out, "and_then (guarded={})", cond.is_some());
            render_node(e, depth + 1, out);
        }
        Expr::ListLit(items) => render_collection("list_lit", items, depth, out),
        Expr::TupleLit(items) => render_collection("tuple_lit", items, depth, out),
        Expr::SetLit(items) => render_collection("set_lit", items, depth, out),
        Expr::DictLit(pairs) => {
            let _ = writeln!(out, "dict_lit ({} pairs)", pairs.len());
            for (k, v) in pairs {
                render_collection_item(k, depth + 1, out);
                render_node(v, depth + 1, out);
            }
        }
        Expr::Comprehension { kind, elt, where_ } => {
            let _ = writeln!(out, "comprehension {kind:?} (where={})", where_.is_some());
            render_node(elt, depth + 1, out);
        }
        Expr::DictComprehension { key, value, where_ } => {
            let _ = writeln!(out, "dict_comprehension (where={})", where_.is_some());
            render_node(key, depth + 1, out);
            render_node(value, depth + 1, out);
        }
        Expr::Iter { elt, where_ } => {
            let _ = writeln!(out, "iter (where={})", where_.is_some());
            render_node(elt, depth + 1, out);
        }
        Expr::Pipe { from, to, label_input, label_output } => {
            let _ = writeln!(
                out,
                "pipe (inputs={}, outputs={})",
                label_input.len(),
                label_output.len()
            );
            render_node(from, depth + 1, out);
            render_node(to, depth + 1, out);
        }
        Expr::Label(name) => { let _ = writeln!(out, "label {name}"); }
        Expr::Filter(src, cond) => {
            let _ = writeln!(out, "filter");
            render_node(src, depth + 1, out);
            render_node(cond, depth + 1, out);
        }
        Expr::Sort { source, key, reverse } => {
            let _ = writeln!(out, "sort (keyed={}, reverse={reverse})", key.is_some());
            render_node(source, depth + 1, out);
        }
        Expr::TakeWhile(src, cond) => {
            let _ = writeln!(out, "take_while");
            render_node(src, depth + 1, out);
            render_node(cond, depth + 1, out);
        }
        Expr::DropWhile(src, cond) => {
            let _ = writeln!(out, "drop_while");
            render_node(src, depth + 1, out);
            render_node(cond, depth + 1, out);
        }
        Expr::IterUnique { source, by } => {
            let _ = writeln!(out, "iter_unique (keyed={})", by.is_some());
            render_node(source, depth + 1, out);
        }
        Expr::IterWindows { source, size, step } => {
            let _ = writeln!(out, "iter_windows size={size} step={step}");
            render_node(source, depth + 1, out);
        }
        Expr::ChunkBy { source, keys, size } => {
            let _ = writeln!(out, "chunk_by ({} keys, size={size:?})", keys.len());
            render_node(source, depth + 1, out);
        }
        Expr::ChunkByCondition { source, pred } => {
            let _ = writeln!(out, "chunk_by_condition");
            render_node(source, depth + 1, out);
            render_node(pred, depth + 1, out);
        }
        Expr::UnorderedChunkBy { source, key, size, max_items_in_memory, portion_to_pop } => {
            let _ = writeln!(
                out,
                "unordered_chunk_by size={size:?} max_in_memory={max_items_in_memory:?} portion_to_pop={portion_to_pop}"
            );
            render_node(source, depth + 1, out);
            render_node(key, depth + 1, out);
        }
        Expr::Cumulative { source, initial, fold, label_name } => {
            let _ = writeln!(out, "cumulative -> {label_name}");
            render_node(source, depth + 1, out);
            render_node(initial, depth + 1, out);
            render_node(fold, depth + 1, out);
        }
        Expr::CumulativeReset(name, source) => {
            let _ = writeln!(out, "cumulative_reset {name}");
            render_node(source, depth + 1, out);
        }
        Expr::Aggregate(spec) => {
            let _ = writeln!(out, "aggregate");
            render_node(spec, depth + 1, out);
        }
        Expr::GroupBy { source, keys, post } => {
            let _ = writeln!(out, "group_by ({} keys)", keys.len());
            render_node(source, depth + 1, out);
            for k in keys {
                render_node(k, depth + 1, out);
            }
            render_node(post, depth + 1, out);
        }
        Expr::Reduce(spec) => {
            let _ = writeln!(out, "reduce {:?}", spec.kind);
            render_node(&spec.input, depth + 1, out);
        }
        Expr::Join { left, right, predicate, how } => {
            let _ = writeln!(out, "join {how:?}");
            render_node(left, depth + 1, out);
            render_node(right, depth + 1, out);
            render_node(predicate, depth + 1, out);
        }
        Expr::Zip(items) => {
            let _ = writeln!(out, "zip ({} sources)", items.len());
            for e in items {
                render_node(e, depth + 1, out);
            }
        }
        Expr::ZipLongest(items, fill) => {
            let _ = writeln!(out, "zip_longest ({} sources)", items.len());
            for e in items {
                render_node(e, depth + 1, out);
            }
            render_node(fill, depth + 1, out);
        }
        Expr::Flatten(e) => {
            let _ = writeln!(out, "flatten");
            render_node(e, depth + 1, out);
        }
        Expr::Try(body, handlers) => {
            let _ = writeln!(out, "try ({} handlers)", handlers.len());
            render_node(body, depth + 1, out);
        }
        Expr::Expect(cond, msg) => {
            let _ = writeln!(out, "expect");
            render_node(cond, depth + 1, out);
            render_node(msg, depth + 1, out);
        }
    }
}

fn render_collection(tag: &str, items: &[CollectionItem], depth: usize, out: &mut String) {
    let _ = writeln!(out, "{tag} ({} items)", items.len());
    for item in items {
        render_collection_item(item, depth + 1, out);
    }
}

fn render_collection_item(item: &CollectionItem, depth: usize, out: &mut String) {
    match item {
        CollectionItem::Plain(e) => render_node(e, depth, out),
        CollectionItem::Optional { value, skip_if, keep_if } => {
            indent(depth, out);
            let _ = writeln!(out, "optional (skip_if={}, keep_if={})", skip_if.is_some(), keep_if.is_some());
            render_node(value, depth + 1, out);
        }
        CollectionItem::Spread(e) => {
            indent(depth, out);
            let _ = writeln!(out, "spread");
            render_node(e, depth + 1, out);
        }
    }
}

/// Write `rendering` to a sidecar file under `dir`, keyed by a stable id, and
/// remember it in the process-wide LRU so a repeated build with the same id
/// overwrites rather than multiplying files on disk.
pub fn write_sidecar(dir: &std::path::Path, id: &str, rendering: &str) -> std::io::Result<std::path::PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{id}.convtools.ir"));
    std::fs::write(&path, rendering)?;
    CACHE.lock().unwrap().insert(id.to_string(), rendering.to_string());
    Ok(path)
}

/// Look up a previously-rendered IR dump by id, without touching disk.
pub fn cached_rendering(id: &str) -> Option<String> {
    CACHE.lock().unwrap().get(id)
}
