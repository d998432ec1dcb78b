// src/graph/render.rs

//! Text renderings of dependency loops for error messages.

use std::collections::HashSet;

use crate::types::TaskPath;

/// `a → b → c → a`
pub fn render_chain(chain: &[TaskPath]) -> String {
    chain
        .iter()
        .map(TaskPath::as_str)
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Render a graph as an indented dependency tree rooted at `root`.
///
/// `children` yields the direct successors of a node. A node already printed
/// higher up is marked with ` (*)` and not expanded again, which keeps the
/// output finite for cyclic input.
///
/// ```text
/// :a
/// \--- :b
///      \--- :c
///           \--- :a (*)
/// ```
pub fn render_tree<'a, F>(root: &'a TaskPath, children: F) -> String
where
    F: Fn(&TaskPath) -> Vec<&'a TaskPath>,
{
    let mut out = String::new();
    let mut seen = HashSet::new();
    out.push_str(root.as_str());
    seen.insert(root.clone());
    write_children(&mut out, root, &children, &mut seen, "");
    out
}

fn write_children<'a, F>(
    out: &mut String,
    node: &TaskPath,
    children: &F,
    seen: &mut HashSet<TaskPath>,
    prefix: &str,
) where
    F: Fn(&TaskPath) -> Vec<&'a TaskPath>,
{
    let kids = children(node);
    let last = kids.len().saturating_sub(1);

    for (i, child) in kids.into_iter().enumerate() {
        let (connector, indent) = if i == last {
            ("\\--- ", "     ")
        } else {
            ("+--- ", "|    ")
        };

        out.push('\n');
        out.push_str(prefix);
        out.push_str(connector);
        out.push_str(child.as_str());

        if !seen.insert(child.clone()) {
            out.push_str(" (*)");
            continue;
        }

        let nested = format!("{prefix}{indent}");
        write_children(out, child, children, seen, &nested);
    }
}
