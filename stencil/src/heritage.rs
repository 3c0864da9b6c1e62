//! Template inheritance resolution.
//!
//! When a document extends a parent, the whole ancestor chain is loaded at
//! compile time and collapsed into a single node tree: the outermost
//! ancestor's layout, with every block replaced by its most-derived
//! override. A `parent` tag inside an override splices in the next-outer
//! definition of the same block. Blocks a child defines that appear
//! nowhere in the ancestor layout are prepended to the output.

use std::collections::{HashMap, HashSet};

use stencil_parser::node::{Arg, Document, Node, TagNode};

use crate::engine::Host;
use crate::error::{Error, Result};

/// Block definitions across the chain, nearest-child first. The index is
/// the position in the extends chain (0 = the compiled document).
type Ancestry = HashMap<String, Vec<(usize, TagNode)>>;

/// Collapses an extends chain into a render-ready node list.
pub(crate) fn flatten(
    doc: Document,
    filename: Option<&str>,
    host: &Host<'_>,
) -> Result<Vec<Node>> {
    if doc.parent.is_none() {
        return Ok(doc.nodes);
    }

    let mut chain = vec![doc];
    let mut visited: HashSet<String> = HashSet::new();
    if let Some(f) = filename {
        visited.insert(f.to_owned());
    }
    let mut from = filename.map(str::to_owned);

    while let Some(parent_ref) = chain.last().and_then(|d| d.parent.clone()) {
        let (resolved, parent) = host
            .load_parsed(&parent_ref, from.as_deref())
            .map_err(Error::Parse)?;
        if !visited.insert(resolved.clone()) {
            return Err(Error::CircularExtends(resolved));
        }
        from = Some(resolved);
        chain.push(parent);
    }

    let mut ancestry: Ancestry = HashMap::new();
    for (idx, doc) in chain.iter().enumerate() {
        for (name, def) in &doc.blocks {
            ancestry
                .entry(name.clone())
                .or_default()
                .push((idx, def.clone()));
        }
    }

    let outermost = chain.len() - 1;
    let mut placed = HashSet::new();
    let mut nodes = remap(&chain[outermost].nodes, &ancestry, outermost, &mut placed);

    // Blocks the nearer documents define that found no slot in the layout
    // are prepended, in source order, nearest document first.
    let mut prefix = Vec::new();
    for (idx, doc) in chain.iter().enumerate().take(outermost) {
        for node in &doc.nodes {
            let Node::Tag(tag) = node else { continue };
            if tag.name != "block" {
                continue;
            }
            let Some(name) = block_name(tag) else { continue };
            if !placed.insert(name.to_owned()) {
                continue;
            }
            let expanded = expand_parent(&tag.content, name, &ancestry, idx);
            let content = remap(&expanded, &ancestry, idx, &mut placed);
            prefix.push(Node::Tag(TagNode {
                content,
                ..tag.clone()
            }));
        }
    }
    prefix.append(&mut nodes);
    Ok(prefix)
}

fn block_name(tag: &TagNode) -> Option<&str> {
    match tag.args.first() {
        Some(Arg::Ident(name)) => Some(name),
        _ => None,
    }
}

/// Rewrites a node list so each block carries its most-derived definition.
/// `depth` is the chain index of the document the nodes came from.
fn remap(
    nodes: &[Node],
    ancestry: &Ancestry,
    depth: usize,
    placed: &mut HashSet<String>,
) -> Vec<Node> {
    nodes
        .iter()
        .map(|node| match node {
            Node::Tag(tag) if tag.name == "block" => {
                let Some(name) = block_name(tag) else {
                    return node.clone();
                };
                let (def_idx, def) = ancestry
                    .get(name)
                    .and_then(|defs| defs.first())
                    .map(|(idx, def)| (*idx, def.clone()))
                    .unwrap_or_else(|| (depth, tag.clone()));
                placed.insert(name.to_owned());
                let expanded = expand_parent(&def.content, name, ancestry, def_idx);
                let content = remap(&expanded, ancestry, def_idx, placed);
                Node::Tag(TagNode { content, ..def })
            }
            Node::Tag(tag) => Node::Tag(TagNode {
                content: remap(&tag.content, ancestry, depth, placed),
                ..tag.clone()
            }),
            other => other.clone(),
        })
        .collect()
}

/// Splices the next-outer definition of `block_name` in place of every
/// `parent` tag. Nested blocks are left alone; their own remap pass
/// handles the `parent` tags they contain.
fn expand_parent(
    nodes: &[Node],
    block_name: &str,
    ancestry: &Ancestry,
    def_idx: usize,
) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Tag(tag) if tag.name == "parent" => {
                let next = ancestry
                    .get(block_name)
                    .and_then(|defs| defs.iter().find(|(idx, _)| *idx > def_idx));
                if let Some((next_idx, next_def)) = next {
                    out.extend(expand_parent(
                        &next_def.content,
                        block_name,
                        ancestry,
                        *next_idx,
                    ));
                }
            }
            Node::Tag(tag) if tag.name == "block" => out.push(node.clone()),
            Node::Tag(tag) => out.push(Node::Tag(TagNode {
                content: expand_parent(&tag.content, block_name, ancestry, def_idx),
                ..tag.clone()
            })),
            other => out.push(other.clone()),
        }
    }
    out
}
