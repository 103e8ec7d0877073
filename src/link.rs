//! The graph linker: turns pending named links into direct references.
//!
//! Linking wires references and performs no evaluation. Links are
//! applied in production (compile) order, observable only through the
//! debug log.

use std::collections::HashMap;

use crate::compile::NodeLink;
use crate::error::CompileError;
use crate::node::{Capabilities, LinkTarget, Node};

/// Build the id→index map, rejecting duplicates.
pub fn index_by_id(nodes: &[Box<dyn Node>]) -> Result<HashMap<String, usize>, CompileError> {
    let mut by_id = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if by_id.insert(node.id().to_string(), i).is_some() {
            return Err(CompileError::DuplicateId(node.id().to_string()));
        }
    }
    Ok(by_id)
}

/// Resolve every pending link into a connected reference.
pub fn link(nodes: &mut [Box<dyn Node>], links: &[NodeLink]) -> Result<(), CompileError> {
    let by_id = index_by_id(nodes)?;
    for link in links {
        let (target_id, slot) = link.split_target();
        let Some(&target_index) = by_id.get(target_id) else {
            return Err(CompileError::UnresolvedLink {
                from_node: link.source.clone(),
                attr: link.attr.clone(),
                target: target_id.to_string(),
                slot: slot.to_string(),
            });
        };
        // The source always resolves: its link was produced alongside it.
        let Some(&source_index) = by_id.get(&link.source) else {
            return Err(CompileError::UnresolvedLink {
                from_node: link.source.clone(),
                attr: link.attr.clone(),
                target: target_id.to_string(),
                slot: slot.to_string(),
            });
        };
        log::debug!(
            "link from={}:{} to={}:{}",
            link.source,
            link.attr,
            target_id,
            slot
        );
        let target = LinkTarget {
            index: target_index,
            id: target_id.to_string(),
            slot: slot.to_string(),
            caps: Capabilities::of(nodes[target_index].as_ref()),
        };
        nodes[source_index].connect(&link.attr, target)?;
    }
    Ok(())
}
