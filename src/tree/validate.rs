//! # Structural validation of descriptor trees.
//!
//! Run before execution: the descriptor graph must be acyclic and no
//! identifier may appear at two different paths from the root. Both
//! violations are reported with a display-name path trace for
//! diagnostics.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::ident::UniqueId;
use crate::tree::TestNode;

/// Validates that `root`'s graph is acyclic and duplicate-free.
pub fn validate_tree(root: &Arc<TestNode>) -> Result<(), EngineError> {
    let mut seen: HashMap<UniqueId, String> = HashMap::new();
    let mut path: Vec<(usize, String)> = Vec::new();
    visit(root, &mut seen, &mut path)
}

fn visit(
    node: &Arc<TestNode>,
    seen: &mut HashMap<UniqueId, String>,
    path: &mut Vec<(usize, String)>,
) -> Result<(), EngineError> {
    let ptr = Arc::as_ptr(node) as usize;
    if path.iter().any(|(p, _)| *p == ptr) {
        let mut names: Vec<&str> = path.iter().map(|(_, n)| n.as_str()).collect();
        names.push(node.display_name());
        return Err(EngineError::CycleDetected {
            path: names.join(" > "),
        });
    }

    let here = if path.is_empty() {
        node.display_name().to_string()
    } else {
        format!("{} > {}", path.last().expect("non-empty").1, node.display_name())
    };
    if let Some(first) = seen.get(node.id()) {
        return Err(EngineError::DuplicateId {
            id: node.id().to_string(),
            first: first.clone(),
            second: here,
        });
    }
    seen.insert(node.id().clone(), here.clone());

    path.push((ptr, here));
    for child in node.children() {
        visit(&child, seen, path)?;
    }
    path.pop();
    Ok(())
}
