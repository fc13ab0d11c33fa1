use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::asset::Layout;
use crate::error::{Result, ToolchainError};

/// Locates the installation root inside an extracted archive.
///
/// Nested archives wrap their payload in one directory whose name is not predictable
/// (`haxe-4.0.5-linux64/haxe_20191217082701_67feacebc`). Hidden entries are ignored and
/// exactly one visible entry must remain.
pub fn find_tool_root(extract_path: &Path, nested: bool) -> Result<PathBuf> {
    if !nested {
        return Ok(extract_path.to_path_buf());
    }

    let mut visible = Vec::new();
    for entry in fs::read_dir(extract_path)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if name.is_empty() || name.starts_with('.') {
            continue;
        }
        visible.push(name);
    }
    visible.sort();

    match visible.len() {
        0 => Err(ToolchainError::ToolRootNotFound {
            path: extract_path.to_path_buf(),
        }),
        1 => Ok(extract_path.join(&visible[0])),
        _ => Err(ToolchainError::AmbiguousToolRoot {
            path: extract_path.to_path_buf(),
            entries: visible,
        }),
    }
}

pub fn validate_layout(name: &str, layout: Layout, root: &Path) -> Result<()> {
    for alternatives in layout {
        if !alternatives.iter().any(|rel| root.join(rel).exists()) {
            return Err(ToolchainError::InvalidToolLayout {
                name: name.to_string(),
                root: root.to_path_buf(),
                reason: format!("missing {}", alternatives.join(" or ")),
            });
        }
    }
    Ok(())
}
