//! File-backed node inventory for peer discovery.
//!
//! ```yaml
//! nodes:
//!   - name: rs1
//!     fqdn: rs1.example.com
//!     environment: production
//!     role: regionserver
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{NodeDescriptor, NodeSearch};

#[derive(Debug, Default, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    nodes: Vec<NodeDescriptor>,
}

/// Reads the inventory on every search so a long-lived process sees edits.
pub struct InventorySearch {
    path: PathBuf,
}

impl InventorySearch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        InventorySearch { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn parse_inventory(content: &str) -> Result<Vec<NodeDescriptor>, String> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: InventoryFile = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    Ok(file.nodes)
}

impl NodeSearch for InventorySearch {
    fn search(&self, role: &str, environment: &str) -> Result<Vec<NodeDescriptor>, String> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| format!("cannot read inventory {}: {}", self.path.display(), e))?;
        let nodes = parse_inventory(&content)
            .map_err(|e| format!("{}: {}", self.path.display(), e))?;
        Ok(nodes
            .into_iter()
            .filter(|n| n.role.as_deref() == Some(role))
            .filter(|n| n.environment.as_deref().map_or(true, |e| e == environment))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = "\
nodes:
  - name: rs2
    environment: prod
    role: regionserver
  - name: rs1
    fqdn: rs1.example.com
    environment: prod
    role: regionserver
  - name: rs9
    environment: dev
    role: regionserver
  - name: m1
    role: master
";

    #[test]
    fn filters_by_role_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.yaml");
        std::fs::write(&path, INVENTORY).unwrap();
        let search = InventorySearch::new(&path);
        let names: Vec<String> = search
            .search("regionserver", "prod")
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["rs2", "rs1"]);
        // Nodes without an environment match any scope.
        assert_eq!(search.search("master", "prod").unwrap().len(), 1);
    }

    #[test]
    fn missing_inventory_is_error() {
        let search = InventorySearch::new("/nonexistent/inventory.yaml");
        assert!(search.search("master", "prod").is_err());
    }

    #[test]
    fn empty_inventory_has_no_nodes() {
        assert!(parse_inventory("").unwrap().is_empty());
        assert!(parse_inventory("nodes: []\n").unwrap().is_empty());
        assert!(parse_inventory("nodes: 3\n").is_err());
    }
}
