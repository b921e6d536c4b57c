//! Attribute store and run settings.
//!
//! The attribute tree starts from the built-in defaults, takes a node file
//! deep-merged on top, and is then handed by `&mut` reference through the
//! recipe pipeline so that later recipes see values derived by earlier ones.

pub mod attributes;
pub mod defaults;
pub mod merge;
pub mod settings;

use std::path::Path;

use crate::error::ConvergeError;

pub use attributes::{scalar_to_string, AttributeTree};
pub use defaults::default_attributes;
pub use merge::deep_merge;
pub use settings::NodeFile;


/// Defaults merged with the node file at `node_file`, if any. Returns the
/// tree and the node file's run list.
pub fn load_attributes(
    node_file: Option<&Path>,
) -> Result<(AttributeTree, Option<Vec<String>>), ConvergeError> {
    let mut attrs = default_attributes();
    let mut run_list = None;
    if let Some(path) = node_file {
        let node = settings::load_node_file(path)?;
        attrs.merge(&node.attributes);
        run_list = node.run_list;
    }
    Ok((attrs, run_list))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_without_node_file_is_defaults() {
        let (attrs, run_list) = load_attributes(None).unwrap();
        assert_eq!(attrs, default_attributes());
        assert!(run_list.is_none());
    }

    #[test]
    fn node_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.yaml");
        std::fs::write(
            &path,
            "run_list: ['hbase::config']\nhbase:\n  config:\n    hbase.rootdir: hdfs://nn:8020/hbase\n",
        )
        .unwrap();
        let (attrs, run_list) = load_attributes(Some(&path)).unwrap();
        assert_eq!(run_list, Some(vec!["hbase::config".to_string()]));
        assert_eq!(
            attrs.str(&["hbase", "config", "hbase.rootdir"]),
            "hdfs://nn:8020/hbase"
        );
        // Untouched sibling keys survive the merge.
        assert_eq!(
            attrs.str(&["hbase", "config", "hbase.zookeeper.quorum"]),
            "localhost"
        );
    }

    #[test]
    fn missing_node_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_attributes(Some(&dir.path().join("absent.json"))).is_err());
    }
}
