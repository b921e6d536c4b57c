//! Notification graph validation.
//!
//! Every edge, declared or implied by a provider, must point at a declared
//! resource that supports the requested action. Immediate edges must not
//! form a cycle, since they run synchronously.

use std::collections::{HashMap, HashSet};

use crate::error::ConvergeError;
use crate::resources::Resource;
use crate::types::resource::{ResourceId, Timing};

pub fn validate(
    resources: &[Resource],
    index: &HashMap<ResourceId, usize>,
) -> Result<(), ConvergeError> {
    let mut immediate: HashMap<usize, Vec<usize>> = HashMap::new();
    for (from, resource) in resources.iter().enumerate() {
        let source = resource.id();
        for n in resource.all_notifications() {
            let to = *index
                .get(&n.target)
                .ok_or_else(|| ConvergeError::UnresolvedNotification {
                    from: source.clone(),
                    to: n.target.clone(),
                    action: n.action,
                })?;
            if !resources[to].supports(n.action) {
                return Err(ConvergeError::InvalidAction {
                    resource: n.target.clone(),
                    action: n.action,
                });
            }
            if n.timing == Timing::Immediate {
                immediate.entry(from).or_default().push(to);
            }
        }
    }

    let mut done = HashSet::new();
    for start in immediate.keys().copied() {
        let mut path = Vec::new();
        if let Some(depth) = find_cycle(start, &immediate, &mut path, &mut done) {
            return Err(ConvergeError::NotificationLoop {
                id: resources[start].id(),
                depth,
            });
        }
    }
    Ok(())
}

/// Depth-first search along immediate edges; returns the cycle length when
/// `node` reaches a node already on the current path.
fn find_cycle(
    node: usize,
    edges: &HashMap<usize, Vec<usize>>,
    path: &mut Vec<usize>,
    done: &mut HashSet<usize>,
) -> Option<usize> {
    if let Some(pos) = path.iter().position(|n| *n == node) {
        return Some(path.len() - pos);
    }
    if done.contains(&node) {
        return None;
    }
    path.push(node);
    for next in edges.get(&node).into_iter().flatten() {
        if let Some(depth) = find_cycle(*next, edges, path, done) {
            return Some(depth);
        }
    }
    path.pop();
    done.insert(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ExecuteSpec, LogSpec};
    use crate::types::resource::{Action, ResourceKind};

    fn build(resources: Vec<Resource>) -> Result<(), ConvergeError> {
        let index = resources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id(), i))
            .collect();
        validate(&resources, &index)
    }

    fn exec(name: &str) -> ResourceId {
        ResourceId::new(ResourceKind::Execute, name)
    }

    #[test]
    fn resolved_targets_pass() {
        let resources = vec![
            Resource::new("a", ExecuteSpec::new("true")).notifies(Action::Run, exec("b"), Timing::Immediate),
            Resource::new("b", ExecuteSpec::new("true")).notifies(Action::Run, exec("a"), Timing::Delayed),
        ];
        assert!(build(resources).is_ok());
    }

    #[test]
    fn typo_in_target_fails_fast() {
        let resources = vec![Resource::new("a", ExecuteSpec::new("true")).notifies(
            Action::Restart,
            ResourceId::service("mastr"),
            Timing::Delayed,
        )];
        let err = build(resources).unwrap_err();
        assert_eq!(
            err.to_string(),
            "execute[a] notifies restart on hbase_service[mastr], which is not declared in this run"
        );
    }

    #[test]
    fn unsupported_notified_action() {
        let resources = vec![
            Resource::new("a", ExecuteSpec::new("true")).notifies(
                Action::Restart,
                ResourceId::new(ResourceKind::Log, "hello"),
                Timing::Delayed,
            ),
            Resource::new("hello", LogSpec::default()),
        ];
        assert!(matches!(build(resources), Err(ConvergeError::InvalidAction { .. })));
    }

    #[test]
    fn immediate_cycle_is_rejected() {
        let resources = vec![
            Resource::new("a", ExecuteSpec::new("true")).notifies(Action::Run, exec("b"), Timing::Immediate),
            Resource::new("b", ExecuteSpec::new("true")).notifies(Action::Run, exec("c"), Timing::Immediate),
            Resource::new("c", ExecuteSpec::new("true")).notifies(Action::Run, exec("a"), Timing::Immediate),
        ];
        match build(resources) {
            Err(ConvergeError::NotificationLoop { depth, .. }) => assert_eq!(depth, 3),
            other => panic!("expected loop, got {:?}", other),
        }
    }
}
