//! The resource engine.
//!
//! Resources are declared in recipe order and converged in two passes: the
//! declaration pass runs each requested action in order, firing immediate
//! notifications synchronously; the delayed pass then runs every queued
//! `(target, action)` once, in first-queued order.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::graph;
use super::report::{ResourceResult, RunReport, Status, SKIP_ABORTED, SKIP_GUARD};
use super::retry::{RetryPolicy, RetryTracker};
use crate::error::ConvergeError;
use crate::infrastructure::Host;
use crate::resources::{ActionContext, Resource};
use crate::types::resource::{Action, Notification, ResourceId, Timing};

#[derive(Debug, Default)]
pub struct Engine {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
}

impl Engine {
    pub fn new() -> Self {
        Engine::default()
    }

    /// Validate and register a resource. Identities are unique per run.
    pub fn declare(&mut self, resource: Resource) -> Result<ResourceId, ConvergeError> {
        resource.validate()?;
        let id = resource.id();
        if self.index.contains_key(&id) {
            return Err(ConvergeError::DuplicateResource { id });
        }
        debug!(resource = %id, "declared");
        self.index.insert(id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|i| &self.resources[*i])
    }

    /// Declared resources in declaration order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Converge every declared resource against `host`.
    ///
    /// Fails only when the notification graph is invalid; apply-time errors
    /// are recorded in the report.
    pub fn run(
        &self,
        host: &mut Host,
        policy: &RetryPolicy,
        dry_run: bool,
    ) -> Result<RunReport, ConvergeError> {
        graph::validate(&self.resources, &self.index)?;
        let started = Instant::now();
        let mut run = Run {
            engine: self,
            host,
            policy,
            dry_run,
            results: Vec::new(),
            delayed: Vec::new(),
            queued: HashSet::new(),
            blocked: Vec::new(),
            aborted: false,
            tracker: RetryTracker::new(),
        };

        for (idx, resource) in self.resources.iter().enumerate() {
            for action in &resource.actions {
                run.converge(idx, *action, None);
            }
        }

        let mut next = 0;
        while next < run.delayed.len() {
            let (n, source) = run.delayed[next].clone();
            next += 1;
            if let Some(&idx) = self.index.get(&n.target) {
                run.converge(idx, n.action, Some(&source));
            }
        }

        let blocked = std::mem::take(&mut run.blocked);
        let mut reported = HashSet::new();
        for ((target, action), source) in blocked {
            if run.queued.contains(&(target.clone(), action)) {
                continue;
            }
            if reported.insert((target.clone(), action)) {
                warn!(resource = %target, %action, upstream = %source, "skipped, upstream failed");
                run.results
                    .push(ResourceResult::upstream_failed(target, action, &source));
            }
        }

        let retries = run.tracker.total();
        let report = RunReport::new(
            dry_run,
            run.results,
            retries,
            started.elapsed().as_millis() as u64,
        );
        info!(summary = %report.summary, why_run = dry_run, "run finished");
        Ok(report)
    }
}

/// Mutable state of one run.
struct Run<'a> {
    engine: &'a Engine,
    host: &'a mut Host,
    policy: &'a RetryPolicy,
    dry_run: bool,
    results: Vec<ResourceResult>,
    delayed: Vec<(Notification, ResourceId)>,
    /// `(target, action)` pairs queued by a successful source.
    queued: HashSet<(ResourceId, Action)>,
    /// Delayed edges whose source failed, resolved at the end of the run.
    blocked: Vec<((ResourceId, Action), ResourceId)>,
    aborted: bool,
    tracker: RetryTracker,
}

impl<'a> Run<'a> {
    fn converge(&mut self, idx: usize, action: Action, trigger: Option<&ResourceId>) {
        if action == Action::Nothing {
            return;
        }
        let engine = self.engine;
        let resource = &engine.resources[idx];
        let id = resource.id();

        if self.aborted {
            self.results.push(
                ResourceResult::new(id, action, Status::skipped(SKIP_ABORTED)).triggered_by(trigger),
            );
            return;
        }
        if !resource.guards_allow(&*self.host) {
            debug!(resource = %id, %action, "skipped by guard");
            self.results.push(
                ResourceResult::new(id, action, Status::skipped(SKIP_GUARD)).triggered_by(trigger),
            );
            return;
        }

        let (result, fired) = self.apply(resource, &id, action);
        let result = result.triggered_by(trigger);
        let failed = result.status.is_failed();
        self.results.push(result);

        if failed {
            for n in resource.all_notifications() {
                self.block(n, &id);
            }
            if resource.critical {
                error!(resource = %id, "critical resource failed, aborting run");
                self.aborted = true;
            }
            return;
        }

        for n in fired {
            match n.timing {
                Timing::Immediate => match engine.index.get(&n.target) {
                    Some(&target) => self.converge(target, n.action, Some(&id)),
                    None => warn!(resource = %id, target = %n.target, "immediate target not declared"),
                },
                Timing::Delayed => {
                    let key = (n.target.clone(), n.action);
                    if self.queued.insert(key) {
                        self.delayed.push((n, id.clone()));
                    }
                }
            }
        }
    }

    /// Run one action with retries. Returns the result and the notifications
    /// it fires.
    fn apply(
        &mut self,
        resource: &Resource,
        id: &ResourceId,
        action: Action,
    ) -> (ResourceResult, Vec<Notification>) {
        let policy = match resource.retries {
            Some(n) => self.policy.with_max_retries(n),
            None => self.policy.clone(),
        };
        let provider = resource.spec.provider();
        let mut attempt = 0;
        loop {
            let mut ctx = ActionContext::new(&mut *self.host, self.dry_run);
            let outcome = provider.converge(id, action, &mut ctx);
            let updated = ctx.updated();
            let ActionContext {
                changes,
                warnings,
                queued,
                ..
            } = ctx;

            match outcome {
                Ok(()) => {
                    let status = if updated { Status::Updated } else { Status::Unchanged };
                    let mut result = ResourceResult::new(id.clone(), action, status);
                    result.retries = attempt;
                    result.warnings = warnings;
                    let mut fired = Vec::new();
                    if updated {
                        info!(resource = %id, %action, changes = ?changes, "updated");
                        fired.extend(resource.notifications.iter().cloned());
                    } else {
                        debug!(resource = %id, %action, "unchanged");
                    }
                    result.changes = changes;
                    for n in queued {
                        if !fired.contains(&n) {
                            fired.push(n);
                        }
                    }
                    return (result, fired);
                }
                Err(err) if err.is_retryable() && policy.should_retry(attempt) => {
                    warn!(resource = %id, %action, attempt = attempt + 1, error = %err, "retrying");
                    self.tracker.record_retry(id, action);
                    let delay = policy.delay(attempt);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => {
                    error!(resource = %id, %action, error = %err, "failed");
                    let mut result = ResourceResult::failed(id.clone(), action, &err);
                    result.retries = attempt;
                    result.changes = changes;
                    result.warnings = warnings;
                    return (result, Vec::new());
                }
            }
        }
    }

    /// Record that `source` failed before it could fire `n`.
    fn block(&mut self, n: Notification, source: &ResourceId) {
        match n.timing {
            Timing::Immediate => {
                warn!(resource = %n.target, action = %n.action, upstream = %source, "skipped, upstream failed");
                self.results
                    .push(ResourceResult::upstream_failed(n.target, n.action, source));
            }
            Timing::Delayed => self.blocked.push(((n.target, n.action), source.clone())),
        }
    }
}
