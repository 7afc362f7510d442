//! Three-phase query evaluation.
//!
//! 1. Pre-iteration: index-driven narrowing of the for-set, top-down. A
//!    clause that cannot narrow returns the incoming set unchanged; the
//!    pass only ever shrinks.
//! 2. Iteration: only when some clause demands it. The possible set is
//!    partitioned into contiguous disjoint chunks, one rayon worker per
//!    chunk; each worker visits its candidates once, testing every
//!    iteration leaf into a worker-local result set. Workers poll the
//!    cancel token per candidate. The pass is a barrier: partial results
//!    are merged only after every partition finishes, and any partition
//!    failure fails the whole query.
//! 3. Combination: set algebra over the cached and recomputed leaf
//!    results, top-down. NOT complements against the remembered for-set,
//!    not the narrowed incoming set.

use std::collections::{BTreeSet, HashMap, HashSet};

use rayon::prelude::*;
use tracing::debug;

use termdb_types::ElementSeq;

use crate::clause::Clause;
use crate::error::{QueryError, QueryResult};
use crate::query::{lookup, Binding, CancelToken, ForSet, IterPredicate, Query};
use crate::queryable::Queryable;

impl Query {
    /// Evaluates this query against a store.
    pub fn compute<Q: Queryable>(&self, store: &Q) -> QueryResult<BTreeSet<ElementSeq>> {
        self.compute_with(store, &CancelToken::new())
    }

    /// Evaluates this query against a store with a cancellation token.
    pub fn compute_with<Q: Queryable>(
        &self,
        store: &Q,
        cancel: &CancelToken,
    ) -> QueryResult<BTreeSet<ElementSeq>> {
        let for_set: BTreeSet<ElementSeq> = match self.for_set {
            ForSet::Concepts => store.concept_sequences(),
            ForSet::Components => store.component_sequences(),
        }
        .into_iter()
        .collect();

        let possible = possible_components(&self.root, &for_set, store, &self.bindings);
        debug_assert!(possible.is_subset(&for_set));

        let phases = self.root.phases();
        debug!(
            for_set = for_set.len(),
            possible = possible.len(),
            iteration = phases.iteration,
            "query narrowed"
        );

        let caches = if phases.iteration {
            run_iteration(
                &possible,
                &self.iter_predicates,
                store,
                cancel,
                self.options.parallelism,
            )?
        } else {
            Vec::new()
        };

        let mut cursor = 0;
        Ok(combine(
            &self.root,
            &possible,
            &for_set,
            &caches,
            &mut cursor,
            store,
            &self.bindings,
        ))
    }
}

/// Pre-iteration narrowing. Result is always a subset of `incoming`.
fn possible_components<Q: Queryable>(
    clause: &Clause,
    incoming: &BTreeSet<ElementSeq>,
    store: &Q,
    bindings: &HashMap<String, Binding>,
) -> BTreeSet<ElementSeq> {
    match clause {
        Clause::MemberOf { assemblage } => {
            let members = store.members_of(resolve_assemblage(bindings, assemblage));
            incoming
                .iter()
                .copied()
                .filter(|sequence| members.binary_search(sequence).is_ok())
                .collect()
        }
        Clause::ContainsComponent {
            assemblage,
            component,
        } => {
            let assemblage = resolve_assemblage(bindings, assemblage);
            let component = resolve_component(bindings, component);
            if incoming.contains(&component) && store.is_member(assemblage, component) {
                [component].into()
            } else {
                BTreeSet::new()
            }
        }
        // Per-component predicates cannot narrow without iterating.
        Clause::ActiveAt { .. } | Clause::TextMatches { .. } => incoming.clone(),
        // Each child narrows the previous child's survivors.
        Clause::And(children) => {
            let mut narrowed = incoming.clone();
            for child in children {
                narrowed = possible_components(child, &narrowed, store, bindings);
            }
            narrowed
        }
        Clause::Or(children) | Clause::Xor(children) => {
            let mut union = BTreeSet::new();
            for child in children {
                union.extend(possible_components(child, incoming, store, bindings));
            }
            union
        }
        // The complement may match anything the child does not.
        Clause::Not(_) => incoming.clone(),
    }
}

/// The iteration pass: partitioned fan-out, barrier, merge.
fn run_iteration<Q: Queryable>(
    possible: &BTreeSet<ElementSeq>,
    predicates: &[IterPredicate],
    store: &Q,
    cancel: &CancelToken,
    parallelism: Option<usize>,
) -> QueryResult<Vec<HashSet<ElementSeq>>> {
    let candidates: Vec<ElementSeq> = possible.iter().copied().collect();
    if candidates.is_empty() {
        return Ok(vec![HashSet::new(); predicates.len()]);
    }

    let workers = parallelism
        .unwrap_or_else(rayon::current_num_threads)
        .max(1);
    let chunk_size = candidates.len().div_ceil(workers);
    debug!(
        candidates = candidates.len(),
        workers,
        chunk_size,
        "starting iteration pass"
    );

    let partials: Vec<Vec<HashSet<ElementSeq>>> = candidates
        .par_chunks(chunk_size)
        .map(|partition| {
            let mut local = vec![HashSet::new(); predicates.len()];
            for &sequence in partition {
                if cancel.is_canceled() {
                    return Err(QueryError::Canceled);
                }
                for (slot, predicate) in predicates.iter().enumerate() {
                    if predicate_matches(predicate, sequence, store)? {
                        local[slot].insert(sequence);
                    }
                }
            }
            Ok(local)
        })
        .collect::<QueryResult<_>>()?;

    let mut merged = vec![HashSet::new(); predicates.len()];
    for partial in partials {
        for (slot, matches) in partial.into_iter().enumerate() {
            merged[slot].extend(matches);
        }
    }
    Ok(merged)
}

fn predicate_matches<Q: Queryable>(
    predicate: &IterPredicate,
    sequence: ElementSeq,
    store: &Q,
) -> QueryResult<bool> {
    match predicate {
        IterPredicate::ActiveAt(coordinate) => Ok(store.is_active_at(sequence, coordinate)?),
        IterPredicate::TextMatches(pattern) => Ok(store
            .text_fields(sequence)?
            .iter()
            .any(|text| pattern.is_match(text))),
    }
}

/// Combination pass. `cursor` walks the iteration-leaf caches in the same
/// depth-first order they were filled.
fn combine<Q: Queryable>(
    clause: &Clause,
    incoming: &BTreeSet<ElementSeq>,
    for_set: &BTreeSet<ElementSeq>,
    caches: &[HashSet<ElementSeq>],
    cursor: &mut usize,
    store: &Q,
    bindings: &HashMap<String, Binding>,
) -> BTreeSet<ElementSeq> {
    match clause {
        Clause::MemberOf { assemblage } => {
            let members = store.members_of(resolve_assemblage(bindings, assemblage));
            incoming
                .iter()
                .copied()
                .filter(|sequence| members.binary_search(sequence).is_ok())
                .collect()
        }
        Clause::ContainsComponent {
            assemblage,
            component,
        } => {
            let assemblage = resolve_assemblage(bindings, assemblage);
            let component = resolve_component(bindings, component);
            if incoming.contains(&component) && store.is_member(assemblage, component) {
                [component].into()
            } else {
                BTreeSet::new()
            }
        }
        Clause::ActiveAt { .. } | Clause::TextMatches { .. } => {
            let cache = &caches[*cursor];
            *cursor += 1;
            incoming
                .iter()
                .copied()
                .filter(|sequence| cache.contains(sequence))
                .collect()
        }
        Clause::And(children) => {
            let mut result: Option<BTreeSet<ElementSeq>> = None;
            for child in children {
                let child_result =
                    combine(child, incoming, for_set, caches, cursor, store, bindings);
                result = Some(match result {
                    None => child_result,
                    Some(acc) => acc.intersection(&child_result).copied().collect(),
                });
            }
            result.unwrap_or_default()
        }
        Clause::Or(children) => {
            let mut result = BTreeSet::new();
            for child in children {
                result.extend(combine(child, incoming, for_set, caches, cursor, store, bindings));
            }
            result
        }
        Clause::Xor(children) => {
            let mut result = BTreeSet::new();
            for child in children {
                let child_result =
                    combine(child, incoming, for_set, caches, cursor, store, bindings);
                result = result
                    .symmetric_difference(&child_result)
                    .copied()
                    .collect();
            }
            result
        }
        Clause::Not(child) => {
            // The child is evaluated against the full for-set so the
            // complement covers candidates the narrowing pass excluded.
            let inner = combine(child, for_set, for_set, caches, cursor, store, bindings);
            for_set.difference(&inner).copied().collect()
        }
    }
}

fn resolve_assemblage(bindings: &HashMap<String, Binding>, key: &str) -> ElementSeq {
    match lookup(bindings, key) {
        Ok(Binding::Assemblage(sequence)) => *sequence,
        _ => unreachable!("bindings are validated at query construction"),
    }
}

fn resolve_component(bindings: &HashMap<String, Binding>, key: &str) -> ElementSeq {
    match lookup(bindings, key) {
        Ok(Binding::Component(sequence)) => *sequence,
        _ => unreachable!("bindings are validated at query construction"),
    }
}
