//! Query construction, let-bindings, and options.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;
use termdb_types::{ElementSeq, StampCoordinate};

use crate::clause::Clause;
use crate::error::{QueryError, QueryResult};

/// The candidate universe a query is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForSet {
    /// Every concept.
    Concepts,
    /// Every component: concepts and semantic annotations.
    Components,
}

/// A named parameter referenced by clauses.
///
/// Bindings are resolved once, when the query is constructed; evaluation
/// never touches them again.
#[derive(Debug, Clone)]
pub enum Binding {
    /// An assemblage, by element sequence.
    Assemblage(ElementSeq),
    /// A single component, by element sequence.
    Component(ElementSeq),
    /// A stamp coordinate.
    Coordinate(StampCoordinate),
    /// A regular-expression pattern for text matching.
    Pattern(String),
}

/// Engine configuration for one query.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Whether clauses requiring the iteration phase are allowed.
    ///
    /// When false, constructing a query whose tree declares the iteration
    /// phase fails with [`QueryError::IterationForbidden`] before any
    /// evaluation begins.
    pub allow_iteration: bool,
    /// Number of iteration partitions. Defaults to the rayon thread count.
    pub parallelism: Option<usize>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            allow_iteration: true,
            parallelism: None,
        }
    }
}

/// Cooperative cancellation for the iteration pass.
///
/// Workers poll the token at every unit of work and exit early once it is
/// flipped; nothing is forcibly interrupted. There is no built-in timeout:
/// a surrounding driver imposes one by canceling the token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A compiled iteration predicate, one per iteration-phase leaf, in the
/// tree's depth-first leaf order.
#[derive(Debug, Clone)]
pub(crate) enum IterPredicate {
    ActiveAt(StampCoordinate),
    TextMatches(Regex),
}

/// A validated, ready-to-evaluate query.
///
/// Construction resolves every let-binding, compiles text patterns, and
/// rejects grammar misuse; [`Query::compute`](crate::Query::compute) can
/// then run any number of times against any store.
#[derive(Debug)]
pub struct Query {
    pub(crate) for_set: ForSet,
    pub(crate) root: Clause,
    pub(crate) options: QueryOptions,
    pub(crate) bindings: HashMap<String, Binding>,
    pub(crate) iter_predicates: Vec<IterPredicate>,
}

impl Query {
    /// Builds a query with default options.
    pub fn new(
        for_set: ForSet,
        bindings: HashMap<String, Binding>,
        root: Clause,
    ) -> QueryResult<Self> {
        Self::with_options(for_set, bindings, root, QueryOptions::default())
    }

    /// Builds a query with explicit options.
    ///
    /// Fails when a combinator is empty, a let key is unbound or bound to
    /// the wrong kind, a pattern does not compile, or the tree requires
    /// iteration while `options.allow_iteration` is false.
    pub fn with_options(
        for_set: ForSet,
        bindings: HashMap<String, Binding>,
        root: Clause,
        options: QueryOptions,
    ) -> QueryResult<Self> {
        validate_tree(&root)?;

        let phases = root.phases();
        if phases.iteration && !options.allow_iteration {
            return Err(QueryError::IterationForbidden);
        }

        let mut iter_predicates = Vec::new();
        let mut first_error = None;
        root.for_each_iteration_leaf(&mut |leaf| {
            if first_error.is_some() {
                return;
            }
            match compile_leaf(leaf, &bindings) {
                Ok(predicate) => iter_predicates.push(predicate),
                Err(err) => first_error = Some(err),
            }
        });
        if let Some(err) = first_error {
            return Err(err);
        }

        // Pre-iteration leaves only need their bindings checked.
        check_narrowing_bindings(&root, &bindings)?;

        Ok(Self {
            for_set,
            root,
            options,
            bindings,
            iter_predicates,
        })
    }

    /// The candidate universe this query runs against.
    pub fn for_set(&self) -> ForSet {
        self.for_set
    }

    /// The root of the clause tree.
    pub fn root(&self) -> &Clause {
        &self.root
    }
}

fn validate_tree(clause: &Clause) -> QueryResult<()> {
    match clause {
        Clause::And(children) | Clause::Or(children) | Clause::Xor(children) => {
            if children.is_empty() {
                return Err(QueryError::EmptyCombinator {
                    kind: match clause {
                        Clause::And(_) => "AND",
                        Clause::Or(_) => "OR",
                        _ => "XOR",
                    },
                });
            }
            children.iter().try_for_each(validate_tree)
        }
        Clause::Not(child) => validate_tree(child),
        _ => Ok(()),
    }
}

fn compile_leaf(leaf: &Clause, bindings: &HashMap<String, Binding>) -> QueryResult<IterPredicate> {
    match leaf {
        Clause::ActiveAt { coordinate } => match lookup(bindings, coordinate)? {
            Binding::Coordinate(coordinate) => Ok(IterPredicate::ActiveAt(coordinate.clone())),
            _ => Err(QueryError::BindingKind {
                key: coordinate.clone(),
                expected: "coordinate",
            }),
        },
        Clause::TextMatches { pattern } => match lookup(bindings, pattern)? {
            Binding::Pattern(pattern) => Ok(IterPredicate::TextMatches(Regex::new(pattern)?)),
            _ => Err(QueryError::BindingKind {
                key: pattern.clone(),
                expected: "pattern",
            }),
        },
        _ => unreachable!("only iteration leaves are compiled"),
    }
}

fn check_narrowing_bindings(
    clause: &Clause,
    bindings: &HashMap<String, Binding>,
) -> QueryResult<()> {
    match clause {
        Clause::MemberOf { assemblage } => {
            expect_assemblage(bindings, assemblage)?;
            Ok(())
        }
        Clause::ContainsComponent {
            assemblage,
            component,
        } => {
            expect_assemblage(bindings, assemblage)?;
            match lookup(bindings, component)? {
                Binding::Component(_) => Ok(()),
                _ => Err(QueryError::BindingKind {
                    key: component.clone(),
                    expected: "component",
                }),
            }
        }
        Clause::ActiveAt { .. } | Clause::TextMatches { .. } => Ok(()),
        Clause::And(children) | Clause::Or(children) | Clause::Xor(children) => children
            .iter()
            .try_for_each(|child| check_narrowing_bindings(child, bindings)),
        Clause::Not(child) => check_narrowing_bindings(child, bindings),
    }
}

fn expect_assemblage(
    bindings: &HashMap<String, Binding>,
    key: &str,
) -> QueryResult<ElementSeq> {
    match lookup(bindings, key)? {
        Binding::Assemblage(sequence) => Ok(*sequence),
        _ => Err(QueryError::BindingKind {
            key: key.to_string(),
            expected: "assemblage",
        }),
    }
}

pub(crate) fn lookup<'a>(
    bindings: &'a HashMap<String, Binding>,
    key: &str,
) -> QueryResult<&'a Binding> {
    bindings.get(key).ok_or_else(|| QueryError::UnboundKey {
        key: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: Vec<(&str, Binding)>) -> HashMap<String, Binding> {
        pairs
            .into_iter()
            .map(|(key, binding)| (key.to_string(), binding))
            .collect()
    }

    #[test]
    fn test_unbound_key_rejected() {
        let root = Clause::MemberOf {
            assemblage: "missing".to_string(),
        };
        let result = Query::new(ForSet::Components, HashMap::new(), root);
        assert!(matches!(result, Err(QueryError::UnboundKey { key }) if key == "missing"));
    }

    #[test]
    fn test_wrong_binding_kind_rejected() {
        let root = Clause::MemberOf {
            assemblage: "a".to_string(),
        };
        let lets = bindings(vec![("a", Binding::Pattern("oops".to_string()))]);
        let result = Query::new(ForSet::Components, lets, root);
        assert!(matches!(result, Err(QueryError::BindingKind { .. })));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let root = Clause::TextMatches {
            pattern: "p".to_string(),
        };
        let lets = bindings(vec![("p", Binding::Pattern("(unclosed".to_string()))]);
        let result = Query::new(ForSet::Components, lets, root);
        assert!(matches!(result, Err(QueryError::InvalidPattern(_))));
    }

    #[test]
    fn test_iteration_forbidden_rejected_up_front() {
        let root = Clause::ActiveAt {
            coordinate: "view".to_string(),
        };
        let lets = bindings(vec![(
            "view",
            Binding::Coordinate(termdb_types::StampCoordinate::latest_on(-5)),
        )]);
        let options = QueryOptions {
            allow_iteration: false,
            parallelism: None,
        };
        let result = Query::with_options(ForSet::Components, lets, root, options);
        assert!(matches!(result, Err(QueryError::IterationForbidden)));
    }

    #[test]
    fn test_empty_combinator_rejected() {
        let root = Clause::And(vec![]);
        let result = Query::new(ForSet::Components, HashMap::new(), root);
        assert!(matches!(result, Err(QueryError::EmptyCombinator { .. })));
    }

    #[test]
    fn test_cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());
        token.cancel();
        token.cancel();
        assert!(token.is_canceled());
    }
}
