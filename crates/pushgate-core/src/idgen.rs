//! Unique id generation.

use dashmap::DashMap;

use crate::error::IdGenError;

/// Source of ids unique within a namespace.
///
/// Ids from one generator handle are strictly increasing per namespace, so
/// callers that request them sequentially observe them in request order.
pub trait IdGen: Send + Sync {
    /// Next id in `namespace`.
    fn next_id(&self, namespace: &str) -> Result<i64, IdGenError>;
}

/// Per-namespace counter starting at 1.
///
/// Unique within a process only. Clustered deployments need a generator
/// that coordinates across nodes.
#[derive(Debug, Default)]
pub struct SequenceIdGen {
    counters: DashMap<String, i64>,
}

impl SequenceIdGen {
    /// Fresh generator; every namespace starts at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator whose next id in `namespace` will be `next`.
    pub fn starting_at(namespace: &str, next: i64) -> Self {
        let generator = Self::new();
        generator.counters.insert(namespace.to_owned(), next.saturating_sub(1));
        generator
    }
}

impl IdGen for SequenceIdGen {
    fn next_id(&self, namespace: &str) -> Result<i64, IdGenError> {
        let mut last = self.counters.entry(namespace.to_owned()).or_insert(0);
        let next = last
            .checked_add(1)
            .ok_or_else(|| IdGenError::Exhausted { namespace: namespace.to_owned() })?;
        *last = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_per_namespace() {
        let ids = SequenceIdGen::new();
        assert_eq!(ids.next_id("dispatch").unwrap(), 1);
        assert_eq!(ids.next_id("dispatch").unwrap(), 2);
        assert_eq!(ids.next_id("other").unwrap(), 1);
        assert_eq!(ids.next_id("dispatch").unwrap(), 3);
    }

    #[test]
    fn exhausted_namespace_errors_without_wrapping() {
        let ids = SequenceIdGen::starting_at("dispatch", i64::MAX);
        assert_eq!(ids.next_id("dispatch").unwrap(), i64::MAX);
        assert_eq!(
            ids.next_id("dispatch"),
            Err(IdGenError::Exhausted { namespace: "dispatch".to_owned() })
        );
        assert_eq!(ids.next_id("other").unwrap(), 1);
    }

    #[test]
    fn concurrent_callers_never_share_an_id() {
        let ids = std::sync::Arc::new(SequenceIdGen::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || {
                    (0..250).map(|_| ids.next_id("dispatch").unwrap()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
