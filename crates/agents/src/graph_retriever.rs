//! Graph retrieval - facts around the entities of a question

use crate::config::RetrievalConfig;
use crate::ports::GraphStore;
use crate::retry::call_with_retry;
use crate::Result;
use graphrag_core::{Entity, GraphFact, Outcome, RetrievalWarning};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Collects graph facts reachable from the extracted entities
pub struct GraphRetriever {
    store: Arc<dyn GraphStore>,
    config: RetrievalConfig,
}

impl GraphRetriever {
    pub fn new(store: Arc<dyn GraphStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    /// Facts within `max_depth` hops of any entity, at most `max_facts`.
    ///
    /// Entities are queried concurrently but the result is assembled in
    /// entity order, so equal inputs give equal outputs. Only when every
    /// issued query fails is [`RetrievalWarning::GraphUnavailable`] raised.
    #[instrument(skip(self, entities), fields(entities = entities.len()))]
    pub async fn retrieve_graph(
        &self,
        entities: &[Entity],
        max_depth: usize,
        max_facts: usize,
    ) -> Outcome<Vec<GraphFact>> {
        if entities.is_empty() {
            return Outcome::ok(Vec::new());
        }

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_queries.max(1)));
        let mut tasks = JoinSet::new();

        for (index, entity) in entities.iter().enumerate() {
            let store = Arc::clone(&self.store);
            let permits = Arc::clone(&permits);
            let config = self.config.clone();
            let name = entity.name.clone();

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = facts_for_entity(store.as_ref(), &config, &name, max_depth).await;
                (index, name, result)
            });
        }

        let mut per_entity: Vec<Option<Vec<GraphFact>>> = vec![None; entities.len()];
        let mut failed = 0;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(facts))) => per_entity[index] = Some(facts),
                Ok((_, name, Err(e))) => {
                    warn!("Graph query for '{}' failed: {}", name, e);
                    failed += 1;
                }
                Err(e) => {
                    warn!("Graph query task aborted: {}", e);
                    failed += 1;
                }
            }
        }

        if failed == entities.len() {
            return Outcome::degraded(Vec::new(), RetrievalWarning::GraphUnavailable { failed });
        }

        let facts = order_facts(per_entity.into_iter().flatten().flatten(), max_facts);
        info!("Retrieved {} graph facts ({} queries failed)", facts.len(), failed);
        Outcome::ok(facts)
    }
}

async fn facts_for_entity(
    store: &dyn GraphStore,
    config: &RetrievalConfig,
    name: &str,
    max_depth: usize,
) -> Result<Vec<GraphFact>> {
    let exists = call_with_retry(&config.retry, config.call_timeout, "graph lookup", || {
        store.node_exists(name)
    })
    .await?;

    if !exists {
        debug!("Entity '{}' is not in the graph", name);
        return Ok(Vec::new());
    }

    call_with_retry(&config.retry, config.call_timeout, "graph traversal", || {
        store.traverse(name, max_depth)
    })
    .await
}

/// Sort by depth then score, drop repeated triples, keep the first `max_facts`.
///
/// The sort is stable, so facts that compare equal stay in arrival order.
pub fn order_facts(facts: impl IntoIterator<Item = GraphFact>, max_facts: usize) -> Vec<GraphFact> {
    let mut facts: Vec<GraphFact> = facts.into_iter().collect();
    facts.sort_by(compare_facts);

    let mut seen = HashSet::new();
    facts.retain(|fact| seen.insert(fact.key()));
    facts.truncate(max_facts);
    facts
}

// A NaN score counts as no score
fn compare_facts(a: &GraphFact, b: &GraphFact) -> Ordering {
    let score = |fact: &GraphFact| fact.score.filter(|s| !s.is_nan());
    a.depth.cmp(&b.depth).then_with(|| match (score(a), score(b)) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}
