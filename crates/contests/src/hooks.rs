//! Side effects that run when a contest enters a state.

use std::collections::HashMap;

use storage::models::{Contest, ContestState};
use storage::traits::Store;
use tracing::info;

use crate::error::{ContestError, Result};

/// Runs after a transition into the state it is registered for was
/// authorized, before the new state is stored. A failing hook aborts the
/// transition.
#[async_trait::async_trait]
pub trait TransitionHook<S: ?Sized>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, store: &S, contest: &Contest) -> Result<()>;
}

/// Hooks keyed by the state that triggers them
pub struct TransitionHooks<S: ?Sized> {
    hooks: HashMap<ContestState, Vec<Box<dyn TransitionHook<S>>>>,
}

impl<S: ?Sized> TransitionHooks<S> {
    pub fn empty() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    pub fn register(&mut self, state: ContestState, hook: Box<dyn TransitionHook<S>>) {
        self.hooks.entry(state).or_default().push(hook);
    }

    pub fn for_state(&self, state: ContestState) -> &[Box<dyn TransitionHook<S>>] {
        self.hooks.get(&state).map(Vec::as_slice).unwrap_or(&[])
    }

    pub async fn run(&self, state: ContestState, store: &S, contest: &Contest) -> Result<()> {
        for hook in self.for_state(state) {
            hook.run(store, contest).await?;
        }
        Ok(())
    }
}

impl<S: Store + ?Sized> Default for TransitionHooks<S> {
    fn default() -> Self {
        let mut hooks = Self::empty();
        hooks.register(ContestState::Published, Box::new(ClearUnpublishedFlags));
        hooks
    }
}

/// Makes every round and result of a published contest visible
pub struct ClearUnpublishedFlags;

#[async_trait::async_trait]
impl<S: Store + ?Sized> TransitionHook<S> for ClearUnpublishedFlags {
    fn name(&self) -> &'static str {
        "clear_unpublished_flags"
    }

    async fn run(&self, store: &S, contest: &Contest) -> Result<()> {
        info!("Publishing competition {}", contest.competition_id);

        let publish = async {
            let rounds = store.publish_rounds(&contest.competition_id).await?;
            let results = store.publish_results(&contest.competition_id).await?;
            Ok::<_, storage::error::StorageError>((rounds, results))
        };

        let (rounds, results) = publish.await.map_err(|e| {
            ContestError::Internal(format!("Error while publishing competition: {}", e))
        })?;

        info!(
            "Published {} rounds and {} results of {}",
            rounds, results, contest.competition_id
        );
        Ok(())
    }
}
