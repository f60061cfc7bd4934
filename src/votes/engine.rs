//! Applies like/dislike toggles against a [`VoteStore`].

use super::{CounterDrift, Disposition, TargetKind, Tally, Transition};
use crate::auth::Identity;
use crate::error::{Error, Result};
use crate::store::{StoreError, TargetLedger, VoteQueries, VoteStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Stateless orchestrator: every call is one unit of work on the store.
pub struct VoteToggleEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for VoteToggleEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: VoteStore + VoteQueries> VoteToggleEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Toggle `requested` for the caller on a target and return the
    /// disposition the caller holds afterwards (`None` after a retraction).
    ///
    /// Anonymous callers are rejected before the store is touched. The
    /// existence check, current-vote lookup, row changes and counter
    /// changes commit together or not at all, and must finish by `deadline`.
    pub fn toggle(
        &self,
        identity: &Identity,
        kind: TargetKind,
        target_id: i64,
        requested: Disposition,
        deadline: Instant,
    ) -> Result<Option<Disposition>> {
        let actor = identity.username().ok_or(Error::Unauthenticated)?;

        let result = self.store.unit_of_work(kind, deadline, |ledger| -> Result<Transition> {
            if !ledger.exists(target_id)? {
                return Err(Error::TargetNotFound {
                    kind,
                    id: target_id,
                });
            }
            let current = ledger.find_vote(actor, target_id)?;
            let transition = Transition::plan(current, requested);
            apply(ledger, actor, target_id, transition)?;
            Ok(transition)
        });

        match result {
            Ok(transition) => {
                tracing::debug!(
                    actor,
                    %kind,
                    target_id,
                    ?transition,
                    "Vote toggled"
                );
                Ok(transition.outcome())
            }
            Err(Error::Persistence(e)) => {
                tracing::warn!(actor, %kind, target_id, "Vote toggle rolled back: {e}");
                Err(Error::Persistence(e))
            }
            Err(e) => Err(e),
        }
    }

    /// The caller's current disposition on a target (`None` when anonymous).
    pub fn disposition_of(
        &self,
        identity: &Identity,
        kind: TargetKind,
        target_id: i64,
    ) -> Result<Option<Disposition>> {
        match identity.username() {
            Some(actor) => Ok(self.store.disposition_of(actor, kind, target_id)?),
            None => Ok(None),
        }
    }

    pub fn tally(&self, kind: TargetKind, target_id: i64) -> Result<Tally> {
        self.store
            .tally(kind, target_id)?
            .ok_or(Error::TargetNotFound {
                kind,
                id: target_id,
            })
    }

    /// Usernames holding `disposition` on a target.
    pub fn voters(
        &self,
        kind: TargetKind,
        target_id: i64,
        disposition: Disposition,
    ) -> Result<Vec<String>> {
        Ok(self.store.voters(kind, target_id, disposition)?)
    }

    /// Per-comment voter lists for every comment under a post.
    pub fn comment_voters(
        &self,
        post_id: i64,
        disposition: Disposition,
    ) -> Result<BTreeMap<i64, Vec<String>>> {
        Ok(self.store.comment_voters(post_id, disposition)?)
    }

    /// Ids of the targets on which `actor` holds `disposition`.
    pub fn voted_by(
        &self,
        actor: &str,
        kind: TargetKind,
        disposition: Disposition,
    ) -> Result<Vec<i64>> {
        Ok(self.store.voted_by(actor, kind, disposition)?)
    }

    /// The `limit` most liked (or most disliked) targets of a kind.
    pub fn ranked(
        &self,
        kind: TargetKind,
        disposition: Disposition,
        limit: u32,
    ) -> Result<Vec<(i64, Tally)>> {
        Ok(self.store.ranked(kind, disposition, limit)?)
    }

    /// Targets whose counters disagree with their vote rows, across both kinds.
    pub fn audit(&self) -> Result<Vec<CounterDrift>> {
        let mut drift = self.store.audit(TargetKind::Post)?;
        drift.extend(self.store.audit(TargetKind::Comment)?);
        Ok(drift)
    }
}

/// Apply one row of the decision table inside an open unit of work.
fn apply(
    ledger: &mut dyn TargetLedger,
    actor: &str,
    target_id: i64,
    transition: Transition,
) -> Result<(), StoreError> {
    if transition.removes().is_some() && !ledger.delete_vote(actor, target_id)? {
        return Err(StoreError::Inconsistent("vote row vanished mid-transition"));
    }
    if let Some(disposition) = transition.inserts() {
        ledger.insert_vote(actor, target_id, disposition)?;
    }
    let (likes, dislikes) = transition.counter_deltas();
    ledger.adjust_counters(target_id, likes, dislikes)
}

// ── Tests ───────────────────────────────────────────────────────
