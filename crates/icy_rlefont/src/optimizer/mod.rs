//! Dictionary optimization.
//!
//! A session seeds its generator from the store, refreshes the entry
//! scores, runs a fixed number of passes and finally writes a fresh seed
//! back, so consecutive sessions continue one random stream. Every pass
//! asks each [`Mutation`] for an [`Edit`], applies it, re-encodes the font
//! and keeps the edit only if the [`AcceptPolicy`] allows the new size.

use fastrand::Rng;
use serde::{Deserialize, Serialize};

use crate::encoder::{EncodedFont, encode_font};
use crate::glyph_store::{DictEntry, GlyphStore};
use crate::Result;

mod init;
mod mutations;

pub use init::init_dictionary;
pub use mutations::{AddSubstring, CombineEntries, ExpandEntry, RemoveWorst, ReplaceWorst, ToggleRefEncode, TrimEntry};

pub const DEFAULT_PASSES_PER_SESSION: usize = 50;

/// When an edit that does not change the size is kept.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptPolicy {
    /// Keep edits that leave the size unchanged (lateral moves).
    #[default]
    AllowTies,
    /// Keep only edits that shrink the font.
    StrictImprovement,
}

impl AcceptPolicy {
    pub fn accepts(self, new_size: usize, old_size: usize) -> bool {
        match self {
            AcceptPolicy::AllowTies => new_size <= old_size,
            AcceptPolicy::StrictImprovement => new_size < old_size,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerOptions {
    pub passes_per_session: usize,
    #[serde(default)]
    pub acceptance: AcceptPolicy,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            passes_per_session: DEFAULT_PASSES_PER_SESSION,
            acceptance: AcceptPolicy::default(),
        }
    }
}

/// Replacement of one or more dictionary slots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Edit {
    changes: Vec<(usize, DictEntry)>,
}

impl Edit {
    pub fn replace(slot: usize, entry: DictEntry) -> Self {
        Self {
            changes: vec![(slot, entry)],
        }
    }

    pub fn and_replace(mut self, slot: usize, entry: DictEntry) -> Self {
        self.changes.push((slot, entry));
        self
    }

    pub fn changes(&self) -> &[(usize, DictEntry)] {
        &self.changes
    }
}

/// A search strategy. Proposals are evaluated and possibly rolled back by
/// the session, so strategies never touch the store themselves.
pub trait Mutation {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the strategy has nothing to offer for this store.
    fn propose(&self, store: &GlyphStore, rng: &mut Rng) -> Result<Option<Edit>>;
}

/// The strategies run by every pass, in order.
pub fn default_strategies() -> Vec<Box<dyn Mutation>> {
    vec![
        Box::new(TrimEntry),
        Box::new(TrimEntry),
        Box::new(ToggleRefEncode),
        Box::new(CombineEntries),
        Box::new(ExpandEntry),
        Box::new(AddSubstring),
        Box::new(ReplaceWorst),
        Box::new(RemoveWorst),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scoring,
    Searching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeReport {
    pub size_before: usize,
    pub size_after: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub new_seed: u32,
}

/// One optimization session. Holds the store exclusively for its lifetime.
pub struct OptimizerSession<'a> {
    store: &'a mut GlyphStore,
    options: OptimizerOptions,
    strategies: Vec<Box<dyn Mutation>>,
    rng: Rng,
    state: SessionState,
    size_before: usize,
    size: usize,
    accepted: usize,
    rejected: usize,
}

impl<'a> OptimizerSession<'a> {
    pub fn new(store: &'a mut GlyphStore, options: OptimizerOptions) -> Self {
        let rng = Rng::with_seed(u64::from(store.seed()));
        Self {
            store,
            options,
            strategies: default_strategies(),
            rng,
            state: SessionState::Idle,
            size_before: 0,
            size: 0,
            accepted: 0,
            rejected: 0,
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn Mutation>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Idle to Scoring: refreshes every entry's score and the baseline size.
    pub fn score(&mut self) {
        self.state = SessionState::Scoring;
        let encoded = encode_font(self.store);
        apply_scores(self.store, &encoded);
        self.size = encoded.encoded_size();
        self.size_before = self.size;
    }

    /// Scoring to Searching: runs the configured passes.
    pub fn search(&mut self) {
        if self.state == SessionState::Idle {
            self.score();
        }
        self.state = SessionState::Searching;
        for _ in 0..self.options.passes_per_session {
            self.optimize_pass();
        }
    }

    /// Searching to Idle: persists a fresh seed and reports the session.
    pub fn finish(&mut self) -> OptimizeReport {
        if self.state != SessionState::Searching {
            self.search();
        }
        let new_seed = self.rng.u32(..);
        self.store.set_seed(new_seed);
        self.state = SessionState::Idle;

        log::info!(
            "session done: {} -> {} bytes, {} edits kept, {} rejected",
            self.size_before,
            self.size,
            self.accepted,
            self.rejected
        );
        OptimizeReport {
            size_before: self.size_before,
            size_after: self.size,
            accepted: self.accepted,
            rejected: self.rejected,
            new_seed,
        }
    }

    /// Runs a whole session and advances the persisted seed.
    pub fn run(mut self) -> OptimizeReport {
        self.score();
        self.search();
        self.finish()
    }

    /// Offers every strategy one edit.
    pub fn optimize_pass(&mut self) {
        for i in 0..self.strategies.len() {
            let name = self.strategies[i].name();
            let kept = match self.strategies[i].propose(self.store, &mut self.rng) {
                Ok(Some(edit)) => self.evaluate(name, &edit),
                Ok(None) => false,
                Err(err) if err.is_capacity_error() => {
                    log::debug!("{name}: {err}");
                    false
                }
                Err(err) => {
                    log::warn!("{name}: {err}");
                    false
                }
            };
            if kept {
                self.accepted += 1;
            } else {
                self.rejected += 1;
            }
        }
    }

    fn evaluate(&mut self, name: &str, edit: &Edit) -> bool {
        let mut undo = Vec::with_capacity(edit.changes().len());
        for (slot, entry) in edit.changes() {
            match self.store.set_dictionary_entry(*slot, entry.clone()) {
                Ok(previous) => undo.push((*slot, previous)),
                Err(err) => {
                    if err.is_capacity_error() {
                        log::debug!("{name}: {err}");
                    } else {
                        log::warn!("{name}: {err}");
                    }
                    self.rollback(undo);
                    return false;
                }
            }
        }

        let encoded = encode_font(self.store);
        let new_size = encoded.encoded_size();
        if self.options.acceptance.accepts(new_size, self.size) {
            if new_size < self.size {
                log::debug!("{name}: {} -> {new_size}", self.size);
            }
            self.size = new_size;
            apply_scores(self.store, &encoded);
            true
        } else {
            self.rollback(undo);
            false
        }
    }

    fn rollback(&mut self, undo: Vec<(usize, DictEntry)>) {
        for (slot, previous) in undo.into_iter().rev() {
            // restoring a slot that was just written cannot fail
            let _ = self.store.set_dictionary_entry(slot, previous);
        }
    }
}

/// Runs one session with the default strategies.
pub fn optimize(store: &mut GlyphStore, options: &OptimizerOptions) -> OptimizeReport {
    OptimizerSession::new(store, *options).run()
}

/// Recomputes the benefit estimate of every dictionary slot.
pub fn update_scores(store: &mut GlyphStore) {
    let encoded = encode_font(store);
    apply_scores(store, &encoded);
}

/// Score of a slot: pixels saved per use over literal codes, times uses,
/// minus the entry's own storage and offset.
fn apply_scores(store: &mut GlyphStore, encoded: &EncodedFont) {
    let usage = encoded.slot_usage();
    for (slot, hits) in usage.into_iter().enumerate() {
        let entry = store.dictionary_entry(slot);
        let score = if entry.is_empty() {
            0
        } else {
            let saved = hits as i64 * (entry.replacement.len() as i64 - 1);
            let stored = stored_len(encoded, slot) as i64 + 2;
            (saved - stored).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
        };
        store.set_score(slot, score);
    }
}

fn stored_len(encoded: &EncodedFont, slot: usize) -> usize {
    encoded
        .slot_code(slot)
        .and_then(|code| encoded.dictionary.lookup(code))
        .and_then(|entry| encoded.dictionary.get(entry))
        .map_or(0, |entry| entry.bytes().len())
}
