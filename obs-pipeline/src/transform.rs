//! Transform scaffolding (spec §4.1).
//!
//! A `Transform` is a pipeline stage: a guard decides whether it runs at all, `apply` turns an
//! input into zero-or-one outputs. Unlike the upstream design's general directed-acyclic graph
//! of typed next-maps, this crate's nine stages never branch (spec §2), so the pipeline itself
//! is just a fixed `Vec<Box<dyn Transform>>` executed in order on the source strand; each
//! transform's guard verdict still decides `RUN`/`SKIP`/`STOP` exactly as specified.

use obs_types::MappedEntity;

/// The three guard verdicts a transform can return for an incoming entity (spec §4.1).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Call `apply` and forward its result.
    Run,
    /// Forward the entity unchanged, bypassing `apply`.
    Skip,
    /// Drop the entity silently.
    Stop,
}

/// A single pipeline stage.
///
/// Implementors only need `guard` and `apply`; `run` wires the two together with the
/// `Run`/`Skip`/`Stop` semantics so individual transforms never have to repeat that logic.
pub trait Transform: Send {
    /// Decides whether this stage processes `entity` at all.
    fn guard(&self, entity: &MappedEntity) -> Verdict;

    /// Transforms `entity`, returning `None` to terminate this entity's flow (a suppressed
    /// observation, e.g. a duplicate or a sub-period sample).
    fn apply(&mut self, entity: MappedEntity) -> Option<MappedEntity>;

    /// Runs this stage's guard/apply pair. Pipeline assembly calls this, not `apply` directly.
    fn run(&mut self, entity: MappedEntity) -> Option<MappedEntity> {
        match self.guard(&entity) {
            Verdict::Run => self.apply(entity),
            Verdict::Skip => Some(entity),
            Verdict::Stop => None,
        }
    }
}

/// Runs `entity` through every stage in order, short-circuiting as soon as one drops it.
pub fn run_stages(stages: &mut [Box<dyn Transform>], mut entity: MappedEntity) -> Option<MappedEntity> {
    for stage in stages.iter_mut() {
        entity = stage.run(entity)?;
    }
    Some(entity)
}
