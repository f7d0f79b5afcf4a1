//! Per-tick throttle for queued map-tile creation.
//!
//! Each tick takes at most two jobs, then one more if any remain, so a large
//! level trickles into the world instead of stalling a single tick. A job that
//! fails is logged and dropped; the rest of the tick's jobs still run.

use std::collections::VecDeque;

use anyhow::anyhow;
use tracing::{debug, error};

use crate::{
    autotile,
    ecs::{EntityId, EntityStore},
    ingest::IngestionJob,
    physics::PhysicsSpace,
    tile::{TileCoord, TileIndex},
};

const FIRST_BATCH: usize = 2;
const SECOND_BATCH: usize = 1;

/// Most jobs a single tick will run.
pub const JOBS_PER_TICK: usize = FIRST_BATCH + SECOND_BATCH;

/// FIFO of pending map-tile jobs.
#[derive(Debug, Default)]
pub struct IngestQueue {
    jobs: VecDeque<IngestionJob>,
}

/// Outcome of one drained tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub placed: Vec<(TileCoord, EntityId)>,
    pub failed: usize,
}

impl IngestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: IngestionJob) {
        self.jobs.push_back(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Pending jobs in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &IngestionJob> {
        self.jobs.iter()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    fn take_batch(&mut self, n: usize) -> Vec<IngestionJob> {
        let n = n.min(self.jobs.len());
        self.jobs.drain(..n).collect()
    }

    /// Runs this tick's share of the queue.
    pub fn drain_tick<S: EntityStore, P: PhysicsSpace>(
        &mut self,
        index: &mut TileIndex,
        store: &mut S,
        space: &mut P,
    ) -> DrainReport {
        let mut batch = self.take_batch(FIRST_BATCH);
        if !self.jobs.is_empty() {
            batch.extend(self.take_batch(SECOND_BATCH));
        }

        let mut report = DrainReport::default();
        for job in batch {
            let coord = job.coord();
            match run_job(&job, index, store, space) {
                Ok(entity) => report.placed.push((coord, entity)),
                Err(e) => {
                    error!(%coord, code = job.code, source = %job.source, error = %format!("{e:#}"), "Map tile job failed");
                    report.failed += 1;
                }
            }
        }

        if !report.placed.is_empty() || report.failed > 0 {
            debug!(
                placed = report.placed.len(),
                failed = report.failed,
                remaining = self.jobs.len(),
                "Ingestion tick"
            );
        }
        report
    }
}

fn run_job<S: EntityStore, P: PhysicsSpace>(
    job: &IngestionJob,
    index: &mut TileIndex,
    store: &mut S,
    space: &mut P,
) -> anyhow::Result<EntityId> {
    let coord = job.coord();
    if let Some(existing) = index.get(coord) {
        return Err(anyhow!("cell {coord} already holds entity {}", existing.0));
    }

    let entity = job.execute(store, space)?;
    if let Err(e) = index.insert(coord, entity) {
        space.detach(entity);
        store.remove_entity(entity);
        return Err(e.into());
    }

    autotile::recompute(index, store, &[coord], true, true);
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        components::{BodyShape, TileKind, TileVariant},
        ecs::World,
        math::Vec3,
        physics::NullSpace,
    };

    fn job(x: f64, y: f64, code: u16) -> IngestionJob {
        IngestionJob {
            source: Arc::from("t.lvl"),
            code,
            location: Vec3::new(x, y, 0.0),
            kind: TileKind::Legacy,
            created_at: 0,
        }
    }

    /// Refuses bodies at one x position.
    struct HoleAt(f64);

    impl PhysicsSpace for HoleAt {
        fn attach(&mut self, _entity: EntityId, _shape: BodyShape, at: Vec3) -> anyhow::Result<()> {
            if at.x == self.0 {
                anyhow::bail!("no room at x={}", at.x);
            }
            Ok(())
        }

        fn detach(&mut self, _entity: EntityId) {}
    }

    #[test]
    fn five_jobs_take_two_ticks() {
        let mut queue = IngestQueue::new();
        for i in 0..5 {
            queue.push(job(f64::from(i) * 4.0, 0.0, 1));
        }
        let mut index = TileIndex::new();
        let mut world = World::default();

        let first = queue.drain_tick(&mut index, &mut world, &mut NullSpace);
        assert_eq!(first.placed.len(), 3);
        assert_eq!(queue.len(), 2);

        let second = queue.drain_tick(&mut index, &mut world, &mut NullSpace);
        assert_eq!(second.placed.len(), 2);
        assert!(queue.is_empty());
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn never_more_than_three_per_tick() {
        let mut queue = IngestQueue::new();
        for i in 0..7 {
            queue.push(job(f64::from(i) * 2.0, 0.0, 1));
        }
        let mut index = TileIndex::new();
        let mut world = World::default();

        let per_tick: Vec<usize> = (0..4)
            .map(|_| queue.drain_tick(&mut index, &mut world, &mut NullSpace).placed.len())
            .collect();
        assert_eq!(per_tick, vec![3, 3, 1, 0]);
        assert!(per_tick.iter().all(|n| *n <= JOBS_PER_TICK));
    }

    #[test]
    fn failed_job_is_dropped_and_others_run() {
        let mut queue = IngestQueue::new();
        queue.push(job(0.0, 0.0, 1));
        queue.push(job(10.0, 0.0, 2));
        queue.push(job(20.0, 0.0, 3));
        queue.push(job(30.0, 0.0, 4));
        let mut index = TileIndex::new();
        let mut world = World::default();

        let report = queue.drain_tick(&mut index, &mut world, &mut HoleAt(10.0));

        assert_eq!(report.failed, 1);
        assert_eq!(
            report.placed.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
            vec![TileCoord::new(0, 0), TileCoord::new(20, 0)]
        );
        assert!(!index.contains(TileCoord::new(10, 0)));
        assert_eq!(world.len(), 2);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn occupied_cell_fails_without_entity() {
        let mut queue = IngestQueue::new();
        queue.push(job(2.4, 3.9, 1));
        let mut index = TileIndex::new();
        let mut world = World::default();
        index.insert(TileCoord::new(2, 3), EntityId(99)).unwrap();

        let report = queue.drain_tick(&mut index, &mut world, &mut NullSpace);

        assert_eq!(report.failed, 1);
        assert!(world.is_empty());
        assert_eq!(index.get(TileCoord::new(2, 3)), Some(EntityId(99)));
    }

    #[test]
    fn placed_tiles_are_auto_tiled() {
        let mut queue = IngestQueue::new();
        queue.push(job(0.0, 0.0, 1));
        queue.push(job(1.0, 0.0, 1));
        queue.push(job(5.0, 5.0, 1));
        let mut index = TileIndex::new();
        let mut world = World::default();

        let report = queue.drain_tick(&mut index, &mut world, &mut NullSpace);
        let west = report.placed[0].1;
        let east = report.placed[1].1;

        assert_eq!(world.get::<TileVariant>(west), Some(&TileVariant { mask: 4 }));
        assert_eq!(world.get::<TileVariant>(east), Some(&TileVariant { mask: 64 }));
    }
}
