//! A small particle simulation driven by live query sets.

use anyhow::Result;
use glam::Vec2;
use kindred_ecs::{BoxError, Component, Entity, QueryHandle, World};
use rand::Rng;
use tracing::{debug, info};

use crate::settings::{Settings, SimulationSettings};

/// Position in world units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position(pub Vec2);
impl Component for Position {}

/// Velocity in world units per second
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity(pub Vec2);
impl Component for Velocity {}

/// Remaining ticks before the entity is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetime(pub u32);
impl Component for Lifetime {}

/// Recorded path of a particle. Flushed when the component goes away.
#[derive(Debug, Default)]
pub struct Trail {
    pub points: Vec<Vec2>,
}

impl Component for Trail {
    fn release(&mut self) -> Result<(), BoxError> {
        debug!(points = self.points.len(), "flushing trail");
        self.points.clear();
        Ok(())
    }
}

/// Per-tick counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub moved: usize,
    pub expired: usize,
}

pub struct Simulation {
    world: World,
    moving: QueryHandle,
    mortal: QueryHandle,
    trails: QueryHandle,
    time_step: f32,
}

impl Simulation {
    /// Build a world and spawn the initial particles.
    pub fn new(settings: &Settings, rng: &mut impl Rng) -> Result<Self> {
        let mut world = World::with_config(&settings.world);

        let moving = world.create_set_containing::<(Position, Velocity)>();
        let mortal = world.create_set_containing::<(Lifetime,)>();
        let trails = world.create_set_containing::<(Position, Trail)>();

        let mut sim = Self {
            world,
            moving,
            mortal,
            trails,
            time_step: settings.simulation.time_step,
        };
        sim.spawn(&settings.simulation, rng)?;
        Ok(sim)
    }

    fn spawn(&mut self, settings: &SimulationSettings, rng: &mut impl Rng) -> Result<()> {
        for i in 0..settings.entity_count {
            let entity = self.world.create(Some(&format!("particle-{i}")));
            let position = Vec2::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0));
            let velocity = Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            self.world.attach(entity, Position(position))?;
            self.world.attach(entity, Velocity(velocity))?;
            self.world
                .attach(entity, Lifetime(rng.gen_range(1..=settings.max_lifetime.max(1))))?;
            if i % 2 == 0 {
                self.world.attach(entity, Trail::default())?;
            }
        }
        info!(entities = self.world.len(), "spawned particles");
        Ok(())
    }

    /// Advance one tick: move everything with a velocity, age everything mortal.
    pub fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();

        // Membership is copied out because moving and releasing mutate the world.
        for entity in self.members(self.moving) {
            let Some(&Velocity(velocity)) = self.world.get::<Velocity>(entity) else {
                continue;
            };
            let step = velocity * self.time_step;
            if let Some(position) = self.world.update(entity, |p: &mut Position| {
                p.0 += step;
                p.0
            }) {
                self.world.update(entity, |t: &mut Trail| t.points.push(position));
                report.moved += 1;
            }
        }

        for entity in self.members(self.mortal) {
            let remaining = self.world.update(entity, |l: &mut Lifetime| {
                l.0 = l.0.saturating_sub(1);
                l.0
            });
            if remaining == Some(0) {
                self.world.release(entity)?;
                report.expired += 1;
            }
        }
        Ok(report)
    }

    /// Run `ticks` ticks, returning the summed report.
    pub fn run(&mut self, ticks: u32) -> Result<TickReport> {
        let mut total = TickReport::default();
        for tick in 0..ticks {
            let report = self.tick()?;
            total.moved += report.moved;
            total.expired += report.expired;
            debug!(tick, moved = report.moved, expired = report.expired, "tick complete");
            if self.world.is_empty() {
                info!(tick, "all particles expired");
                break;
            }
        }
        Ok(total)
    }

    fn members(&self, handle: QueryHandle) -> Vec<Entity> {
        self.world
            .query(handle)
            .map(|set| set.iter().collect())
            .unwrap_or_default()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Entities currently recording a trail.
    pub fn trail_count(&self) -> usize {
        self.world.query(self.trails).map_or(0, |set| set.len())
    }
}
