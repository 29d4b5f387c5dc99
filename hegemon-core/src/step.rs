//! The tick dispatcher and command pipeline.
//!
//! [`Simulation`] owns the authoritative state and everything that reacts
//! to it. Per tick: time advances, tick events fan out (subscribers may
//! only enqueue commands), systems run in dependency order, queued commands
//! apply in submission order, and the barrier swaps the province buffers
//! and publishes state-change events. [`Simulation::submit`] is the sole
//! external mutation entry point.

use crate::calendar::{GameTime, DAYS_PER_WEEK};
use crate::clock::{ClockError, TimeManager};
use crate::command::{Command, CommandLog, Effects, RejectReason};
use crate::config::SimConfig;
use crate::events::{
    CommandBuffer, CompositeDisposable, DailyTick, Event, EventBus, HourlyTick, MonthlyTick,
    PeaceMade, PendingEvent, PostLoadFinalize, ProvinceOwnershipChanged, UnitCreated, WarDeclared,
    WeeklyTick, YearlyTick,
};
use crate::fixed::Fixed;
use crate::ids::{ProvinceId, UnitId};
use crate::metrics::SimMetrics;
use crate::modifiers::TimedModifier;
use crate::pathfind::{PathContext, PathOptions, PathResult, Pathfinder, StandardMovement};
use crate::provinces::OwnershipChange;
use crate::state::GameState;
use crate::systems;
use crate::units::MovementOrder;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Opinion gained per unit of treasury spent on improving relations.
const IMPROVE_RELATIONS_RATE: (i64, i64) = (1, 2);
/// Opinion penalty a war declaration attaches to the pair.
const DECLARED_WAR_OPINION: i64 = -50;
/// The war penalty decays over five years.
const DECLARED_WAR_DECAY_TICKS: u32 = 5 * 360 * 24;
/// Barrier cascade bound: rounds of publish→command→apply per barrier.
const MAX_EVENT_CASCADE: usize = 16;

/// The running simulation.
pub struct Simulation {
    pub state: GameState,
    pub bus: EventBus,
    pub clock: TimeManager,
    pub pathfinder: Pathfinder,
    pub scheduler: crate::ai::AiScheduler,
    pub command_log: CommandLog,
    pub config: SimConfig,
    pub metrics: SimMetrics,
    /// Commands awaiting application, in submission order.
    queue: Vec<Command>,
    /// State-change events awaiting the barrier.
    pending_events: Vec<PendingEvent>,
    handler_buffer: CommandBuffer,
    ownership_changes: Vec<OwnershipChange>,
    scratch_units: Vec<UnitId>,
    scratch_roster: Vec<(ProvinceId, UnitId)>,
}

impl Simulation {
    pub fn new(state: GameState, config: SimConfig) -> Self {
        let scheduler =
            crate::ai::AiScheduler::new(Duration::from_millis(config.ai_timeout_ms));
        Self {
            pathfinder: Pathfinder::with_capacity(config.path_cache_capacity),
            command_log: CommandLog::new(config.command_log_ticks),
            scheduler,
            clock: TimeManager::new(Fixed::ONE),
            bus: EventBus::new(),
            metrics: SimMetrics::default(),
            queue: Vec::with_capacity(256),
            pending_events: Vec::with_capacity(256),
            handler_buffer: CommandBuffer::with_capacity(64),
            ownership_changes: Vec::with_capacity(64),
            scratch_units: Vec::with_capacity(256),
            scratch_roster: Vec::with_capacity(256),
            state,
            config,
        }
    }

    /// Install the stock gameplay policies (alliance auto-join). The
    /// returned group detaches them.
    pub fn install_default_handlers(&mut self) -> CompositeDisposable {
        crate::alliance::install_alliance_policy(&mut self.bus)
    }

    /// Register the stock AI goals against this scenario's registries.
    pub fn install_default_goals(&mut self) {
        let gold = self.state.well_known.gold;
        if self.state.buildings.count() > 0 {
            let building = crate::ids::BuildingTypeId(1);
            let cost = self
                .state
                .buildings
                .get(building)
                .map(|d| d.cost)
                .unwrap_or(Fixed::from_int(50));
            self.scheduler
                .register(Box::new(crate::ai::goals::DevelopEconomy::new(
                    gold, building, cost,
                )));
        }
        self.scheduler
            .register(Box::new(crate::ai::goals::ImproveStanding::new(
                gold,
                Fixed::from_int(10),
            )));
        self.scheduler
            .register(Box::new(crate::ai::goals::Expand::new(
                gold,
                Fixed::from_int(50),
            )));
        if self.state.unit_types.count() > 0 {
            self.scheduler
                .register(Box::new(crate::ai::goals::Mobilize::new(
                    crate::ids::UnitTypeId(1),
                )));
        }
    }

    /// Submit one command from outside the tick loop (player, network,
    /// console). Validates, applies, and runs a barrier so the effects are
    /// visible to queries immediately.
    pub fn submit(&mut self, command: Command) -> Result<Effects, RejectReason> {
        let effects = self.execute_command(&command)?;
        self.command_log.push(self.state.tick, command);
        self.metrics.commands_applied += 1;
        self.barrier();
        Ok(effects)
    }

    /// Advance one in-game hour.
    #[instrument(skip_all, name = "sim_tick")]
    pub fn tick(&mut self) {
        let tick_start = Instant::now();

        self.state.tick += 1;
        let rollover = self.state.time.advance_hour();
        let tick = self.state.tick;
        let time = self.state.time;

        // 1. Tick fan-out, hour → year. Handlers only enqueue commands.
        self.publish(&HourlyTick { tick, time });
        if rollover.day {
            self.publish(&DailyTick { tick, time });
            if time.total_days() % DAYS_PER_WEEK == 0 {
                self.publish(&WeeklyTick { tick, time });
            }
        }
        if rollover.month {
            self.publish(&MonthlyTick { tick, time });
        }
        if rollover.year {
            self.publish(&YearlyTick { tick, time });
        }

        // 2. Systems in dependency order. Diplomacy decay runs before AI
        // scheduling on monthly ticks.
        if rollover.month {
            let started = Instant::now();
            let removed = self.state.diplomacy.run_decay(tick);
            self.metrics.modifiers_compacted += removed as u64;
            self.metrics.diplomacy_time += started.elapsed();
            if removed > 0 {
                log::debug!("diplomacy decay compacted {removed} modifiers at {time}");
            }

            let started = Instant::now();
            systems::run_economy_tick(&mut self.state, tick);
            self.metrics.economy_time += started.elapsed();
        }

        let started = Instant::now();
        systems::run_movement_tick(
            &mut self.state,
            tick,
            &mut self.pending_events,
            &mut self.scratch_units,
        );
        self.metrics.movement_time += started.elapsed();

        let started = Instant::now();
        systems::run_combat_tick(
            &mut self.state,
            tick,
            &mut self.pending_events,
            &mut self.scratch_roster,
        );
        self.metrics.combat_time += started.elapsed();

        if rollover.day {
            let started = Instant::now();
            let day = time.day;
            self.scheduler
                .run_strategic(&mut self.state, day, tick, &mut self.queue);
            self.metrics.ai_time += started.elapsed();
        }

        // 3. Apply queued commands in submission order, then the barrier.
        self.drain_queue();
        self.barrier();

        self.command_log.prune(tick);

        if self.config.checksum_frequency > 0
            && tick % self.config.checksum_frequency as u64 == 0
        {
            log::debug!(
                "tick {tick}: checksum={:08x}",
                crate::save::state_checksum(&self.state)
            );
        }

        self.metrics.total_ticks += 1;
        self.metrics.total_time += tick_start.elapsed();
        self.metrics.path_cache = self.pathfinder.stats();
    }

    /// Run a batch of hours.
    pub fn run_hours(&mut self, hours: u64) {
        for _ in 0..hours {
            self.tick();
        }
    }

    /// Feed a real-time delta; the clock decides how many hours to run.
    pub fn update(&mut self, real_delta_seconds: Fixed) {
        let hours = self.clock.update(real_delta_seconds);
        self.run_hours(hours as u64);
    }

    /// Multiplayer resync: fast-forward hour-by-hour to `target`.
    /// Backward sync is a hard error.
    pub fn synchronize_to_tick(&mut self, target: u64) -> Result<u64, ClockError> {
        let hours = self.clock.hours_to_synchronize(self.state.tick, target)?;
        self.clock.reset_accumulator();
        self.run_hours(hours);
        Ok(hours)
    }

    /// Resync primitive: force the tick counter (and the calendar with it)
    /// without running systems. The authoritative host uses this when a
    /// snapshot transfer, not replay, established the new state; prefer
    /// [`synchronize_to_tick`](Self::synchronize_to_tick) otherwise.
    pub fn set_current_tick(&mut self, target: crate::ids::Tick) {
        let delta = target as i64 - self.state.tick as i64;
        let hours = self.state.time.to_total_hours() as i64 + delta;
        self.state.time = GameTime::from_total_hours(hours.max(0) as u64);
        self.state.tick = target;
        self.clock.reset_accumulator();
    }

    /// Rebuild caches after a snapshot restore and let external caches know.
    pub fn finalize_load(&mut self) {
        self.pathfinder.invalidate();
        self.queue.clear();
        self.pending_events.clear();
        self.command_log.clear();
        let tick = self.state.tick;
        self.publish(&PostLoadFinalize { tick });
        // Post-load notifications must not mutate: drop anything a stray
        // handler enqueued.
        if !self.queue.is_empty() {
            log::warn!(
                "discarding {} commands enqueued during load finalize",
                self.queue.len()
            );
            self.queue.clear();
        }
    }

    pub fn checksum(&self) -> u32 {
        crate::save::state_checksum(&self.state)
    }

    // === Internals ===

    fn publish<E: Event>(&mut self, event: &E) {
        let Self {
            bus,
            state,
            handler_buffer,
            queue,
            metrics,
            ..
        } = self;
        bus.publish(event, state, handler_buffer);
        metrics.events_published += 1;
        handler_buffer.drain_into(queue);
    }

    fn publish_pending(&mut self, event: &PendingEvent) {
        match event {
            PendingEvent::WarDeclared(e) => self.publish(e),
            PendingEvent::PeaceMade(e) => self.publish(e),
            PendingEvent::ProvinceOwnershipChanged(e) => self.publish(e),
            PendingEvent::UnitCreated(e) => self.publish(e),
            PendingEvent::UnitMoved(e) => self.publish(e),
            PendingEvent::UnitMovementCancelled(e) => self.publish(e),
            PendingEvent::UnitDestroyed(e) => self.publish(e),
        }
    }

    /// Apply everything in the queue, in order. Rejections are logged and
    /// counted; they never unwind prior applications.
    fn drain_queue(&mut self) {
        let mut commands = std::mem::take(&mut self.queue);
        for command in commands.drain(..) {
            match self.execute_command(&command) {
                Ok(_) => {
                    self.command_log.push(self.state.tick, command);
                    self.metrics.commands_applied += 1;
                }
                Err(reason) => {
                    log::debug!("command rejected ({reason}): {command:?}");
                    self.metrics.commands_rejected += 1;
                }
            }
        }
        // Nothing publishes during application, so the queue stayed empty;
        // hand the allocation back.
        debug_assert!(self.queue.is_empty());
        self.queue = commands;
    }

    /// The barrier: swap province buffers, publish state-change events,
    /// and apply whatever commands the handlers raised, until quiescent.
    fn barrier(&mut self) {
        for _ in 0..MAX_EVENT_CASCADE {
            self.state.provinces.swap_buffers();
            self.state
                .provinces
                .drain_ownership_changes(&mut self.ownership_changes);
            if !self.ownership_changes.is_empty() {
                // Any ownership flip can change restricted passage.
                self.pathfinder.invalidate();
                let tick = self.state.tick;
                for change in self.ownership_changes.drain(..) {
                    self.pending_events.push(PendingEvent::ProvinceOwnershipChanged(
                        ProvinceOwnershipChanged {
                            province: change.province,
                            old_owner: change.old_owner,
                            new_owner: change.new_owner,
                            tick,
                        },
                    ));
                }
            }

            if self.pending_events.is_empty() && self.queue.is_empty() {
                return;
            }

            let events = std::mem::take(&mut self.pending_events);
            for event in &events {
                self.publish_pending(event);
            }
            self.drain_queue();
        }
        log::warn!(
            "event cascade exceeded {MAX_EVENT_CASCADE} rounds at tick {}; {} events deferred",
            self.state.tick,
            self.pending_events.len()
        );
    }

    fn execute_command(&mut self, command: &Command) -> Result<Effects, RejectReason> {
        {
            let Self {
                state, pathfinder, ..
            } = self;
            validate_command(state, pathfinder, command)?;
        }
        self.apply_command(command)
    }

    /// Mutate state for a validated command. Only capacity exhaustion can
    /// still reject here.
    fn apply_command(&mut self, command: &Command) -> Result<Effects, RejectReason> {
        use Command::*;
        let tick = self.state.tick;
        let mut effects = Effects::default();

        match *command {
            DeclareWar { attacker, defender } => {
                if !self.state.diplomacy.set_at_war(attacker, defender) {
                    return Err(RejectReason::CapacityExceeded);
                }
                let penalty = TimedModifier::new(
                    self.state.well_known.declared_war,
                    tick,
                    DECLARED_WAR_DECAY_TICKS,
                    Fixed::from_int(DECLARED_WAR_OPINION),
                );
                if !self.state.diplomacy.add_modifier(attacker, defender, penalty) {
                    log::warn!("no room for declared_war modifier ({attacker} vs {defender})");
                }
                self.pending_events.push(PendingEvent::WarDeclared(WarDeclared {
                    attacker,
                    defender,
                    tick,
                }));
                effects.events_queued += 1;
            }
            MakePeace { a, b } => {
                if !self.state.diplomacy.set_at_peace(a, b) {
                    return Err(RejectReason::CapacityExceeded);
                }
                self.pending_events
                    .push(PendingEvent::PeaceMade(PeaceMade { a, b, tick }));
                effects.events_queued += 1;
            }
            ImproveRelations { from, to, spend } => {
                let gold = self.state.well_known.gold;
                if !self.state.resources.try_spend(from, gold, spend) {
                    return Err(RejectReason::InsufficientResources);
                }
                let gain = spend
                    * Fixed::from_ratio(IMPROVE_RELATIONS_RATE.0, IMPROVE_RELATIONS_RATE.1);
                self.state.diplomacy.adjust_base_opinion(from, to, gain);
            }
            FormAlliance { a, b } => {
                if !self.state.diplomacy.set_symmetric_treaty(
                    a,
                    b,
                    crate::diplomacy::TreatyFlags::ALLIANCE,
                    true,
                ) {
                    return Err(RejectReason::CapacityExceeded);
                }
            }
            BreakAlliance { a, b } => {
                let _ = self.state.diplomacy.set_symmetric_treaty(
                    a,
                    b,
                    crate::diplomacy::TreatyFlags::ALLIANCE,
                    false,
                );
            }
            FormNonAggressionPact { a, b } => {
                if !self.state.diplomacy.set_symmetric_treaty(
                    a,
                    b,
                    crate::diplomacy::TreatyFlags::NON_AGGRESSION,
                    true,
                ) {
                    return Err(RejectReason::CapacityExceeded);
                }
            }
            BreakNonAggressionPact { a, b } => {
                let _ = self.state.diplomacy.set_symmetric_treaty(
                    a,
                    b,
                    crate::diplomacy::TreatyFlags::NON_AGGRESSION,
                    false,
                );
            }
            FormGuarantee { from, to } => {
                if !self.state.diplomacy.set_directional_treaty(
                    crate::diplomacy::Directional::Guarantee,
                    from,
                    to,
                    true,
                ) {
                    return Err(RejectReason::CapacityExceeded);
                }
            }
            BreakGuarantee { from, to } => {
                let _ = self.state.diplomacy.set_directional_treaty(
                    crate::diplomacy::Directional::Guarantee,
                    from,
                    to,
                    false,
                );
            }
            GrantMilitaryAccess { from, to } => {
                if !self.state.diplomacy.set_directional_treaty(
                    crate::diplomacy::Directional::MilitaryAccess,
                    from,
                    to,
                    true,
                ) {
                    return Err(RejectReason::CapacityExceeded);
                }
            }
            RevokeMilitaryAccess { from, to } => {
                let _ = self.state.diplomacy.set_directional_treaty(
                    crate::diplomacy::Directional::MilitaryAccess,
                    from,
                    to,
                    false,
                );
            }
            AddOpinionModifier {
                a,
                b,
                kind,
                magnitude,
                decay_ticks,
            } => {
                let modifier = TimedModifier::new(kind, tick, decay_ticks, magnitude);
                if !self.state.diplomacy.add_modifier(a, b, modifier) {
                    return Err(RejectReason::CapacityExceeded);
                }
            }
            CreateUnit {
                province,
                country,
                unit_type,
            } => {
                let Some(unit) = self.state.units.spawn(province, country, unit_type) else {
                    return Err(RejectReason::CapacityExceeded);
                };
                self.pending_events.push(PendingEvent::UnitCreated(UnitCreated {
                    unit,
                    country,
                    province,
                    tick,
                }));
                effects.created_unit = Some(unit);
                effects.events_queued += 1;
            }
            MoveUnit { unit, destination } => {
                let (country, from, unit_type) = {
                    let u = self.state.units.get(unit).expect("validated");
                    (u.country, u.province, u.unit_type)
                };
                let path = {
                    let Self {
                        state, pathfinder, ..
                    } = self;
                    let state = &*state;
                    let calculator = StandardMovement { state };
                    let ctx = PathContext::for_country(country);
                    match pathfinder.find_path(
                        &state.adjacency,
                        &calculator,
                        &ctx,
                        from,
                        destination,
                        &PathOptions::default(),
                    ) {
                        PathResult::Found(path) => path,
                        PathResult::NoPath => return Err(RejectReason::NoPath),
                        PathResult::Forbidden => return Err(RejectReason::ForbiddenTarget),
                    }
                };
                let segment_ticks = self.state.unit_travel_ticks(unit_type);
                let order: MovementOrder =
                    systems::movement::order_from_path(segment_ticks, destination, &path, tick);
                self.state.units.set_order(unit, order);
            }
            DisbandUnit { unit } => {
                let (country, province) = {
                    let u = self.state.units.get(unit).expect("validated");
                    (u.country, u.province)
                };
                self.state.units.despawn(unit);
                self.pending_events.push(PendingEvent::UnitDestroyed(
                    crate::events::UnitDestroyed {
                        unit,
                        country,
                        province,
                        tick,
                    },
                ));
                effects.events_queued += 1;
            }
            Build { province, building } => {
                let owner = self.state.provinces.get_owner(province);
                let cost = self
                    .state
                    .buildings
                    .get(building)
                    .map(|d| d.cost)
                    .expect("validated");
                let gold = self.state.well_known.gold;
                if !self.state.resources.try_spend(owner, gold, cost) {
                    return Err(RejectReason::InsufficientResources);
                }
                self.state.economy.add_building(province, building);
            }
            AddResource {
                country,
                resource,
                amount,
            } => {
                self.state.resources.add(country, resource, amount);
            }
            SetProvinceOwner { province, owner } => {
                // Same-value writes are a no-op inside the store and emit
                // no event.
                self.state.provinces.set_owner(province, owner);
            }
        }

        Ok(effects)
    }
}

/// Check a command against the current READ state. Rejections carry the
/// §7 taxonomy; a validated command's application cannot fail except on
/// capacity exhaustion.
pub fn validate_command(
    state: &GameState,
    pathfinder: &mut Pathfinder,
    command: &Command,
) -> Result<(), RejectReason> {
    use Command::*;
    use RejectReason::*;

    let known_country = |c: crate::ids::CountryId| -> Result<(), RejectReason> {
        if state.countries.contains(c) {
            Ok(())
        } else {
            Err(UnknownCountry(c))
        }
    };
    let known_pair = |a, b| -> Result<(), RejectReason> {
        if a == b {
            return Err(UnknownTarget);
        }
        known_country(a)?;
        known_country(b)
    };

    match *command {
        DeclareWar { attacker, defender } => {
            known_pair(attacker, defender)?;
            if state.diplomacy.at_war(attacker, defender) {
                return Err(AlreadyAtWar);
            }
            if state.diplomacy.has_nap(attacker, defender) {
                return Err(BlockedByNAP);
            }
            if state.diplomacy.are_allied(attacker, defender) {
                return Err(BlockedByAlliance);
            }
            Ok(())
        }
        MakePeace { a, b } => {
            known_pair(a, b)?;
            if !state.diplomacy.at_war(a, b) {
                return Err(NotAtWar);
            }
            Ok(())
        }
        ImproveRelations { from, to, spend } => {
            known_pair(from, to)?;
            if spend <= Fixed::ZERO {
                return Err(ForbiddenTarget);
            }
            if state.resources.get(from, state.well_known.gold) < spend {
                return Err(InsufficientResources);
            }
            Ok(())
        }
        FormAlliance { a, b } | FormNonAggressionPact { a, b } => {
            known_pair(a, b)?;
            if state.diplomacy.at_war(a, b) {
                return Err(AlreadyAtWar);
            }
            Ok(())
        }
        BreakAlliance { a, b } => {
            known_pair(a, b)?;
            if !state.diplomacy.are_allied(a, b) {
                return Err(ForbiddenTarget);
            }
            Ok(())
        }
        BreakNonAggressionPact { a, b } => {
            known_pair(a, b)?;
            if !state.diplomacy.has_nap(a, b) {
                return Err(ForbiddenTarget);
            }
            Ok(())
        }
        FormGuarantee { from, to } | GrantMilitaryAccess { from, to } => known_pair(from, to),
        BreakGuarantee { from, to } => {
            known_pair(from, to)?;
            if !state.diplomacy.is_guaranteeing(from, to) {
                return Err(ForbiddenTarget);
            }
            Ok(())
        }
        RevokeMilitaryAccess { from, to } => {
            known_pair(from, to)?;
            if !state.diplomacy.has_military_access(from, to) {
                return Err(ForbiddenTarget);
            }
            Ok(())
        }
        AddOpinionModifier { a, b, kind, .. } => {
            known_pair(a, b)?;
            if state.modifier_types.name_of(kind).is_none() {
                return Err(UnknownTarget);
            }
            Ok(())
        }
        CreateUnit {
            province,
            country,
            unit_type,
        } => {
            if !state.provinces.contains(province) {
                return Err(UnknownProvince(province));
            }
            known_country(country)?;
            if state.unit_types.get(unit_type).is_none() {
                return Err(UnknownTarget);
            }
            let p = state.provinces.get_state(province);
            if p.is_sea() || p.is_impassable() {
                return Err(ForbiddenTarget);
            }
            Ok(())
        }
        MoveUnit { unit, destination } => {
            let u = state.units.get(unit).ok_or(UnknownUnit(unit))?;
            if !state.provinces.contains(destination) {
                return Err(UnknownProvince(destination));
            }
            // A one-province "path" is not a movement.
            if destination == u.province {
                return Err(ForbiddenTarget);
            }
            let calculator = StandardMovement { state };
            let ctx = PathContext::for_country(u.country);
            match pathfinder.find_path(
                &state.adjacency,
                &calculator,
                &ctx,
                u.province,
                destination,
                &PathOptions::default(),
            ) {
                PathResult::Found(_) => Ok(()),
                PathResult::NoPath => Err(NoPath),
                PathResult::Forbidden => Err(ForbiddenTarget),
            }
        }
        DisbandUnit { unit } => {
            state.units.get(unit).ok_or(UnknownUnit(unit))?;
            Ok(())
        }
        Build { province, building } => {
            if !state.provinces.contains(province) {
                return Err(UnknownProvince(province));
            }
            let Some(def) = state.buildings.get(building) else {
                return Err(UnknownTarget);
            };
            let owner = state.provinces.get_owner(province);
            if owner.is_none() {
                return Err(ForbiddenTarget);
            }
            if state.resources.get(owner, state.well_known.gold) < def.cost {
                return Err(InsufficientResources);
            }
            Ok(())
        }
        AddResource {
            country, resource, ..
        } => {
            known_country(country)?;
            if state.resource_types.name_of(resource).is_none() {
                return Err(UnknownTarget);
            }
            Ok(())
        }
        SetProvinceOwner { province, owner } => {
            if !state.provinces.contains(province) {
                return Err(UnknownProvince(province));
            }
            if owner.is_some() {
                known_country(owner)?;
            }
            if state.provinces.get_state(province).is_sea() {
                return Err(ForbiddenTarget);
            }
            Ok(())
        }
    }
}
