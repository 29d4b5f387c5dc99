//! Typed in-process publish/subscribe.
//!
//! Subscribers register per event type at load; delivery order within a
//! type is registration order. Handlers receive the event, a read-only view
//! of the game state, and a command buffer: the only way a reaction may
//! mutate the world is by submitting commands through it. Direct store
//! mutation from a handler is an invariant breach by design review.

use crate::calendar::GameTime;
use crate::command::Command;
use crate::ids::{CountryId, ProvinceId, Tick, UnitId};
use crate::state::GameState;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};

/// Commands queued by event handlers and systems, drained by the dispatcher
/// in submission order.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    pub fn submit(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Move all queued commands into `out`, preserving order.
    pub fn drain_into(&mut self, out: &mut Vec<Command>) {
        out.append(&mut self.commands);
    }
}

/// Marker trait for event payloads.
pub trait Event: Any + Send + Sync {}

// === Tick events (published by the dispatcher, in this order) ===

#[derive(Debug, Clone, Copy)]
pub struct HourlyTick {
    pub tick: Tick,
    pub time: GameTime,
}
impl Event for HourlyTick {}

#[derive(Debug, Clone, Copy)]
pub struct DailyTick {
    pub tick: Tick,
    pub time: GameTime,
}
impl Event for DailyTick {}

/// Every 7 days.
#[derive(Debug, Clone, Copy)]
pub struct WeeklyTick {
    pub tick: Tick,
    pub time: GameTime,
}
impl Event for WeeklyTick {}

#[derive(Debug, Clone, Copy)]
pub struct MonthlyTick {
    pub tick: Tick,
    pub time: GameTime,
}
impl Event for MonthlyTick {}

#[derive(Debug, Clone, Copy)]
pub struct YearlyTick {
    pub tick: Tick,
    pub time: GameTime,
}
impl Event for YearlyTick {}

// === State-change events (published at the barrier) ===

#[derive(Debug, Clone, Copy)]
pub struct WarDeclared {
    pub attacker: CountryId,
    pub defender: CountryId,
    pub tick: Tick,
}
impl Event for WarDeclared {}

#[derive(Debug, Clone, Copy)]
pub struct PeaceMade {
    pub a: CountryId,
    pub b: CountryId,
    pub tick: Tick,
}
impl Event for PeaceMade {}

#[derive(Debug, Clone, Copy)]
pub struct ProvinceOwnershipChanged {
    pub province: ProvinceId,
    pub old_owner: CountryId,
    pub new_owner: CountryId,
    pub tick: Tick,
}
impl Event for ProvinceOwnershipChanged {}

#[derive(Debug, Clone, Copy)]
pub struct UnitCreated {
    pub unit: UnitId,
    pub country: CountryId,
    pub province: ProvinceId,
    pub tick: Tick,
}
impl Event for UnitCreated {}

#[derive(Debug, Clone, Copy)]
pub struct UnitMoved {
    pub unit: UnitId,
    pub from: ProvinceId,
    pub to: ProvinceId,
    pub tick: Tick,
}
impl Event for UnitMoved {}

/// A unit's path became impassable mid-journey; it stopped where it was.
#[derive(Debug, Clone, Copy)]
pub struct UnitMovementCancelled {
    pub unit: UnitId,
    pub at: ProvinceId,
    pub tick: Tick,
}
impl Event for UnitMovementCancelled {}

#[derive(Debug, Clone, Copy)]
pub struct UnitDestroyed {
    pub unit: UnitId,
    pub country: CountryId,
    pub province: ProvinceId,
    pub tick: Tick,
}
impl Event for UnitDestroyed {}

/// Published once after a save has been loaded and all derived indices
/// rebuilt, so external caches (renderer, UI) can refresh.
#[derive(Debug, Clone, Copy)]
pub struct PostLoadFinalize {
    pub tick: Tick,
}
impl Event for PostLoadFinalize {}

/// A state-change event produced during command application or a system
/// tick, held until the barrier and then published in production order.
#[derive(Debug, Clone, Copy)]
pub enum PendingEvent {
    WarDeclared(WarDeclared),
    PeaceMade(PeaceMade),
    ProvinceOwnershipChanged(ProvinceOwnershipChanged),
    UnitCreated(UnitCreated),
    UnitMoved(UnitMoved),
    UnitMovementCancelled(UnitMovementCancelled),
    UnitDestroyed(UnitDestroyed),
}

type ErasedHandler = Box<dyn Fn(&dyn Any, &GameState, &mut CommandBuffer)>;

/// Token returned by `subscribe`; hand it back to `unsubscribe` to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    type_id: TypeId,
    token: u64,
}

/// Groups subscriptions so a whole feature can detach at once.
#[derive(Default)]
pub struct CompositeDisposable {
    subscriptions: Vec<Subscription>,
}

impl CompositeDisposable {
    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Unsubscribe everything this group holds.
    pub fn dispose(&mut self, bus: &mut EventBus) {
        for subscription in self.subscriptions.drain(..) {
            bus.unsubscribe(subscription);
        }
    }
}

/// The event bus.
#[derive(Default)]
pub struct EventBus {
    handlers: FxHashMap<TypeId, Vec<(u64, ErasedHandler)>>,
    next_token: u64,
    /// Events delivered since creation (for metrics).
    delivered: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for events of type `E`. Handlers fire in
    /// registration order.
    pub fn subscribe<E, F>(&mut self, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&E, &GameState, &mut CommandBuffer) + 'static,
    {
        let token = self.next_token;
        self.next_token += 1;

        let erased: ErasedHandler = Box::new(move |any, state, buffer| {
            // The bus only dispatches an E to handlers registered under
            // E's TypeId, so this downcast cannot fail.
            let event = any
                .downcast_ref::<E>()
                .expect("event type mismatch in bus dispatch");
            handler(event, state, buffer);
        });

        self.handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push((token, erased));

        Subscription {
            type_id: TypeId::of::<E>(),
            token,
        }
    }

    /// Detach a handler. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        if let Some(list) = self.handlers.get_mut(&subscription.type_id) {
            let before = list.len();
            list.retain(|(token, _)| *token != subscription.token);
            return list.len() != before;
        }
        false
    }

    /// Deliver `event` to every subscriber, in registration order.
    /// Handlers react by submitting commands into `buffer`.
    pub fn publish<E: Event>(&mut self, event: &E, state: &GameState, buffer: &mut CommandBuffer) {
        if let Some(list) = self.handlers.get(&TypeId::of::<E>()) {
            for (_, handler) in list {
                handler(event, state, buffer);
            }
            self.delivered += list.len() as u64;
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(|v| v.len()).sum()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::testing::GameStateBuilder;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_publish_reaches_subscriber() {
        let state = GameStateBuilder::new().build();
        let mut bus = EventBus::new();
        let seen = Rc::new(Cell::new(0u32));

        let seen2 = seen.clone();
        bus.subscribe::<HourlyTick, _>(move |event, _state, _buffer| {
            assert_eq!(event.tick, 7);
            seen2.set(seen2.get() + 1);
        });

        let mut buffer = CommandBuffer::default();
        let event = HourlyTick {
            tick: 7,
            time: GameTime::default(),
        };
        bus.publish(&event, &state, &mut buffer);
        bus.publish(&event, &state, &mut buffer);
        assert_eq!(seen.get(), 2);
        assert_eq!(bus.delivered(), 2);
    }

    #[test]
    fn test_handlers_fire_in_registration_order() {
        let state = GameStateBuilder::new().build();
        let mut bus = EventBus::new();
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            bus.subscribe::<DailyTick, _>(move |_e, _s, _b| log.borrow_mut().push(i));
        }

        let mut buffer = CommandBuffer::default();
        bus.publish(
            &DailyTick {
                tick: 0,
                time: GameTime::default(),
            },
            &state,
            &mut buffer,
        );
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe() {
        let state = GameStateBuilder::new().build();
        let mut bus = EventBus::new();
        let seen = Rc::new(Cell::new(0u32));

        let seen2 = seen.clone();
        let sub = bus.subscribe::<HourlyTick, _>(move |_e, _s, _b| seen2.set(seen2.get() + 1));

        let mut buffer = CommandBuffer::default();
        let event = HourlyTick {
            tick: 0,
            time: GameTime::default(),
        };
        bus.publish(&event, &state, &mut buffer);
        assert!(bus.unsubscribe(sub));
        assert!(!bus.unsubscribe(sub)); // already detached
        bus.publish(&event, &state, &mut buffer);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_composite_disposable() {
        let state = GameStateBuilder::new().build();
        let mut bus = EventBus::new();
        let seen = Rc::new(Cell::new(0u32));

        let mut group = CompositeDisposable::default();
        for _ in 0..3 {
            let seen = seen.clone();
            group.add(bus.subscribe::<HourlyTick, _>(move |_e, _s, _b| seen.set(seen.get() + 1)));
        }
        assert_eq!(bus.handler_count(), 3);

        group.dispose(&mut bus);
        assert_eq!(bus.handler_count(), 0);
        assert!(group.is_empty());

        let mut buffer = CommandBuffer::default();
        bus.publish(
            &HourlyTick {
                tick: 0,
                time: GameTime::default(),
            },
            &state,
            &mut buffer,
        );
        assert_eq!(seen.get(), 0);
    }

    #[test]
    fn test_handler_submits_commands() {
        let state = GameStateBuilder::new()
            .with_country("AAA")
            .with_country("BBB")
            .build();
        let mut bus = EventBus::new();

        bus.subscribe::<WarDeclared, _>(|event, _state, buffer| {
            buffer.submit(Command::MakePeace {
                a: event.attacker,
                b: event.defender,
            });
        });

        let mut buffer = CommandBuffer::default();
        bus.publish(
            &WarDeclared {
                attacker: CountryId(1),
                defender: CountryId(2),
                tick: 0,
            },
            &state,
            &mut buffer,
        );

        let mut drained = Vec::new();
        buffer.drain_into(&mut drained);
        assert_eq!(drained.len(), 1);
    }

    #[test]
    fn test_unrelated_event_types_isolated() {
        let state = GameStateBuilder::new().build();
        let mut bus = EventBus::new();
        let seen = Rc::new(Cell::new(0u32));

        let seen2 = seen.clone();
        bus.subscribe::<MonthlyTick, _>(move |_e, _s, _b| seen2.set(seen2.get() + 1));

        let mut buffer = CommandBuffer::default();
        bus.publish(
            &HourlyTick {
                tick: 0,
                time: GameTime::default(),
            },
            &state,
            &mut buffer,
        );
        assert_eq!(seen.get(), 0);
    }
}
