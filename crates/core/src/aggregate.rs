//! Aggregate root trait for domain models with a command/event lifecycle.

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state (+1 per applied event).
    fn version(&self) -> u64;
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Decision logic**: `handle(&self, cmd)` returns events.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// Aggregates must not perform IO or side effects. Stores persist the resulting
/// state and the audit trail records the events.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event.
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    ///
    /// This must not mutate state. State evolution is done through `apply`.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

/// Handle a command and apply the resulting events in order.
///
/// On error the aggregate is left untouched.
pub fn execute<A: Aggregate>(
    aggregate: &mut A,
    command: &A::Command,
) -> Result<Vec<A::Event>, A::Error> {
    let events = aggregate.handle(command)?;
    for event in &events {
        aggregate.apply(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DomainError;

    #[derive(Debug, Clone, Default)]
    struct Counter {
        value: i64,
        version: u64,
    }

    impl AggregateRoot for Counter {
        type Id = u8;

        fn id(&self) -> &u8 {
            &0
        }

        fn version(&self) -> u64 {
            self.version
        }
    }

    impl Aggregate for Counter {
        type Command = i64;
        type Event = i64;
        type Error = DomainError;

        fn apply(&mut self, event: &i64) {
            self.value += event;
            self.version += 1;
        }

        fn handle(&self, command: &i64) -> Result<Vec<i64>, DomainError> {
            if self.value + command < 0 {
                return Err(DomainError::invariant("counter cannot go negative"));
            }
            Ok(vec![*command])
        }
    }

    #[test]
    fn execute_applies_emitted_events() {
        let mut c = Counter::default();
        let events = execute(&mut c, &5).unwrap();
        assert_eq!(events, vec![5]);
        assert_eq!(c.value, 5);
        assert_eq!(c.version(), 1);
    }

    #[test]
    fn rejected_commands_leave_state_untouched() {
        let mut c = Counter::default();
        assert!(execute(&mut c, &-1).is_err());
        assert_eq!(c.value, 0);
        assert_eq!(c.version(), 0);
    }
}
