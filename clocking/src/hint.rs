/// How a component would prefer to be clocked, from most to least eager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockingPreference {
    /// The component has no pending time-dependent state; don't clock it at
    /// all until some stimulus (a register write, a motor switching on)
    /// wakes it.
    None,
    /// The component only needs to be up to date when observed; advance it
    /// lazily, immediately before any interaction.
    JustInTime,
    /// The component generates externally-visible events of its own accord
    /// and must be advanced in lockstep with the machine.
    RealTime,
}

/// Implemented by anything that can describe its current clocking needs.
pub trait ClockingSource {
    fn preferred_clocking(&self) -> ClockingPreference;
}

/// Receives notice that an observed component's preference has changed.
///
/// Observers are told only of transitions; they are expected to re-query
/// [`ClockingSource::preferred_clocking`] of whatever they aggregate.
pub trait ClockingObserver {
    fn clocking_preference_changed(&mut self, new_preference: ClockingPreference);
}
