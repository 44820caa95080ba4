//! Per-tick snapshot ring used for resimulation, reconciliation and render
//! interpolation.

use crate::{constants::HISTORY_SIZE, state::AgentState};

/// Ring of full-precision fixed states indexed by `tick mod HISTORY_SIZE`.
#[derive(Clone, Debug)]
pub struct History {
    entries: Vec<Option<AgentState>>,
}

impl Default for History {
    fn default() -> Self {
        Self {
            entries: vec![None; HISTORY_SIZE],
        }
    }
}

impl History {
    #[inline]
    fn slot(tick: i32) -> Option<usize> {
        (tick >= 0).then(|| tick as usize % HISTORY_SIZE)
    }

    /// Stores a copy of `data` under `data.tick`. Negative ticks are ignored.
    pub fn store(&mut self, data: &AgentState) {
        let Some(slot) = Self::slot(data.tick) else {
            return;
        };
        match &mut self.entries[slot] {
            Some(entry) => entry.clone_from(data),
            entry @ None => *entry = Some(data.clone()),
        }
    }

    /// The entry for `tick`, only if the slot has not been overwritten since.
    pub fn get(&self, tick: i32) -> Option<&AgentState> {
        let slot = Self::slot(tick)?;
        self.entries[slot].as_ref().filter(|entry| entry.tick == tick)
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|entry| *entry = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_tick(tick: i32) -> AgentState {
        AgentState {
            tick,
            ..AgentState::default()
        }
    }

    #[test]
    fn lookup_requires_matching_tick() {
        let mut history = History::default();
        history.store(&at_tick(5));
        assert_eq!(history.get(5).map(|d| d.tick), Some(5));
        assert!(history.get(5 + HISTORY_SIZE as i32).is_none());
        assert!(history.get(4).is_none());
    }

    #[test]
    fn newer_tick_overwrites_slot() {
        let mut history = History::default();
        history.store(&at_tick(3));
        history.store(&at_tick(3 + HISTORY_SIZE as i32));
        assert!(history.get(3).is_none());
        assert!(history.get(3 + HISTORY_SIZE as i32).is_some());
    }

    #[test]
    fn negative_ticks_are_never_stored() {
        let mut history = History::default();
        history.store(&at_tick(-1));
        assert!(history.get(-1).is_none());
    }
}
