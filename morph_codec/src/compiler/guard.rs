use super::RoutineKey;
use tracing::trace;

/// Routines currently being compiled in one session, outermost first.
///
/// A nested record whose key is already active is referenced through a
/// handle to the active routine's name instead of being compiled again,
/// which is what makes self- and mutually-recursive records terminate.
#[derive(Debug, Default)]
pub struct RecursionGuard {
    active: Vec<(RoutineKey, String)>,
}

impl RecursionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, key: RoutineKey, name: String) {
        trace!(routine = %name, nesting = self.active.len(), "enter");
        self.active.push((key, name));
    }

    pub fn leave(&mut self, key: &RoutineKey) {
        if let Some(pos) = self.active.iter().rposition(|(k, _)| k == key) {
            self.active.remove(pos);
        }
    }

    /// Name of the routine being compiled for `key`, if any.
    pub fn active(&self, key: &RoutineKey) -> Option<&str> {
        self.active
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, name)| name.as_str())
    }
}
