//! Whether a checker runs against a given daemon: a pure function of the
//! global preference map, the per-daemon override map, and the checker's
//! name, rather than a class hierarchy of checker objects each carrying
//! their own enablement state.

use std::collections::HashMap;

use crate::model::DaemonId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckerState {
    Enabled,
    Disabled,
}

/// Per-daemon overrides take precedence over the global map, which in turn
/// takes precedence over `default` (the checker's own built-in state).
pub fn resolve(
    global: &HashMap<String, CheckerState>,
    per_daemon: &HashMap<DaemonId, HashMap<String, CheckerState>>,
    daemon_id: DaemonId,
    checker_name: &str,
    default: CheckerState,
) -> CheckerState {
    if let Some(state) = per_daemon.get(&daemon_id).and_then(|m| m.get(checker_name)) {
        return *state;
    }
    global.get(checker_name).copied().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_with_no_overrides() {
        let global = HashMap::new();
        let per_daemon = HashMap::new();
        let state = resolve(&global, &per_daemon, DaemonId(1), "subnet_dispensable", CheckerState::Enabled);
        assert_eq!(state, CheckerState::Enabled);
    }

    #[test]
    fn global_override_beats_default() {
        let mut global = HashMap::new();
        global.insert("subnet_dispensable".to_string(), CheckerState::Disabled);
        let per_daemon = HashMap::new();
        let state = resolve(&global, &per_daemon, DaemonId(1), "subnet_dispensable", CheckerState::Enabled);
        assert_eq!(state, CheckerState::Disabled);
    }

    #[test]
    fn per_daemon_override_beats_global() {
        let mut global = HashMap::new();
        global.insert("subnet_dispensable".to_string(), CheckerState::Disabled);
        let mut per_daemon = HashMap::new();
        let mut overrides = HashMap::new();
        overrides.insert("subnet_dispensable".to_string(), CheckerState::Enabled);
        per_daemon.insert(DaemonId(1), overrides);

        let state = resolve(&global, &per_daemon, DaemonId(1), "subnet_dispensable", CheckerState::Enabled);
        assert_eq!(state, CheckerState::Enabled);

        // A different daemon still sees the global override.
        let state_other = resolve(&global, &per_daemon, DaemonId(2), "subnet_dispensable", CheckerState::Enabled);
        assert_eq!(state_other, CheckerState::Disabled);
    }
}
