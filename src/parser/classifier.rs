use crate::model::{MachineConfig, MachineStatus};
use crate::util::stringify_value;

use serde_json::Value;

/// Maps a raw status value to a machine status using the rule's value sets.
///
/// Sets are not required to be disjoint. When a value appears in more than
/// one, DOWN wins, then UP, then IDLE.
pub fn classify(value: &Value, rule: &MachineConfig) -> Option<MachineStatus> {
    let text = stringify_value(value);

    if rule.down_values.contains(&text) {
        Some(MachineStatus::Down)
    } else if rule.up_values.contains(&text) {
        Some(MachineStatus::Up)
    } else if rule.idle_values.contains(&text) {
        Some(MachineStatus::Idle)
    } else {
        None
    }
}
