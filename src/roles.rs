//! Axis roles for downstream plotting.
//!
//! A consumer rendering a structured dataset needs to know which axis to
//! average over and which axes to put on x and y. [`AxisRoles::suggest`]
//! makes the default choice; [`AxisRoles::assign`] applies a manual one.

use serde::{Deserialize, Serialize};

use crate::structure::AxisInfo;

/// Axis names that mark an axis as meant for averaging (compared
/// case-insensitively).
pub const AVERAGING_AXIS_NAMES: [&str; 4] = ["average", "averages", "repetition", "repetitions"];

/// Role an axis can play in a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisRole {
    /// Averaged over before plotting.
    Average,
    /// Horizontal plot axis.
    X,
    /// Vertical plot axis.
    Y,
}

/// Axis name chosen for each role. An axis fills at most one role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisRoles {
    /// Axis to average over.
    pub average: Option<String>,
    /// Horizontal axis.
    pub x: Option<String>,
    /// Vertical axis, for 2-d plots.
    pub y: Option<String>,
}

/// Whether an axis name marks an averaging axis.
#[must_use]
pub fn is_averaging_axis(name: &str) -> bool {
    let lower = name.to_lowercase();
    AVERAGING_AXIS_NAMES.contains(&lower.as_str())
}

impl AxisRoles {
    /// Default roles for a dataset's axes.
    ///
    /// The last axis with an averaging name becomes the averaging axis; the
    /// first two remaining axes become x and y.
    #[must_use]
    pub fn suggest(axes: &[AxisInfo]) -> Self {
        let average = axes
            .iter()
            .rev()
            .find(|a| is_averaging_axis(&a.name))
            .map(|a| a.name.clone());

        let mut rest = axes
            .iter()
            .map(|a| a.name.as_str())
            .filter(|n| Some(*n) != average.as_deref());
        let x = rest.next().map(str::to_string);
        let y = rest.next().map(str::to_string);

        Self { average, x, y }
    }

    /// The axis currently holding `role`.
    #[must_use]
    pub fn get(&self, role: AxisRole) -> Option<&str> {
        match role {
            AxisRole::Average => self.average.as_deref(),
            AxisRole::X => self.x.as_deref(),
            AxisRole::Y => self.y.as_deref(),
        }
    }

    /// Assign `axis` to `role`, clearing any other role that held it.
    pub fn assign(&mut self, role: AxisRole, axis: Option<String>) {
        if let Some(name) = axis.as_deref() {
            for slot in [&mut self.average, &mut self.x, &mut self.y] {
                if slot.as_deref() == Some(name) {
                    *slot = None;
                }
            }
        }
        *self.slot_mut(role) = axis;
    }

    fn slot_mut(&mut self, role: AxisRole) -> &mut Option<String> {
        match role {
            AxisRole::Average => &mut self.average,
            AxisRole::X => &mut self.x,
            AxisRole::Y => &mut self.y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axes(names: &[&str]) -> Vec<AxisInfo> {
        names
            .iter()
            .map(|n| AxisInfo {
                name: (*n).to_string(),
                len: 2,
            })
            .collect()
    }

    #[test]
    fn suggest_picks_averaging_axis_then_x_and_y() {
        let roles = AxisRoles::suggest(&axes(&["Repetitions", "freq", "power"]));
        assert_eq!(roles.average.as_deref(), Some("Repetitions"));
        assert_eq!(roles.x.as_deref(), Some("freq"));
        assert_eq!(roles.y.as_deref(), Some("power"));
    }

    #[test]
    fn last_averaging_name_wins() {
        let roles = AxisRoles::suggest(&axes(&["average", "t", "repetition"]));
        assert_eq!(roles.average.as_deref(), Some("repetition"));
        assert_eq!(roles.x.as_deref(), Some("average"));
        assert_eq!(roles.y.as_deref(), Some("t"));
    }

    #[test]
    fn single_axis_has_no_y() {
        let roles = AxisRoles::suggest(&axes(&["t"]));
        assert_eq!(roles, AxisRoles {
            average: None,
            x: Some("t".to_string()),
            y: None,
        });
    }

    #[test]
    fn assign_moves_axis_between_roles() {
        let mut roles = AxisRoles::suggest(&axes(&["a", "b"]));
        roles.assign(AxisRole::Y, Some("a".to_string()));
        assert_eq!(roles.get(AxisRole::X), None);
        assert_eq!(roles.get(AxisRole::Y), Some("a"));

        roles.assign(AxisRole::Y, None);
        assert_eq!(roles.get(AxisRole::Y), None);
    }
}
