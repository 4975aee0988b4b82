/// Stage records and casting assignments.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::tree::StageId;

/// The three reserved stage kinds; casting tables may not take these
/// names.
pub const RESERVED_NAMES: &[&str] = &["Direct", "Success", "Sink"];

/// Returns true if `name` collides with a reserved stage kind.
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// A stage's casting assignment: a reserved pass-through/terminal
/// kind, or a casting table referenced by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Casting {
    /// No assignment yet. Never passes validation.
    Unassigned,
    /// Pass the whole incoming population to the single child.
    Direct,
    /// Terminal stage: the population recruited successfully.
    Success,
    /// Terminal stage: the population is absorbed and lost.
    Sink,
    /// Split the incoming population across children according to the
    /// named casting table.
    Table(String),
}

impl Casting {
    /// The label stored in the persisted model file. `Unassigned` is
    /// an empty string, matching a cleared reference.
    pub fn label(&self) -> &str {
        match self {
            Casting::Unassigned => "",
            Casting::Direct => "Direct",
            Casting::Success => "Success",
            Casting::Sink => "Sink",
            Casting::Table(name) => name,
        }
    }

    /// Parse a persisted label back into a casting assignment.
    pub fn from_label(label: &str) -> Casting {
        match label {
            "" => Casting::Unassigned,
            "Direct" => Casting::Direct,
            "Success" => Casting::Success,
            "Sink" => Casting::Sink,
            name => Casting::Table(name.to_string()),
        }
    }

    /// True for `Success` and `Sink`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Casting::Success | Casting::Sink)
    }
}

impl fmt::Display for Casting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A stage in the recruitment tree: one step a population fraction
/// can reach. Parent/child links are arena indices managed by
/// [`super::tree::StageTree`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Display label; not required to be unique.
    pub name: String,
    /// Casting assignment routing population to the children.
    pub casting: Casting,
    /// Whether this stage appears in the simulation output.
    pub report: bool,
    /// Dot-separated path label ("1.2.3"), recomputed on every
    /// validation pass. Diagnostic only, not a stable identity.
    pub hierarchical_id: String,
    pub(crate) parent: Option<StageId>,
    pub(crate) children: Vec<StageId>,
}

impl Stage {
    pub(crate) fn new(name: impl Into<String>, casting: Casting, parent: Option<StageId>) -> Stage {
        Stage {
            name: name.into(),
            casting,
            report: false,
            hierarchical_id: String::new(),
            parent,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<StageId> {
        self.parent
    }

    /// Child stages in order.
    pub fn children(&self) -> &[StageId] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trip() {
        for casting in [
            Casting::Unassigned,
            Casting::Direct,
            Casting::Success,
            Casting::Sink,
            Casting::Table("Dispersers".to_string()),
        ] {
            assert_eq!(Casting::from_label(casting.label()), casting);
        }
    }

    #[test]
    fn reserved_names() {
        assert!(is_reserved_name("Direct"));
        assert!(is_reserved_name("Success"));
        assert!(is_reserved_name("Sink"));
        assert!(!is_reserved_name("direct"));
        assert!(!is_reserved_name("Dispersers"));
    }

    #[test]
    fn terminal_kinds() {
        assert!(Casting::Success.is_terminal());
        assert!(Casting::Sink.is_terminal());
        assert!(!Casting::Direct.is_terminal());
        assert!(!Casting::Table("T".to_string()).is_terminal());
        assert!(!Casting::Unassigned.is_terminal());
    }
}
