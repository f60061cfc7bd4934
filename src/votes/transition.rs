//! The toggle decision table.
//!
//! | current | requested | transition                  | likes | dislikes |
//! |---------|-----------|-----------------------------|-------|----------|
//! | none    | like      | `Cast(Like)`                | +1    |          |
//! | none    | dislike   | `Cast(Dislike)`             |       | +1       |
//! | like    | like      | `Retract(Like)`             | -1    |          |
//! | dislike | dislike   | `Retract(Dislike)`          |       | -1       |
//! | like    | dislike   | `Switch { Like -> Dislike }`| -1    | +1       |
//! | dislike | like      | `Switch { Dislike -> Like }`| +1    | -1       |

use super::Disposition;

/// The single state change a toggle applies to one (actor, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No prior vote; record one.
    Cast(Disposition),
    /// The same vote was requested again; remove it.
    Retract(Disposition),
    /// The opposite vote was requested; replace it.
    Switch { from: Disposition, to: Disposition },
}

impl Transition {
    /// Decide the transition for an actor currently holding `current`.
    pub fn plan(current: Option<Disposition>, requested: Disposition) -> Self {
        match current {
            None => Self::Cast(requested),
            Some(held) if held == requested => Self::Retract(held),
            Some(held) => Self::Switch {
                from: held,
                to: requested,
            },
        }
    }

    /// The vote row this transition removes, if any.
    pub fn removes(self) -> Option<Disposition> {
        match self {
            Self::Cast(_) => None,
            Self::Retract(d) => Some(d),
            Self::Switch { from, .. } => Some(from),
        }
    }

    /// The vote row this transition inserts, if any.
    pub fn inserts(self) -> Option<Disposition> {
        match self {
            Self::Cast(d) => Some(d),
            Self::Retract(_) => None,
            Self::Switch { to, .. } => Some(to),
        }
    }

    /// The disposition the actor holds once the transition is applied.
    pub fn outcome(self) -> Option<Disposition> {
        self.inserts()
    }

    /// `(likes, dislikes)` counter deltas.
    pub fn counter_deltas(self) -> (i64, i64) {
        let (mut likes, mut dislikes) = (0, 0);
        if let Some(removed) = self.removes() {
            match removed {
                Disposition::Like => likes -= 1,
                Disposition::Dislike => dislikes -= 1,
            }
        }
        if let Some(inserted) = self.inserts() {
            match inserted {
                Disposition::Like => likes += 1,
                Disposition::Dislike => dislikes += 1,
            }
        }
        (likes, dislikes)
    }
}
