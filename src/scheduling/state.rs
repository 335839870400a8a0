//! Appointment state machine.
//!
//! ```text
//! open ──book──▶ booked ──confirm──▶ confirmed
//!                  │  ╲                 │
//!                  │   ╲──complete──────┼──▶ completed ──adjust-price──▶ completed
//!                  │    ╲──cancel───────┼──▶ cancelled
//!                  │     ╲─no-show──────┴──▶ no_show
//! ```
//!
//! Reschedule and arrival keep the current state.

use serde::{Deserialize, Serialize};

use crate::models::AppointmentState::{self, *};

use super::error::StateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Book,
    Confirm,
    Cancel,
    Complete,
    MarkNoShow,
    AdjustPrice,
    Reschedule,
    RecordArrival,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::MarkNoShow => "mark as no-show",
            Self::AdjustPrice => "adjust the price of",
            Self::Reschedule => "reschedule",
            Self::RecordArrival => "record the arrival for",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State reached by applying `transition` in state `from`.
pub fn next_state(from: AppointmentState, transition: Transition) -> Result<AppointmentState, StateError> {
    use Transition as T;

    let next = match (from, transition) {
        (Open, T::Book) => Booked,
        (Booked, T::Confirm) => Confirmed,
        (Booked | Confirmed, T::Cancel) => Cancelled,
        (Booked | Confirmed, T::Complete) => Completed,
        (Booked | Confirmed, T::MarkNoShow) => NoShow,
        (Completed, T::AdjustPrice) => Completed,
        (s @ (Open | Booked | Confirmed), T::Reschedule) => s,
        (s @ (Booked | Confirmed), T::RecordArrival) => s,

        (Booked | Confirmed | Completed | Cancelled | NoShow, T::Book)
        | (Open | Confirmed | Completed | Cancelled | NoShow, T::Confirm)
        | (Open | Completed | Cancelled | NoShow, T::Cancel)
        | (Open | Completed | Cancelled | NoShow, T::Complete)
        | (Open | Completed | Cancelled | NoShow, T::MarkNoShow)
        | (Open | Booked | Confirmed | Cancelled | NoShow, T::AdjustPrice)
        | (Completed | Cancelled | NoShow, T::Reschedule)
        | (Open | Completed | Cancelled | NoShow, T::RecordArrival) => {
            return Err(StateError { from, transition });
        }
    };
    Ok(next)
}
