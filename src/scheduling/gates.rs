//! Completion gates, evaluated in order: time, record, price.

use chrono::NaiveDateTime;

use crate::models::{Appointment, ClinicalRecord, Money};

use super::error::{GateFailure, RecordProblem};

/// Everything the gates look at besides the appointment itself.
#[derive(Debug, Clone, Default)]
pub struct CompletionInputs {
    pub record: Option<ClinicalRecord>,
    pub explicit_price: Option<Money>,
    pub service_base_price: Option<Money>,
}

/// Run all three gates. On success returns the price to charge.
pub fn check_completion(
    appt: &Appointment,
    now: NaiveDateTime,
    inputs: &CompletionInputs,
) -> Result<Money, GateFailure> {
    time_gate(appt, now)?;
    record_gate(inputs.record.as_ref())?;
    price_gate(
        inputs.explicit_price,
        appt.charged_price,
        inputs.service_base_price,
    )
}

pub fn time_gate(appt: &Appointment, now: NaiveDateTime) -> Result<(), GateFailure> {
    if appt.starts_at > now {
        return Err(GateFailure::TimeGate(appt.starts_at));
    }
    Ok(())
}

pub fn record_gate(record: Option<&ClinicalRecord>) -> Result<(), GateFailure> {
    let record = record.ok_or(GateFailure::RecordGate(RecordProblem::Missing))?;
    let missing = record.missing_fields();
    if !missing.is_empty() {
        return Err(GateFailure::RecordGate(RecordProblem::Incomplete(missing)));
    }
    Ok(())
}

/// Explicit price, then the appointment's own price, then the service
/// base price. An explicit price that is not positive is refused outright.
pub fn price_gate(
    explicit: Option<Money>,
    existing: Option<Money>,
    service_base: Option<Money>,
) -> Result<Money, GateFailure> {
    if let Some(price) = explicit {
        return if price.is_positive() {
            Ok(price)
        } else {
            Err(GateFailure::PriceGate)
        };
    }
    [existing, service_base]
        .into_iter()
        .flatten()
        .find(|p| p.is_positive())
        .ok_or(GateFailure::PriceGate)
}
