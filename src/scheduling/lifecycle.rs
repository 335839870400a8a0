//! Appointment lifecycle.
//!
//! Every mutating operation runs in an `IMMEDIATE` transaction, so the
//! slot check and the write happen under SQLite's write lock and two
//! concurrent bookings of the same slot cannot both commit. The audit
//! event is written after the commit.

use std::sync::{Arc, LazyLock};

use chrono::{NaiveDateTime, SubsecRound};
use regex::Regex;
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::clock::Clock;
use crate::config::SchedulingConfig;
use crate::db::{self, DatabaseError};
use crate::models::*;

use super::collaborators::{
    ClinicalRecordStore, PatientDirectory, ServiceCatalog, SqliteClinicalRecordStore,
    SqlitePatientDirectory, SqliteServiceCatalog,
};
use super::conflict::{resolve_duration, SlotChecker};
use super::error::{ConflictReason, SchedulingError, ValidationError};
use super::gates::{check_completion, CompletionInputs};
use super::state::{next_state, Transition};

/// Who the appointment is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientRef {
    /// A patient already in the directory.
    Existing(Uuid),
    /// Look the patient up by email, registering them if unknown.
    ByEmail {
        name: String,
        email: String,
        phone: Option<String>,
    },
    /// Contact details only; no directory record is linked.
    Walkin(PatientContact),
}

#[derive(Debug, Clone, Default)]
pub struct NewAppointment {
    pub practitioner_id: Option<Uuid>,
    pub starts_at: Option<NaiveDateTime>,
    pub service_type_id: Option<Uuid>,
    pub patient: Option<PatientRef>,
    /// Overrides the service base price. Must be positive.
    pub charged_price: Option<Money>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub explicit_price: Option<Money>,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PriceAdjustment {
    pub new_price: Option<Money>,
    pub notes: Option<String>,
    pub justification: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RescheduleRequest {
    pub starts_at: NaiveDateTime,
    /// `None` keeps the current practitioner.
    pub practitioner_id: Option<Uuid>,
    /// `None` keeps the current service.
    pub service_type_id: Option<Uuid>,
    pub charged_price: Option<Money>,
}

pub struct Scheduler {
    clock: Arc<dyn Clock>,
    config: SchedulingConfig,
    patients: Box<dyn PatientDirectory>,
    services: Box<dyn ServiceCatalog>,
    records: Box<dyn ClinicalRecordStore>,
    audit: AuditLog,
}

impl Scheduler {
    /// Scheduler backed by this crate's own SQLite tables.
    pub fn new(clock: Arc<dyn Clock>, audit: AuditLog) -> Self {
        Self {
            clock,
            config: SchedulingConfig::default(),
            patients: Box::new(SqlitePatientDirectory),
            services: Box::new(SqliteServiceCatalog),
            records: Box::new(SqliteClinicalRecordStore),
            audit,
        }
    }

    pub fn with_config(mut self, config: SchedulingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_collaborators(
        mut self,
        patients: Box<dyn PatientDirectory>,
        services: Box<dyn ServiceCatalog>,
        records: Box<dyn ClinicalRecordStore>,
    ) -> Self {
        self.patients = patients;
        self.services = services;
        self.records = records;
        self
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn get(&self, conn: &Connection, id: &Uuid) -> Result<Appointment, SchedulingError> {
        load(conn, id)
    }

    /// Check a candidate slot without booking it.
    pub fn check_slot(
        &self,
        conn: &Connection,
        practitioner_id: &Uuid,
        start: NaiveDateTime,
        duration_minutes: u32,
        exclude: Option<&Uuid>,
    ) -> Result<(), SchedulingError> {
        SlotChecker::new(conn, self.clock.now(), self.config.default_duration_minutes).check(
            practitioner_id,
            start.trunc_subsecs(0),
            duration_minutes,
            exclude,
        )
    }

    pub fn requires_attention(&self, conn: &Connection, id: &Uuid) -> Result<bool, SchedulingError> {
        Ok(load(conn, id)?.requires_attention(self.clock.now()))
    }

    pub fn appointments_requiring_attention(
        &self,
        conn: &Connection,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        Ok(db::appointments_requiring_attention(conn, &self.clock.now())?)
    }

    // ── Transitions ─────────────────────────────────────────────────────

    /// Create an appointment. It starts `booked` when a patient is given,
    /// `open` otherwise.
    pub fn create(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        req: NewAppointment,
    ) -> Result<Appointment, SchedulingError> {
        let practitioner_id = req.practitioner_id.ok_or(ValidationError::MissingPractitioner)?;
        let starts_at = req
            .starts_at
            .ok_or(ValidationError::MissingStart)?
            .trunc_subsecs(0);
        require_positive(req.charged_price)?;
        let now = self.clock.now();

        let appt = write_tx(conn, |tx| {
            require_practitioner(tx, &practitioner_id)?;
            let service = self.require_service(tx, req.service_type_id.as_ref())?;
            let minutes = resolve_duration(
                service.as_ref().and_then(|s| s.estimated_duration_minutes),
                self.config.default_duration_minutes,
            );
            SlotChecker::new(tx, now, self.config.default_duration_minutes).check(
                &practitioner_id,
                starts_at,
                minutes,
                None,
            )?;

            let (patient_id, snapshot) = match &req.patient {
                Some(patient) => self.resolve_patient(tx, patient)?,
                None => (None, PatientSnapshot::default()),
            };
            let state = if patient_id.is_some() || !snapshot.is_empty() {
                AppointmentState::Booked
            } else {
                AppointmentState::Open
            };
            let charged_price = req.charged_price.or_else(|| {
                service
                    .as_ref()
                    .map(|s| s.base_price)
                    .filter(|p| p.is_positive())
            });

            let appt = Appointment {
                id: Uuid::new_v4(),
                starts_at,
                state,
                practitioner_id: Some(practitioner_id),
                patient_id,
                snapshot,
                service_type_id: service.map(|s| s.id),
                charged_price,
                reason: req.reason.clone(),
                arrived_at: None,
                no_show_reason: None,
                payment_method: None,
                price_adjustment_reason: None,
                notes: req.notes.clone(),
                created_at: now,
                updated_at: now,
                created_by: actor.staff_id.clone(),
                completed_by: None,
                completed_at: None,
            };
            db::insert_appointment(tx, &appt).map_err(|e| duplicate_or(e, starts_at))?;
            Ok(appt)
        })?;

        tracing::info!(
            appointment_id = %appt.id,
            practitioner_id = %practitioner_id,
            state = %appt.state,
            "Appointment created"
        );
        self.record(
            conn,
            actor,
            AuditAction::Create,
            &appt,
            "Appointment created",
            Some(format!("state={} starts_at={}", appt.state, db::format_timestamp(&appt.starts_at))),
        );
        Ok(appt)
    }

    /// `open → booked`, attaching a patient.
    pub fn book(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        id: &Uuid,
        patient: PatientRef,
    ) -> Result<Appointment, SchedulingError> {
        let now = self.clock.now();
        let appt = write_tx(conn, |tx| {
            let mut appt = load(tx, id)?;
            appt.state = next_state(appt.state, Transition::Book)?;
            let (patient_id, snapshot) = self.resolve_patient(tx, &patient)?;
            appt.patient_id = patient_id;
            appt.snapshot = snapshot;
            appt.updated_at = now;
            db::update_appointment(tx, &appt)?;
            Ok(appt)
        })?;
        self.state_changed(conn, actor, &appt, AppointmentState::Open);
        Ok(appt)
    }

    /// `booked → confirmed`.
    pub fn confirm(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        id: &Uuid,
    ) -> Result<Appointment, SchedulingError> {
        let now = self.clock.now();
        let (appt, from) = write_tx(conn, |tx| {
            let mut appt = load(tx, id)?;
            let from = appt.state;
            appt.state = next_state(from, Transition::Confirm)?;
            appt.updated_at = now;
            db::update_appointment(tx, &appt)?;
            Ok((appt, from))
        })?;
        self.state_changed(conn, actor, &appt, from);
        Ok(appt)
    }

    /// `booked`/`confirmed` → `cancelled`. The patient relation is cleared
    /// after refreshing the snapshot from the live record.
    pub fn cancel(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        id: &Uuid,
    ) -> Result<Appointment, SchedulingError> {
        let now = self.clock.now();
        let (appt, from) = write_tx(conn, |tx| {
            let mut appt = load(tx, id)?;
            let from = appt.state;
            appt.state = next_state(from, Transition::Cancel)?;
            if let Some(patient_id) = appt.patient_id {
                if let Some(live) = self.patients.get(tx, &patient_id)? {
                    if appt.snapshot.differs_from(&live) {
                        appt.snapshot.refresh_from(&live);
                    }
                }
            }
            appt.patient_id = None;
            appt.updated_at = now;
            db::update_appointment(tx, &appt)?;
            Ok((appt, from))
        })?;
        self.state_changed(conn, actor, &appt, from);
        Ok(appt)
    }

    /// `booked`/`confirmed` → `completed`, once the time, record and
    /// price gates all pass.
    pub fn complete(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        id: &Uuid,
        req: CompletionRequest,
    ) -> Result<Appointment, SchedulingError> {
        let now = self.clock.now();
        let (appt, from) = write_tx(conn, |tx| {
            let mut appt = load(tx, id)?;
            let from = appt.state;
            let next = next_state(from, Transition::Complete)?;

            let service_base_price = match appt.service_type_id {
                Some(service_id) => self.services.get(tx, &service_id)?.map(|s| s.base_price),
                None => None,
            };
            let inputs = CompletionInputs {
                record: self.records.record_for_appointment(tx, &appt.id)?,
                explicit_price: req.explicit_price,
                service_base_price,
            };
            let price = check_completion(&appt, now, &inputs)?;

            appt.state = next;
            appt.charged_price = Some(price);
            appt.completed_at = Some(now);
            appt.completed_by = actor.staff_id.clone();
            if req.payment_method.is_some() {
                appt.payment_method = req.payment_method;
            }
            if req.notes.is_some() {
                appt.notes = req.notes.clone();
            }
            appt.updated_at = now;
            db::update_appointment(tx, &appt)?;
            Ok((appt, from))
        })?;
        self.state_changed(conn, actor, &appt, from);
        Ok(appt)
    }

    /// Change the price and notes of a completed appointment.
    pub fn adjust_price(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        id: &Uuid,
        adjustment: PriceAdjustment,
    ) -> Result<Appointment, SchedulingError> {
        let now = self.clock.now();
        let (appt, previous) = write_tx(conn, |tx| {
            let mut appt = load(tx, id)?;
            next_state(appt.state, Transition::AdjustPrice)?;
            require_positive(adjustment.new_price)?;

            let previous = appt.charged_price;
            if adjustment.new_price.is_some() {
                appt.charged_price = adjustment.new_price;
            }
            if adjustment.notes.is_some() {
                appt.notes = adjustment.notes.clone();
            }
            if adjustment.justification.is_some() {
                appt.price_adjustment_reason = adjustment.justification.clone();
            }
            appt.updated_at = now;
            db::update_appointment(tx, &appt)?;
            Ok((appt, previous))
        })?;

        tracing::info!(appointment_id = %appt.id, "Appointment price adjusted");
        self.record(
            conn,
            actor,
            AuditAction::Update,
            &appt,
            "Completed appointment price adjusted",
            Some(format!(
                "price {} -> {}",
                display_price(previous),
                display_price(appt.charged_price)
            )),
        );
        Ok(appt)
    }

    /// `booked`/`confirmed` → `no_show`, only once the start has passed.
    pub fn mark_no_show(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        id: &Uuid,
        reason: &str,
    ) -> Result<Appointment, SchedulingError> {
        let now = self.clock.now();
        let (appt, from) = write_tx(conn, |tx| {
            let mut appt = load(tx, id)?;
            let from = appt.state;
            let next = next_state(from, Transition::MarkNoShow)?;
            if appt.starts_at >= now {
                return Err(ValidationError::NotYetStarted(appt.starts_at).into());
            }
            appt.state = next;
            appt.no_show_reason = Some(reason.trim().to_string()).filter(|r| !r.is_empty());
            appt.updated_at = now;
            db::update_appointment(tx, &appt)?;
            Ok((appt, from))
        })?;
        self.state_changed(conn, actor, &appt, from);
        Ok(appt)
    }

    /// Record that the patient is in the waiting room.
    pub fn mark_arrived(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        id: &Uuid,
    ) -> Result<Appointment, SchedulingError> {
        let now = self.clock.now();
        let appt = write_tx(conn, |tx| {
            let mut appt = load(tx, id)?;
            next_state(appt.state, Transition::RecordArrival)?;
            appt.arrived_at = Some(now);
            appt.updated_at = now;
            db::update_appointment(tx, &appt)?;
            Ok(appt)
        })?;
        tracing::info!(appointment_id = %appt.id, "Patient arrival recorded");
        self.record(conn, actor, AuditAction::Update, &appt, "Patient arrival recorded", None);
        Ok(appt)
    }

    /// Move an unfinished appointment to a new time, practitioner or
    /// service. The patient stays the same.
    pub fn reschedule(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        id: &Uuid,
        req: RescheduleRequest,
    ) -> Result<Appointment, SchedulingError> {
        let starts_at = req.starts_at.trunc_subsecs(0);
        require_positive(req.charged_price)?;
        let now = self.clock.now();

        let (appt, previous_start) = write_tx(conn, |tx| {
            let mut appt = load(tx, id)?;
            next_state(appt.state, Transition::Reschedule)?;

            let practitioner_id = req
                .practitioner_id
                .or(appt.practitioner_id)
                .ok_or(ValidationError::MissingPractitioner)?;
            require_practitioner(tx, &practitioner_id)?;

            let service_changed =
                req.service_type_id.is_some() && req.service_type_id != appt.service_type_id;
            let service = if service_changed {
                self.require_service(tx, req.service_type_id.as_ref())?
            } else {
                match appt.service_type_id {
                    Some(service_id) => self.services.get(tx, &service_id)?,
                    None => None,
                }
            };
            let minutes = resolve_duration(
                service.as_ref().and_then(|s| s.estimated_duration_minutes),
                self.config.default_duration_minutes,
            );
            SlotChecker::new(tx, now, self.config.default_duration_minutes).check(
                &practitioner_id,
                starts_at,
                minutes,
                Some(&appt.id),
            )?;

            if let Some(price) = req.charged_price {
                appt.charged_price = Some(price);
            } else if service_changed {
                appt.charged_price = service
                    .as_ref()
                    .map(|s| s.base_price)
                    .filter(|p| p.is_positive());
            }
            if service_changed {
                appt.service_type_id = req.service_type_id;
            }

            let previous_start = appt.starts_at;
            appt.starts_at = starts_at;
            appt.practitioner_id = Some(practitioner_id);
            appt.updated_at = now;
            db::update_appointment(tx, &appt).map_err(|e| duplicate_or(e, starts_at))?;
            Ok((appt, previous_start))
        })?;

        tracing::info!(appointment_id = %appt.id, "Appointment rescheduled");
        self.record(
            conn,
            actor,
            AuditAction::Update,
            &appt,
            "Appointment rescheduled",
            Some(format!(
                "starts_at {} -> {}",
                db::format_timestamp(&previous_start),
                db::format_timestamp(&appt.starts_at)
            )),
        );
        Ok(appt)
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn require_service(
        &self,
        conn: &Connection,
        service_id: Option<&Uuid>,
    ) -> Result<Option<ServiceType>, SchedulingError> {
        match service_id {
            None => Ok(None),
            Some(id) => match self.services.get(conn, id)? {
                Some(service) => Ok(Some(service)),
                None => Err(ValidationError::UnknownService(*id).into()),
            },
        }
    }

    fn resolve_patient(
        &self,
        conn: &Connection,
        patient: &PatientRef,
    ) -> Result<(Option<Uuid>, PatientSnapshot), SchedulingError> {
        match patient {
            PatientRef::Existing(id) => {
                let found = self
                    .patients
                    .get(conn, id)?
                    .ok_or(ValidationError::UnknownPatient(*id))?;
                // The snapshot must be able to identify the patient after a cancel.
                if found.email.as_deref().and_then(non_blank).is_none() {
                    return Err(ValidationError::MissingPatientEmail.into());
                }
                Ok((Some(found.id), PatientSnapshot::from_patient(&found)))
            }
            PatientRef::ByEmail { name, email, phone } => {
                let name = non_blank(name).ok_or(ValidationError::MissingPatientName)?;
                let email = email_address(email)?;
                let phone = phone.as_deref().and_then(non_blank);
                let found = self
                    .patients
                    .find_or_create_by_email(conn, name, email, phone)?;
                Ok((Some(found.id), PatientSnapshot::from_patient(&found)))
            }
            PatientRef::Walkin(contact) => {
                let name = non_blank(&contact.name).ok_or(ValidationError::MissingPatientName)?;
                let email = email_address(contact.email.as_deref().unwrap_or_default())?;
                let contact = PatientContact {
                    name: name.to_string(),
                    email: Some(email.to_lowercase()),
                    phone: contact.phone.as_deref().and_then(non_blank).map(str::to_string),
                };
                Ok((None, PatientSnapshot::from_contact(&contact)))
            }
        }
    }

    fn state_changed(
        &self,
        conn: &Connection,
        actor: &Actor,
        appt: &Appointment,
        from: AppointmentState,
    ) {
        tracing::info!(
            appointment_id = %appt.id,
            from = %from,
            to = %appt.state,
            "Appointment state changed"
        );
        self.record(
            conn,
            actor,
            AuditAction::StateChange,
            appt,
            &format!("Appointment {from} -> {}", appt.state),
            None,
        );
    }

    fn record(
        &self,
        conn: &Connection,
        actor: &Actor,
        action: AuditAction,
        appt: &Appointment,
        description: &str,
        details: Option<String>,
    ) {
        let mut event = NewAuditEvent::new(actor, action, AuditModule::Appointments, description)
            .object(ObjectRef::appointment(appt.id));
        if let Some(details) = details {
            event = event.details(details);
        }
        self.audit.record(conn, event);
    }
}

/// Run `f` inside an `IMMEDIATE` transaction, committing on success.
fn write_tx<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Connection) -> Result<T, SchedulingError>,
) -> Result<T, SchedulingError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

fn load(conn: &Connection, id: &Uuid) -> Result<Appointment, SchedulingError> {
    db::get_appointment(conn, id)?.ok_or(SchedulingError::NotFound(*id))
}

fn require_practitioner(conn: &Connection, id: &Uuid) -> Result<(), SchedulingError> {
    match db::get_practitioner(conn, id)? {
        Some(p) if p.active => Ok(()),
        _ => Err(ValidationError::UnknownPractitioner(*id).into()),
    }
}

fn require_positive(price: Option<Money>) -> Result<(), ValidationError> {
    match price {
        Some(p) if !p.is_positive() => Err(ValidationError::NonPositivePrice),
        _ => Ok(()),
    }
}

/// A unique-index violation on write means another appointment took the
/// exact instant after the check.
fn duplicate_or(err: DatabaseError, starts_at: NaiveDateTime) -> SchedulingError {
    if err.is_unique_violation() {
        ConflictReason::DuplicateInstant(starts_at).into()
    } else {
        err.into()
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").unwrap());

/// Trimmed email, or the reason it cannot be used to reach the patient.
fn email_address(value: &str) -> Result<&str, ValidationError> {
    let email = non_blank(value).ok_or(ValidationError::MissingPatientEmail)?;
    if EMAIL_PATTERN.is_match(email) {
        Ok(email)
    } else {
        Err(ValidationError::InvalidPatientEmail)
    }
}

fn display_price(price: Option<Money>) -> String {
    price.map_or_else(|| "none".to_string(), |p| p.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{RetentionPolicy, SweepTrigger};
    use crate::calendar;
    use crate::clock::FixedClock;
    use crate::db::open_memory_database;
    use crate::scheduling::error::{GateFailure, StateError};
    use chrono::{Duration, NaiveDate, NaiveTime};

    struct Fixture {
        conn: Connection,
        clock: Arc<FixedClock>,
        scheduler: Scheduler,
        practitioner: Uuid,
        service: Uuid,
        actor: Actor,
    }

    // 2026-03-02 is a Monday; the clock starts on the Sunday before.
    fn monday(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn setup() -> Fixture {
        let conn = open_memory_database().unwrap();
        let clock = Arc::new(FixedClock::new(monday(12, 0) - Duration::days(1)));

        let practitioner = Uuid::new_v4();
        db::insert_practitioner(&conn, &Practitioner {
            id: practitioner,
            name: "Dr. Rojas".into(),
            active: true,
        })
        .unwrap();
        calendar::add_block(&conn, &practitioner, 0, hm(9, 0), hm(12, 0), &clock.now()).unwrap();

        let service = Uuid::new_v4();
        db::insert_service_type(&conn, &ServiceType {
            id: service,
            name: "Limpieza".into(),
            base_price: Money::from_major(25_000),
            estimated_duration_minutes: Some(30),
            active: true,
        })
        .unwrap();

        let audit = AuditLog::new(clock.clone(), RetentionPolicy::default(), SweepTrigger::Disabled);
        let scheduler = Scheduler::new(clock.clone(), audit);
        Fixture {
            conn,
            clock,
            scheduler,
            practitioner,
            service,
            actor: Actor::staff("staff-7"),
        }
    }

    fn insert_patient(conn: &Connection) -> Patient {
        let id = Uuid::new_v4();
        let patient = Patient {
            id,
            full_name: "Ana Pérez".into(),
            email: Some(format!("ana.{}@example.com", id.simple())),
            phone: Some("+56 9 1111 2222".into()),
        };
        db::insert_patient(conn, &patient).unwrap();
        patient
    }

    fn request(f: &Fixture, at: NaiveDateTime) -> NewAppointment {
        NewAppointment {
            practitioner_id: Some(f.practitioner),
            starts_at: Some(at),
            service_type_id: Some(f.service),
            ..Default::default()
        }
    }

    fn create_booked(f: &mut Fixture, at: NaiveDateTime) -> (Appointment, Patient) {
        let patient = insert_patient(&f.conn);
        let req = NewAppointment {
            patient: Some(PatientRef::Existing(patient.id)),
            ..request(f, at)
        };
        let appt = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap();
        (appt, patient)
    }

    fn link_complete_record(f: &Fixture, appt: &Appointment) {
        db::insert_clinical_record(
            &f.conn,
            &ClinicalRecord {
                id: Uuid::new_v4(),
                appointment_id: Some(appt.id),
                patient_name: Some("Ana Pérez".into()),
                reason: Some("Limpieza".into()),
                practitioner_id: Some(f.practitioner),
            },
            &f.clock.now(),
        )
        .unwrap();
    }

    fn history(f: &Fixture, appt: &Appointment) -> Vec<AuditEvent> {
        db::audit_events_for_object(&f.conn, &ObjectRef::appointment(appt.id)).unwrap()
    }

    // ── create ──────────────────────────────────────────────────────────

    #[test]
    fn create_without_patient_is_open() {
        let mut f = setup();
        let req = request(&f, monday(9, 0));
        let appt = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap();

        assert_eq!(appt.state, AppointmentState::Open);
        assert_eq!(appt.charged_price, Some(Money::from_major(25_000)));
        assert_eq!(appt.created_by.as_deref(), Some("staff-7"));

        let events = history(&f, &appt);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Create);
        assert_eq!(events[0].module, AuditModule::Appointments);
    }

    #[test]
    fn create_with_patient_starts_booked() {
        let mut f = setup();
        let (appt, patient) = create_booked(&mut f, monday(9, 0));
        assert_eq!(appt.state, AppointmentState::Booked);
        assert_eq!(appt.patient_id, Some(patient.id));
        assert_eq!(appt.snapshot, PatientSnapshot::from_patient(&patient));
    }

    #[test]
    fn create_by_email_registers_patient() {
        let mut f = setup();
        let req = NewAppointment {
            patient: Some(PatientRef::ByEmail {
                name: " Luis Díaz ".into(),
                email: "luis@example.com".into(),
                phone: None,
            }),
            ..request(&f, monday(9, 0))
        };
        let appt = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap();
        let registered = db::find_patient_by_email(&f.conn, "luis@example.com").unwrap().unwrap();
        assert_eq!(appt.patient_id, Some(registered.id));
        assert_eq!(appt.snapshot.name.as_deref(), Some("Luis Díaz"));
    }

    #[test]
    fn create_walkin_keeps_contact_without_record() {
        let mut f = setup();
        let req = NewAppointment {
            patient: Some(PatientRef::Walkin(PatientContact {
                name: "Carla Muñoz".into(),
                email: Some(" Carla.Munoz@Example.com ".into()),
                phone: Some("+56 9 5555 6666".into()),
            })),
            ..request(&f, monday(9, 0))
        };
        let appt = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap();
        assert_eq!(appt.state, AppointmentState::Booked);
        assert!(appt.patient_id.is_none());
        assert_eq!(appt.snapshot.name.as_deref(), Some("Carla Muñoz"));
        assert_eq!(appt.snapshot.email.as_deref(), Some("carla.munoz@example.com"));
    }

    #[test]
    fn book_rejects_directory_patient_without_email() {
        let mut f = setup();
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: "Jorge Vidal".into(),
            email: None,
            phone: Some("+56 9 7777 8888".into()),
        };
        db::insert_patient(&f.conn, &patient).unwrap();
        let req = request(&f, monday(9, 0));
        let appt = f
            .scheduler
            .create(&mut f.conn, &f.actor, req)
            .unwrap();

        let err = f
            .scheduler
            .book(&mut f.conn, &f.actor, &appt.id, PatientRef::Existing(patient.id))
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::Validation(ValidationError::MissingPatientEmail)
        ));
        let stored = f.scheduler.get(&f.conn, &appt.id).unwrap();
        assert_eq!(stored.state, AppointmentState::Open);
        assert!(stored.patient_id.is_none());
    }

    #[test]
    fn email_format_is_checked() {
        for good in ["ana@example.com", "a.b+c@mail.example.cl"] {
            assert_eq!(email_address(good), Ok(good));
        }
        assert_eq!(email_address("  "), Err(ValidationError::MissingPatientEmail));
        for bad in ["ana", "ana@", "@example.com", "ana@example", "ana @example.com", "a@b@c.com", "ana@example."] {
            assert_eq!(email_address(bad), Err(ValidationError::InvalidPatientEmail), "{bad}");
        }
    }

    #[test]
    fn create_validation_errors() {
        let mut f = setup();
        let cases: Vec<(NewAppointment, ValidationError)> = vec![
            (
                NewAppointment {
                    practitioner_id: None,
                    ..request(&f, monday(9, 0))
                },
                ValidationError::MissingPractitioner,
            ),
            (
                NewAppointment {
                    starts_at: None,
                    ..request(&f, monday(9, 0))
                },
                ValidationError::MissingStart,
            ),
            (
                NewAppointment {
                    charged_price: Some(Money::ZERO),
                    ..request(&f, monday(9, 0))
                },
                ValidationError::NonPositivePrice,
            ),
            (
                NewAppointment {
                    patient: Some(PatientRef::ByEmail {
                        name: "Luis".into(),
                        email: "  ".into(),
                        phone: None,
                    }),
                    ..request(&f, monday(9, 0))
                },
                ValidationError::MissingPatientEmail,
            ),
            (
                NewAppointment {
                    patient: Some(PatientRef::ByEmail {
                        name: "Luis".into(),
                        email: "luis.example.com".into(),
                        phone: None,
                    }),
                    ..request(&f, monday(9, 0))
                },
                ValidationError::InvalidPatientEmail,
            ),
            (
                NewAppointment {
                    patient: Some(PatientRef::Walkin(PatientContact {
                        name: "Carla".into(),
                        email: None,
                        phone: Some("+56 9 5555 6666".into()),
                    })),
                    ..request(&f, monday(9, 0))
                },
                ValidationError::MissingPatientEmail,
            ),
            (
                NewAppointment {
                    patient: Some(PatientRef::Walkin(PatientContact {
                        name: "".into(),
                        email: None,
                        phone: None,
                    })),
                    ..request(&f, monday(9, 0))
                },
                ValidationError::MissingPatientName,
            ),
        ];
        for (req, expected) in cases {
            match f.scheduler.create(&mut f.conn, &f.actor, req) {
                Err(SchedulingError::Validation(e)) => assert_eq!(e, expected),
                other => panic!("Expected {expected:?}, got {other:?}"),
            }
        }
        // Nothing was written.
        let count: i64 = f
            .conn
            .query_row("SELECT COUNT(*) FROM appointments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn create_rejects_unknown_or_inactive_references() {
        let mut f = setup();
        let unknown = Uuid::new_v4();
        let req = NewAppointment {
            service_type_id: Some(unknown),
            ..request(&f, monday(9, 0))
        };
        let err = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap_err();
        assert!(matches!(err, SchedulingError::Validation(ValidationError::UnknownService(id)) if id == unknown));

        let req = NewAppointment {
            patient: Some(PatientRef::Existing(unknown)),
            ..request(&f, monday(9, 0))
        };
        let err = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap_err();
        assert!(matches!(err, SchedulingError::Validation(ValidationError::UnknownPatient(_))));

        db::set_practitioner_active(&f.conn, &f.practitioner, false).unwrap();
        let req = request(&f, monday(9, 0));
        let err = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap_err();
        assert!(matches!(err, SchedulingError::Validation(ValidationError::UnknownPractitioner(_))));
    }

    #[test]
    fn explicit_price_overrides_base_price() {
        let mut f = setup();
        let req = NewAppointment {
            charged_price: Some(Money::from_major(18_000)),
            ..request(&f, monday(9, 0))
        };
        let appt = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap();
        assert_eq!(appt.charged_price, Some(Money::from_major(18_000)));
    }

    #[test]
    fn start_is_truncated_to_whole_seconds() {
        let mut f = setup();
        let at = monday(9, 0) + Duration::milliseconds(750);
        let req = request(&f, at);
        let appt = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap();
        assert_eq!(appt.starts_at, monday(9, 0));
        assert_eq!(f.scheduler.get(&f.conn, &appt.id).unwrap().starts_at, monday(9, 0));
    }

    // ── book / confirm ──────────────────────────────────────────────────

    #[test]
    fn book_attaches_patient_once() {
        let mut f = setup();
        let req = request(&f, monday(9, 0));
        let open = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap();
        let patient = insert_patient(&f.conn);

        let booked = f
            .scheduler
            .book(&mut f.conn, &f.actor, &open.id, PatientRef::Existing(patient.id))
            .unwrap();
        assert_eq!(booked.state, AppointmentState::Booked);
        assert_eq!(booked.snapshot.email, patient.email);

        let err = f
            .scheduler
            .book(&mut f.conn, &f.actor, &open.id, PatientRef::Existing(patient.id))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidState(_)));
    }

    #[test]
    fn confirm_only_from_booked() {
        let mut f = setup();
        let (appt, _) = create_booked(&mut f, monday(9, 0));
        let confirmed = f.scheduler.confirm(&mut f.conn, &f.actor, &appt.id).unwrap();
        assert_eq!(confirmed.state, AppointmentState::Confirmed);

        let err = f.scheduler.confirm(&mut f.conn, &f.actor, &appt.id).unwrap_err();
        match err {
            SchedulingError::InvalidState(StateError { from, transition }) => {
                assert_eq!(from, AppointmentState::Confirmed);
                assert_eq!(transition, Transition::Confirm);
            }
            other => panic!("Expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn unknown_appointment_is_not_found() {
        let mut f = setup();
        let id = Uuid::new_v4();
        let err = f.scheduler.confirm(&mut f.conn, &f.actor, &id).unwrap_err();
        assert!(matches!(err, SchedulingError::NotFound(missing) if missing == id));
    }

    // ── cancel ──────────────────────────────────────────────────────────

    #[test]
    fn cancel_detaches_patient_but_keeps_snapshot() {
        let mut f = setup();
        let (appt, patient) = create_booked(&mut f, monday(9, 0));
        let cancelled = f.scheduler.cancel(&mut f.conn, &f.actor, &appt.id).unwrap();

        assert_eq!(cancelled.state, AppointmentState::Cancelled);
        assert!(cancelled.patient_id.is_none());
        assert_eq!(cancelled.practitioner_id, Some(f.practitioner));
        assert_eq!(cancelled.snapshot.name.as_deref(), Some(patient.full_name.as_str()));
        assert_eq!(cancelled.snapshot.email, patient.email);

        let stored = f.scheduler.get(&f.conn, &appt.id).unwrap();
        assert_eq!(stored.snapshot, cancelled.snapshot);
    }

    #[test]
    fn cancel_captures_latest_contact_details() {
        let mut f = setup();
        let (appt, mut patient) = create_booked(&mut f, monday(9, 0));
        patient.phone = Some("+56 9 9999 0000".into());
        db::update_patient_contact(&f.conn, &patient).unwrap();

        let cancelled = f.scheduler.cancel(&mut f.conn, &f.actor, &appt.id).unwrap();
        assert_eq!(cancelled.snapshot.phone.as_deref(), Some("+56 9 9999 0000"));
    }

    #[test]
    fn cancel_open_is_refused_without_side_effects() {
        let mut f = setup();
        let req = request(&f, monday(9, 0));
        let open = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap();
        let before = history(&f, &open).len();

        let err = f.scheduler.cancel(&mut f.conn, &f.actor, &open.id).unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidState(_)));
        assert_eq!(f.scheduler.get(&f.conn, &open.id).unwrap().state, AppointmentState::Open);
        assert_eq!(history(&f, &open).len(), before);
    }

    // ── complete / adjust-price ─────────────────────────────────────────

    #[test]
    fn complete_sets_completion_fields() {
        let mut f = setup();
        let (appt, _) = create_booked(&mut f, monday(9, 0));
        link_complete_record(&f, &appt);
        f.clock.set(monday(9, 45));

        let done = f
            .scheduler
            .complete(&mut f.conn, &f.actor, &appt.id, CompletionRequest {
                explicit_price: None,
                payment_method: Some(PaymentMethod::Cash),
                notes: Some("Sin complicaciones".into()),
            })
            .unwrap();
        assert_eq!(done.state, AppointmentState::Completed);
        assert_eq!(done.charged_price, Some(Money::from_major(25_000)));
        assert_eq!(done.completed_at, Some(monday(9, 45)));
        assert_eq!(done.completed_by.as_deref(), Some("staff-7"));
        assert_eq!(done.payment_method, Some(PaymentMethod::Cash));
        assert_eq!(done.notes.as_deref(), Some("Sin complicaciones"));
    }

    #[test]
    fn complete_in_future_fails_time_gate() {
        let mut f = setup();
        let (appt, _) = create_booked(&mut f, monday(9, 0));
        link_complete_record(&f, &appt);
        let err = f
            .scheduler
            .complete(&mut f.conn, &f.actor, &appt.id, CompletionRequest::default())
            .unwrap_err();
        assert!(matches!(err, SchedulingError::Gate(GateFailure::TimeGate(_))));
        assert_eq!(f.scheduler.get(&f.conn, &appt.id).unwrap().state, AppointmentState::Booked);
    }

    #[test]
    fn adjust_price_only_after_completion() {
        let mut f = setup();
        let (appt, _) = create_booked(&mut f, monday(9, 0));
        let adjustment = PriceAdjustment {
            new_price: Some(Money::from_major(20_000)),
            notes: None,
            justification: Some("Descuento convenio".into()),
        };

        let err = f
            .scheduler
            .adjust_price(&mut f.conn, &f.actor, &appt.id, adjustment.clone())
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidState(_)));
        let untouched = f.scheduler.get(&f.conn, &appt.id).unwrap();
        assert_eq!(untouched.charged_price, Some(Money::from_major(25_000)));

        link_complete_record(&f, &appt);
        f.clock.set(monday(10, 0));
        f.scheduler
            .complete(&mut f.conn, &f.actor, &appt.id, CompletionRequest::default())
            .unwrap();

        let adjusted = f
            .scheduler
            .adjust_price(&mut f.conn, &f.actor, &appt.id, adjustment)
            .unwrap();
        assert_eq!(adjusted.state, AppointmentState::Completed);
        assert_eq!(adjusted.charged_price, Some(Money::from_major(20_000)));
        assert_eq!(adjusted.price_adjustment_reason.as_deref(), Some("Descuento convenio"));
        assert_eq!(adjusted.starts_at, appt.starts_at);

        let err = f
            .scheduler
            .adjust_price(&mut f.conn, &f.actor, &appt.id, PriceAdjustment {
                new_price: Some(Money::ZERO),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SchedulingError::Validation(ValidationError::NonPositivePrice)));
    }

    // ── no-show / arrival ───────────────────────────────────────────────

    #[test]
    fn no_show_requires_past_start() {
        let mut f = setup();
        let (appt, _) = create_booked(&mut f, monday(9, 0));

        let err = f
            .scheduler
            .mark_no_show(&mut f.conn, &f.actor, &appt.id, "No llegó")
            .unwrap_err();
        assert!(matches!(err, SchedulingError::Validation(ValidationError::NotYetStarted(_))));

        f.clock.set(monday(9, 20));
        let no_show = f
            .scheduler
            .mark_no_show(&mut f.conn, &f.actor, &appt.id, " No llegó ")
            .unwrap();
        assert_eq!(no_show.state, AppointmentState::NoShow);
        assert_eq!(no_show.no_show_reason.as_deref(), Some("No llegó"));
    }

    #[test]
    fn arrival_recorded_without_state_change() {
        let mut f = setup();
        let (appt, _) = create_booked(&mut f, monday(9, 0));
        f.clock.set(monday(8, 50));
        let arrived = f.scheduler.mark_arrived(&mut f.conn, &f.actor, &appt.id).unwrap();
        assert_eq!(arrived.state, AppointmentState::Booked);
        assert_eq!(arrived.arrived_at, Some(monday(8, 50)));
    }

    // ── reschedule ──────────────────────────────────────────────────────

    #[test]
    fn reschedule_may_overlap_its_own_old_slot() {
        let mut f = setup();
        let (appt, _) = create_booked(&mut f, monday(9, 0));
        let moved = f
            .scheduler
            .reschedule(&mut f.conn, &f.actor, &appt.id, RescheduleRequest {
                starts_at: monday(9, 15),
                practitioner_id: None,
                service_type_id: None,
                charged_price: None,
            })
            .unwrap();
        assert_eq!(moved.starts_at, monday(9, 15));
        assert_eq!(moved.state, AppointmentState::Booked);
        assert_eq!(moved.charged_price, Some(Money::from_major(25_000)));
    }

    #[test]
    fn reschedule_checks_other_appointments() {
        let mut f = setup();
        let (first, _) = create_booked(&mut f, monday(9, 0));
        let (second, _) = {
            let patient = Patient {
                id: Uuid::new_v4(),
                full_name: "Luis Díaz".into(),
                email: Some("luis@example.com".into()),
                phone: None,
            };
            db::insert_patient(&f.conn, &patient).unwrap();
            let req = NewAppointment {
                patient: Some(PatientRef::Existing(patient.id)),
                ..request(&f, monday(10, 0))
            };
            (f.scheduler.create(&mut f.conn, &f.actor, req).unwrap(), patient)
        };

        let err = f
            .scheduler
            .reschedule(&mut f.conn, &f.actor, &second.id, RescheduleRequest {
                starts_at: monday(9, 15),
                practitioner_id: None,
                service_type_id: None,
                charged_price: None,
            })
            .unwrap_err();
        match err {
            SchedulingError::Conflict(ConflictReason::Overlap { existing_id, .. }) => {
                assert_eq!(existing_id, first.id)
            }
            other => panic!("Expected Overlap, got {other:?}"),
        }
        assert_eq!(f.scheduler.get(&f.conn, &second.id).unwrap().starts_at, monday(10, 0));
    }

    #[test]
    fn reschedule_with_new_service_takes_its_base_price() {
        let mut f = setup();
        let (appt, _) = create_booked(&mut f, monday(9, 0));
        let ortho = Uuid::new_v4();
        db::insert_service_type(&f.conn, &ServiceType {
            id: ortho,
            name: "Control ortodoncia".into(),
            base_price: Money::from_major(35_000),
            estimated_duration_minutes: Some(60),
            active: true,
        })
        .unwrap();

        let moved = f
            .scheduler
            .reschedule(&mut f.conn, &f.actor, &appt.id, RescheduleRequest {
                starts_at: monday(10, 0),
                practitioner_id: None,
                service_type_id: Some(ortho),
                charged_price: None,
            })
            .unwrap();
        assert_eq!(moved.service_type_id, Some(ortho));
        assert_eq!(moved.charged_price, Some(Money::from_major(35_000)));

        // 60 minutes from 11:15 runs past the block.
        let err = f
            .scheduler
            .reschedule(&mut f.conn, &f.actor, &appt.id, RescheduleRequest {
                starts_at: monday(11, 15),
                practitioner_id: None,
                service_type_id: None,
                charged_price: None,
            })
            .unwrap_err();
        assert!(matches!(err, SchedulingError::Conflict(ConflictReason::DurationDoesNotFit)));
    }

    #[test]
    fn completed_cannot_be_rescheduled() {
        let mut f = setup();
        let (appt, _) = create_booked(&mut f, monday(9, 0));
        link_complete_record(&f, &appt);
        f.clock.set(monday(9, 40));
        f.scheduler
            .complete(&mut f.conn, &f.actor, &appt.id, CompletionRequest::default())
            .unwrap();
        f.clock.set(monday(12, 0) - Duration::days(1));

        let err = f
            .scheduler
            .reschedule(&mut f.conn, &f.actor, &appt.id, RescheduleRequest {
                starts_at: monday(10, 0),
                practitioner_id: None,
                service_type_id: None,
                charged_price: None,
            })
            .unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidState(_)));
    }

    // ── attention / audit trail ─────────────────────────────────────────

    #[test]
    fn past_unprogressed_appointments_need_attention() {
        let mut f = setup();
        let req = request(&f, monday(9, 0));
        let open = f.scheduler.create(&mut f.conn, &f.actor, req).unwrap();
        let (booked, _) = create_booked(&mut f, monday(10, 0));
        let (confirmed, _) = create_booked(&mut f, monday(11, 0));
        f.scheduler.confirm(&mut f.conn, &f.actor, &confirmed.id).unwrap();

        assert!(!f.scheduler.requires_attention(&f.conn, &open.id).unwrap());

        f.clock.set(monday(12, 0));
        assert!(f.scheduler.requires_attention(&f.conn, &open.id).unwrap());
        assert!(f.scheduler.requires_attention(&f.conn, &booked.id).unwrap());
        assert!(!f.scheduler.requires_attention(&f.conn, &confirmed.id).unwrap());

        let ids: Vec<Uuid> = f
            .scheduler
            .appointments_requiring_attention(&f.conn)
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![open.id, booked.id]);
    }

    #[test]
    fn every_transition_leaves_an_audit_event() {
        let mut f = setup();
        let (appt, _) = create_booked(&mut f, monday(9, 0));
        f.scheduler.confirm(&mut f.conn, &f.actor, &appt.id).unwrap();
        f.scheduler.cancel(&mut f.conn, &f.actor, &appt.id).unwrap();

        let events = history(&f, &appt);
        let actions: Vec<AuditAction> = events.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::Create, AuditAction::StateChange, AuditAction::StateChange]
        );
        assert_eq!(events[2].description, "Appointment confirmed -> cancelled");
        assert!(events.iter().all(|e| e.actor_id.as_deref() == Some("staff-7")));
    }
}
