//! The Dinner aggregate and its value objects.
//!
//! The aggregate is a pure data-and-rules object: it validates its own
//! invariants and enforces the lifecycle state machine, but it neither
//! persists itself nor publishes facts. Those effects belong to the
//! [`DinnerLifecycle`](crate::service::DinnerLifecycle) command handlers.

use chrono::{DateTime, Duration, Utc};
use tablehop_core::fact::{DinnerId, DinnerSnapshot, HostId, MenuId};
use thiserror::Error;

/// Errors surfaced by dinner operations.
#[derive(Error, Debug)]
pub enum DinnerError {
    /// The request was rejected before persistence.
    #[error("invalid dinner: {0}")]
    Validation(String),

    /// No dinner exists with the given id.
    #[error("dinner {0} not found")]
    NotFound(DinnerId),

    /// The requested lifecycle transition is not allowed; state is unchanged.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The state change was persisted but the fact could not be published.
    #[error("failed to publish {event_type}: {reason}")]
    Publish {
        /// Event type that failed to publish.
        event_type: String,
        /// Transport-level reason.
        reason: String,
    },

    /// The repository failed.
    #[error("storage failure: {0}")]
    Storage(String),

    /// A synchronous collaborator check (identity, menu) failed.
    #[error("collaborator check failed: {0}")]
    Collaborator(String),
}

/// A single rejected value, produced by the value-object constructors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Lifecycle status of a dinner. `Completed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DinnerStatus {
    /// Scheduled but not yet started.
    Upcoming,
    /// Currently running.
    InProgress,
    /// Finished; no further transitions.
    Completed,
    /// Moved to a new time range, awaiting start.
    Rescheduled,
}

impl DinnerStatus {
    /// Stable string form, used in snapshots and storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "UPCOMING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Rescheduled => "RESCHEDULED",
        }
    }
}

impl std::fmt::Display for DinnerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A start/end pair where start is strictly before end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Construct a time range.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(ValidationError(
                "start time must be before end time".to_string(),
            ))
        }
    }

    /// Start of the range.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// End of the range.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether `time` falls inside the range (inclusive bounds).
    #[must_use]
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.start && time <= self.end
    }

    /// Length of the range.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// A postal address with all components required.
///
/// The wire and storage form is the formatted string
/// `"street, city, state, postal code, country"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    street: String,
    city: String,
    state: String,
    postal_code: String,
    country: String,
}

impl Address {
    /// Parse the formatted `"street, city, state, postal code, country"` form.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the string does not have exactly five
    /// comma-separated components or any component is empty.
    pub fn parse(address: &str) -> Result<Self, ValidationError> {
        if address.trim().is_empty() {
            return Err(ValidationError("address cannot be empty".to_string()));
        }

        let parts: Vec<&str> = address.split(',').map(str::trim).collect();
        if parts.len() != 5 {
            return Err(ValidationError(
                "expected address as: street, city, state, postal code, country".to_string(),
            ));
        }
        if parts.iter().any(|part| part.is_empty()) {
            return Err(ValidationError(
                "all address components must be non-empty".to_string(),
            ));
        }

        Ok(Self {
            street: parts[0].to_string(),
            city: parts[1].to_string(),
            state: parts[2].to_string(),
            postal_code: parts[3].to_string(),
            country: parts[4].to_string(),
        })
    }

    /// Formatted string form: `"street, city, state, postal code, country"`.
    #[must_use]
    pub fn format(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}",
            self.street, self.city, self.state, self.postal_code, self.country
        )
    }
}

/// Request to create (or fully update) a dinner.
#[derive(Clone, Debug)]
pub struct NewDinner {
    /// Hosting user; must be a known host with id > 0.
    pub host_id: i64,
    /// Menu served; must exist with id > 0.
    pub menu_id: i64,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Price per seat; must not be negative.
    pub price: f64,
    /// Scheduled start.
    pub start_time: DateTime<Utc>,
    /// Scheduled end; must be after the start.
    pub end_time: DateTime<Utc>,
    /// Formatted address string.
    pub address: String,
    /// Cuisine type; must not be blank.
    pub cuisine_type: String,
    /// Maximum guest count; must not be negative.
    pub max_guest_count: i32,
}

/// The Dinner aggregate root.
///
/// Created once per booking, never hard-deleted, only transitioned.
#[derive(Clone, Debug)]
pub struct Dinner {
    id: DinnerId,
    host_id: HostId,
    menu_id: MenuId,
    name: String,
    description: String,
    price: f64,
    time_range: TimeRange,
    address: Address,
    cuisine_type: String,
    max_guest_count: i32,
    status: DinnerStatus,
}

impl Dinner {
    /// Validate a creation request into a new aggregate in `Upcoming` state.
    ///
    /// The id is a placeholder until the repository assigns one on insert.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::Validation`] listing every rejected field.
    pub fn new(spec: &NewDinner) -> Result<Self, DinnerError> {
        Self::hydrate(DinnerId(0), spec, DinnerStatus::Upcoming)
    }

    /// Rebuild an aggregate from persisted state.
    ///
    /// Unlike [`Dinner::new`] the persisted status is taken as a parameter,
    /// so repositories rehydrate without bypassing invariant checks.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::Validation`] if the persisted fields no longer
    /// satisfy the aggregate invariants.
    pub fn hydrate(id: DinnerId, spec: &NewDinner, status: DinnerStatus) -> Result<Self, DinnerError> {
        let mut errors: Vec<String> = Vec::new();

        if spec.host_id <= 0 {
            errors.push("host id must be positive".to_string());
        }
        if spec.menu_id <= 0 {
            errors.push("menu id must be positive".to_string());
        }
        if spec.name.trim().is_empty() {
            errors.push("name is required".to_string());
        }
        if spec.price < 0.0 {
            errors.push("price cannot be negative".to_string());
        }
        if spec.cuisine_type.trim().is_empty() {
            errors.push("cuisine type is required".to_string());
        }
        if spec.max_guest_count < 0 {
            errors.push("maximum guest count cannot be negative".to_string());
        }

        let time_range = match TimeRange::new(spec.start_time, spec.end_time) {
            Ok(range) => Some(range),
            Err(e) => {
                errors.push(format!("invalid time range: {e}"));
                None
            }
        };
        let address = match Address::parse(&spec.address) {
            Ok(address) => Some(address),
            Err(e) => {
                errors.push(format!("invalid address: {e}"));
                None
            }
        };

        match (time_range, address) {
            (Some(time_range), Some(address)) if errors.is_empty() => Ok(Self {
                id,
                host_id: HostId(spec.host_id),
                menu_id: MenuId(spec.menu_id),
                name: spec.name.clone(),
                description: spec.description.clone(),
                price: spec.price,
                time_range,
                address,
                cuisine_type: spec.cuisine_type.clone(),
                max_guest_count: spec.max_guest_count,
                status,
            }),
            _ => Err(DinnerError::Validation(errors.join(", "))),
        }
    }

    /// Replace this aggregate's identity. Used by repositories when the
    /// storage layer assigns the id on insert.
    #[must_use]
    pub const fn with_id(mut self, id: DinnerId) -> Self {
        self.id = id;
        self
    }

    /// Apply a full update, revalidating every field. Status is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::Validation`] if the update is rejected; the
    /// aggregate is unchanged in that case.
    pub fn apply_update(&mut self, spec: &NewDinner) -> Result<(), DinnerError> {
        let updated = Self::hydrate(self.id, spec, self.status)?;
        *self = updated;
        Ok(())
    }

    /// Move the dinner to a new time range.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::InvalidStateTransition`] for completed dinners
    /// and [`DinnerError::Validation`] for a bad range; state is unchanged on
    /// error.
    pub fn reschedule(
        &mut self,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<(), DinnerError> {
        if self.status == DinnerStatus::Completed {
            return Err(DinnerError::InvalidStateTransition(
                "cannot reschedule a completed dinner".to_string(),
            ));
        }
        let range = TimeRange::new(new_start, new_end)
            .map_err(|e| DinnerError::Validation(format!("invalid time range: {e}")))?;
        self.time_range = range;
        self.status = DinnerStatus::Rescheduled;
        Ok(())
    }

    /// Start the dinner.
    ///
    /// Allowed only from `Upcoming` or `Rescheduled`, and only once the
    /// scheduled start time has passed.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::InvalidStateTransition`] otherwise; state is
    /// unchanged on error.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), DinnerError> {
        if !matches!(self.status, DinnerStatus::Upcoming | DinnerStatus::Rescheduled) {
            return Err(DinnerError::InvalidStateTransition(format!(
                "only upcoming or rescheduled dinners can be started, status is {}",
                self.status
            )));
        }
        if now < self.time_range.start() {
            return Err(DinnerError::InvalidStateTransition(
                "dinner cannot start before its scheduled time".to_string(),
            ));
        }
        self.status = DinnerStatus::InProgress;
        Ok(())
    }

    /// Complete the dinner. Allowed only from `InProgress`.
    ///
    /// # Errors
    ///
    /// Returns [`DinnerError::InvalidStateTransition`] otherwise; state is
    /// unchanged on error.
    pub fn complete(&mut self) -> Result<(), DinnerError> {
        if self.status != DinnerStatus::InProgress {
            return Err(DinnerError::InvalidStateTransition(format!(
                "only in-progress dinners can be completed, status is {}",
                self.status
            )));
        }
        self.status = DinnerStatus::Completed;
        Ok(())
    }

    /// Denormalized copy of the current state for embedding in facts.
    #[must_use]
    pub fn snapshot(&self) -> DinnerSnapshot {
        DinnerSnapshot {
            id: self.id,
            host_id: self.host_id,
            menu_id: self.menu_id,
            name: self.name.clone(),
            description: self.description.clone(),
            price: self.price,
            start_time: self.time_range.start(),
            end_time: self.time_range.end(),
            address: self.address.format(),
            cuisine_type: self.cuisine_type.clone(),
            max_guest_count: self.max_guest_count,
            status: self.status.as_str().to_string(),
        }
    }

    /// Dinner id.
    #[must_use]
    pub const fn id(&self) -> DinnerId {
        self.id
    }

    /// Hosting user.
    #[must_use]
    pub const fn host_id(&self) -> HostId {
        self.host_id
    }

    /// Menu served at this dinner.
    #[must_use]
    pub const fn menu_id(&self) -> MenuId {
        self.menu_id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> DinnerStatus {
        self.status
    }

    /// Scheduled start.
    #[must_use]
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.time_range.start()
    }

    /// Scheduled end.
    #[must_use]
    pub const fn end_time(&self) -> DateTime<Utc> {
        self.time_range.end()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can panic
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T18:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    fn valid_spec() -> NewDinner {
        let start = base_time();
        NewDinner {
            host_id: 1,
            menu_id: 1,
            name: "Tagine Night".to_string(),
            description: "Slow-cooked lamb with preserved lemon".to_string(),
            price: 35.0,
            start_time: start,
            end_time: start + Duration::hours(3),
            address: "1 Rue Atlas, Marrakesh, MK, 40000, Morocco".to_string(),
            cuisine_type: "Moroccan".to_string(),
            max_guest_count: 8,
        }
    }

    proptest! {
        #[test]
        fn time_range_accepts_exactly_start_before_end(start_offset in -10_000i64..10_000, end_offset in -10_000i64..10_000) {
            let base = base_time();
            let start = base + Duration::seconds(start_offset);
            let end = base + Duration::seconds(end_offset);
            let result = TimeRange::new(start, end);
            prop_assert_eq!(result.is_ok(), start < end);
        }
    }

    #[test]
    fn address_roundtrips_through_format() {
        let address = Address::parse("1 Rue Atlas, Marrakesh, MK, 40000, Morocco")
            .expect("valid address should parse");
        assert_eq!(address.format(), "1 Rue Atlas, Marrakesh, MK, 40000, Morocco");
    }

    #[test]
    fn address_rejects_missing_or_blank_components() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("street, city, state, 40000").is_err());
        assert!(Address::parse("street, , state, 40000, country").is_err());
        assert!(Address::parse("a, b, c, d, e, f").is_err());
    }

    #[test]
    fn new_dinners_start_upcoming() {
        let dinner = Dinner::new(&valid_spec()).expect("valid spec should build");
        assert_eq!(dinner.status(), DinnerStatus::Upcoming);
    }

    #[test]
    fn validation_collects_every_rejected_field() {
        let mut spec = valid_spec();
        spec.host_id = 0;
        spec.menu_id = -4;
        spec.name = "  ".to_string();
        spec.price = -1.0;
        spec.max_guest_count = -1;
        let err = Dinner::new(&spec).expect_err("invalid spec must fail");
        let DinnerError::Validation(message) = err else {
            panic!("expected a validation error");
        };
        assert!(message.contains("host id"));
        assert!(message.contains("menu id"));
        assert!(message.contains("name"));
        assert!(message.contains("price"));
        assert!(message.contains("guest count"));
    }

    #[test]
    fn start_requires_upcoming_or_rescheduled_and_a_reached_start_time() {
        let mut dinner = Dinner::new(&valid_spec()).expect("valid spec");
        let start = dinner.start_time();

        // Too early: status unchanged.
        let err = dinner.start(start - Duration::minutes(1));
        assert!(matches!(err, Err(DinnerError::InvalidStateTransition(_))));
        assert_eq!(dinner.status(), DinnerStatus::Upcoming);

        // On time.
        dinner.start(start).expect("start at scheduled time");
        assert_eq!(dinner.status(), DinnerStatus::InProgress);

        // Already in progress: rejected, unchanged.
        let err = dinner.start(start + Duration::hours(1));
        assert!(matches!(err, Err(DinnerError::InvalidStateTransition(_))));
        assert_eq!(dinner.status(), DinnerStatus::InProgress);
    }

    #[test]
    fn rescheduled_dinners_can_start() {
        let mut dinner = Dinner::new(&valid_spec()).expect("valid spec");
        let new_start = dinner.start_time() + Duration::days(1);
        dinner
            .reschedule(new_start, new_start + Duration::hours(3))
            .expect("reschedule should succeed");
        assert_eq!(dinner.status(), DinnerStatus::Rescheduled);

        dinner.start(new_start).expect("start after reschedule");
        assert_eq!(dinner.status(), DinnerStatus::InProgress);
    }

    #[test]
    fn complete_requires_in_progress() {
        let mut dinner = Dinner::new(&valid_spec()).expect("valid spec");
        assert!(matches!(
            dinner.complete(),
            Err(DinnerError::InvalidStateTransition(_))
        ));
        assert_eq!(dinner.status(), DinnerStatus::Upcoming);

        dinner.start(dinner.start_time()).expect("start");
        dinner.complete().expect("complete from in-progress");
        assert_eq!(dinner.status(), DinnerStatus::Completed);
    }

    #[test]
    fn completed_is_terminal() {
        let mut dinner = Dinner::new(&valid_spec()).expect("valid spec");
        dinner.start(dinner.start_time()).expect("start");
        dinner.complete().expect("complete");

        let later = dinner.start_time() + Duration::days(1);
        assert!(dinner.start(later).is_err());
        assert!(dinner.complete().is_err());
        assert!(dinner.reschedule(later, later + Duration::hours(2)).is_err());
        assert_eq!(dinner.status(), DinnerStatus::Completed);
    }

    #[test]
    fn reschedule_rejects_a_bad_range_and_keeps_state() {
        let mut dinner = Dinner::new(&valid_spec()).expect("valid spec");
        let start = dinner.start_time();
        let err = dinner.reschedule(start, start);
        assert!(matches!(err, Err(DinnerError::Validation(_))));
        assert_eq!(dinner.status(), DinnerStatus::Upcoming);
    }

    #[test]
    fn hydrate_preserves_the_persisted_status() {
        let dinner = Dinner::hydrate(DinnerId(9), &valid_spec(), DinnerStatus::InProgress)
            .expect("valid spec");
        assert_eq!(dinner.id(), DinnerId(9));
        assert_eq!(dinner.status(), DinnerStatus::InProgress);
        assert_eq!(dinner.snapshot().status, "IN_PROGRESS");
    }
}
