//! SLA deadline and breach evaluation.
//!
//! Durations come from a per-priority table supplied by configuration. Each
//! dimension (respond, resolve) is tracked independently; a missing or
//! non-positive duration means that dimension carries no SLA.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::models::{Priority, SlaFlag, Ticket};

pub const DEFAULT_NEAR_THRESHOLD: f64 = 0.8;

/// Respond-within and resolve-within windows for one priority tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlaTargets {
    pub respond_within: Option<Duration>,
    pub resolve_within: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SlaPolicy {
    targets: HashMap<Priority, SlaTargets>,
    near_threshold: f64,
}

impl Default for SlaPolicy {
    fn default() -> Self {
        SlaPolicy {
            targets: HashMap::new(),
            near_threshold: DEFAULT_NEAR_THRESHOLD,
        }
    }
}

impl SlaPolicy {
    pub fn new(targets: HashMap<Priority, SlaTargets>, near_threshold: f64) -> Self {
        SlaPolicy {
            targets,
            near_threshold,
        }
    }

    pub fn with_targets(mut self, priority: Priority, targets: SlaTargets) -> Self {
        self.targets.insert(priority, targets);
        self
    }

    pub fn targets(&self, priority: Priority) -> SlaTargets {
        self.targets.get(&priority).copied().unwrap_or_default()
    }

    pub fn near_threshold(&self) -> f64 {
        self.near_threshold
    }

    pub fn response_duration(&self, priority: Priority) -> Option<Duration> {
        self.targets(priority).respond_within.filter(is_positive)
    }

    pub fn resolution_duration(&self, priority: Priority) -> Option<Duration> {
        self.targets(priority).resolve_within.filter(is_positive)
    }

    /// Response deadline for a ticket of `priority` opened at `base`.
    /// A window that would run past the representable range is not tracked.
    pub fn response_deadline(
        &self,
        priority: Priority,
        base: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.response_duration(priority)
            .and_then(|d| base.checked_add_signed(d))
    }

    pub fn resolution_deadline(
        &self,
        priority: Priority,
        base: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.resolution_duration(priority)
            .and_then(|d| base.checked_add_signed(d))
    }

    /// Stamp fresh deadlines from `base` and reset the flag.
    pub fn initialize(&self, ticket: &mut Ticket, base: DateTime<Utc>) {
        ticket.sla_response_deadline = self.response_deadline(ticket.priority, base);
        ticket.sla_resolution_deadline = self.resolution_deadline(ticket.priority, base);
        ticket.sla_flag = SlaFlag::Ok;
    }

    /// Same effect as [`initialize`](Self::initialize); called when priority changes.
    /// The caller re-evaluates the flag afterwards if the ticket is still tracked.
    pub fn recompute_deadlines(&self, ticket: &mut Ticket, base: DateTime<Utc>) {
        self.initialize(ticket, base);
    }

    pub fn evaluate_flag(&self, ticket: &Ticket, reference: DateTime<Utc>) -> SlaFlag {
        if !ticket.status.is_sla_tracked() {
            return SlaFlag::Ok;
        }

        let response = self.flag_for(
            ticket.sla_response_deadline,
            self.response_duration(ticket.priority),
            reference,
        );
        let resolution = self.flag_for(
            ticket.sla_resolution_deadline,
            self.resolution_duration(ticket.priority),
            reference,
        );

        // Variants are ordered by severity.
        response.max(resolution)
    }

    fn flag_for(
        &self,
        deadline: Option<DateTime<Utc>>,
        duration: Option<Duration>,
        reference: DateTime<Utc>,
    ) -> SlaFlag {
        let (Some(deadline), Some(duration)) = (deadline, duration) else {
            return SlaFlag::Ok;
        };

        let ratio = elapsed_ratio(deadline, duration, reference);
        if ratio >= 1.0 {
            SlaFlag::Breached
        } else if ratio >= self.near_threshold {
            SlaFlag::Near
        } else {
            SlaFlag::Ok
        }
    }
}

/// Fraction of the window `[deadline - duration, deadline]` consumed at `reference`.
///
/// Returns 0 before the window opens and for non-positive durations.
pub fn elapsed_ratio(deadline: DateTime<Utc>, duration: Duration, reference: DateTime<Utc>) -> f64 {
    if !is_positive(&duration) {
        return 0.0;
    }

    let Some(start) = deadline.checked_sub_signed(duration) else {
        return 0.0;
    };
    if reference <= start {
        return 0.0;
    }

    let elapsed = reference - start;
    elapsed.num_milliseconds() as f64 / duration.num_milliseconds() as f64
}

fn is_positive(duration: &Duration) -> bool {
    *duration > Duration::zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Status};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn high_policy() -> SlaPolicy {
        SlaPolicy::default().with_targets(
            Priority::High,
            SlaTargets {
                respond_within: Some(Duration::hours(4)),
                resolve_within: Some(Duration::hours(24)),
            },
        )
    }

    fn ticket(priority: Priority) -> Ticket {
        let created = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        Ticket {
            id: 1,
            ticket_number: "ITSM-2025-0001".to_string(),
            subject: "VPN down".to_string(),
            description: "Cannot reach the VPN".to_string(),
            category: Category::Network,
            priority,
            status: Status::New,
            reporter_id: 1,
            assignee_id: None,
            created_at: created,
            updated_at: created,
            resolved_at: None,
            closed_at: None,
            sla_response_deadline: None,
            sla_resolution_deadline: None,
            sla_flag: SlaFlag::Ok,
        }
    }

    #[test]
    fn test_initialize_sets_deadlines_and_flag() {
        let policy = high_policy();
        let mut t = ticket(Priority::High);
        t.sla_flag = SlaFlag::Breached;

        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);

        assert_eq!(t.sla_response_deadline, Some(t.created_at + Duration::hours(4)));
        assert_eq!(t.sla_resolution_deadline, Some(t.created_at + Duration::hours(24)));
        assert_eq!(t.sla_flag, SlaFlag::Ok);
    }

    #[test]
    fn test_unconfigured_priority_has_no_deadlines() {
        let policy = high_policy();
        let mut t = ticket(Priority::Low);
        t.sla_response_deadline = Some(t.created_at);

        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);

        assert_eq!(t.sla_response_deadline, None);
        assert_eq!(t.sla_resolution_deadline, None);
        assert_eq!(policy.evaluate_flag(&t, t.created_at + Duration::days(365)), SlaFlag::Ok);
    }

    #[test]
    fn test_single_dimension_configured() {
        let policy = SlaPolicy::default().with_targets(
            Priority::Medium,
            SlaTargets {
                respond_within: Some(Duration::hours(8)),
                resolve_within: None,
            },
        );
        let mut t = ticket(Priority::Medium);
        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);

        assert!(t.sla_response_deadline.is_some());
        assert_eq!(t.sla_resolution_deadline, None);
        assert_eq!(policy.evaluate_flag(&t, t.created_at + Duration::hours(9)), SlaFlag::Breached);
    }

    #[test]
    fn test_near_at_eighty_percent_of_response() {
        let policy = high_policy();
        let mut t = ticket(Priority::High);
        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);

        let at = t.created_at + Duration::hours(3) + Duration::minutes(12);
        assert_eq!(policy.evaluate_flag(&t, at), SlaFlag::Near);
    }

    #[test]
    fn test_breached_after_response_deadline() {
        let policy = high_policy();
        let mut t = ticket(Priority::High);
        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);

        assert_eq!(policy.evaluate_flag(&t, t.created_at + Duration::hours(5)), SlaFlag::Breached);
    }

    #[test]
    fn test_ok_just_before_threshold() {
        let policy = high_policy();
        let mut t = ticket(Priority::High);
        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);

        let at = t.created_at + Duration::hours(3) + Duration::minutes(11);
        assert_eq!(policy.evaluate_flag(&t, at), SlaFlag::Ok);
    }

    #[test]
    fn test_breach_exactly_at_deadline() {
        let policy = high_policy();
        let mut t = ticket(Priority::High);
        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);

        assert_eq!(policy.evaluate_flag(&t, t.created_at + Duration::hours(4)), SlaFlag::Breached);
    }

    #[test]
    fn test_most_critical_dimension_wins() {
        let policy = high_policy();
        let mut t = ticket(Priority::High);
        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);
        // Response window pushed out so only resolution is near.
        t.sla_response_deadline = Some(t.created_at + Duration::hours(30));

        let at = t.created_at + Duration::hours(20);
        assert_eq!(policy.evaluate_flag(&t, at), SlaFlag::Near);
    }

    #[test]
    fn test_untracked_status_always_ok() {
        let policy = high_policy();
        let mut t = ticket(Priority::High);
        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);

        for status in [Status::Closed, Status::Cancelled] {
            t.status = status;
            assert_eq!(policy.evaluate_flag(&t, t.created_at + Duration::days(30)), SlaFlag::Ok);
        }

        t.status = Status::Resolved;
        assert_eq!(
            policy.evaluate_flag(&t, t.created_at + Duration::days(30)),
            SlaFlag::Breached
        );
    }

    #[test]
    fn test_zero_or_negative_duration_is_no_sla() {
        let policy = SlaPolicy::default().with_targets(
            Priority::Critical,
            SlaTargets {
                respond_within: Some(Duration::zero()),
                resolve_within: Some(Duration::hours(-2)),
            },
        );
        let mut t = ticket(Priority::Critical);
        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);

        assert_eq!(t.sla_response_deadline, None);
        assert_eq!(t.sla_resolution_deadline, None);

        let deadline = t.created_at;
        assert_eq!(elapsed_ratio(deadline, Duration::zero(), deadline + Duration::days(1)), 0.0);
    }

    #[test]
    fn test_window_past_representable_range_is_untracked() {
        let policy = SlaPolicy::default().with_targets(
            Priority::Critical,
            SlaTargets {
                respond_within: Some(Duration::MAX),
                resolve_within: Some(Duration::hours(8)),
            },
        );
        let mut t = ticket(Priority::Critical);
        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);

        assert_eq!(t.sla_response_deadline, None);
        assert_eq!(t.sla_resolution_deadline, Some(t.created_at + Duration::hours(8)));
        assert_eq!(policy.evaluate_flag(&t, t.created_at + Duration::hours(9)), SlaFlag::Breached);
    }

    #[test]
    fn test_ratio_clamped_before_window() {
        let deadline = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let ratio = elapsed_ratio(deadline, Duration::hours(4), deadline - Duration::hours(6));
        assert_eq!(ratio, 0.0);
    }

    #[test]
    fn test_custom_near_threshold() {
        let policy = SlaPolicy::new(
            HashMap::from([(
                Priority::High,
                SlaTargets {
                    respond_within: Some(Duration::hours(10)),
                    resolve_within: None,
                },
            )]),
            0.5,
        );
        let mut t = ticket(Priority::High);
        let created_at = t.created_at;
        policy.initialize(&mut t, created_at);

        assert_eq!(policy.evaluate_flag(&t, t.created_at + Duration::hours(5)), SlaFlag::Near);
    }

    proptest! {
        #[test]
        fn prop_ratio_monotonic_in_elapsed_time(
            duration_mins in 1i64..10_000,
            t1 in 0i64..20_000,
            delta in 0i64..20_000,
        ) {
            let deadline = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
            let duration = Duration::minutes(duration_mins);
            let start = deadline - duration;
            let a = elapsed_ratio(deadline, duration, start + Duration::minutes(t1));
            let b = elapsed_ratio(deadline, duration, start + Duration::minutes(t1 + delta));
            prop_assert!(a <= b);
            prop_assert!(a >= 0.0);
        }

        #[test]
        fn prop_flag_never_improves_with_time(
            minutes in 0i64..3_000,
            delta in 0i64..3_000,
        ) {
            let policy = high_policy();
            let mut t = ticket(Priority::High);
            let created_at = t.created_at;
            policy.initialize(&mut t, created_at);

            let earlier = policy.evaluate_flag(&t, t.created_at + Duration::minutes(minutes));
            let later = policy.evaluate_flag(&t, t.created_at + Duration::minutes(minutes + delta));
            prop_assert!(earlier <= later);
        }
    }
}
