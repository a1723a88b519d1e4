//! Billing vocabulary and arithmetic (plans, subscriptions, invoices, coupons).
//!
//! All amounts are integer cents. Status and interval values are stored as
//! plain strings in the database; the enums here convert in both directions.

use chrono::{DateTime, Datelike, Months, Utc};

use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How often a plan bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanInterval {
    Month,
    Year,
}

impl PlanInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    fn months(&self) -> u32 {
        match self {
            Self::Month => 1,
            Self::Year => 12,
        }
    }
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trialing" => Some(Self::Trialing),
            "active" => Some(Self::Active),
            "past_due" => Some(Self::PastDue),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// Payment state of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Open,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Paid => "paid",
            Self::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "paid" => Some(Self::Paid),
            "void" => Some(Self::Void),
            _ => None,
        }
    }

    /// Initial status of a freshly issued invoice: nothing to collect means
    /// it is settled on creation.
    pub fn for_amount(amount_due_cents: i64) -> Self {
        if amount_due_cents == 0 {
            Self::Paid
        } else {
            Self::Open
        }
    }
}

// ---------------------------------------------------------------------------
// Periods
// ---------------------------------------------------------------------------

/// End of the billing period starting at `start`.
///
/// Uses calendar months; days past the end of a shorter month clamp to its
/// last day (Jan 31 + 1 month = Feb 28 or 29).
pub fn advance_period(start: Timestamp, interval: PlanInterval) -> Timestamp {
    start
        .checked_add_months(Months::new(interval.months()))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// End of a free trial of `trial_days` days starting at `start`.
pub fn trial_end(start: Timestamp, trial_days: i32) -> Timestamp {
    start + chrono::Duration::days(i64::from(trial_days))
}

// ---------------------------------------------------------------------------
// Coupons
// ---------------------------------------------------------------------------

/// A discount taken from a coupon row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discount {
    /// Percentage off, 1..=100.
    Percent(i32),
    /// Fixed amount off, in cents.
    Amount(i64),
}

impl Discount {
    /// Build a discount from the two nullable coupon columns.
    pub fn from_columns(percent_off: Option<i32>, amount_off_cents: Option<i64>) -> Option<Self> {
        match (percent_off, amount_off_cents) {
            (Some(pct), _) if (1..=100).contains(&pct) => Some(Self::Percent(pct)),
            (None, Some(amount)) if amount > 0 => Some(Self::Amount(amount)),
            _ => None,
        }
    }

    /// Cents taken off `amount`. Never exceeds `amount`; percentages round
    /// down so the customer is never over-credited by a fraction of a cent.
    pub fn discount_on(&self, amount: i64) -> i64 {
        if amount <= 0 {
            return 0;
        }
        let off = match self {
            Self::Percent(pct) => amount * i64::from(*pct) / 100,
            Self::Amount(cents) => *cents,
        };
        off.min(amount)
    }

    /// Amount left to pay after the discount.
    pub fn apply(&self, amount: i64) -> i64 {
        amount - self.discount_on(amount)
    }
}

/// Coupon usability at `now`, independent of storage.
pub fn coupon_usable(
    is_active: bool,
    valid_until: Option<Timestamp>,
    max_redemptions: Option<i32>,
    times_redeemed: i32,
    now: Timestamp,
) -> bool {
    if !is_active {
        return false;
    }
    if valid_until.is_some_and(|until| until <= now) {
        return false;
    }
    if max_redemptions.is_some_and(|max| times_redeemed >= max) {
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

/// Line totals of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceAmounts {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub amount_due_cents: i64,
}

impl InvoiceAmounts {
    pub fn compute(subtotal_cents: i64, discount: Option<Discount>) -> Self {
        let discount_cents = discount.map_or(0, |d| d.discount_on(subtotal_cents));
        Self {
            subtotal_cents,
            discount_cents,
            amount_due_cents: subtotal_cents - discount_cents,
        }
    }
}

/// Human-facing invoice number, unique per user sequence.
pub fn invoice_number(user_id: DbId, seq: i64) -> String {
    format!("INV-{user_id}-{seq:06}")
}

/// Share of `price_cents` covering the rest of the period after `now`.
///
/// Computed on whole seconds with integer arithmetic, rounding down. `now`
/// outside the period clamps to zero or the full price.
pub fn unused_share(
    price_cents: i64,
    period_start: Timestamp,
    period_end: Timestamp,
    now: Timestamp,
) -> i64 {
    let total = (period_end - period_start).num_seconds();
    if total <= 0 {
        return 0;
    }
    let remaining = (period_end - now).num_seconds().clamp(0, total);
    let share = i128::from(price_cents) * i128::from(remaining) / i128::from(total);
    // remaining <= total, so the share never exceeds price_cents.
    i64::try_from(share).unwrap_or(price_cents)
}

/// Amount due when switching plans mid-period.
///
/// The customer is credited for the unused share of the old price and
/// charged the unused share of the new price. Downgrades never produce a
/// negative charge; the credit is simply forfeited.
pub fn prorate_plan_change(
    old_price_cents: i64,
    new_price_cents: i64,
    period_start: Timestamp,
    period_end: Timestamp,
    now: Timestamp,
) -> i64 {
    let credit = unused_share(old_price_cents, period_start, period_end, now);
    let charge = unused_share(new_price_cents, period_start, period_end, now);
    (charge - credit).max(0)
}

/// Whether a card expiring at the end of `exp_month/exp_year` is still valid
/// on `now`.
pub fn card_valid_on(exp_year: i32, exp_month: i32, now: Timestamp) -> bool {
    let current = now.year() * 12 + now.month() as i32;
    exp_year * 12 + exp_month >= current
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn statuses_round_trip_their_database_strings() {
        for status in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InvoiceStatus::parse("paid"), Some(InvoiceStatus::Paid));
        assert_eq!(PlanInterval::parse("week"), None);
    }

    #[test]
    fn monthly_period_clamps_to_month_end() {
        assert_eq!(advance_period(at(2025, 1, 31), PlanInterval::Month), at(2025, 2, 28));
        assert_eq!(advance_period(at(2024, 1, 31), PlanInterval::Month), at(2024, 2, 29));
        assert_eq!(advance_period(at(2025, 3, 15), PlanInterval::Month), at(2025, 4, 15));
    }

    #[test]
    fn yearly_period_handles_leap_day() {
        assert_eq!(advance_period(at(2024, 2, 29), PlanInterval::Year), at(2025, 2, 28));
    }

    #[test]
    fn trial_adds_whole_days() {
        assert_eq!(trial_end(at(2025, 1, 1), 14), at(2025, 1, 15));
    }

    #[test]
    fn percent_discount_rounds_down() {
        let d = Discount::Percent(15);
        assert_eq!(d.discount_on(999), 149);
        assert_eq!(d.apply(999), 850);
    }

    #[test]
    fn amount_discount_never_goes_negative() {
        let d = Discount::Amount(5_000);
        assert_eq!(d.apply(2_990), 0);
        assert_eq!(d.discount_on(0), 0);
    }

    #[test]
    fn discount_from_columns_rejects_out_of_range() {
        assert_eq!(Discount::from_columns(Some(0), None), None);
        assert_eq!(Discount::from_columns(None, Some(-1)), None);
        assert_eq!(Discount::from_columns(Some(20), None), Some(Discount::Percent(20)));
        assert_eq!(Discount::from_columns(None, Some(300)), Some(Discount::Amount(300)));
    }

    #[test]
    fn coupon_usability_rules() {
        let now = at(2025, 6, 1);
        assert!(coupon_usable(true, None, None, 0, now));
        assert!(!coupon_usable(false, None, None, 0, now));
        assert!(!coupon_usable(true, Some(at(2025, 5, 31)), None, 0, now));
        assert!(coupon_usable(true, Some(at(2025, 6, 2)), Some(3), 2, now));
        assert!(!coupon_usable(true, None, Some(3), 3, now));
    }

    #[test]
    fn invoice_amounts_apply_discount() {
        let amounts = InvoiceAmounts::compute(4_900, Some(Discount::Percent(10)));
        assert_eq!(amounts.discount_cents, 490);
        assert_eq!(amounts.amount_due_cents, 4_410);

        let plain = InvoiceAmounts::compute(4_900, None);
        assert_eq!(plain.amount_due_cents, 4_900);
    }

    #[test]
    fn zero_amount_invoices_start_paid() {
        assert_eq!(InvoiceStatus::for_amount(0), InvoiceStatus::Paid);
        assert_eq!(InvoiceStatus::for_amount(1), InvoiceStatus::Open);
    }

    #[test]
    fn invoice_number_is_zero_padded() {
        assert_eq!(invoice_number(7, 12), "INV-7-000012");
    }

    #[test]
    fn upgrade_halfway_charges_half_the_difference() {
        let start = at(2025, 4, 1);
        let end = at(2025, 5, 1);
        let mid = start + (end - start) / 2;
        assert_eq!(prorate_plan_change(1_000, 3_000, start, end, mid), 1_000);
    }

    #[test]
    fn downgrade_is_free() {
        let start = at(2025, 4, 1);
        let end = at(2025, 5, 1);
        assert_eq!(prorate_plan_change(3_000, 1_000, start, end, at(2025, 4, 10)), 0);
    }

    #[test]
    fn proration_outside_period_is_clamped() {
        let start = at(2025, 4, 1);
        let end = at(2025, 5, 1);
        assert_eq!(prorate_plan_change(1_000, 3_000, start, end, at(2025, 6, 1)), 0);
        assert_eq!(prorate_plan_change(1_000, 3_000, start, end, at(2025, 3, 1)), 2_000);
        assert_eq!(prorate_plan_change(1_000, 3_000, end, start, at(2025, 4, 2)), 0);
    }

    #[test]
    fn unused_share_of_a_fresh_period_is_the_full_price() {
        let start = at(2025, 4, 1);
        let end = at(2025, 5, 1);
        assert_eq!(unused_share(4_900, start, end, start), 4_900);
        assert_eq!(unused_share(4_900, start, end, end), 0);
    }

    #[test]
    fn card_validity_is_month_granular() {
        assert!(card_valid_on(2025, 6, at(2025, 6, 30)));
        assert!(!card_valid_on(2025, 5, at(2025, 6, 1)));
    }
}
