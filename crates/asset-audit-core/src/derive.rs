//! Metric Deriver
//!
//! Turns raw Asset Records into time-based and financial metrics against the
//! run's audit reference date. Malformed inputs are coerced here and only
//! here: unreadable dates become the configured fallback date, unreadable
//! amounts become zero. Every coercion is counted in [`CoercionStats`].

use crate::config::{IntangiblePolicy, OtherAssetPolicy, RealEstatePolicy};
use crate::pipeline::AuditContext;
use crate::record::{
    DateField, IntangibleRecord, MachineryRecord, Numeric, OtherAssetRecord, RealEstateRecord,
};
use chrono::{Months, NaiveDate, TimeDelta};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DAYS_PER_YEAR: f64 = 365.25;
/// Day count the books use to turn a useful life into an end-of-life date.
const BOOK_DAYS_PER_YEAR: f64 = 365.0;

/// Inputs of the unsupervised model, named by the derived field they read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    AcquisitionValue,
    AgeYears,
    RemainingLifeYears,
    SurfaceArea,
}

impl Feature {
    /// Source field whose absence makes this feature unrecoverable.
    pub fn source_field(&self) -> &'static str {
        match self {
            Self::AcquisitionValue => "acquisition_value",
            Self::AgeYears => "acquisition_date",
            Self::RemainingLifeYears => "end_of_life_date",
            Self::SurfaceArea => "surface_area",
        }
    }
}

/// Derived metrics that can feed the feature matrix.
pub trait FeatureRow {
    /// Feature value, NaN when the record has none.
    fn feature(&self, feature: Feature) -> f64;
}

/// How the end-of-life date of a record was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfLifeSource {
    Recorded,
    /// acquisition date plus useful life
    UsefulLife,
    /// drawn from the synthesized life range
    Synthesized,
    /// recorded value unreadable; default life applied
    DefaultLife,
    /// nothing usable; end of life equals acquisition
    AcquisitionDate,
}

/// Silent recoveries applied while deriving one class batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionStats {
    pub missing_dates: u64,
    pub unparseable_dates: u64,
    pub missing_amounts: u64,
    pub unparseable_amounts: u64,
    pub synthesized_end_of_life: u64,
}

impl CoercionStats {
    pub fn total(&self) -> u64 {
        self.missing_dates
            + self.unparseable_dates
            + self.missing_amounts
            + self.unparseable_amounts
            + self.synthesized_end_of_life
    }

    /// Resolve a date, falling back to the configured day.
    fn date(&mut self, field: &DateField, fallback: NaiveDate, id: &str, name: &str) -> NaiveDate {
        match field {
            DateField::Valid(date) => *date,
            DateField::Missing => {
                self.missing_dates += 1;
                debug!(record = id, field = name, "missing date coerced to fallback");
                fallback
            }
            DateField::Invalid(raw) => {
                self.unparseable_dates += 1;
                debug!(record = id, field = name, raw = %raw, "unparseable date coerced to fallback");
                fallback
            }
        }
    }

    /// Resolve an amount, coercing anything unreadable to zero.
    fn amount(&mut self, field: &Numeric, id: &str, name: &str) -> f64 {
        match field {
            Numeric::Value(v) => *v,
            Numeric::Missing => {
                self.missing_amounts += 1;
                debug!(record = id, field = name, "missing amount coerced to zero");
                0.0
            }
            Numeric::Invalid(raw) => {
                self.unparseable_amounts += 1;
                debug!(record = id, field = name, raw = %raw, "unparseable amount coerced to zero");
                0.0
            }
        }
    }
}

/// Age and remaining life shared by machinery and real estate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleMetrics {
    pub acquisition_date: NaiveDate,
    pub acquisition_value: f64,
    pub end_of_life_date: NaiveDate,
    pub end_of_life_source: EndOfLifeSource,
    pub age_years: f64,
    /// Never negative
    pub remaining_life_years: f64,
}

impl LifecycleMetrics {
    fn new(
        acquisition_date: NaiveDate,
        acquisition_value: f64,
        end_of_life_date: NaiveDate,
        end_of_life_source: EndOfLifeSource,
        reference: NaiveDate,
    ) -> Self {
        let remaining = years_between(reference, end_of_life_date).max(0.0);
        Self {
            acquisition_date,
            acquisition_value,
            end_of_life_date,
            end_of_life_source,
            age_years: round2(years_between(acquisition_date, reference)),
            remaining_life_years: round2(remaining),
        }
    }
}

impl FeatureRow for LifecycleMetrics {
    fn feature(&self, feature: Feature) -> f64 {
        match feature {
            Feature::AcquisitionValue => self.acquisition_value,
            Feature::AgeYears => self.age_years,
            Feature::RemainingLifeYears => self.remaining_life_years,
            Feature::SurfaceArea => f64::NAN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealEstateMetrics {
    #[serde(flatten)]
    pub lifecycle: LifecycleMetrics,
    /// `None` when the record carries no readable surface
    pub surface_area: Option<f64>,
}

impl FeatureRow for RealEstateMetrics {
    fn feature(&self, feature: Feature) -> f64 {
        match feature {
            Feature::SurfaceArea => self.surface_area.unwrap_or(f64::NAN),
            other => self.lifecycle.feature(other),
        }
    }
}

/// Amortization and book value checks for an intangible asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntangibleMetrics {
    pub acquisition_date: NaiveDate,
    pub cost: f64,
    pub useful_life_years: f64,
    pub simulated_accumulated_amortization: f64,
    pub simulated_net_book_value: f64,
    /// cost − simulated accumulated amortization
    pub net_book_value_calculated: f64,
    /// calculated − simulated net book value; zero for consistent books
    pub discrepancy_vnc: f64,
    /// cost / useful life, zero when the life is zero
    pub annual_amortization: f64,
    pub years_elapsed: f64,
    pub age_years: f64,
    /// Never exceeds cost
    pub expected_accumulated_amortization: f64,
    /// expected − simulated accumulated amortization
    pub amortization_discrepancy: f64,
    pub has_book_value_discrepancy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherAssetMetrics {
    pub registration_date: NaiveDate,
    pub amount: f64,
    pub days_since_registration: i64,
    pub is_stale: bool,
}

pub fn derive_machinery(
    record: &MachineryRecord,
    ctx: &AuditContext,
    stats: &mut CoercionStats,
) -> LifecycleMetrics {
    let id = record.id.as_str();
    let acquired = stats.date(&record.acquisition_date, ctx.fallback_date, id, "acquisition_date");
    let value = stats.amount(&record.acquisition_value, id, "acquisition_value");

    let useful_life_end = record
        .useful_life_years
        .value()
        .and_then(|years| add_days(acquired, (years * BOOK_DAYS_PER_YEAR).round() as i64));

    if let DateField::Invalid(raw) = &record.end_of_life_date {
        stats.unparseable_dates += 1;
        debug!(record = id, raw = %raw, "unparseable end of life ignored");
    }

    let (end_of_life, source) = match (&record.end_of_life_date, useful_life_end) {
        (DateField::Valid(date), _) => (*date, EndOfLifeSource::Recorded),
        (_, Some(date)) => (date, EndOfLifeSource::UsefulLife),
        (_, None) => (acquired, EndOfLifeSource::AcquisitionDate),
    };

    LifecycleMetrics::new(acquired, value, end_of_life, source, ctx.reference_date())
}

pub fn derive_real_estate(
    record: &RealEstateRecord,
    policy: &RealEstatePolicy,
    ctx: &AuditContext,
    stats: &mut CoercionStats,
) -> RealEstateMetrics {
    let id = record.id.as_str();
    let acquired = stats.date(&record.acquisition_date, ctx.fallback_date, id, "acquisition_date");
    let value = stats.amount(&record.acquisition_value, id, "acquisition_value");

    let (end_of_life, source) = match &record.end_of_life_date {
        DateField::Valid(date) => (*date, EndOfLifeSource::Recorded),
        DateField::Missing => {
            stats.synthesized_end_of_life += 1;
            let years = synthesized_life_years(id, policy, ctx.seed);
            debug!(record = id, years, "end of life synthesized");
            (add_years(acquired, years), EndOfLifeSource::Synthesized)
        }
        DateField::Invalid(raw) => {
            stats.unparseable_dates += 1;
            debug!(record = id, raw = %raw, "unparseable end of life replaced by default life");
            (
                add_years(acquired, policy.unparseable_life_years),
                EndOfLifeSource::DefaultLife,
            )
        }
    };

    RealEstateMetrics {
        lifecycle: LifecycleMetrics::new(acquired, value, end_of_life, source, ctx.reference_date()),
        surface_area: record.surface_area.value(),
    }
}

pub fn derive_intangible(
    record: &IntangibleRecord,
    policy: &IntangiblePolicy,
    ctx: &AuditContext,
    stats: &mut CoercionStats,
) -> IntangibleMetrics {
    let id = record.id.as_str();
    let acquired = stats.date(&record.acquisition_date, ctx.fallback_date, id, "acquisition_date");
    let cost = stats.amount(&record.cost, id, "cost");
    let life = stats.amount(&record.useful_life_years, id, "useful_life_years");
    let simulated_accumulated = stats.amount(
        &record.simulated_accumulated_amortization,
        id,
        "simulated_accumulated_amortization",
    );
    let simulated_nbv =
        stats.amount(&record.simulated_net_book_value, id, "simulated_net_book_value");

    let net_book_value_calculated = cost - simulated_accumulated;
    let discrepancy_vnc = net_book_value_calculated - simulated_nbv;

    let annual = cost / life;
    let annual_amortization = if annual.is_finite() { annual } else { 0.0 };

    let years_elapsed = years_between(acquired, ctx.reference_date());
    let expected_accumulated_amortization = cost.min(annual_amortization * years_elapsed);

    IntangibleMetrics {
        acquisition_date: acquired,
        cost,
        useful_life_years: life,
        simulated_accumulated_amortization: simulated_accumulated,
        simulated_net_book_value: simulated_nbv,
        net_book_value_calculated,
        discrepancy_vnc,
        annual_amortization,
        years_elapsed,
        age_years: years_elapsed,
        expected_accumulated_amortization,
        amortization_discrepancy: expected_accumulated_amortization - simulated_accumulated,
        has_book_value_discrepancy: discrepancy_vnc.abs() > policy.book_value_tolerance,
    }
}

pub fn derive_other_asset(
    record: &OtherAssetRecord,
    policy: &OtherAssetPolicy,
    ctx: &AuditContext,
    stats: &mut CoercionStats,
) -> OtherAssetMetrics {
    let id = record.id.as_str();
    let registered =
        stats.date(&record.registration_date, ctx.fallback_date, id, "registration_date");
    let amount = stats.amount(&record.amount, id, "amount");
    let days = (ctx.reference_date() - registered).num_days();

    OtherAssetMetrics {
        registration_date: registered,
        amount,
        days_since_registration: days,
        is_stale: days > policy.stale_after_days,
    }
}

/// Useful life for a record with no end-of-life date.
///
/// Keyed on the record id and run seed, so the draw does not depend on the
/// record's position in the batch.
pub fn synthesized_life_years(id: &str, policy: &RealEstatePolicy, seed: u64) -> u32 {
    let range = policy.synthesized_life_years;
    let key = xxhash_rust::xxh3::xxh3_64_with_seed(id.as_bytes(), seed);
    StdRng::seed_from_u64(key).random_range(range.min..range.max)
}

/// Fractional years from `from` to `to`, negative when `to` is earlier.
pub fn years_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / DAYS_PER_YEAR
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    TimeDelta::try_days(days).and_then(|delta| date.checked_add_signed(delta))
}

fn add_years(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_add_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MAX)
}
