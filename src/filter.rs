//! Sequential filters narrowing the aggregated customer set

use crate::config::SegmentRules;
use crate::data::Transactions;
use crate::model::CustomerAggregate;
use crate::segment::{Profile, Segmenter};
use log::debug;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// User selections; `None` means "no restriction"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    /// Exact customer match
    pub customer: Option<String>,
    /// Inclusive recurrence bounds
    pub recurrence: Option<RangeInclusive<u32>>,
    /// Keep customers active in at least one of these years
    pub years: Option<BTreeSet<i32>>,
    pub profile: Profile,
}

/// Options offered to the user for each filter
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBounds {
    /// Distinct customers, sorted by name
    pub customers: Vec<String>,
    pub min_recurrence: u32,
    pub max_recurrence: u32,
    /// Distinct years present in the transactions
    pub years: Vec<i32>,
}

impl FilterBounds {
    pub fn from_data(
        transactions: &Transactions,
        aggregates: &[CustomerAggregate],
    ) -> crate::Result<Self> {
        let mut customers: Vec<String> = aggregates.iter().map(|c| c.customer.clone()).collect();
        customers.sort();
        customers.dedup();

        let recurrences = aggregates.iter().map(|c| c.recurrence);
        Ok(Self {
            customers,
            min_recurrence: recurrences.clone().min().unwrap_or(0),
            max_recurrence: recurrences.max().unwrap_or(0),
            years: transactions.available_years()?,
        })
    }

    /// Criteria that select everything, as the filters start out
    ///
    /// Every year selected places no restriction at all, so customers whose
    /// years were all invalid (recurrence 0) stay in the set.
    pub fn full_criteria(&self) -> FilterCriteria {
        FilterCriteria {
            customer: None,
            recurrence: Some(self.min_recurrence..=self.max_recurrence),
            years: None,
            profile: Profile::None,
        }
    }

    /// Whether `years` selects every year present in the data
    pub fn covers_all_years(&self, years: &BTreeSet<i32>) -> bool {
        !self.years.is_empty() && self.years.iter().all(|year| years.contains(year))
    }
}

/// Partition of candidates after a filter ran
pub struct FilterResult<C> {
    pub kept: Vec<C>,
    pub removed: Vec<C>,
}

/// A pure predicate over aggregated customers
pub trait CustomerFilter {
    /// Whether this filter restricts anything for the current criteria
    fn enable(&self) -> bool {
        true
    }

    fn keep(&self, customer: &CustomerAggregate) -> bool;

    /// Stable name for logging
    fn name(&self) -> &str;

    fn filter(&self, candidates: Vec<CustomerAggregate>) -> FilterResult<CustomerAggregate> {
        let (kept, removed) = candidates.into_iter().partition(|c| self.keep(c));
        FilterResult { kept, removed }
    }
}

pub struct CustomerNameFilter<'a> {
    pub customer: Option<&'a str>,
}

impl CustomerFilter for CustomerNameFilter<'_> {
    fn enable(&self) -> bool {
        self.customer.is_some()
    }

    fn keep(&self, customer: &CustomerAggregate) -> bool {
        self.customer.map_or(true, |name| customer.customer == name)
    }

    fn name(&self) -> &str {
        "customer"
    }
}

pub struct RecurrenceFilter {
    pub range: Option<RangeInclusive<u32>>,
}

impl CustomerFilter for RecurrenceFilter {
    fn enable(&self) -> bool {
        self.range.is_some()
    }

    fn keep(&self, customer: &CustomerAggregate) -> bool {
        self.range
            .as_ref()
            .map_or(true, |range| range.contains(&customer.recurrence))
    }

    fn name(&self) -> &str {
        "recurrence"
    }
}

pub struct ActiveYearFilter<'a> {
    pub years: Option<&'a BTreeSet<i32>>,
}

impl CustomerFilter for ActiveYearFilter<'_> {
    fn enable(&self) -> bool {
        self.years.is_some()
    }

    fn keep(&self, customer: &CustomerAggregate) -> bool {
        self.years.map_or(true, |years| {
            customer.active_years.iter().any(|year| years.contains(year))
        })
    }

    fn name(&self) -> &str {
        "active_years"
    }
}

pub struct ProfileFilter<'a> {
    pub profile: Profile,
    pub segmenter: Segmenter<'a>,
}

impl CustomerFilter for ProfileFilter<'_> {
    fn enable(&self) -> bool {
        self.profile != Profile::None
    }

    fn keep(&self, customer: &CustomerAggregate) -> bool {
        self.segmenter.matches(self.profile, customer)
    }

    fn name(&self) -> &str {
        "profile"
    }
}

/// Narrow the full customer set by every criterion, in sequence
///
/// The profile mean is always taken over `aggregates` (the unfiltered set),
/// so the result does not depend on the order the filters run in. Input
/// order is preserved.
pub fn apply_filters(
    aggregates: &[CustomerAggregate],
    criteria: &FilterCriteria,
    rules: &SegmentRules,
) -> Vec<CustomerAggregate> {
    let filters: Vec<Box<dyn CustomerFilter + '_>> = vec![
        Box::new(CustomerNameFilter {
            customer: criteria.customer.as_deref(),
        }),
        Box::new(RecurrenceFilter {
            range: criteria.recurrence.clone(),
        }),
        Box::new(ActiveYearFilter {
            years: criteria.years.as_ref(),
        }),
        Box::new(ProfileFilter {
            profile: criteria.profile,
            segmenter: Segmenter::new(aggregates, rules),
        }),
    ];

    let mut candidates = aggregates.to_vec();
    for filter in filters.iter().filter(|f| f.enable()) {
        let result = filter.filter(candidates);
        debug!(
            "Filter '{}' kept {} and removed {} customers",
            filter.name(),
            result.kept.len(),
            result.removed.len()
        );
        candidates = result.kept;
    }
    candidates
}
