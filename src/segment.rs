//! Customer profiles derived from spend and recurrence thresholds

use crate::config::{CurrencyFormat, SegmentRules};
use crate::model::{mean_total_spend, CustomerAggregate};
use clap::ValueEnum;
use std::fmt;

/// Named customer segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Profile {
    /// No segmentation; every customer matches
    #[default]
    None,
    /// Spend above the global mean and loyal
    LoyalProfitable,
    /// Spend at or below the global mean and loyal
    MediumLoyal,
    /// Spend above the top threshold and loyal
    Top,
}

impl Profile {
    pub fn label(&self) -> &'static str {
        match self {
            Profile::None => "Nenhuma",
            Profile::LoyalProfitable => "Fiel e Lucrativo",
            Profile::MediumLoyal => "Médio e Fiel",
            Profile::Top => "Top Clientes",
        }
    }

    /// Human-readable rule, `None` for the unfiltered profile
    pub fn criteria(&self, rules: &SegmentRules, currency: &CurrencyFormat) -> Option<String> {
        let spend = match self {
            Profile::None => return None,
            Profile::LoyalProfitable => "Total Gasto > média geral".to_string(),
            Profile::MediumLoyal => "Total Gasto <= média geral".to_string(),
            Profile::Top => format!(
                "Total Gasto > {}",
                currency.format(rules.top_spend_threshold)
            ),
        };
        let recent = rules
            .recent_years
            .iter()
            .map(|year| year.to_string())
            .collect::<Vec<_>>()
            .join(" ou ");

        let mut text = format!(
            "{} E (Recorrência > {} anos",
            spend, rules.recurrence_threshold
        );
        if !recent.is_empty() {
            text.push_str(&format!(" ou comprou em {}", recent));
        }
        text.push(')');
        Some(text)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifies customers against a fixed population mean
#[derive(Debug, Clone)]
pub struct Segmenter<'a> {
    rules: &'a SegmentRules,
    mean_spend: f64,
}

impl<'a> Segmenter<'a> {
    /// Capture the mean total spend of the full (unfiltered) customer set
    pub fn new(population: &[CustomerAggregate], rules: &'a SegmentRules) -> Self {
        Self {
            rules,
            mean_spend: mean_total_spend(population),
        }
    }

    pub fn mean_spend(&self) -> f64 {
        self.mean_spend
    }

    /// Recurrence above the threshold, or a purchase in a recent year
    pub fn is_loyal(&self, customer: &CustomerAggregate) -> bool {
        customer.recurrence > self.rules.recurrence_threshold
            || self
                .rules
                .recent_years
                .iter()
                .any(|&year| customer.is_active_in(year))
    }

    pub fn matches(&self, profile: Profile, customer: &CustomerAggregate) -> bool {
        match profile {
            Profile::None => true,
            Profile::LoyalProfitable => {
                customer.total_spend > self.mean_spend && self.is_loyal(customer)
            }
            Profile::MediumLoyal => {
                customer.total_spend <= self.mean_spend && self.is_loyal(customer)
            }
            Profile::Top => {
                customer.total_spend > self.rules.top_spend_threshold && self.is_loyal(customer)
            }
        }
    }

    /// Profiles a customer qualifies for, most specific first
    pub fn classify(&self, customer: &CustomerAggregate) -> Vec<Profile> {
        [Profile::Top, Profile::LoyalProfitable, Profile::MediumLoyal]
            .into_iter()
            .filter(|&profile| self.matches(profile, customer))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn customer(name: &str, years: &[i32], total: f64) -> CustomerAggregate {
        CustomerAggregate::new(
            name.to_string(),
            years.iter().copied().collect::<BTreeSet<_>>(),
            total,
            "-".to_string(),
        )
    }

    fn population() -> Vec<CustomerAggregate> {
        vec![
            customer("Big Recent", &[2024], 500_000.0),
            customer("Big Old", &[2018, 2019], 300_000.0),
            customer("Loyal Small", &[2017, 2018, 2019, 2020, 2021], 1_000.0),
            customer("Small Recent", &[2025], 500.0),
            customer("Small Old", &[2019], 200.0),
        ]
    }

    #[test]
    fn test_loyalty_rule() {
        let rules = SegmentRules::default();
        let all = population();
        let segmenter = Segmenter::new(&all, &rules);

        let loyal: Vec<&str> = all
            .iter()
            .filter(|c| segmenter.is_loyal(c))
            .map(|c| c.customer.as_str())
            .collect();
        assert_eq!(loyal, vec!["Big Recent", "Loyal Small", "Small Recent"]);
    }

    #[test]
    fn test_profiles() {
        let rules = SegmentRules::default();
        let all = population();
        let segmenter = Segmenter::new(&all, &rules);
        assert_eq!(segmenter.mean_spend(), 160_340.0);

        let select = |profile: Profile| {
            all.iter()
                .filter(|c| segmenter.matches(profile, c))
                .map(|c| c.customer.as_str())
                .collect::<Vec<_>>()
        };

        assert_eq!(select(Profile::None).len(), 5);
        assert_eq!(select(Profile::Top), vec!["Big Recent"]);
        assert_eq!(select(Profile::LoyalProfitable), vec!["Big Recent"]);
        assert_eq!(select(Profile::MediumLoyal), vec!["Loyal Small", "Small Recent"]);
    }

    #[test]
    fn test_recent_years_are_configurable() {
        let rules = SegmentRules {
            recent_years: vec![2019],
            ..SegmentRules::default()
        };
        let all = population();
        let segmenter = Segmenter::new(&all, &rules);

        assert!(segmenter.is_loyal(&all[1]));
        assert!(!segmenter.is_loyal(&all[0]));
        assert_eq!(segmenter.classify(&all[1]), vec![Profile::Top, Profile::LoyalProfitable]);
    }

    #[test]
    fn test_criteria_text() {
        let rules = SegmentRules::default();
        let currency = CurrencyFormat::default();

        assert_eq!(Profile::None.criteria(&rules, &currency), None);
        assert_eq!(
            Profile::Top.criteria(&rules, &currency).unwrap(),
            "Total Gasto > R$200.000,00 E (Recorrência > 4 anos ou comprou em 2024 ou 2025)"
        );
    }
}
