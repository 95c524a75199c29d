//! Typed views over warehouse result sets, plus the one piece of local
//! logic the dashboard owns: fixed-threshold bucketing of sentiment scores
//! and RFM measures.

use crate::session::RowSet;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

/// Cortex Analyst reply, unpacked from the JSON document in the `RESPONSE`
/// column. Either field may be absent depending on the question.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalystReply {
    pub sql: Option<String>,
    pub answer: Option<String>,
}

impl AnalystReply {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse analyst response")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Cortex sentiment scores are in [-1, 1]; the cutoffs at +/-0.3 match
    /// the dashboard's traffic-light buckets.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.3 {
            Self::Positive
        } else if score <= -0.3 {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Positive => "😊 Positive",
            Self::Neutral => "😐 Neutral",
            Self::Negative => "😞 Negative",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Review {
    pub id: i64,
    pub rating: f64,
    pub text: String,
    pub score: f64,
}

impl Review {
    pub fn from_rows(rows: &RowSet) -> Vec<Review> {
        (0..rows.len())
            .filter_map(|i| {
                Some(Review {
                    id: rows.i64_at(i, "REVIEW_ID")?,
                    rating: rows.f64_at(i, "OVERALL_RATING").unwrap_or(0.0),
                    text: rows.str_at(i, "REVIEW_TEXT").unwrap_or("").to_string(),
                    score: rows.f64_at(i, "SENTIMENT_SCORE")?,
                })
            })
            .collect()
    }

    pub fn sentiment(&self) -> SentimentLabel {
        SentimentLabel::from_score(self.score)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SentimentSummary {
    pub avg_score: f64,
    pub positive_pct: f64,
    pub negative_pct: f64,
    pub avg_rating: f64,
}

impl SentimentSummary {
    pub fn from_reviews(reviews: &[Review]) -> Option<Self> {
        if reviews.is_empty() {
            return None;
        }
        let n = reviews.len() as f64;
        let positive = reviews
            .iter()
            .filter(|r| r.sentiment() == SentimentLabel::Positive)
            .count() as f64;
        let negative = reviews
            .iter()
            .filter(|r| r.sentiment() == SentimentLabel::Negative)
            .count() as f64;
        Some(Self {
            avg_score: reviews.iter().map(|r| r.score).sum::<f64>() / n,
            positive_pct: positive / n * 100.0,
            negative_pct: negative / n * 100.0,
            avg_rating: reviews.iter().map(|r| r.rating).sum::<f64>() / n,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Champion,
    Loyal,
    AtRisk,
    Lost,
    Regular,
}

impl Segment {
    pub const ALL: [Segment; 5] = [
        Segment::Champion,
        Segment::Loyal,
        Segment::Regular,
        Segment::AtRisk,
        Segment::Lost,
    ];

    /// RFM bucketing. Rules are checked in order, first match wins.
    pub fn classify(recency_days: i64, frequency: i64, monetary: f64) -> Self {
        if recency_days < 30 && frequency >= 5 && monetary >= 200.0 {
            Self::Champion
        } else if recency_days < 60 && frequency >= 3 {
            Self::Loyal
        } else if recency_days > 90 && monetary >= 100.0 {
            Self::AtRisk
        } else if recency_days > 120 {
            Self::Lost
        } else {
            Self::Regular
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Champion => "⭐ Champion",
            Self::Loyal => "💚 Loyal",
            Self::Regular => "👋 Regular",
            Self::AtRisk => "⚠ At Risk",
            Self::Lost => "👻 Lost",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub recency_days: i64,
    pub orders: i64,
    pub lifetime_value: f64,
    pub segment: Segment,
}

impl Customer {
    pub fn from_rows(rows: &RowSet) -> Vec<Customer> {
        (0..rows.len())
            .filter_map(|i| {
                let recency_days = rows.i64_at(i, "DAYS_SINCE_LAST_ORDER")?;
                let orders = rows.i64_at(i, "TOTAL_ORDERS")?;
                let lifetime_value = rows.f64_at(i, "LIFETIME_VALUE")?;
                Some(Customer {
                    name: rows.str_at(i, "CUSTOMER_NAME").unwrap_or("").to_string(),
                    email: rows.str_at(i, "EMAIL").unwrap_or("").to_string(),
                    recency_days,
                    orders,
                    lifetime_value,
                    segment: Segment::classify(recency_days, orders, lifetime_value),
                })
            })
            .collect()
    }
}

pub fn segment_counts(customers: &[Customer]) -> [(Segment, usize); 5] {
    Segment::ALL.map(|segment| {
        let count = customers.iter().filter(|c| c.segment == segment).count();
        (segment, count)
    })
}

#[derive(Debug, Clone)]
pub struct ForecastPoint {
    pub location: String,
    pub date: NaiveDate,
    pub forecast: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ForecastPoint {
    pub fn from_rows(rows: &RowSet) -> Vec<ForecastPoint> {
        (0..rows.len())
            .filter_map(|i| {
                Some(ForecastPoint {
                    location: rows.str_at(i, "LOCATION_NAME")?.to_string(),
                    date: parse_date(rows.str_at(i, "FORECAST_DATE")?)?,
                    forecast: rows.f64_at(i, "FORECAST")?,
                    lower: rows.f64_at(i, "LOWER_BOUND").unwrap_or(f64::NAN),
                    upper: rows.f64_at(i, "UPPER_BOUND").unwrap_or(f64::NAN),
                })
            })
            .collect()
    }
}

/// Timestamps come back as `YYYY-MM-DD[ HH:MM:SS...]`; only the date part
/// matters for a daily forecast.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TodayKpis {
    pub orders: i64,
    pub revenue: f64,
    pub avg_order: f64,
}

impl TodayKpis {
    /// A day with no orders yields an all-NULL row; render it as zeros.
    pub fn from_rows(rows: &RowSet) -> TodayKpis {
        TodayKpis {
            orders: rows.i64_at(0, "ORDERS_TODAY").unwrap_or(0),
            revenue: rows.f64_at(0, "REVENUE_TODAY").unwrap_or(0.0),
            avg_order: rows.f64_at(0, "AVG_ORDER").unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationRevenue {
    pub location: String,
    pub orders: i64,
    pub revenue: f64,
}

impl LocationRevenue {
    pub fn from_rows(rows: &RowSet) -> Vec<LocationRevenue> {
        (0..rows.len())
            .filter_map(|i| {
                Some(LocationRevenue {
                    location: rows.str_at(i, "LOCATION_NAME")?.to_string(),
                    orders: rows.i64_at(i, "ORDERS").unwrap_or(0),
                    revenue: rows.f64_at(i, "REVENUE")?,
                })
            })
            .collect()
    }
}

/// Dollar amount with thousands separators, for the metric widgets.
pub fn format_usd(amount: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, amount.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    match frac_part {
        Some(f) => format!("{sign}${grouped}.{f}"),
        None => format!("{sign}${grouped}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sentiment_thresholds_are_inclusive() {
        assert_eq!(SentimentLabel::from_score(0.3), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.299), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(0.0), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.299), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.3), SentimentLabel::Negative);
        assert_eq!(SentimentLabel::from_score(0.95), SentimentLabel::Positive);
    }

    #[test]
    fn segment_rules_match_in_order() {
        // All three champion conditions hold
        assert_eq!(Segment::classify(10, 6, 250.0), Segment::Champion);
        // Recent and frequent but low spend falls through to Loyal
        assert_eq!(Segment::classify(10, 6, 50.0), Segment::Loyal);
        assert_eq!(Segment::classify(45, 3, 500.0), Segment::Loyal);
        // Lapsed with meaningful spend
        assert_eq!(Segment::classify(100, 2, 150.0), Segment::AtRisk);
        // Long gone, low spend
        assert_eq!(Segment::classify(130, 1, 50.0), Segment::Lost);
        // Lapsed but cheap, not yet lost
        assert_eq!(Segment::classify(100, 2, 50.0), Segment::Regular);
        assert_eq!(Segment::classify(70, 1, 80.0), Segment::Regular);
    }

    #[test]
    fn at_risk_takes_precedence_over_lost() {
        // recency > 120 with monetary >= 100 still matches the earlier rule
        assert_eq!(Segment::classify(150, 2, 300.0), Segment::AtRisk);
    }

    #[test]
    fn summary_averages_and_percentages() {
        let reviews = vec![
            Review { id: 1, rating: 5.0, text: "great".into(), score: 0.8 },
            Review { id: 2, rating: 1.0, text: "bad".into(), score: -0.6 },
            Review { id: 3, rating: 3.0, text: "ok".into(), score: 0.1 },
            Review { id: 4, rating: 5.0, text: "love it".into(), score: 0.5 },
        ];
        let summary = SentimentSummary::from_reviews(&reviews).unwrap();
        assert!((summary.avg_score - 0.2).abs() < 1e-9);
        assert!((summary.positive_pct - 50.0).abs() < 1e-9);
        assert!((summary.negative_pct - 25.0).abs() < 1e-9);
        assert!((summary.avg_rating - 3.5).abs() < 1e-9);
        assert!(SentimentSummary::from_reviews(&[]).is_none());
    }

    #[test]
    fn analyst_reply_tolerates_missing_fields() {
        let reply = AnalystReply::parse(r#"{"sql": "SELECT 1", "answer": "One."}"#).unwrap();
        assert_eq!(reply.sql.as_deref(), Some("SELECT 1"));
        assert_eq!(reply.answer.as_deref(), Some("One."));

        let reply = AnalystReply::parse(r#"{"answer": "No query needed."}"#).unwrap();
        assert!(reply.sql.is_none());

        assert!(AnalystReply::parse("not json").is_err());
    }

    #[test]
    fn customers_are_classified_from_raw_measures() {
        let rows = RowSet {
            columns: vec![
                "CUSTOMER_NAME".into(),
                "EMAIL".into(),
                "DAYS_SINCE_LAST_ORDER".into(),
                "TOTAL_ORDERS".into(),
                "LIFETIME_VALUE".into(),
            ],
            rows: vec![
                vec![
                    json!("Mario Rossi"),
                    json!("mario@example.com"),
                    json!("12"),
                    json!("8"),
                    json!("412.50"),
                ],
                vec![
                    json!("Anna Bianchi"),
                    json!("anna@example.com"),
                    json!("125"),
                    json!("1"),
                    json!("35.00"),
                ],
            ],
        };
        let customers = Customer::from_rows(&rows);
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].segment, Segment::Champion);
        assert_eq!(customers[1].segment, Segment::Lost);

        let counts = segment_counts(&customers);
        assert_eq!(counts[0], (Segment::Champion, 1));
        assert_eq!(counts[4], (Segment::Lost, 1));
        assert_eq!(counts[2], (Segment::Regular, 0));
    }

    #[test]
    fn forecast_rows_parse_timestamps() {
        let rows = RowSet {
            columns: vec![
                "LOCATION_NAME".into(),
                "FORECAST_DATE".into(),
                "FORECAST".into(),
                "LOWER_BOUND".into(),
                "UPPER_BOUND".into(),
            ],
            rows: vec![
                vec![
                    json!("Centro"),
                    json!("2026-09-01 00:00:00.000"),
                    json!("1520.7"),
                    json!("1340.2"),
                    json!("1701.3"),
                ],
                // Malformed date rows are skipped
                vec![json!("Centro"), json!("bad"), json!("1.0"), json!("0.5"), json!("1.5")],
            ],
        };
        let points = ForecastPoint::from_rows(&rows);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2026, 9, 1).unwrap());
        assert!((points[0].forecast - 1520.7).abs() < 1e-9);
    }

    #[test]
    fn empty_kpi_row_renders_as_zeros() {
        let rows = RowSet {
            columns: vec!["ORDERS_TODAY".into(), "REVENUE_TODAY".into(), "AVG_ORDER".into()],
            rows: vec![vec![json!(null), json!(null), json!(null)]],
        };
        let kpis = TodayKpis::from_rows(&rows);
        assert_eq!(kpis.orders, 0);
        assert_eq!(kpis.revenue, 0.0);
    }

    #[test]
    fn usd_formatting_groups_thousands() {
        assert_eq!(format_usd(0.0, 0), "$0");
        assert_eq!(format_usd(1234.5, 2), "$1,234.50");
        assert_eq!(format_usd(9876543.0, 0), "$9,876,543");
        assert_eq!(format_usd(-42.0, 2), "-$42.00");
    }
}
