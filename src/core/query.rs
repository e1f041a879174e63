//! Query parameters for admin listings and reports

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;

use crate::core::error::{FieldValidationError, ValidationError};

/// Query parameters of the orders report
///
/// # Example
/// ```text
/// GET /api/admin/reports/orders?startDate=2025-01-01&endDate=2025-01-31&status=deposit_paid,processing
/// GET /api/admin/reports/orders?status=all
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ReportParams {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,

    #[serde(rename = "endDate")]
    pub end_date: Option<String>,

    /// Comma-separated status codes, or `all`
    pub status: Option<String>,
}

/// Query parameters of the admin order list
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ListParams {
    /// Comma-separated status codes, or `all`
    pub status: Option<String>,

    /// Maximum number of orders returned
    pub limit: Option<usize>,
}

impl ListParams {
    /// Get limit, ensuring it stays within bounds
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(50).clamp(1, 500)
    }

    pub fn to_filter(&self) -> OrderFilter {
        OrderFilter {
            statuses: parse_statuses(self.status.as_deref()),
            limit: Some(self.limit()),
            ..OrderFilter::default()
        }
    }
}

/// Filter applied by [`crate::core::OrderService::list_orders`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    /// Inclusive lower bound on `created_at`
    pub created_from: Option<DateTime<Utc>>,

    /// Inclusive upper bound on `created_at`
    pub created_to: Option<DateTime<Utc>>,

    /// Accepted status codes, matched case-insensitively; `None` accepts all
    pub statuses: Option<Vec<String>>,

    pub limit: Option<usize>,
}

impl OrderFilter {
    /// Whether an order with these attributes passes the filter
    pub fn matches(&self, created_at: &DateTime<Utc>, status: &str) -> bool {
        self.created_from.is_none_or(|from| *created_at >= from)
            && self.created_to.is_none_or(|to| *created_at <= to)
            && self.statuses.as_ref().is_none_or(|statuses| {
                statuses.iter().any(|s| s.eq_ignore_ascii_case(status))
            })
    }
}

impl ReportParams {
    /// Validate the parameters and build the filter
    ///
    /// Dates are whole days: `startDate` starts at midnight UTC and
    /// `endDate` runs until the last instant of that day.
    pub fn to_filter(&self) -> Result<OrderFilter, ValidationError> {
        let mut errors = Vec::new();

        let start = parse_day(self.start_date.as_deref(), "startDate", &mut errors);
        let end = parse_day(self.end_date.as_deref(), "endDate", &mut errors);

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                errors.push(FieldValidationError::new(
                    "startDate",
                    "must not be after endDate",
                ));
            }
        }

        if !errors.is_empty() {
            return Err(ValidationError::FieldErrors(errors));
        }

        Ok(OrderFilter {
            created_from: start.map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))),
            created_to: end.and_then(|d| {
                d.and_hms_nano_opt(23, 59, 59, 999_999_999)
                    .map(|t| Utc.from_utc_datetime(&t))
            }),
            statuses: parse_statuses(self.status.as_deref()),
            limit: None,
        })
    }
}

fn parse_day(
    value: Option<&str>,
    field: &str,
    errors: &mut Vec<FieldValidationError>,
) -> Option<NaiveDate> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(FieldValidationError::new(field, "expected YYYY-MM-DD"));
            None
        }
    }
}

/// Split a comma-separated status list; `all` or blank means no filter
pub fn parse_statuses(value: Option<&str>) -> Option<Vec<String>> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    if value.eq_ignore_ascii_case("all") {
        return None;
    }
    let statuses: Vec<String> = value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if statuses.is_empty() {
        None
    } else {
        Some(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_filter_ignores_stored_case() {
        let filter = OrderFilter {
            statuses: parse_statuses(Some("cancelled")),
            ..OrderFilter::default()
        };
        let now = Utc::now();
        assert!(filter.matches(&now, "Cancelled"));
        assert!(filter.matches(&now, "cancelled"));
        assert!(!filter.matches(&now, "completed"));
    }

    #[test]
    fn test_parse_statuses() {
        assert_eq!(parse_statuses(None), None);
        assert_eq!(parse_statuses(Some("all")), None);
        assert_eq!(parse_statuses(Some("ALL")), None);
        assert_eq!(
            parse_statuses(Some("deposit_paid, processing,,")),
            Some(vec!["deposit_paid".to_string(), "processing".to_string()])
        );
    }

    #[test]
    fn test_report_filter_covers_whole_days() {
        let params = ReportParams {
            start_date: Some("2025-03-01".to_string()),
            end_date: Some("2025-03-01".to_string()),
            status: None,
        };
        let filter = params.to_filter().unwrap();

        let morning = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let night = Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 59).unwrap();
        let next_day = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();

        assert!(filter.matches(&morning, "processing"));
        assert!(filter.matches(&night, "processing"));
        assert!(!filter.matches(&next_day, "processing"));
    }

    #[test]
    fn test_report_filter_rejects_bad_dates() {
        let params = ReportParams {
            start_date: Some("03/01/2025".to_string()),
            end_date: None,
            status: None,
        };
        assert!(params.to_filter().is_err());

        let reversed = ReportParams {
            start_date: Some("2025-03-02".to_string()),
            end_date: Some("2025-03-01".to_string()),
            status: None,
        };
        match reversed.to_filter() {
            Err(ValidationError::FieldErrors(errors)) => {
                assert_eq!(errors[0].field, "startDate");
            }
            other => panic!("expected field errors, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_statuses() {
        let filter = OrderFilter {
            statuses: Some(vec!["completed".to_string()]),
            ..OrderFilter::default()
        };
        let now = Utc::now();
        assert!(filter.matches(&now, "completed"));
        assert!(!filter.matches(&now, "cancelled"));
    }

    #[test]
    fn test_list_params_limit_bounds() {
        assert_eq!(ListParams::default().limit(), 50);
        let params = ListParams {
            status: None,
            limit: Some(10_000),
        };
        assert_eq!(params.limit(), 500);
    }
}
