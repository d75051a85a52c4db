use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{event::Event, trip::Trip};

const GRID_CELLS: usize = 42;

/// Every calendar date from `start` to `end`, both included.
pub fn day_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|day| *day <= end).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub events: Vec<Event>,
}

/// Buckets events per day. Untimed events come first; events whose date is
/// not in `days` are dropped.
pub fn group_by_day(events: &[Event], days: &[NaiveDate]) -> Vec<DayBucket> {
    days.iter()
        .map(|date| {
            let mut events: Vec<Event> = events
                .iter()
                .filter(|event| event.date == *date)
                .cloned()
                .collect();
            events.sort_by_key(|event| event.start_time);
            DayBucket {
                date: *date,
                events,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarCell {
    pub date: NaiveDate,
    pub in_month: bool,
    pub trips: Vec<Trip>,
}

/// Six weeks of cells starting on the Sunday on or before the first of
/// `month`'s month.
pub fn month_grid(month: NaiveDate, trips: &[Trip]) -> Vec<CalendarCell> {
    let first = month.with_day(1).unwrap_or(month);
    let start = first - Duration::days(first.weekday().num_days_from_sunday().into());
    start
        .iter_days()
        .take(GRID_CELLS)
        .map(|date| CalendarCell {
            date,
            in_month: date.month() == first.month() && date.year() == first.year(),
            trips: trips
                .iter()
                .filter(|trip| trip.covers(date))
                .cloned()
                .collect(),
        })
        .collect()
}

/// Parses `YYYY-MM` into the first day of that month.
pub fn parse_month(raw: &str) -> Option<NaiveDate> {
    let (year, month) = raw.trim().split_once('-')?;
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(id: i64, day: NaiveDate, start: Option<(u32, u32)>) -> Event {
        Event {
            id,
            trip_id: 1,
            location_id: None,
            date: day,
            start_time: start.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0)),
            end_time: None,
            title: format!("e{id}"),
            kind: "activity".into(),
            cost: None,
            notes: None,
            category_type: "other".into(),
            is_refundable: false,
            reservation_link: None,
        }
    }

    fn trip(id: i64, start: NaiveDate, end: NaiveDate) -> Trip {
        Trip {
            id,
            owner_id: 1,
            name: format!("trip {id}"),
            destination: "Oslo".into(),
            start_date: start,
            end_date: end,
            total_budget: 0.0,
            currency: "USD".into(),
            party_size: 1,
            price_sensitivity: "balanced".into(),
            trip_type: "balanced".into(),
        }
    }

    #[test]
    fn range_is_inclusive_and_empty_when_reversed() {
        let days = day_range(date(2026, 2, 27), date(2026, 3, 2));
        assert_eq!(days.len(), 4);
        assert_eq!(days[0], date(2026, 2, 27));
        assert_eq!(days[3], date(2026, 3, 2));
        assert_eq!(day_range(date(2026, 1, 1), date(2026, 1, 1)).len(), 1);
        assert!(day_range(date(2026, 1, 2), date(2026, 1, 1)).is_empty());
    }

    #[test]
    fn untimed_events_lead_each_day() {
        let d1 = date(2026, 7, 1);
        let d2 = date(2026, 7, 2);
        let events = vec![
            event(1, d1, Some((14, 0))),
            event(2, d1, None),
            event(3, d1, Some((9, 30))),
            event(4, d2, Some((8, 0))),
            event(5, date(2026, 7, 9), None),
        ];
        let buckets = group_by_day(&events, &[d1, d2]);
        assert_eq!(buckets.len(), 2);
        let ids: Vec<i64> = buckets[0].events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(buckets[1].events.len(), 1);
    }

    #[test]
    fn grid_starts_on_sunday() {
        // 2026-10-01 is a Thursday.
        let cells = month_grid(date(2026, 10, 15), &[trip(1, date(2026, 9, 30), date(2026, 10, 2))]);
        assert_eq!(cells.len(), 42);
        assert_eq!(cells[0].date, date(2026, 9, 27));
        assert!(!cells[0].in_month);
        assert!(cells[4].in_month);
        assert_eq!(cells[3].trips.len(), 1);
        assert_eq!(cells[5].trips.len(), 1);
        assert!(cells[6].trips.is_empty());
    }

    #[test]
    fn month_parsing() {
        assert_eq!(parse_month("2026-03"), Some(date(2026, 3, 1)));
        assert_eq!(parse_month("2026-13"), None);
        assert_eq!(parse_month("March"), None);
    }
}
