use chrono::{Duration, NaiveDateTime};

use crate::models::{GlucoseReading, MatchedPeak, MealEvent, ParticipantId};

/// Highest glucose value among `participant`'s readings inside the closed
/// window `[start, start + window]`. `None` when no valued reading falls in
/// the window. Windows of different meals may overlap and share readings.
#[must_use]
pub fn peak_glucose(
    participant: ParticipantId,
    start: NaiveDateTime,
    window: Duration,
    readings: &[GlucoseReading],
) -> Option<f64> {
    // past the representable range the window is open-ended
    let end = start.checked_add_signed(window);
    readings
        .iter()
        .filter(|r| r.participant_id == participant)
        .filter(|r| {
            r.timestamp
                .is_some_and(|ts| ts >= start && end.is_none_or(|end| ts <= end))
        })
        .filter_map(|r| r.glucose_mg_dl)
        .reduce(f64::max)
}

/// Peak for a single meal. Meals without a start time never match.
#[must_use]
pub fn match_meal<'a>(
    meal: &'a MealEvent,
    readings: &[GlucoseReading],
    window: Duration,
) -> Option<MatchedPeak<'a>> {
    let start = meal.time_begin?;
    peak_glucose(meal.participant_id, start, window, readings)
        .map(|peak_glucose| MatchedPeak { meal, peak_glucose })
}

/// Matched peaks for every meal that has one, in meal order.
#[must_use]
pub fn match_meals<'a>(
    meals: &'a [MealEvent],
    readings: &[GlucoseReading],
    window: Duration,
) -> Vec<MatchedPeak<'a>> {
    meals
        .iter()
        .filter_map(|m| match_meal(m, readings, window))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hm: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("2020-02-13 {hm}:00"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn reading(id: ParticipantId, hm: &str, value: Option<f64>) -> GlucoseReading {
        GlucoseReading {
            participant_id: id,
            timestamp: Some(at(hm)),
            glucose_mg_dl: value,
        }
    }

    fn meal(id: ParticipantId, hm: Option<&str>) -> MealEvent {
        MealEvent {
            participant_id: id,
            time_begin: hm.map(at),
            food_description: None,
            nutrient_amounts: vec![],
            nutrient_present: vec![],
        }
    }

    fn two_hours() -> Duration {
        Duration::hours(2)
    }

    #[test]
    fn test_three_meal_scenario() {
        let readings = vec![
            reading(7, "10:45", Some(140.0)),
            reading(7, "11:30", Some(165.0)),
            reading(7, "13:20", Some(150.0)),
        ];
        let meals = vec![
            meal(7, Some("10:00")),
            meal(7, Some("13:00")),
            meal(7, Some("19:00")),
        ];
        let matched = match_meals(&meals, &readings, two_hours());
        assert_eq!(matched.len(), 2);
        assert!((matched[0].peak_glucose - 165.0).abs() < f64::EPSILON);
        assert!(std::ptr::eq(matched[0].meal, &meals[0]));
        assert!((matched[1].peak_glucose - 150.0).abs() < f64::EPSILON);
        assert!(std::ptr::eq(matched[1].meal, &meals[1]));
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let readings = vec![
            reading(1, "09:59", Some(300.0)),
            reading(1, "10:00", Some(100.0)),
            reading(1, "12:00", Some(120.0)),
            reading(1, "12:01", Some(400.0)),
        ];
        let peak = peak_glucose(1, at("10:00"), two_hours(), &readings);
        assert_eq!(peak, Some(120.0));
    }

    #[test]
    fn test_no_readings_in_window() {
        let readings = vec![reading(1, "08:00", Some(100.0))];
        assert_eq!(peak_glucose(1, at("10:00"), two_hours(), &readings), None);
        assert_eq!(peak_glucose(1, at("10:00"), two_hours(), &[]), None);
    }

    #[test]
    fn test_other_participants_ignored() {
        let readings = vec![
            reading(2, "10:30", Some(250.0)),
            reading(1, "10:30", Some(110.0)),
        ];
        assert_eq!(peak_glucose(1, at("10:00"), two_hours(), &readings), Some(110.0));
    }

    #[test]
    fn test_missing_values_do_not_contribute() {
        let readings = vec![
            reading(1, "10:30", None),
            GlucoseReading {
                participant_id: 1,
                timestamp: None,
                glucose_mg_dl: Some(500.0),
            },
        ];
        assert_eq!(peak_glucose(1, at("10:00"), two_hours(), &readings), None);

        let mut readings = readings;
        readings.push(reading(1, "11:00", Some(130.0)));
        assert_eq!(peak_glucose(1, at("10:00"), two_hours(), &readings), Some(130.0));
    }

    #[test]
    fn test_untimed_meal_never_matches() {
        let readings = vec![reading(1, "10:30", Some(110.0))];
        let meals = vec![meal(1, None)];
        assert!(match_meals(&meals, &readings, two_hours()).is_empty());
    }

    #[test]
    fn test_overlapping_windows_share_readings() {
        let readings = vec![reading(1, "11:00", Some(180.0))];
        let meals = vec![meal(1, Some("10:00")), meal(1, Some("10:30"))];
        let matched = match_meals(&meals, &readings, two_hours());
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().all(|m| (m.peak_glucose - 180.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_custom_window() {
        let readings = vec![reading(1, "10:20", Some(140.0)), reading(1, "10:40", Some(190.0))];
        let peak = peak_glucose(1, at("10:00"), Duration::minutes(30), &readings);
        assert_eq!(peak, Some(140.0));
    }

    #[test]
    fn test_overflowing_window_is_open_ended() {
        let readings = vec![reading(1, "09:00", Some(120.0)), reading(1, "23:00", Some(210.0))];
        let peak = peak_glucose(1, at("10:00"), Duration::MAX, &readings);
        assert_eq!(peak, Some(210.0));
    }
}
