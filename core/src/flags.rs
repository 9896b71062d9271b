use crate::models::{LoggedMeal, MealEvent, Nutrient};

/// A nutrient is present when the logged amount reaches
/// `threshold * daily_value`. Missing amounts are never present.
#[must_use]
pub fn is_present(amount: Option<f64>, daily_value: f64, threshold: f64) -> bool {
    amount.is_some_and(|a| a >= threshold * daily_value)
}

/// Flags for one meal, aligned with `nutrients`. Amounts beyond the end of
/// `meal.nutrient_amounts` count as missing.
#[must_use]
pub fn presence_flags(meal: &LoggedMeal, nutrients: &[Nutrient], threshold: f64) -> Vec<bool> {
    nutrients
        .iter()
        .enumerate()
        .map(|(i, n)| {
            let amount = meal.nutrient_amounts.get(i).copied().flatten();
            is_present(amount, n.daily_value, threshold)
        })
        .collect()
}

#[must_use]
pub fn flag_meal(meal: LoggedMeal, nutrients: &[Nutrient], threshold: f64) -> MealEvent {
    let nutrient_present = presence_flags(&meal, nutrients, threshold);
    MealEvent {
        participant_id: meal.participant_id,
        time_begin: meal.time_begin,
        food_description: meal.food_description,
        nutrient_amounts: meal.nutrient_amounts,
        nutrient_present,
    }
}

#[must_use]
pub fn flag_meals(meals: Vec<LoggedMeal>, nutrients: &[Nutrient], threshold: f64) -> Vec<MealEvent> {
    meals
        .into_iter()
        .map(|m| flag_meal(m, nutrients, threshold))
        .collect()
}
