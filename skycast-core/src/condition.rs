//! Text-to-code mapping for providers that report conditions as phrases.
//!
//! The base code is the phrase's position in [`CONDITIONS`]. A `Light `
//! qualifier adds 100 and a `Heavy ` qualifier adds 200. Anything outside the
//! vocabulary maps to [`UNKNOWN_CONDITION`].

pub const UNKNOWN_CONDITION: i32 = -1;

pub const LIGHT_OFFSET: i32 = 100;
pub const HEAVY_OFFSET: i32 = 200;

pub const CONDITIONS: [&str; 52] = [
    "Drizzle",
    "Rain",
    "Snow",
    "Snow Grains",
    "Ice Crystals",
    "Ice Pellets",
    "Hail",
    "Mist",
    "Fog",
    "Fog Patches",
    "Smoke",
    "Volcanic Ash",
    "Widespread Dust",
    "Sand",
    "Haze",
    "Spray",
    "Dust Whirls",
    "Sandstorm",
    "Low Drifting Snow",
    "Low Drifting Widespread Dust",
    "Low Drifting Sand",
    "Blowing Snow",
    "Blowing Widespread Dust",
    "Blowing Sand",
    "Rain Mist",
    "Rain Showers",
    "Snow Showers",
    "Snow Blowing Snow Mist",
    "Ice Pellet Showers",
    "Hail Showers",
    "Small Hail Showers",
    "Thunderstorm",
    "Thunderstorms and Rain",
    "Thunderstorms and Snow",
    "Thunderstorms and Ice Pellets",
    "Thunderstorms with Hail",
    "Thunderstorms with Small Hail",
    "Freezing Drizzle",
    "Freezing Rain",
    "Freezing Fog",
    "Patches of Fog",
    "Shallow Fog",
    "Partial Fog",
    "Overcast",
    "Clear",
    "Partly Cloudy",
    "Mostly Cloudy",
    "Scattered Clouds",
    "Small Hail",
    "Squalls",
    "Funnel Cloud",
    "Unknown Precipitation",
];

/// Map a condition phrase such as `"Light Rain"` to its numeric code.
pub fn condition_code(text: &str) -> i32 {
    let (offset, base) = if let Some(rest) = text.strip_prefix("Light ") {
        (LIGHT_OFFSET, rest)
    } else if let Some(rest) = text.strip_prefix("Heavy ") {
        (HEAVY_OFFSET, rest)
    } else {
        (0, text)
    };

    match CONDITIONS.iter().position(|c| *c == base) {
        Some(index) => index as i32 + offset,
        None => UNKNOWN_CONDITION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(phrase: &str) -> i32 {
        CONDITIONS.iter().position(|c| *c == phrase).unwrap() as i32
    }

    #[test]
    fn every_base_phrase_maps_to_its_index() {
        for (i, phrase) in CONDITIONS.iter().enumerate() {
            assert_eq!(condition_code(phrase), i as i32, "{phrase}");
        }
    }

    #[test]
    fn qualifiers_add_offsets() {
        assert_eq!(condition_code("Light Rain"), index_of("Rain") + 100);
        assert_eq!(condition_code("Heavy Snow"), index_of("Snow") + 200);
        assert_eq!(
            condition_code("Heavy Thunderstorms and Rain"),
            index_of("Thunderstorms and Rain") + 200
        );
        assert_eq!(condition_code("Light Freezing Drizzle"), 137);
    }

    #[test]
    fn unknown_phrases_degrade_to_minus_one() {
        assert_eq!(condition_code("Sharknado"), UNKNOWN_CONDITION);
        assert_eq!(condition_code("Light Sharknado"), UNKNOWN_CONDITION);
        assert_eq!(condition_code(""), UNKNOWN_CONDITION);
        assert_eq!(condition_code("rain"), UNKNOWN_CONDITION);
        // The vocabulary stops at "Unknown Precipitation".
        assert_eq!(condition_code("Unknown"), UNKNOWN_CONDITION);
    }

    #[test]
    fn bare_qualifier_is_not_a_condition() {
        assert_eq!(condition_code("Light"), UNKNOWN_CONDITION);
        assert_eq!(condition_code("Heavy "), UNKNOWN_CONDITION);
    }
}
