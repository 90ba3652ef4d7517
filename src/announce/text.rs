//! Announcement wording.

/// Render a distance for speech: meters below 1 km, kilometers above.
pub fn format_distance(meters: f64) -> String {
    let meters = meters.max(0.0);
    if meters >= 1000.0 {
        let km = meters / 1000.0;
        if km < 10.0 {
            format!("{:.1} km", km)
        } else {
            format!("{:.0} km", km)
        }
    } else if meters >= 100.0 {
        format!("{} m", ((meters / 10.0).round() * 10.0) as u32)
    } else {
        format!("{} m", meters.round() as u32)
    }
}

/// "In 100 m, turn left onto Main Street"
pub fn maneuver(distance_m: f64, instruction: &str) -> String {
    format!(
        "In {}, {}",
        format_distance(distance_m),
        lower_first(instruction)
    )
}

pub fn arrival() -> String {
    "You have arrived at your destination".to_string()
}

/// "Faster route available, saves 3 min"
pub fn better_route(savings_s: f64) -> String {
    let minutes = ((savings_s / 60.0).round() as u64).max(1);
    format!("Faster route available, saves {} min", minutes)
}

pub fn rerouted() -> String {
    "Route recalculated".to_string()
}

pub fn off_route() -> String {
    "You are off route".to_string()
}

pub fn incident(description: &str) -> String {
    format!("Incident ahead: {}", description)
}

fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
