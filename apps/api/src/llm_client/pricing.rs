/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rates {
    pub input: f64,
    pub cached_input: f64,
    pub output: f64,
}

const fn rates(input: f64, cached_input: f64, output: f64) -> Rates {
    Rates {
        input,
        cached_input,
        output,
    }
}

/// Looks up rates by model substring. `auto` bills as `standard`; any other
/// unrecognized tier bills as `flex`. Unknown models use gpt-5-nano standard.
pub fn rates_for(model: &str, tier: &str) -> Rates {
    let model = model.to_ascii_lowercase();
    let tier = match tier.to_ascii_lowercase().as_str() {
        "auto" | "standard" | "default" => "standard",
        "priority" => "priority",
        _ => "flex",
    };

    if model.contains("gpt-5-nano") {
        match tier {
            "standard" => rates(0.05, 0.005, 0.4),
            // No published nano priority rates; approximated at double standard.
            "priority" => rates(0.10, 0.010, 0.8),
            _ => rates(0.025, 0.0025, 0.2),
        }
    } else if model.contains("gpt-5-mini") {
        match tier {
            "standard" => rates(0.25, 0.025, 2.0),
            "priority" => rates(0.45, 0.05, 3.6),
            _ => rates(0.125, 0.0125, 1.0),
        }
    } else if model.contains("gpt-5") {
        match tier {
            "standard" => rates(1.25, 0.125, 10.0),
            "priority" => rates(2.5, 0.25, 20.0),
            _ => rates(0.625, 0.0625, 5.0),
        }
    } else {
        rates(0.05, 0.005, 0.4)
    }
}

/// Estimated cost in USD, rounded to 6 decimal places.
///
/// `cached_input_tokens` is the subset of `input_tokens` served from the
/// prompt cache: those bill at the cached rate and the rest at the full rate.
pub fn estimate_cost_usd(
    model: &str,
    tier: &str,
    input_tokens: u64,
    cached_input_tokens: u64,
    output_tokens: u64,
) -> f64 {
    let r = rates_for(model, tier);
    let cached = cached_input_tokens.min(input_tokens);
    let uncached = input_tokens - cached;
    let cost = (uncached as f64 / 1e6) * r.input
        + (cached as f64 / 1e6) * r.cached_input
        + (output_tokens as f64 / 1e6) * r.output;
    (cost * 1e6).round() / 1e6
}
