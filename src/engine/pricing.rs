//! Bonding-curve pricing engine.
//!
//! Pure functions over a validated `CollectionConfig`. All arithmetic is
//! fixed-point in the smallest currency unit; no floats, no I/O, safe to
//! call with hypothetical future counts for UI previews.

use crate::engine::types::{CollectionConfig, Phase, PhasePricing, PriceQuote};

/// Price of the next mint when `minted_count` NFTs have been sold.
///
/// Counts below the first phase return its entry price; counts at or past
/// the final phase end return its exit price (no extrapolation).
pub fn price_at(minted_count: u64, config: &CollectionConfig) -> u64 {
    let phase = config.phase_at(minted_count);
    phase_price(minted_count, phase)
}

/// The phase active at a given supply position.
pub fn phase_at(minted_count: u64, config: &CollectionConfig) -> &Phase {
    config.phase_at(minted_count)
}

/// Build a full quote for the current supply position.
pub fn quote(minted_count: u64, config: &CollectionConfig) -> PriceQuote {
    let phase = config.phase_at(minted_count);
    PriceQuote {
        collection_id: config.collection_id.clone(),
        price: phase_price(minted_count, phase),
        currency: config.currency.clone(),
        phase: phase.name.clone(),
        minted_count,
    }
}

fn phase_price(minted_count: u64, phase: &Phase) -> u64 {
    match phase.pricing {
        PhasePricing::Flat { price } => price,
        PhasePricing::Curve {
            price_start,
            price_end,
            exponent,
        } => {
            let span = phase.end - phase.start;
            // Clamp local progress to [0, span]: counts before the phase
            // start price at the floor, counts past the end at the ceiling.
            let position = minted_count.saturating_sub(phase.start).min(span);
            interpolate(price_start, price_end, position, span, exponent)
        }
    }
}

/// `price_start + (price_end - price_start) * (position / span)^exponent`
/// evaluated in u128 so the division happens once, after the power, with no
/// intermediate rounding drift.
fn interpolate(price_start: u64, price_end: u64, position: u64, span: u64, exponent: u32) -> u64 {
    if span == 0 || position >= span {
        return price_end;
    }
    let delta = (price_end - price_start) as u128;
    let numerator = (position as u128).pow(exponent);
    let denominator = (span as u128).pow(exponent);
    price_start + (delta * numerator / denominator) as u64
}
