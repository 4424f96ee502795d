//! Unit conversions into the host's US unit system.

pub const MILE_PER_KNOT: f64 = 1.15078;
pub const MILE_PER_KM: f64 = 0.621371192;
pub const INHG_PER_MBAR: f64 = 0.0295299875;
pub const CM_PER_INCH: f64 = 2.54;

/// Host unit system marker for US customary units (°F, mph, inHg, inches).
pub const US_UNITS: u8 = 0x01;

#[inline]
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 1.8 + 32.0
}

#[inline]
pub fn knots_to_mph(knots: f64) -> f64 {
    knots * MILE_PER_KNOT
}

#[inline]
pub fn kph_to_mph(kph: f64) -> f64 {
    kph * MILE_PER_KM
}

#[inline]
pub fn mbar_to_inhg(mbar: f64) -> f64 {
    mbar * INHG_PER_MBAR
}

#[inline]
pub fn cm_to_inches(cm: f64) -> f64 {
    cm / CM_PER_INCH
}
